use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{Money, Rate};

// ---------------------------------------------------------------------------
// Raw financial records
// ---------------------------------------------------------------------------

/// One fiscal year of reported figures. Every line is optional because
/// source data is routinely incomplete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinancialPeriod {
    pub revenue: Option<Money>,
    pub ebitda: Option<Money>,
    /// Operating profit
    pub ebit: Option<Money>,
    pub depreciation: Option<Money>,
    pub interest_expense: Option<Money>,
    pub profit_before_tax: Option<Money>,
    pub tax_expense: Option<Money>,
    pub net_profit: Option<Money>,
    /// Capital expenditure from the cash-flow statement (positive = spend)
    pub capex: Option<Money>,
    pub operating_cash_flow: Option<Money>,
    pub gross_block: Option<Money>,
    pub capital_work_in_progress: Option<Money>,
    pub inventory: Option<Money>,
    pub receivables: Option<Money>,
    pub payables: Option<Money>,
    pub current_assets: Option<Money>,
    pub current_liabilities: Option<Money>,
    pub total_debt: Option<Money>,
    pub cash: Option<Money>,
    pub net_worth: Option<Money>,
    pub capital_employed: Option<Money>,
    pub shares_outstanding: Option<Decimal>,
    /// Gross non-performing assets ratio (lenders only)
    pub gross_npa_ratio: Option<Rate>,
}

/// Quarterly or half-yearly figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterimPeriod {
    pub revenue: Option<Money>,
    pub ebitda: Option<Money>,
    pub ebit: Option<Money>,
    pub depreciation: Option<Money>,
    pub net_profit: Option<Money>,
    pub total_debt: Option<Money>,
    pub cash: Option<Money>,
}

/// Immutable multi-period snapshot of a company's reported metrics.
///
/// Annual periods are keyed by fiscal year. Interim periods are keyed by
/// `fiscal_year * 100 + sub_period`, e.g. `202403` is Q3 of FY2024 in
/// `quarterly` and `202402` is H2 of FY2024 in `half_yearly`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyFinancials {
    pub annual: BTreeMap<i32, FinancialPeriod>,
    pub half_yearly: BTreeMap<i32, InterimPeriod>,
    pub quarterly: BTreeMap<i32, InterimPeriod>,
}

impl CompanyFinancials {
    pub fn latest_annual(&self) -> Option<(i32, &FinancialPeriod)> {
        self.annual.iter().next_back().map(|(k, v)| (*k, v))
    }

    pub fn latest_year(&self) -> Option<i32> {
        self.annual.keys().next_back().copied()
    }

    /// Up to `count` most recent annual periods, oldest first.
    pub fn recent_annual(&self, count: usize) -> Vec<(i32, &FinancialPeriod)> {
        let mut periods: Vec<(i32, &FinancialPeriod)> = self
            .annual
            .iter()
            .rev()
            .take(count)
            .map(|(k, v)| (*k, v))
            .collect();
        periods.reverse();
        periods
    }

    /// Latest value of an annual line, searching back through older years.
    pub fn latest_annual_value(
        &self,
        accessor: impl Fn(&FinancialPeriod) -> Option<Decimal>,
    ) -> Option<(i32, Decimal)> {
        self.annual
            .iter()
            .rev()
            .find_map(|(year, p)| accessor(p).map(|v| (*year, v)))
    }

    /// Latest value of an interim line, quarters first then half-years.
    pub fn latest_interim_value(
        &self,
        accessor: impl Fn(&InterimPeriod) -> Option<Decimal>,
    ) -> Option<(i32, Decimal)> {
        self.quarterly
            .iter()
            .rev()
            .find_map(|(key, p)| accessor(p).map(|v| (*key, v)))
            .or_else(|| {
                self.half_yearly
                    .iter()
                    .rev()
                    .find_map(|(key, p)| accessor(p).map(|v| (*key, v)))
            })
    }

    /// Trailing four consecutive quarters, oldest first, when all are present.
    pub fn trailing_quarters(&self) -> Option<Vec<(i32, &InterimPeriod)>> {
        let last4: Vec<(i32, &InterimPeriod)> = self
            .quarterly
            .iter()
            .rev()
            .take(4)
            .map(|(k, v)| (*k, v))
            .collect();
        if last4.len() < 4 {
            return None;
        }
        let consecutive = last4
            .windows(2)
            .all(|w| quarter_index(w[0].0) - quarter_index(w[1].0) == 1);
        if !consecutive {
            return None;
        }
        let mut ordered = last4;
        ordered.reverse();
        Some(ordered)
    }
}

/// Fiscal year of an interim key.
pub fn interim_year(key: i32) -> i32 {
    key / 100
}

/// Quarter or half number of an interim key.
pub fn sub_period(key: i32) -> i32 {
    key % 100
}

/// Monotone index of a quarterly key, so consecutive quarters differ by one.
pub fn quarter_index(key: i32) -> i32 {
    interim_year(key) * 4 + (sub_period(key) - 1)
}

// ---------------------------------------------------------------------------
// Company identity, market data and overrides
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyProfile {
    pub name: String,
    pub symbol: String,
    pub sector: String,
    pub industry: String,
    /// Company-specific risk premium added to the cost of equity.
    pub alpha: Option<Rate>,
    /// Share of promoter holding pledged, 0..1.
    pub promoter_pledge: Option<Rate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSnapshot {
    pub price: Option<Money>,
    pub market_cap: Option<Money>,
    pub shares_outstanding: Option<Decimal>,
    pub as_of: Option<NaiveDate>,
    /// Set by the price collaborator when it could not refresh the quote.
    pub stale: bool,
}

/// Reviewer-supplied values that replace resolved inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputOverrides {
    pub base_revenue: Option<Money>,
    pub revenue_growth: Option<Vec<Rate>>,
    pub ebitda_margin: Option<Rate>,
    pub margin_drift: Option<Rate>,
    pub capex_to_sales: Option<Rate>,
    pub depreciation_to_sales: Option<Rate>,
    pub nwc_to_sales: Option<Rate>,
    pub tax_rate: Option<Rate>,
    pub risk_free_rate: Option<Rate>,
    pub equity_risk_premium: Option<Rate>,
    pub beta: Option<Decimal>,
    pub cost_of_debt: Option<Rate>,
    pub debt_ratio: Option<Rate>,
    pub terminal_roce: Option<Rate>,
    pub terminal_reinvestment: Option<Rate>,
    pub shares_outstanding: Option<Decimal>,
    pub net_debt: Option<Money>,
    pub cash: Option<Money>,
    pub wacc: Option<Rate>,
}

impl InputOverrides {
    pub fn is_empty(&self) -> bool {
        *self == InputOverrides::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quarter(revenue: Decimal) -> InterimPeriod {
        InterimPeriod {
            revenue: Some(revenue),
            ..Default::default()
        }
    }

    #[test]
    fn test_recent_annual_oldest_first() {
        let mut fin = CompanyFinancials::default();
        for (y, r) in [(2021, dec!(80)), (2022, dec!(90)), (2023, dec!(100)), (2024, dec!(110))] {
            fin.annual.insert(
                y,
                FinancialPeriod {
                    revenue: Some(r),
                    ..Default::default()
                },
            );
        }
        let recent = fin.recent_annual(3);
        assert_eq!(recent.iter().map(|(y, _)| *y).collect::<Vec<_>>(), vec![2022, 2023, 2024]);
        assert_eq!(fin.latest_year(), Some(2024));
    }

    #[test]
    fn test_trailing_quarters_requires_consecutive() {
        let mut fin = CompanyFinancials::default();
        for key in [202403, 202404, 202501, 202502] {
            fin.quarterly.insert(key, quarter(dec!(25)));
        }
        assert_eq!(fin.trailing_quarters().map(|q| q.len()), Some(4));

        fin.quarterly.remove(&202404);
        fin.quarterly.insert(202402, quarter(dec!(25)));
        assert!(fin.trailing_quarters().is_none());
    }

    #[test]
    fn test_quarter_index_crosses_year() {
        assert_eq!(quarter_index(202501) - quarter_index(202404), 1);
    }

    #[test]
    fn test_interim_key_layout() {
        assert_eq!(interim_year(202403), 2024);
        assert_eq!(sub_period(202403), 3);
        assert_eq!(quarter_index(202403) - quarter_index(202401), 2);
    }

    #[test]
    fn test_overrides_empty() {
        assert!(InputOverrides::default().is_empty());
        let o = InputOverrides {
            beta: Some(dec!(1.2)),
            ..Default::default()
        };
        assert!(!o.is_empty());
    }
}
