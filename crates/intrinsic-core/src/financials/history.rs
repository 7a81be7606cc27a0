use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;

use super::model::{CompanyFinancials, FinancialPeriod};
use crate::config::PolicyRules;
use crate::stats;
use crate::types::Rate;

/// Number of annual periods the ratio estimates look back over.
pub const LOOKBACK_YEARS: usize = 3;

/// Compound annual growth between two positive values `years` apart.
pub fn cagr(start: Decimal, end: Decimal, years: u32) -> Option<Rate> {
    if start <= Decimal::ZERO || end <= Decimal::ZERO || years == 0 {
        return None;
    }
    let ratio = end / start;
    let exponent = Decimal::ONE / Decimal::from(years);
    let growth = ratio.checked_powd(exponent)?;
    Some(growth - Decimal::ONE)
}

pub fn yoy(previous: Decimal, current: Decimal) -> Option<Rate> {
    if previous <= Decimal::ZERO {
        return None;
    }
    Some(current / previous - Decimal::ONE)
}

/// Revenue CAGR over up to `LOOKBACK_YEARS` years, measured between the
/// oldest and latest available annual revenues in the window.
pub fn revenue_cagr(fin: &CompanyFinancials) -> Option<Rate> {
    let revenues: Vec<(i32, Decimal)> = fin
        .recent_annual(LOOKBACK_YEARS + 1)
        .into_iter()
        .filter_map(|(y, p)| p.revenue.map(|r| (y, r)))
        .collect();
    let (first_year, first) = *revenues.first()?;
    let (last_year, last) = *revenues.last()?;
    let span = u32::try_from(last_year - first_year).ok()?;
    cagr(first, last, span)
}

/// Latest annual revenue growth against the immediately preceding year.
pub fn latest_revenue_yoy(fin: &CompanyFinancials) -> Option<Rate> {
    let recent = fin.recent_annual(2);
    if recent.len() < 2 || recent[1].0 - recent[0].0 != 1 {
        return None;
    }
    yoy(recent[0].1.revenue?, recent[1].1.revenue?)
}

/// Growth of the latest quarter against the same quarter a year earlier.
pub fn latest_quarter_yoy(fin: &CompanyFinancials) -> Option<Rate> {
    let (key, latest) = fin.quarterly.iter().next_back()?;
    let prior = fin.quarterly.get(&(key - 10))?;
    yoy(prior.revenue?, latest.revenue?)
}

/// Per-year `numerator / revenue` over the lookback window, oldest first.
/// Years lacking either figure or with non-positive revenue are skipped.
pub fn ratio_series(
    fin: &CompanyFinancials,
    numerator: impl Fn(&FinancialPeriod) -> Option<Decimal>,
) -> Vec<Decimal> {
    fin.recent_annual(LOOKBACK_YEARS)
        .into_iter()
        .filter_map(|(_, p)| {
            let revenue = p.revenue.filter(|r| *r > Decimal::ZERO)?;
            Some(numerator(p)? / revenue)
        })
        .collect()
}

/// Like [`ratio_series`] but the numerator is the year-on-year change of a
/// balance-sheet line (requires consecutive years).
pub fn delta_ratio_series(
    fin: &CompanyFinancials,
    level: impl Fn(&FinancialPeriod) -> Option<Decimal>,
) -> Vec<Decimal> {
    let window = fin.recent_annual(LOOKBACK_YEARS + 1);
    window
        .windows(2)
        .filter_map(|w| {
            let (prev_year, prev) = w[0];
            let (year, cur) = w[1];
            if year - prev_year != 1 {
                return None;
            }
            let revenue = cur.revenue.filter(|r| *r > Decimal::ZERO)?;
            Some((level(cur)? - level(prev)?) / revenue)
        })
        .collect()
}

/// Average of a ratio series, leaning on the latest year when the series has
/// fallen sharply from its peak. Returns the estimate and whether the trend
/// weighting kicked in.
pub fn trend_weighted_average(series: &[Decimal], rules: &PolicyRules) -> Option<(Decimal, bool)> {
    let latest = *series.last()?;
    if series.len() == 1 {
        return Some((latest, false));
    }
    if stats::peak_to_trough_decline(series) > rules.trend_decline_threshold {
        let earlier = &series[..series.len() - 1];
        let earlier_mean = stats::mean(earlier)?;
        let w = rules.trend_recent_weight;
        return Some((latest * w + earlier_mean * (Decimal::ONE - w), true));
    }
    Some((stats::mean(series)?, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn with_revenues(pairs: &[(i32, Decimal)]) -> CompanyFinancials {
        let mut fin = CompanyFinancials::default();
        for (y, r) in pairs {
            fin.annual.insert(
                *y,
                FinancialPeriod {
                    revenue: Some(*r),
                    ..Default::default()
                },
            );
        }
        fin
    }

    #[test]
    fn test_cagr_doubling_in_one_year() {
        let g = cagr(dec!(100), dec!(200), 1).unwrap();
        assert!((g - Decimal::ONE).abs() < dec!(0.0000001));
        assert!(cagr(Decimal::ZERO, dec!(200), 2).is_none());
    }

    #[test]
    fn test_revenue_cagr_three_years() {
        let fin = with_revenues(&[
            (2021, dec!(1000)),
            (2022, dec!(1100)),
            (2023, dec!(1210)),
            (2024, dec!(1331)),
        ]);
        let g = revenue_cagr(&fin).unwrap();
        assert!((g - dec!(0.10)).abs() < dec!(0.0001));
        let y = latest_revenue_yoy(&fin).unwrap();
        assert!((y - dec!(0.10)).abs() < dec!(0.0000001));
    }

    #[test]
    fn test_yoy_needs_consecutive_years() {
        let fin = with_revenues(&[(2021, dec!(100)), (2023, dec!(150))]);
        assert!(latest_revenue_yoy(&fin).is_none());
    }

    #[test]
    fn test_trend_weighting_on_steep_decline() {
        let rules = PolicyRules::default();
        let (v, weighted) =
            trend_weighted_average(&[dec!(0.20), dec!(0.16), dec!(0.10)], &rules).unwrap();
        assert!(weighted);
        // 0.65 * 0.10 + 0.35 * 0.18
        assert_eq!(v, dec!(0.128));
    }

    #[test]
    fn test_simple_mean_when_stable() {
        let rules = PolicyRules::default();
        let (v, weighted) =
            trend_weighted_average(&[dec!(0.10), dec!(0.11), dec!(0.12)], &rules).unwrap();
        assert!(!weighted);
        assert_eq!(v, dec!(0.11));
    }

    #[test]
    fn test_delta_ratio_series() {
        let mut fin = with_revenues(&[(2023, dec!(100)), (2024, dec!(200))]);
        fin.annual.get_mut(&2023).unwrap().gross_block = Some(dec!(50));
        fin.annual.get_mut(&2024).unwrap().gross_block = Some(dec!(70));
        assert_eq!(delta_ratio_series(&fin, |p| p.gross_block), vec![dec!(0.1)]);
    }
}
