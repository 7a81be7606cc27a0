//! Probe functions and the resolution chains built from them.

use rust_decimal::Decimal;
use tracing::info;

use super::chain::{Probe, ResolutionChain};
use super::history::{self, LOOKBACK_YEARS};
use super::model::{interim_year, CompanyFinancials, FinancialPeriod, MarketSnapshot};
use crate::config::{MarketParameters, PolicyRules, SectorConfig};
use crate::stats;

/// Everything a probe may look at.
pub struct ProbeContext<'a> {
    pub financials: &'a CompanyFinancials,
    pub market: Option<&'a MarketSnapshot>,
    pub sector: &'a SectorConfig,
    pub market_params: &'a MarketParameters,
    pub rules: &'a PolicyRules,
}

fn positive(v: Decimal) -> Option<Decimal> {
    (v > Decimal::ZERO).then_some(v)
}

fn trend_probe(ctx: &ProbeContext<'_>, series: &[Decimal], what: &str) -> Option<Probe> {
    let (value, weighted) = history::trend_weighted_average(series, ctx.rules)?;
    let how = if weighted {
        "trend-weighted"
    } else {
        "average"
    };
    Some(Probe::new(
        value,
        format!("{what}, {how} over {} yr", series.len()),
    ))
}

// ---------------------------------------------------------------------------
// Base revenue
// ---------------------------------------------------------------------------

pub fn base_revenue_chain<'a>() -> ResolutionChain<ProbeContext<'a>> {
    ResolutionChain::new("base_revenue")
        .actual("ttm", ttm_revenue)
        .actual("annual", annual_revenue)
        .derived("half_year", annualized_half_year)
        .derived("quarter", annualized_quarter)
}

fn ttm_revenue(ctx: &ProbeContext<'_>) -> Option<Probe> {
    let quarters = ctx.financials.trailing_quarters()?;
    let (latest_key, _) = *quarters.last()?;
    if let Some(year) = ctx.financials.latest_year() {
        if interim_year(latest_key) <= year {
            return None;
        }
    }
    let mut total = Decimal::ZERO;
    for (_, q) in &quarters {
        total += q.revenue?;
    }
    positive(total).map(|v| Probe::new(v, format!("TTM revenue, 4 quarters to {latest_key}")))
}

fn annual_revenue(ctx: &ProbeContext<'_>) -> Option<Probe> {
    let (year, revenue) = ctx.financials.latest_annual_value(|p| p.revenue.and_then(positive))?;
    Some(Probe::new(revenue, format!("FY{year} revenue")))
}

fn annualized_half_year(ctx: &ProbeContext<'_>) -> Option<Probe> {
    let (key, p) = ctx.financials.half_yearly.iter().next_back()?;
    let revenue = positive(p.revenue?)?;
    Some(Probe::new(
        revenue * Decimal::TWO,
        format!("half-year {key} revenue x 2"),
    ))
}

fn annualized_quarter(ctx: &ProbeContext<'_>) -> Option<Probe> {
    let (key, p) = ctx.financials.quarterly.iter().next_back()?;
    let revenue = positive(p.revenue?)?;
    Some(Probe::new(
        revenue * Decimal::from(4),
        format!("quarter {key} revenue x 4"),
    ))
}

// ---------------------------------------------------------------------------
// Growth and margin
// ---------------------------------------------------------------------------

pub fn starting_growth_chain<'a>() -> ResolutionChain<ProbeContext<'a>> {
    ResolutionChain::new("starting_growth")
        .actual("annual", annual_growth)
        .derived("quarterly_yoy", quarterly_growth)
}

fn annual_growth(ctx: &ProbeContext<'_>) -> Option<Probe> {
    let cagr = history::revenue_cagr(ctx.financials);
    let yoy = history::latest_revenue_yoy(ctx.financials);
    match (cagr, yoy) {
        (Some(c), Some(y)) => {
            let w = ctx.rules.cagr_weight;
            Some(Probe::new(
                c * w + y * (Decimal::ONE - w),
                format!("{w} x CAGR {} + {} x YoY {}", c.round_dp(4), Decimal::ONE - w, y.round_dp(4)),
            ))
        }
        (Some(c), None) => Some(Probe::new(c, "revenue CAGR")),
        (None, Some(y)) => Some(Probe::new(y, "latest revenue YoY")),
        (None, None) => None,
    }
}

fn quarterly_growth(ctx: &ProbeContext<'_>) -> Option<Probe> {
    history::latest_quarter_yoy(ctx.financials)
        .map(|g| Probe::new(g, "latest quarter vs same quarter prior year"))
}

pub fn ebitda_margin_series(fin: &CompanyFinancials) -> Vec<Decimal> {
    let direct = history::ratio_series(fin, |p| p.ebitda);
    if !direct.is_empty() {
        return direct;
    }
    history::ratio_series(fin, ebit_plus_depreciation)
}

fn ebit_plus_depreciation(p: &FinancialPeriod) -> Option<Decimal> {
    Some(p.ebit? + p.depreciation?)
}

pub fn ebitda_margin_chain<'a>() -> ResolutionChain<ProbeContext<'a>> {
    ResolutionChain::new("ebitda_margin")
        .actual("ebitda", |ctx: &ProbeContext<'a>| {
            let series = history::ratio_series(ctx.financials, |p| p.ebitda);
            trend_probe(ctx, &series, "EBITDA / revenue")
        })
        .derived("ebit_plus_dep", |ctx| {
            let series = history::ratio_series(ctx.financials, ebit_plus_depreciation);
            trend_probe(ctx, &series, "(EBIT + depreciation) / revenue")
        })
        .derived("ttm_quarterly", ttm_quarterly_margin)
}

fn ttm_quarterly_margin(ctx: &ProbeContext<'_>) -> Option<Probe> {
    let quarters = ctx.financials.trailing_quarters()?;
    let mut ebitda = Decimal::ZERO;
    let mut revenue = Decimal::ZERO;
    for (_, q) in &quarters {
        ebitda += q.ebitda?;
        revenue += q.revenue?;
    }
    let revenue = positive(revenue)?;
    Some(Probe::new(ebitda / revenue, "TTM quarterly EBITDA / revenue"))
}

// ---------------------------------------------------------------------------
// Reinvestment ratios
// ---------------------------------------------------------------------------

pub fn capex_chain<'a>() -> ResolutionChain<ProbeContext<'a>> {
    ResolutionChain::new("capex_to_sales")
        .actual("capex_line", |ctx: &ProbeContext<'a>| {
            let series = history::ratio_series(ctx.financials, |p| p.capex.map(|c| c.abs()));
            trend_probe(ctx, &series, "capex / revenue")
        })
        .derived("gross_block_delta", |ctx| {
            let series = history::delta_ratio_series(ctx.financials, |p| {
                Some(p.gross_block? + p.capital_work_in_progress.unwrap_or(Decimal::ZERO))
            });
            let probe = trend_probe(ctx, &series, "(d gross block + d CWIP) / revenue")?;
            (probe.value > Decimal::ZERO).then_some(probe)
        })
}

pub fn depreciation_chain<'a>() -> ResolutionChain<ProbeContext<'a>> {
    ResolutionChain::new("depreciation_to_sales")
        .actual("depreciation_line", |ctx: &ProbeContext<'a>| {
            let series = history::ratio_series(ctx.financials, |p| p.depreciation);
            trend_probe(ctx, &series, "depreciation / revenue")
        })
        .derived("ebitda_less_ebit", derived_depreciation)
}

/// Independent depreciation estimate, also used by the cross-check.
pub fn derived_depreciation(ctx: &ProbeContext<'_>) -> Option<Probe> {
    let series = history::ratio_series(ctx.financials, |p| Some(p.ebitda? - p.ebit?));
    let probe = trend_probe(ctx, &series, "(EBITDA - EBIT) / revenue")?;
    (probe.value >= Decimal::ZERO).then_some(probe)
}

pub fn nwc_chain<'a>() -> ResolutionChain<ProbeContext<'a>> {
    ResolutionChain::new("nwc_to_sales")
        .actual("trade_working_capital", |ctx: &ProbeContext<'a>| {
            let series = history::ratio_series(ctx.financials, trade_working_capital);
            trend_probe(ctx, &series, "(inventory + receivables - payables) / revenue")
        })
        .derived("current_accounts", |ctx| {
            let series =
                history::ratio_series(ctx.financials, |p| Some(p.current_assets? - p.current_liabilities?));
            trend_probe(ctx, &series, "(current assets - current liabilities) / revenue")
        })
}

pub fn trade_working_capital(p: &FinancialPeriod) -> Option<Decimal> {
    Some(p.inventory? + p.receivables? - p.payables?)
}

// ---------------------------------------------------------------------------
// Tax and financing
// ---------------------------------------------------------------------------

/// Years in the lookback window with positive PBT and a reported tax line.
pub fn direct_tax_years(fin: &CompanyFinancials) -> Vec<(Decimal, Decimal)> {
    fin.recent_annual(LOOKBACK_YEARS)
        .into_iter()
        .filter_map(|(_, p)| {
            let pbt = positive(p.profit_before_tax?)?;
            Some((p.tax_expense?, pbt))
        })
        .collect()
}

pub fn tax_rate_chain<'a>() -> ResolutionChain<ProbeContext<'a>> {
    ResolutionChain::new("tax_rate")
        .actual("effective", |ctx: &ProbeContext<'a>| {
            let years = direct_tax_years(ctx.financials);
            if years.is_empty() {
                return None;
            }
            let tax: Decimal = years.iter().map(|(t, _)| *t).sum();
            let pbt: Decimal = years.iter().map(|(_, p)| *p).sum();
            let rate = tax / pbt;
            (rate >= Decimal::ZERO && rate <= ctx.rules.tax_rate_ceiling).then(|| {
                Probe::new(rate, format!("tax expense / PBT over {} yr", years.len()))
            })
        })
        .derived("net_profit_gap", derived_tax_rate)
}

/// `1 - net profit / PBT` for the latest year with positive PBT.
pub fn derived_tax_rate(ctx: &ProbeContext<'_>) -> Option<Probe> {
    let (year, rate) = ctx.financials.latest_annual_value(|p| {
        let pbt = positive(p.profit_before_tax?)?;
        Some(Decimal::ONE - p.net_profit? / pbt)
    })?;
    (rate >= Decimal::ZERO && rate <= ctx.rules.tax_rate_ceiling)
        .then(|| Probe::new(rate, format!("1 - net profit / PBT, FY{year}")))
}

pub fn cost_of_debt_chain<'a>() -> ResolutionChain<ProbeContext<'a>> {
    ResolutionChain::new("cost_of_debt")
        .actual("average_debt", |ctx: &ProbeContext<'a>| {
            let recent = ctx.financials.recent_annual(2);
            if recent.len() < 2 || recent[1].0 - recent[0].0 != 1 {
                return None;
            }
            let avg = (recent[0].1.total_debt? + recent[1].1.total_debt?) / Decimal::TWO;
            let rate = recent[1].1.interest_expense? / positive(avg)?;
            within_debt_ceiling(ctx, rate)
                .map(|r| Probe::new(r, format!("interest / average debt, FY{}", recent[1].0)))
        })
        .derived("closing_debt", |ctx| {
            let (year, rate) = ctx.financials.latest_annual_value(|p| {
                Some(p.interest_expense? / positive(p.total_debt?)?)
            })?;
            within_debt_ceiling(ctx, rate)
                .map(|r| Probe::new(r, format!("interest / closing debt, FY{year}")))
        })
}

fn within_debt_ceiling(ctx: &ProbeContext<'_>, rate: Decimal) -> Option<Decimal> {
    (rate > Decimal::ZERO && rate <= ctx.rules.cost_of_debt_ceiling).then_some(rate)
}

pub fn debt_ratio_chain<'a>() -> ResolutionChain<ProbeContext<'a>> {
    ResolutionChain::new("debt_ratio")
        .actual("market_value", |ctx: &ProbeContext<'a>| {
            let (_, debt) = ctx.financials.latest_annual_value(|p| p.total_debt)?;
            let mcap = positive(ctx.market?.market_cap?)?;
            let debt = debt.max(Decimal::ZERO);
            Some(Probe::new(debt / (debt + mcap), "debt / (debt + market cap)"))
        })
        .derived("book_value", |ctx| {
            let (year, ratio) = ctx.financials.latest_annual_value(|p| {
                let debt = p.total_debt?.max(Decimal::ZERO);
                let capital = positive(debt + p.net_worth?)?;
                Some(debt / capital)
            })?;
            Some(Probe::new(ratio, format!("debt / (debt + net worth), FY{year}")))
        })
}

// ---------------------------------------------------------------------------
// Terminal economics
// ---------------------------------------------------------------------------

/// `EBIT / capital employed` per year, oldest first.
pub fn roce_series(fin: &CompanyFinancials) -> Vec<Decimal> {
    fin.recent_annual(LOOKBACK_YEARS)
        .into_iter()
        .filter_map(|(_, p)| {
            let capital = positive(p.capital_employed.or_else(|| proxy_capital(p))?)?;
            Some(p.ebit? / capital)
        })
        .collect()
}

fn proxy_capital(p: &FinancialPeriod) -> Option<Decimal> {
    Some(p.net_worth? + p.total_debt.unwrap_or(Decimal::ZERO))
}

/// Relative gap between reported capital employed and net worth plus debt,
/// for the latest year reporting both.
pub fn capital_employed_divergence(fin: &CompanyFinancials) -> Option<(i32, Decimal)> {
    fin.latest_annual_value(|p| {
        let reported = p.capital_employed?;
        let proxy = positive(proxy_capital(p)?)?;
        Some((reported - proxy).abs() / proxy)
    })
}

pub fn terminal_roce_chain<'a>() -> ResolutionChain<ProbeContext<'a>> {
    ResolutionChain::new("terminal_roce")
        .actual("capital_employed", |ctx: &ProbeContext<'a>| {
            if let Some((year, gap)) = capital_employed_divergence(ctx.financials) {
                if gap > ctx.rules.roce_divergence_threshold {
                    info!(
                        year,
                        divergence = %gap.round_dp(4),
                        "capital employed diverges from net worth + debt, using proxy"
                    );
                    return None;
                }
            }
            let (year, roce) = ctx.financials.latest_annual_value(|p| {
                Some(p.ebit? / positive(p.capital_employed?)?)
            })?;
            Some(Probe::new(roce, format!("EBIT / capital employed, FY{year}")))
        })
        .derived("net_worth_plus_debt", |ctx| {
            let (year, roce) = ctx
                .financials
                .latest_annual_value(|p| Some(p.ebit? / positive(proxy_capital(p)?)?))?;
            Some(Probe::new(roce, format!("EBIT / (net worth + debt), FY{year}")))
        })
}

pub fn terminal_reinvestment_chain<'a>() -> ResolutionChain<ProbeContext<'a>> {
    ResolutionChain::new("terminal_reinvestment").derived("historical", historical_reinvestment)
}

/// Aggregate `(capex - depreciation + dNWC) / NOPAT` over the lookback window.
fn historical_reinvestment(ctx: &ProbeContext<'_>) -> Option<Probe> {
    let window = ctx.financials.recent_annual(LOOKBACK_YEARS + 1);
    let mut reinvested = Decimal::ZERO;
    let mut nopat = Decimal::ZERO;
    let mut years = 0usize;
    for w in window.windows(2) {
        let (prev_year, prev) = w[0];
        let (year, cur) = w[1];
        if year - prev_year != 1 {
            continue;
        }
        let (Some(capex), Some(dep), Some(ebit)) = (cur.capex, cur.depreciation, cur.ebit) else {
            continue;
        };
        let delta_nwc = match (trade_working_capital(cur), trade_working_capital(prev)) {
            (Some(a), Some(b)) => a - b,
            _ => Decimal::ZERO,
        };
        let tax = match (cur.tax_expense, cur.profit_before_tax.and_then(positive)) {
            (Some(t), Some(pbt)) => stats::clamp(t / pbt, Decimal::ZERO, ctx.rules.tax_rate_ceiling),
            _ => ctx.market_params.statutory_tax_rate,
        };
        reinvested += capex.abs() - dep + delta_nwc;
        nopat += ebit * (Decimal::ONE - tax);
        years += 1;
    }
    let nopat = positive(nopat)?;
    let rate = reinvested / nopat;
    (rate >= ctx.rules.reinvestment_floor && rate <= ctx.rules.reinvestment_ceiling).then(|| {
        Probe::new(rate, format!("(capex - dep + dNWC) / NOPAT over {years} yr"))
    })
}

// ---------------------------------------------------------------------------
// Balance-sheet and share data
// ---------------------------------------------------------------------------

pub fn cash_chain<'a>() -> ResolutionChain<ProbeContext<'a>> {
    ResolutionChain::new("cash")
        .actual("annual", |ctx: &ProbeContext<'a>| {
            let (year, cash) = ctx.financials.latest_annual_value(|p| p.cash)?;
            Some(Probe::new(cash, format!("FY{year} cash")))
        })
        .derived("interim", |ctx| {
            let (key, cash) = ctx.financials.latest_interim_value(|p| p.cash)?;
            Some(Probe::new(cash, format!("interim {key} cash")))
        })
}

pub fn debt_chain<'a>() -> ResolutionChain<ProbeContext<'a>> {
    ResolutionChain::new("net_debt")
        .actual("annual", |ctx: &ProbeContext<'a>| {
            let (year, debt) = ctx.financials.latest_annual_value(|p| p.total_debt)?;
            Some(Probe::new(debt, format!("FY{year} total debt")))
        })
        .derived("interim", |ctx| {
            let (key, debt) = ctx.financials.latest_interim_value(|p| p.total_debt)?;
            Some(Probe::new(debt, format!("interim {key} total debt")))
        })
}

pub fn shares_chain<'a>() -> ResolutionChain<ProbeContext<'a>> {
    ResolutionChain::new("shares_outstanding")
        .actual("annual", |ctx: &ProbeContext<'a>| {
            let (year, shares) = ctx
                .financials
                .latest_annual_value(|p| p.shares_outstanding.and_then(positive))?;
            Some(Probe::new(shares, format!("FY{year} shares outstanding")))
        })
        .actual("market", |ctx| {
            let shares = positive(ctx.market?.shares_outstanding?)?;
            Some(Probe::new(shares, "market snapshot shares"))
        })
        .derived("market_cap_over_price", |ctx| {
            let market = ctx.market?;
            let mcap = positive(market.market_cap?)?;
            let price = positive(market.price?)?;
            Some(Probe::new(mcap / price, "market cap / price"))
        })
}
