use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::blend_rules::{blend_toward, select_blend_weights, BlendBand, SectorTags};
use super::chain::Probe;
use super::history;
use super::model::{CompanyFinancials, CompanyProfile, InputOverrides, MarketSnapshot};
use super::probes::{self, ProbeContext};
use crate::config::{EngineConfig, MarketParameters, PolicyRules, SectorConfig, StalenessConfig};
use crate::dcf::DcfInputs;
use crate::error::ValuationError;
use crate::stats;
use crate::types::{AuditTrail, Provenance, Rate, Tagged, Warning, WarningKind};
use crate::IntrinsicResult;

const OVERRIDE_SOURCE: &str = "override";
const STAGE: &str = "financials";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Everything known about one company at valuation time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyData {
    pub profile: CompanyProfile,
    pub financials: CompanyFinancials,
    pub market: Option<MarketSnapshot>,
}

/// Intermediate facts the processor observed, kept for reporting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessorDiagnostics {
    pub latest_fiscal_year: Option<i32>,
    pub revenue_cagr: Option<Rate>,
    pub latest_yoy: Option<Rate>,
    pub high_growth: bool,
    pub margin_band: Option<BlendBand>,
    pub roce_band: Option<BlendBand>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedInputs {
    pub inputs: DcfInputs,
    pub diagnostics: ProcessorDiagnostics,
    pub warnings: Vec<Warning>,
    pub trail: AuditTrail,
}

/// Turns raw multi-period records into provenance-tagged DCF inputs.
#[derive(Debug, Clone)]
pub struct FinancialDataProcessor {
    market: MarketParameters,
    rules: PolicyRules,
    staleness: StalenessConfig,
    projection_years: u32,
    valuation_date: NaiveDate,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl FinancialDataProcessor {
    pub fn new(config: &EngineConfig) -> Self {
        FinancialDataProcessor {
            market: config.market.clone(),
            rules: config.rules.clone(),
            staleness: config.staleness.clone(),
            projection_years: config.projection_years.max(2),
            valuation_date: Utc::now().date_naive(),
        }
    }

    pub fn with_valuation_date(mut self, date: NaiveDate) -> Self {
        self.valuation_date = date;
        self
    }

    /// Resolve every DCF input for `company`.
    ///
    /// Fails only when no base revenue can be established and none was
    /// supplied as an override.
    pub fn build_inputs(
        &self,
        company: &CompanyData,
        sector: &SectorConfig,
        overrides: &InputOverrides,
    ) -> IntrinsicResult<ProcessedInputs> {
        let fin = &company.financials;
        let ctx = ProbeContext {
            financials: fin,
            market: company.market.as_ref(),
            sector,
            market_params: &self.market,
            rules: &self.rules,
        };
        let mut trail = AuditTrail::new();
        let mut warnings: Vec<Warning> = Vec::new();
        let mut diagnostics = ProcessorDiagnostics {
            latest_fiscal_year: fin.latest_year(),
            ..Default::default()
        };

        self.check_staleness(company, &mut warnings);

        // --- Base revenue ---
        let base_revenue = match probes::base_revenue_chain().resolve(&ctx, &mut trail) {
            Some(found) => found,
            None => match overrides.base_revenue {
                Some(v) => Tagged::actual(v, OVERRIDE_SOURCE),
                None => {
                    return Err(ValuationError::DataInsufficiency(format!(
                        "{}: no base revenue could be established",
                        company.profile.symbol
                    )))
                }
            },
        };
        if base_revenue.provenance == Provenance::Derived {
            warnings.push(Warning::new(
                WarningKind::DataQuality,
                "financials",
                format!("Base revenue annualized from interim data ({})", base_revenue.source),
            ));
        }

        // --- Growth ---
        diagnostics.revenue_cagr = history::revenue_cagr(fin);
        diagnostics.latest_yoy = history::latest_revenue_yoy(fin);
        diagnostics.high_growth = diagnostics
            .revenue_cagr
            .is_some_and(|c| c > self.rules.high_growth_cagr)
            || diagnostics
                .latest_yoy
                .is_some_and(|y| y > self.rules.high_growth_yoy);

        let start = probes::starting_growth_chain().resolve_or(
            &ctx,
            &mut trail,
            Probe::new(sector.default_growth, "sector default growth"),
        );
        let revenue_growth = self.growth_sequence(&start, sector, &mut trail);

        // --- Margin and drift ---
        let tags = sector_tags(fin, sector);
        let ebitda_margin = probes::ebitda_margin_chain().resolve_or(
            &ctx,
            &mut trail,
            Probe::new(sector.margin_target(), "sector terminal margin midpoint"),
        );
        let margin_drift = if ebitda_margin.provenance == Provenance::Default {
            Tagged::defaulted(Decimal::ZERO, "margin already at sector target")
        } else {
            let series = probes::ebitda_margin_series(fin);
            let selection = select_blend_weights(&series, &tags, &self.rules.blend_bands);
            let target = sector.margin_target();
            let drift = (target - ebitda_margin.value) * selection.weights.convergence
                / Decimal::from(self.projection_years);
            diagnostics.margin_band = Some(selection.band.clone());
            Tagged::derived(
                drift,
                format!(
                    "convergence toward {target} at weight {} ({:?} band)",
                    selection.weights.convergence, selection.band
                ),
            )
        };
        trail.record_tagged(STAGE, "margin_drift", &margin_drift);

        // --- Reinvestment ratios ---
        let capex_to_sales = if diagnostics.high_growth {
            self.normalized(
                "capex_to_sales",
                sector.capex_norm,
                "sector steady-state capex",
                &mut trail,
            )
        } else {
            probes::capex_chain().resolve_or(
                &ctx,
                &mut trail,
                Probe::new(sector.capex_norm, "sector capex norm"),
            )
        };

        let mut depreciation_to_sales = probes::depreciation_chain().resolve_or(
            &ctx,
            &mut trail,
            Probe::new(sector.depreciation_norm, "sector depreciation norm"),
        );
        let direct_dep_years = history::ratio_series(fin, |p| p.depreciation).len();
        if depreciation_to_sales.provenance == Provenance::Actual
            && direct_dep_years == 1
            && depreciation_to_sales.value > self.rules.depreciation_anomaly_threshold
        {
            let second = probes::derived_depreciation(&ctx).unwrap_or_else(|| {
                Probe::new(sector.depreciation_norm, "sector depreciation norm")
            });
            depreciation_to_sales =
                self.cross_check("depreciation_to_sales", &depreciation_to_sales, second, &mut trail);
        }

        let nwc_to_sales = if diagnostics.high_growth {
            self.normalized(
                "nwc_to_sales",
                sector.nwc_norm,
                "sector steady-state working capital",
                &mut trail,
            )
        } else {
            let resolved = probes::nwc_chain().resolve_or(
                &ctx,
                &mut trail,
                Probe::new(sector.nwc_norm, "sector NWC norm"),
            );
            let clamped =
                stats::clamp(resolved.value, self.rules.nwc_floor, self.rules.nwc_ceiling);
            if clamped != resolved.value {
                debug!(raw = %resolved.value, clamped = %clamped, "nwc_to_sales clamped");
                Tagged::new(
                    clamped,
                    resolved.provenance,
                    format!("{}; clamped", resolved.source),
                )
            } else {
                resolved
            }
        };

        // --- Tax and financing ---
        let mut tax_rate = probes::tax_rate_chain().resolve_or(
            &ctx,
            &mut trail,
            Probe::new(self.market.statutory_tax_rate, "statutory tax rate"),
        );
        if tax_rate.provenance == Provenance::Actual
            && probes::direct_tax_years(fin).len() == 1
            && tax_rate.value > self.rules.tax_anomaly_threshold
        {
            let second = probes::derived_tax_rate(&ctx).unwrap_or_else(|| {
                Probe::new(self.market.statutory_tax_rate, "statutory tax rate")
            });
            tax_rate = self.cross_check("tax_rate", &tax_rate, second, &mut trail);
        }

        let cost_of_debt = probes::cost_of_debt_chain().resolve_or(
            &ctx,
            &mut trail,
            Probe::new(
                self.market.risk_free_rate + self.market.credit_spread,
                "risk-free rate + credit spread",
            ),
        );
        let debt_ratio = probes::debt_ratio_chain().resolve_or(
            &ctx,
            &mut trail,
            Probe::new(sector.debt_ratio, "sector debt ratio"),
        );
        let beta = self.configured("beta", sector.beta, "sector beta", &mut trail);
        let risk_free_rate = self.configured(
            "risk_free_rate",
            self.market.risk_free_rate,
            "configured market parameter",
            &mut trail,
        );
        let equity_risk_premium = self.configured(
            "equity_risk_premium",
            self.market.equity_risk_premium,
            "configured market parameter",
            &mut trail,
        );

        // --- Terminal economics ---
        if let Some((year, gap)) = probes::capital_employed_divergence(fin) {
            if gap > self.rules.roce_divergence_threshold {
                warnings.push(Warning::new(
                    WarningKind::DataQuality,
                    "financials",
                    format!(
                        "FY{year} capital employed diverges {}% from net worth + debt; proxy used",
                        (gap * Decimal::ONE_HUNDRED).round_dp(1)
                    ),
                ));
            }
        }
        let historical_roce = probes::terminal_roce_chain().resolve_or(
            &ctx,
            &mut trail,
            Probe::new(sector.roce_target, "sector ROCE target"),
        );
        let terminal_roce = if historical_roce.provenance == Provenance::Default {
            historical_roce
        } else {
            let series = probes::roce_series(fin);
            let selection = select_blend_weights(&series, &tags, &self.rules.blend_bands);
            let blended = blend_toward(historical_roce.value, sector.roce_target, &selection.weights);
            diagnostics.roce_band = Some(selection.band.clone());
            let tagged = Tagged::derived(
                blended,
                format!(
                    "{} blended {}/{} with target {}",
                    historical_roce.source,
                    selection.weights.historical,
                    selection.weights.convergence,
                    sector.roce_target
                ),
            );
            trail.record_tagged(STAGE, "terminal_roce", &tagged);
            tagged
        };
        let terminal_reinvestment = probes::terminal_reinvestment_chain().resolve_or(
            &ctx,
            &mut trail,
            Probe::new(sector.reinvestment_rate, "sector reinvestment rate"),
        );

        // --- Balance sheet and shares ---
        let cash = probes::cash_chain().resolve_or(
            &ctx,
            &mut trail,
            Probe::new(Decimal::ZERO, "cash not reported"),
        );
        let net_debt = probes::debt_chain().resolve_or(
            &ctx,
            &mut trail,
            Probe::new(Decimal::ZERO, "debt not reported"),
        );
        let shares_outstanding = probes::shares_chain().resolve_or(
            &ctx,
            &mut trail,
            Probe::new(Decimal::ONE, "no share count or market data"),
        );
        if shares_outstanding.provenance == Provenance::Default && overrides.shares_outstanding.is_none() {
            warn!(symbol = %company.profile.symbol, "share count defaulted to 1.0");
            warnings.push(Warning::new(
                WarningKind::DataQuality,
                "financials",
                "Shares outstanding unavailable; per-share values use a placeholder of 1.0",
            ));
        }

        let company_alpha = company.profile.alpha.map(|a| {
            let tagged = Tagged::actual(a, "company profile");
            trail.record_tagged(STAGE, "company_alpha", &tagged);
            tagged
        });

        let mut inputs = DcfInputs {
            base_revenue,
            revenue_growth,
            ebitda_margin,
            margin_drift,
            capex_to_sales,
            depreciation_to_sales,
            nwc_to_sales,
            tax_rate,
            risk_free_rate,
            equity_risk_premium,
            beta,
            cost_of_debt,
            debt_ratio,
            terminal_roce,
            terminal_reinvestment,
            shares_outstanding,
            net_debt,
            cash,
            company_alpha,
            wacc_override: None,
        };
        apply_overrides(&mut inputs, overrides, &mut trail);
        inputs.validate()?;

        info!(
            symbol = %company.profile.symbol,
            base_revenue = %inputs.base_revenue.value,
            defaulted = inputs.defaulted_fields().len(),
            high_growth = diagnostics.high_growth,
            "inputs resolved"
        );

        Ok(ProcessedInputs {
            inputs,
            diagnostics,
            warnings,
            trail,
        })
    }

    /// Linear decay from the clipped starting growth to the terminal-zone
    /// target, which is never above the start.
    pub fn growth_sequence(
        &self,
        start: &Tagged<Rate>,
        sector: &SectorConfig,
        trail: &mut AuditTrail,
    ) -> Tagged<Vec<Rate>> {
        let floor = self.rules.growth_floor;
        let ceiling = self.rules.growth_ceiling;
        let first = stats::clamp(start.value, floor, ceiling);
        let target = stats::clamp(sector.terminal_zone_growth.min(first), floor, ceiling);
        let years = self.projection_years.max(2);
        let steps = Decimal::from(years - 1);

        let sequence: Vec<Rate> = (0..years)
            .map(|i| first - (first - target) * Decimal::from(i) / steps)
            .collect();
        let note = format!("{}; decays {first} -> {target}", start.source);
        trail.record(
            STAGE,
            "revenue_growth",
            format!("{first} -> {target} over {years} yr"),
            Some(start.provenance),
            note.clone(),
        );
        Tagged::new(sequence, start.provenance, note)
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

impl FinancialDataProcessor {
    fn check_staleness(&self, company: &CompanyData, warnings: &mut Vec<Warning>) {
        if let Some(market) = &company.market {
            if market.stale {
                warnings.push(Warning::new(
                    WarningKind::StaleData,
                    "market",
                    "Price snapshot flagged stale by the data source",
                ));
            }
            if let Some(as_of) = market.as_of {
                let age = (self.valuation_date - as_of).num_days();
                if age > self.staleness.price_max_age_days {
                    warnings.push(Warning::new(
                        WarningKind::StaleData,
                        "market",
                        format!("Price snapshot is {age} days old"),
                    ));
                }
            }
        }
        if let Some(year) = company.financials.latest_year() {
            let lag = self.valuation_date.year() - year;
            if lag > self.staleness.financials_max_age_years {
                warnings.push(Warning::new(
                    WarningKind::StaleData,
                    "financials",
                    format!("Latest annual financials are FY{year}, {lag} years old"),
                ));
            }
        }
        for w in warnings.iter() {
            warn!(source = %w.source, "{}", w.message);
        }
    }

    fn normalized(
        &self,
        field: &str,
        norm: Decimal,
        what: &str,
        trail: &mut AuditTrail,
    ) -> Tagged<Decimal> {
        info!(field, value = %norm, "high-growth history, using sector norm");
        let tagged = Tagged::defaulted(norm, format!("high-growth normalization: {what}"));
        trail.record_tagged(STAGE, field, &tagged);
        tagged
    }

    fn configured(
        &self,
        field: &str,
        value: Decimal,
        note: &str,
        trail: &mut AuditTrail,
    ) -> Tagged<Decimal> {
        let tagged = Tagged::defaulted(value, note);
        trail.record_tagged(STAGE, field, &tagged);
        tagged
    }

    /// Blend a single-year direct estimate with an independent second one.
    fn cross_check(
        &self,
        field: &str,
        direct: &Tagged<Decimal>,
        second: Probe,
        trail: &mut AuditTrail,
    ) -> Tagged<Decimal> {
        let w = self.rules.cross_check_weight;
        let blended = direct.value * w + second.value * (Decimal::ONE - w);
        info!(
            field,
            direct = %direct.value,
            second = %second.value,
            blended = %blended,
            "single-year anomaly, blending with independent estimate"
        );
        let tagged = Tagged::derived(
            blended,
            format!("cross-check: {} blended with {}", direct.source, second.note),
        );
        trail.record_tagged(STAGE, field, &tagged);
        tagged
    }
}

fn sector_tags(fin: &CompanyFinancials, sector: &SectorConfig) -> SectorTags {
    let roe = fin
        .latest_annual_value(|p| {
            let nw = p.net_worth.filter(|v| *v > Decimal::ZERO)?;
            Some(p.net_profit? / nw)
        })
        .map(|(_, v)| v);
    let npa = fin.latest_annual_value(|p| p.gross_npa_ratio).map(|(_, v)| v);
    SectorTags {
        financial: sector.flags.financial,
        cyclical: sector.flags.cyclical,
        roe,
        npa,
    }
}

fn override_scalar(
    slot: &mut Tagged<Decimal>,
    value: Option<Decimal>,
    field: &str,
    trail: &mut AuditTrail,
) {
    if let Some(v) = value {
        debug!(field, value = %v, "applying override");
        *slot = Tagged::actual(v, OVERRIDE_SOURCE);
        trail.record("overrides", field, v, Some(Provenance::Actual), OVERRIDE_SOURCE);
    }
}

/// Replace resolved inputs with reviewer overrides, tagged ACTUAL.
pub fn apply_overrides(inputs: &mut DcfInputs, o: &InputOverrides, trail: &mut AuditTrail) {
    override_scalar(&mut inputs.base_revenue, o.base_revenue, "base_revenue", trail);
    override_scalar(&mut inputs.ebitda_margin, o.ebitda_margin, "ebitda_margin", trail);
    override_scalar(&mut inputs.margin_drift, o.margin_drift, "margin_drift", trail);
    override_scalar(&mut inputs.capex_to_sales, o.capex_to_sales, "capex_to_sales", trail);
    override_scalar(
        &mut inputs.depreciation_to_sales,
        o.depreciation_to_sales,
        "depreciation_to_sales",
        trail,
    );
    override_scalar(&mut inputs.nwc_to_sales, o.nwc_to_sales, "nwc_to_sales", trail);
    override_scalar(&mut inputs.tax_rate, o.tax_rate, "tax_rate", trail);
    override_scalar(&mut inputs.risk_free_rate, o.risk_free_rate, "risk_free_rate", trail);
    override_scalar(
        &mut inputs.equity_risk_premium,
        o.equity_risk_premium,
        "equity_risk_premium",
        trail,
    );
    override_scalar(&mut inputs.beta, o.beta, "beta", trail);
    override_scalar(&mut inputs.cost_of_debt, o.cost_of_debt, "cost_of_debt", trail);
    override_scalar(&mut inputs.debt_ratio, o.debt_ratio, "debt_ratio", trail);
    override_scalar(&mut inputs.terminal_roce, o.terminal_roce, "terminal_roce", trail);
    override_scalar(
        &mut inputs.terminal_reinvestment,
        o.terminal_reinvestment,
        "terminal_reinvestment",
        trail,
    );
    override_scalar(
        &mut inputs.shares_outstanding,
        o.shares_outstanding,
        "shares_outstanding",
        trail,
    );
    override_scalar(&mut inputs.net_debt, o.net_debt, "net_debt", trail);
    override_scalar(&mut inputs.cash, o.cash, "cash", trail);

    if let Some(wacc) = o.wacc {
        inputs.wacc_override = Some(Tagged::actual(wacc, OVERRIDE_SOURCE));
        trail.record("overrides", "wacc", wacc, Some(Provenance::Actual), OVERRIDE_SOURCE);
    }
    if let Some(growth) = &o.revenue_growth {
        inputs.revenue_growth = Tagged::actual(growth.clone(), OVERRIDE_SOURCE);
        trail.record(
            "overrides",
            "revenue_growth",
            format!("{growth:?}"),
            Some(Provenance::Actual),
            OVERRIDE_SOURCE,
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
