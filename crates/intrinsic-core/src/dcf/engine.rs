use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use super::inputs::DcfInputs;
use super::wacc::{resolve_wacc, WaccOutput};
use crate::config::EngineConfig;
use crate::error::ValuationError;
use crate::stats;
use crate::time_value::discount_factor;
use crate::types::{with_metadata, ComputationOutput, Money, Rate};
use crate::IntrinsicResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Engine knobs that come from configuration rather than per-company inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcfSettings {
    pub mid_year_convention: bool,
    pub terminal_growth_floor: Rate,
    pub terminal_growth_cap: Rate,
    /// Maximum cumulative deviation of the margin from its base value.
    pub margin_drift_cap: Rate,
    pub terminal_value_warning_share: Decimal,
}

impl DcfSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        DcfSettings {
            mid_year_convention: config.mid_year_convention,
            terminal_growth_floor: config.rules.terminal_growth_floor,
            terminal_growth_cap: config.rules.terminal_growth_cap,
            margin_drift_cap: config.rules.margin_drift_cap,
            terminal_value_warning_share: config.rules.terminal_value_warning_share,
        }
    }
}

impl Default for DcfSettings {
    fn default() -> Self {
        DcfSettings::from_config(&EngineConfig::default())
    }
}

/// Projection for a single explicit year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcfYearProjection {
    pub year: u32,
    pub growth: Rate,
    pub revenue: Money,
    pub ebitda_margin: Rate,
    pub ebitda: Money,
    pub depreciation: Money,
    pub ebit: Money,
    pub nopat: Money,
    pub capex: Money,
    pub nwc_change: Money,
    pub fcff: Money,
    pub discount_factor: Rate,
    pub pv_fcff: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcfValuation {
    pub projections: Vec<DcfYearProjection>,
    pub wacc: WaccOutput,
    /// clip(ROCE x reinvestment) unless swept explicitly
    pub terminal_growth: Rate,
    pub terminal_nopat: Money,
    pub terminal_fcff: Money,
    pub terminal_value: Money,
    pub pv_terminal_value: Money,
    pub pv_explicit: Money,
    pub firm_value: Money,
    pub net_debt: Money,
    pub cash: Money,
    pub equity_value: Money,
    pub shares_outstanding: Decimal,
    pub intrinsic_per_share: Money,
    /// PV(TV) / firm value
    pub terminal_value_share: Decimal,
}

/// Deterministic FCFF model over [`DcfInputs`].
#[derive(Debug, Clone, Default)]
pub struct DcfEngine {
    settings: DcfSettings,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl DcfEngine {
    pub fn new(settings: DcfSettings) -> Self {
        DcfEngine { settings }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        DcfEngine::new(DcfSettings::from_config(config))
    }

    pub fn settings(&self) -> &DcfSettings {
        &self.settings
    }

    /// Full valuation wrapped in the standard output envelope.
    pub fn calculate_intrinsic_value(
        &self,
        inputs: &DcfInputs,
    ) -> IntrinsicResult<ComputationOutput<DcfValuation>> {
        let start = Instant::now();
        let mut warnings: Vec<String> = Vec::new();
        let valuation = self.value(inputs, &mut warnings)?;
        let elapsed = start.elapsed().as_micros() as u64;
        Ok(with_metadata(
            "FCFF DCF with NOPAT-based terminal value",
            inputs,
            warnings,
            elapsed,
            valuation,
        ))
    }

    /// Value with the discount rate and terminal growth implied by `inputs`.
    pub fn value(&self, inputs: &DcfInputs, warnings: &mut Vec<String>) -> IntrinsicResult<DcfValuation> {
        self.value_with(inputs, None, None, warnings)
    }

    /// Terminal growth implied by ROCE x reinvestment, clipped to the
    /// configured band.
    pub fn terminal_growth(&self, inputs: &DcfInputs) -> Rate {
        stats::clamp(
            inputs.terminal_roce.value * inputs.terminal_reinvestment.value,
            self.settings.terminal_growth_floor,
            self.settings.terminal_growth_cap,
        )
    }

    /// Value with an optional explicit discount rate and terminal growth.
    /// Used directly by the sensitivity grid.
    pub fn value_with(
        &self,
        inputs: &DcfInputs,
        wacc_override: Option<Rate>,
        growth_override: Option<Rate>,
        warnings: &mut Vec<String>,
    ) -> IntrinsicResult<DcfValuation> {
        inputs.validate()?;

        let mut wacc_out = resolve_wacc(inputs, warnings)?;
        if let Some(rate) = wacc_override {
            wacc_out.wacc = rate;
            wacc_out.overridden = true;
        }
        let wacc = wacc_out.wacc;
        if wacc <= Decimal::ZERO {
            return Err(ValuationError::invalid_parameter(
                "wacc",
                format!("WACC must be positive, got {wacc}"),
            ));
        }

        let g = growth_override.unwrap_or_else(|| self.terminal_growth(inputs));
        if wacc <= g {
            return Err(ValuationError::invalid_parameter(
                "wacc",
                format!("WACC ({wacc}) must exceed terminal growth ({g})"),
            ));
        }

        let projections = self.build_projections(inputs, wacc)?;
        let last = projections.last().ok_or_else(|| {
            ValuationError::DataInsufficiency("No projection years generated".into())
        })?;

        // --- Terminal value ---
        let reinvestment = inputs.terminal_reinvestment.value;
        let terminal_nopat = last.nopat * (Decimal::ONE + g);
        let terminal_fcff = terminal_nopat * (Decimal::ONE - reinvestment);
        let terminal_value = terminal_fcff / (wacc - g);
        if terminal_value < Decimal::ZERO {
            return Err(ValuationError::invalid_parameter(
                "terminal_value",
                format!("Terminal value is negative ({terminal_value}); terminal NOPAT {terminal_nopat}"),
            ));
        }
        let horizon = projections.len() as u32;
        let pv_terminal_value = terminal_value * discount_factor(wacc, horizon, false)?;
        let pv_explicit: Money = projections.iter().map(|p| p.pv_fcff).sum();
        let firm_value = pv_explicit + pv_terminal_value;

        let terminal_value_share = if firm_value.is_zero() {
            Decimal::ZERO
        } else {
            pv_terminal_value / firm_value
        };
        if terminal_value_share > self.settings.terminal_value_warning_share {
            warnings.push(format!(
                "Terminal value represents {:.1}% of firm value",
                terminal_value_share * dec!(100)
            ));
        }

        // --- Equity bridge ---
        let shares = inputs.shares_outstanding.value;
        if shares <= Decimal::ZERO {
            return Err(ValuationError::invalid_parameter(
                "shares_outstanding",
                "Shares outstanding must be positive",
            ));
        }
        let net_debt = inputs.net_debt.value;
        let cash = inputs.cash.value;
        let equity_value = firm_value - net_debt + cash;
        let intrinsic_per_share = equity_value / shares;

        debug!(
            wacc = %wacc,
            terminal_growth = %g,
            firm_value = %firm_value.round_dp(2),
            per_share = %intrinsic_per_share.round_dp(4),
            "dcf valued"
        );

        Ok(DcfValuation {
            projections,
            wacc: wacc_out,
            terminal_growth: g,
            terminal_nopat,
            terminal_fcff,
            terminal_value,
            pv_terminal_value,
            pv_explicit,
            firm_value,
            net_debt,
            cash,
            equity_value,
            shares_outstanding: shares,
            intrinsic_per_share,
            terminal_value_share,
        })
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

impl DcfEngine {
    fn build_projections(&self, inputs: &DcfInputs, wacc: Rate) -> IntrinsicResult<Vec<DcfYearProjection>> {
        let growth = &inputs.revenue_growth.value;
        let n_years = growth.len();
        let mut projections = Vec::with_capacity(n_years);

        let base_margin = inputs.ebitda_margin.value;
        let drift = inputs.margin_drift.value;
        let cap = self.settings.margin_drift_cap;
        let mut deviation = Decimal::ZERO;

        let mut prev_revenue = inputs.base_revenue.value;
        let mut prev_nwc = prev_revenue * inputs.nwc_to_sales.value;

        for (idx, g) in growth.iter().enumerate() {
            let year = idx as u32 + 1;
            deviation = stats::clamp(
                deviation + drift * damping_factor(idx, n_years),
                -cap,
                cap,
            );
            let margin = base_margin + deviation;

            let revenue = prev_revenue * (Decimal::ONE + *g);
            let ebitda = revenue * margin;
            let depreciation = revenue * inputs.depreciation_to_sales.value;
            let ebit = ebitda - depreciation;
            let nopat = ebit * (Decimal::ONE - inputs.tax_rate.value);
            let capex = revenue * inputs.capex_to_sales.value;
            let current_nwc = revenue * inputs.nwc_to_sales.value;
            let nwc_change = current_nwc - prev_nwc;

            // FCFF = NOPAT + D&A - CapEx - dNWC
            let fcff = nopat + depreciation - capex - nwc_change;
            let df = discount_factor(wacc, year, self.settings.mid_year_convention)?;

            projections.push(DcfYearProjection {
                year,
                growth: *g,
                revenue,
                ebitda_margin: margin,
                ebitda,
                depreciation,
                ebit,
                nopat,
                capex,
                nwc_change,
                fcff,
                discount_factor: df,
                pv_fcff: fcff * df,
            });

            prev_revenue = revenue;
            prev_nwc = current_nwc;
        }

        Ok(projections)
    }
}

/// Share of the annual drift applied in year `idx` (0-based): full in the
/// first year, fading linearly to zero in the last.
fn damping_factor(idx: usize, n_years: usize) -> Decimal {
    if n_years <= 1 {
        return Decimal::ONE;
    }
    Decimal::ONE - Decimal::from(idx as u64) / Decimal::from((n_years - 1) as u64)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Tagged;

    fn reference_inputs() -> DcfInputs {
        DcfInputs {
            base_revenue: dec!(1000).into(),
            revenue_growth: vec![dec!(0.10), dec!(0.09), dec!(0.08), dec!(0.07), dec!(0.06)].into(),
            ebitda_margin: dec!(0.15).into(),
            margin_drift: Decimal::ZERO.into(),
            capex_to_sales: dec!(0.08).into(),
            depreciation_to_sales: dec!(0.04).into(),
            nwc_to_sales: dec!(0.15).into(),
            tax_rate: dec!(0.25).into(),
            risk_free_rate: dec!(0.07).into(),
            equity_risk_premium: dec!(0.05).into(),
            beta: Decimal::ONE.into(),
            cost_of_debt: dec!(0.09).into(),
            debt_ratio: Decimal::ZERO.into(),
            terminal_roce: dec!(0.15).into(),
            terminal_reinvestment: dec!(0.30).into(),
            shares_outstanding: dec!(100).into(),
            net_debt: Decimal::ZERO.into(),
            cash: Decimal::ZERO.into(),
            company_alpha: None,
            wacc_override: None,
        }
    }

    #[test]
    fn test_terminal_value_formula() {
        let engine = DcfEngine::default();
        let mut w = Vec::new();
        let v = engine.value(&reference_inputs(), &mut w).unwrap();
        assert_eq!(v.wacc.wacc, dec!(0.12));
        assert_eq!(v.terminal_growth, dec!(0.045));
        assert_eq!(v.terminal_value, v.terminal_fcff / (dec!(0.12) - dec!(0.045)));
        assert_eq!(v.terminal_fcff, v.terminal_nopat * dec!(0.70));
    }

    #[test]
    fn test_fcff_identity_each_year() {
        let engine = DcfEngine::default();
        let mut w = Vec::new();
        let v = engine.value(&reference_inputs(), &mut w).unwrap();
        for p in &v.projections {
            assert_eq!(p.fcff, p.nopat + p.depreciation - p.capex - p.nwc_change);
        }
        assert_eq!(v.projections[0].revenue, dec!(1100));
        assert_eq!(v.projections[0].nwc_change, dec!(15));
    }

    #[test]
    fn test_wacc_not_above_growth_is_invalid_parameter() {
        let engine = DcfEngine::default();
        let mut inputs = reference_inputs();
        inputs.wacc_override = Some(Tagged::actual(dec!(0.04), "test"));
        let mut w = Vec::new();
        let err = engine.value(&inputs, &mut w).unwrap_err();
        assert!(matches!(err, ValuationError::InvalidParameter { .. }));
    }

    #[test]
    fn test_margin_drift_damped_and_capped() {
        let engine = DcfEngine::default();
        let mut inputs = reference_inputs();
        inputs.margin_drift = dec!(0.02).into();
        let mut w = Vec::new();
        let v = engine.value(&inputs, &mut w).unwrap();
        let margins: Vec<Rate> = v.projections.iter().map(|p| p.ebitda_margin).collect();
        // 0.02, +0.015 capped at 0.03, then flat
        assert_eq!(margins[0], dec!(0.17));
        assert_eq!(margins[1], dec!(0.18));
        assert_eq!(margins[4], dec!(0.18));
    }

    #[test]
    fn test_cash_added_back() {
        let engine = DcfEngine::default();
        let mut inputs = reference_inputs();
        let mut w = Vec::new();
        let base = engine.value(&inputs, &mut w).unwrap();
        inputs.net_debt = dec!(200).into();
        inputs.cash = dec!(50).into();
        let bridged = engine.value(&inputs, &mut w).unwrap();
        assert_eq!(bridged.equity_value, base.firm_value - dec!(150));
    }

    #[test]
    fn test_damping_factor_endpoints() {
        assert_eq!(damping_factor(0, 5), Decimal::ONE);
        assert_eq!(damping_factor(4, 5), Decimal::ZERO);
    }
}
