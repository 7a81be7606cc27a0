use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::blend::{BlendOutcome, ConfidenceBreakdown};
use crate::dcf::{DcfInputs, DcfValuation, SensitivityGrid};
use crate::financials::{CompanyData, InputOverrides, ProcessorDiagnostics};
use crate::peers::PeerGroup;
use crate::relative::RelativeValuation;
use crate::scenarios::{OutlookAdjustment, ScenarioKind};
use crate::types::{AuditTrail, Money, Rate, Warning};

/// One company to value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuationRequest {
    pub company: CompanyData,
    pub outlook: OutlookAdjustment,
    pub overrides: InputOverrides,
    /// Defaults to today.
    pub valuation_date: Option<NaiveDate>,
}

/// Headline numbers for one DCF scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub kind: ScenarioKind,
    pub intrinsic_per_share: Money,
    pub firm_value: Money,
    pub equity_value: Money,
    pub wacc: Rate,
    pub terminal_growth: Rate,
    pub terminal_value_share: Decimal,
}

impl ScenarioSummary {
    pub fn from_valuation(kind: ScenarioKind, v: &DcfValuation) -> Self {
        ScenarioSummary {
            kind,
            intrinsic_per_share: v.intrinsic_per_share,
            firm_value: v.firm_value,
            equity_value: v.equity_value,
            wacc: v.wacc.wacc,
            terminal_growth: v.terminal_growth,
            terminal_value_share: v.terminal_value_share,
        }
    }
}

/// Monte Carlo distribution reduced to what the result keeps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McSummary {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub coefficient_of_variation: Option<f64>,
    pub p5: f64,
    pub p95: f64,
    pub probability_above_cmp: Option<f64>,
    pub valid_draws: u32,
    pub rejected_draws: u32,
    pub degraded: bool,
}

#[cfg(feature = "monte_carlo")]
impl From<&crate::monte_carlo::McValuation> for McSummary {
    fn from(v: &crate::monte_carlo::McValuation) -> Self {
        McSummary {
            mean: v.mean,
            median: v.median,
            std_dev: v.std_dev,
            coefficient_of_variation: v.coefficient_of_variation,
            p5: v.percentiles.p5,
            p95: v.percentiles.p95,
            probability_above_cmp: v.probability_above_cmp,
            valid_draws: v.valid_draws,
            rejected_draws: v.rejected_draws,
            degraded: v.degraded,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodAvailability {
    pub dcf: bool,
    pub relative: bool,
    pub monte_carlo: bool,
}

/// Complete, immutable outcome of valuing one company.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationResult {
    pub symbol: String,
    pub name: String,
    pub valuation_date: NaiveDate,
    pub valued_at: DateTime<Utc>,

    pub blended_value: Money,
    pub market_price: Option<Money>,
    /// blended / price - 1
    pub upside: Option<Rate>,
    pub confidence: ConfidenceBreakdown,
    pub blend: BlendOutcome,
    pub availability: MethodAvailability,

    pub scenarios: Vec<ScenarioSummary>,
    pub base_dcf: DcfValuation,
    pub relative: Option<RelativeValuation>,
    pub monte_carlo: Option<McSummary>,
    pub sensitivity: Option<SensitivityGrid>,
    pub peer_group: Option<PeerGroup>,

    pub inputs: DcfInputs,
    pub diagnostics: ProcessorDiagnostics,
    pub warnings: Vec<Warning>,
    pub trail: AuditTrail,
}

impl ValuationResult {
    pub fn scenario(&self, kind: ScenarioKind) -> Option<&ScenarioSummary> {
        self.scenarios.iter().find(|s| s.kind == kind)
    }
}
