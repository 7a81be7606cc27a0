use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::config::{EngineConfig, ScenarioConfig};
use crate::dcf::{DcfEngine, DcfInputs, DcfValuation};
use crate::error::ValuationError;
use crate::stats;
use crate::types::{Rate, Tagged};
use crate::IntrinsicResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScenarioKind {
    Bull,
    Base,
    Bear,
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioKind::Bull => write!(f, "BULL"),
            ScenarioKind::Base => write!(f, "BASE"),
            ScenarioKind::Bear => write!(f, "BEAR"),
        }
    }
}

/// Growth and margin deltas produced by the outlook scoring collaborators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlookAdjustment {
    pub growth_adjustment: Rate,
    pub margin_adjustment: Rate,
    pub outlook_label: Option<String>,
    pub outlook_score: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSet {
    pub bull: DcfInputs,
    pub base: DcfInputs,
    pub bear: DcfInputs,
}

impl ScenarioSet {
    pub fn get(&self, kind: ScenarioKind) -> &DcfInputs {
        match kind {
            ScenarioKind::Bull => &self.bull,
            ScenarioKind::Base => &self.base,
            ScenarioKind::Bear => &self.bear,
        }
    }
}

/// DCF results per scenario. BASE is always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioValuations {
    pub base: DcfValuation,
    pub bull: Option<DcfValuation>,
    pub bear: Option<DcfValuation>,
    /// Scenarios that were dropped and why.
    pub rejected: Vec<(ScenarioKind, String)>,
    pub warnings: Vec<String>,
}

/// Derives BULL/BASE/BEAR input sets from one resolved BASE set.
#[derive(Debug, Clone)]
pub struct ScenarioBuilder {
    spreads: ScenarioConfig,
    growth_floor: Rate,
    growth_ceiling: Rate,
}

impl ScenarioBuilder {
    pub fn from_config(config: &EngineConfig) -> Self {
        ScenarioBuilder {
            spreads: config.scenarios.clone(),
            growth_floor: config.rules.growth_floor,
            growth_ceiling: config.rules.growth_ceiling,
        }
    }

    /// BASE = inputs shifted by the outlook. BULL and BEAR move growth and
    /// margin a configured spread away from BASE; the side the outlook
    /// points to is widened by the outlook's magnitude.
    pub fn build(&self, inputs: &DcfInputs, outlook: &OutlookAdjustment) -> ScenarioSet {
        let g_adj = outlook.growth_adjustment;
        let m_adj = outlook.margin_adjustment;
        let base = self.shift(inputs, g_adj, m_adj, "outlook");

        let up_growth = self.spreads.growth_spread + g_adj.max(Decimal::ZERO);
        let down_growth = self.spreads.growth_spread + (-g_adj).max(Decimal::ZERO);
        let up_margin = self.spreads.margin_spread + m_adj.max(Decimal::ZERO);
        let down_margin = self.spreads.margin_spread + (-m_adj).max(Decimal::ZERO);

        ScenarioSet {
            bull: self.shift(&base, up_growth, up_margin, "bull"),
            bear: self.shift(&base, -down_growth, -down_margin, "bear"),
            base,
        }
    }

    /// Value all three scenarios. A BASE failure is fatal for the company;
    /// BULL/BEAR failures are recorded and omitted.
    pub fn value_scenarios(
        &self,
        engine: &DcfEngine,
        set: &ScenarioSet,
    ) -> IntrinsicResult<ScenarioValuations> {
        let mut warnings = Vec::new();
        let base = engine.value(&set.base, &mut warnings).map_err(|e| {
            ValuationError::DataInsufficiency(format!("no BASE scenario computable: {e}"))
        })?;

        let mut rejected = Vec::new();
        let mut run = |kind: ScenarioKind, warnings: &mut Vec<String>| {
            match engine.value(set.get(kind), warnings) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(scenario = %kind, error = %e, "scenario rejected");
                    rejected.push((kind, e.to_string()));
                    None
                }
            }
        };
        let bull = run(ScenarioKind::Bull, &mut warnings);
        let bear = run(ScenarioKind::Bear, &mut warnings);

        Ok(ScenarioValuations {
            base,
            bull,
            bear,
            rejected,
            warnings,
        })
    }

    fn shift(&self, inputs: &DcfInputs, growth_delta: Rate, margin_delta: Rate, note: &str) -> DcfInputs {
        let mut out = inputs.clone();
        if !growth_delta.is_zero() {
            let source = append_note(&inputs.revenue_growth.source, note);
            let shifted: Vec<Rate> = inputs
                .revenue_growth
                .value
                .iter()
                .map(|g| stats::clamp(*g + growth_delta, self.growth_floor, self.growth_ceiling))
                .collect();
            out.revenue_growth = Tagged::new(shifted, inputs.revenue_growth.provenance, source);
        }
        if !margin_delta.is_zero() {
            out.ebitda_margin = inputs.ebitda_margin.shifted(margin_delta, note);
        }
        out
    }
}

fn append_note(source: &str, note: &str) -> String {
    if source.is_empty() {
        note.to_string()
    } else {
        format!("{source}; {note}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn inputs() -> DcfInputs {
        serde_json::from_str(
            r#"{
                "base_revenue": 1000,
                "revenue_growth": [0.10, 0.09, 0.08, 0.07, 0.06],
                "ebitda_margin": 0.15,
                "capex_to_sales": 0.08,
                "depreciation_to_sales": 0.04,
                "nwc_to_sales": 0.15,
                "tax_rate": 0.25,
                "risk_free_rate": 0.07,
                "equity_risk_premium": 0.05,
                "beta": 1,
                "cost_of_debt": 0.09,
                "debt_ratio": 0,
                "terminal_roce": 0.15,
                "terminal_reinvestment": 0.30,
                "shares_outstanding": 100
            }"#,
        )
        .unwrap()
    }

    fn builder() -> ScenarioBuilder {
        ScenarioBuilder::from_config(&EngineConfig::default())
    }

    #[test]
    fn test_neutral_outlook_is_symmetric() {
        let set = builder().build(&inputs(), &OutlookAdjustment::default());
        assert_eq!(set.base, inputs());
        assert_eq!(set.bull.revenue_growth.value[0], dec!(0.12));
        assert_eq!(set.bear.revenue_growth.value[0], dec!(0.08));
        assert_eq!(set.bull.ebitda_margin.value, dec!(0.16));
        assert_eq!(set.bear.ebitda_margin.value, dec!(0.14));
    }

    #[test]
    fn test_positive_outlook_widens_bull_side() {
        let outlook = OutlookAdjustment {
            growth_adjustment: dec!(0.01),
            ..Default::default()
        };
        let set = builder().build(&inputs(), &outlook);
        assert_eq!(set.base.revenue_growth.value[0], dec!(0.11));
        assert_eq!(set.bull.revenue_growth.value[0], dec!(0.14));
        assert_eq!(set.bear.revenue_growth.value[0], dec!(0.09));
    }

    #[test]
    fn test_shifted_growth_stays_in_bounds() {
        let set = builder().build(&inputs(), &OutlookAdjustment::default());
        assert!(set.bear.revenue_growth.value.iter().all(|g| *g >= dec!(0.03)));
        assert!(set.bear.revenue_growth.value.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_bear_failure_is_not_fatal() {
        let mut base = inputs();
        // BASE margin 0.045 clears depreciation; BEAR at 0.025 does not.
        base.ebitda_margin = dec!(0.055).into();
        let outlook = OutlookAdjustment {
            margin_adjustment: dec!(-0.01),
            ..Default::default()
        };
        let b = builder();
        let set = b.build(&base, &outlook);
        let vals = b.value_scenarios(&DcfEngine::default(), &set).unwrap();
        assert!(vals.bear.is_none());
        assert_eq!(vals.rejected.len(), 1);
        assert_eq!(vals.rejected[0].0, ScenarioKind::Bear);
    }

    #[test]
    fn test_base_failure_is_data_insufficiency() {
        let mut base = inputs();
        base.shares_outstanding = Decimal::ZERO.into();
        let b = builder();
        let set = b.build(&base, &OutlookAdjustment::default());
        let err = b.value_scenarios(&DcfEngine::default(), &set).unwrap_err();
        assert!(matches!(err, ValuationError::DataInsufficiency(_)));
    }
}
