use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::debug;

use super::confidence::{calculate_confidence, ConfidenceBreakdown};
use crate::config::{BlendWeightsConfig, ConfidenceConfig, EngineConfig};
use crate::error::ValuationError;
use crate::types::{with_metadata, ComputationOutput, Money};
use crate::IntrinsicResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationMethod {
    Dcf,
    Relative,
    MonteCarlo,
}

impl fmt::Display for ValuationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValuationMethod::Dcf => write!(f, "DCF"),
            ValuationMethod::Relative => write!(f, "Relative"),
            ValuationMethod::MonteCarlo => write!(f, "Monte Carlo"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodContribution {
    pub method: ValuationMethod,
    pub value: Option<Money>,
    /// Configured weight before renormalization.
    pub nominal_weight: Decimal,
    /// Weight actually applied; zero when excluded.
    pub weight: Decimal,
    pub included: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendOutcome {
    pub blended_value: Money,
    pub contributions: Vec<MethodContribution>,
}

impl BlendOutcome {
    pub fn surviving(&self) -> impl Iterator<Item = &MethodContribution> + '_ {
        self.contributions.iter().filter(|c| c.included)
    }

    pub fn weight_of(&self, method: ValuationMethod) -> Decimal {
        self.contributions
            .iter()
            .find(|c| c.method == method)
            .map(|c| c.weight)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Combines per-method values with renormalized weights.
#[derive(Debug, Clone, Default)]
pub struct ValuationBlender {
    weights: BlendWeightsConfig,
    confidence: ConfidenceConfig,
}

impl ValuationBlender {
    pub fn new(weights: BlendWeightsConfig, confidence: ConfidenceConfig) -> Self {
        ValuationBlender { weights, confidence }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        ValuationBlender::new(config.blend.clone(), config.confidence.clone())
    }

    /// Weighted average over the methods with a positive value. Weights of
    /// the survivors are rescaled to sum to exactly one.
    pub fn blend(
        &self,
        dcf: Option<Money>,
        relative: Option<Money>,
        mc_median: Option<Money>,
    ) -> IntrinsicResult<BlendOutcome> {
        let candidates = [
            (ValuationMethod::Dcf, dcf, self.weights.dcf),
            (ValuationMethod::Relative, relative, self.weights.relative),
            (ValuationMethod::MonteCarlo, mc_median, self.weights.monte_carlo),
        ];

        let survives = |value: Option<Money>, weight: Decimal| {
            matches!(value, Some(v) if v > Decimal::ZERO) && weight > Decimal::ZERO
        };
        let total: Decimal = candidates
            .iter()
            .filter(|(_, v, w)| survives(*v, *w))
            .map(|(_, _, w)| *w)
            .sum();
        let survivor_count = candidates.iter().filter(|(_, v, w)| survives(*v, *w)).count();
        if survivor_count == 0 {
            return Err(ValuationError::NoSurvivingMethod);
        }

        // The last survivor takes the remainder so the weights sum to one exactly.
        let mut assigned = Decimal::ZERO;
        let mut seen = 0usize;
        let mut blended_value = Decimal::ZERO;
        let mut contributions = Vec::with_capacity(candidates.len());
        for (method, value, nominal) in candidates {
            let included = survives(value, nominal);
            let weight = if included {
                seen += 1;
                let w = if seen == survivor_count {
                    Decimal::ONE - assigned
                } else {
                    nominal / total
                };
                assigned += w;
                w
            } else {
                Decimal::ZERO
            };
            if let (true, Some(v)) = (included, value) {
                blended_value += v * weight;
            }
            contributions.push(MethodContribution {
                method,
                value,
                nominal_weight: nominal,
                weight,
                included,
            });
        }

        debug!(
            blended = %blended_value.round_dp(4),
            methods = survivor_count,
            "valuation blended"
        );
        Ok(BlendOutcome {
            blended_value,
            contributions,
        })
    }

    pub fn calculate_confidence(
        &self,
        outcome: &BlendOutcome,
        mc_cv: Option<Decimal>,
        data_quality_warnings: usize,
    ) -> ConfidenceBreakdown {
        calculate_confidence(&self.confidence, outcome, mc_cv, data_quality_warnings)
    }

    /// `blend` followed by `calculate_confidence`, in the standard envelope.
    pub fn blend_with_confidence(
        &self,
        dcf: Option<Money>,
        relative: Option<Money>,
        mc_median: Option<Money>,
        mc_cv: Option<Decimal>,
        data_quality_warnings: usize,
    ) -> IntrinsicResult<ComputationOutput<(BlendOutcome, ConfidenceBreakdown)>> {
        let start = Instant::now();
        let outcome = self.blend(dcf, relative, mc_median)?;
        let confidence = self.calculate_confidence(&outcome, mc_cv, data_quality_warnings);
        let mut warnings = Vec::new();
        for c in outcome.contributions.iter().filter(|c| !c.included) {
            warnings.push(format!("{} excluded from blend", c.method));
        }
        let elapsed = start.elapsed().as_micros() as u64;
        Ok(with_metadata(
            "Renormalized weighted blend",
            &serde_json::json!({
                "weights": self.weights,
                "confidence": self.confidence,
            }),
            warnings,
            elapsed,
            (outcome, confidence),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_all_methods_use_configured_weights() {
        let out = ValuationBlender::default()
            .blend(Some(dec!(100)), Some(dec!(120)), Some(dec!(110)))
            .unwrap();
        // 0.6*100 + 0.3*120 + 0.1*110
        assert_eq!(out.blended_value, dec!(107));
        let total: Decimal = out.contributions.iter().map(|c| c.weight).sum();
        assert_eq!(total, Decimal::ONE);
    }

    #[test]
    fn test_missing_relative_renormalizes() {
        let out = ValuationBlender::default()
            .blend(Some(dec!(100)), None, Some(dec!(130)))
            .unwrap();
        assert_eq!(out.weight_of(ValuationMethod::Relative), Decimal::ZERO);
        let total: Decimal = out.surviving().map(|c| c.weight).sum();
        assert_eq!(total, Decimal::ONE);
        // 6/7 and 1/7
        assert!((out.blended_value - dec!(104.2857142857)).abs() < dec!(0.0000001));
    }

    #[test]
    fn test_non_positive_values_are_dropped() {
        let out = ValuationBlender::default()
            .blend(Some(dec!(-5)), Some(dec!(80)), Some(Decimal::ZERO))
            .unwrap();
        assert_eq!(out.surviving().count(), 1);
        assert_eq!(out.blended_value, dec!(80));
        assert_eq!(out.weight_of(ValuationMethod::Relative), Decimal::ONE);
    }

    #[test]
    fn test_no_survivor_is_an_error() {
        let err = ValuationBlender::default().blend(None, Some(dec!(-1)), None).unwrap_err();
        assert!(matches!(err, ValuationError::NoSurvivingMethod));
    }

    #[test]
    fn test_zero_weight_method_is_excluded() {
        let blender = ValuationBlender::new(
            BlendWeightsConfig {
                dcf: dec!(1),
                relative: Decimal::ZERO,
                monte_carlo: Decimal::ZERO,
            },
            ConfidenceConfig::default(),
        );
        let out = blender.blend(Some(dec!(50)), Some(dec!(500)), None).unwrap();
        assert_eq!(out.blended_value, dec!(50));
    }
}
