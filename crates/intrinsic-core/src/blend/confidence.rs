use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::blender::BlendOutcome;
use crate::config::ConfidenceConfig;
use crate::stats;

/// Additive build-up of the confidence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub base: Decimal,
    pub method_bonus: Decimal,
    /// Dispersion of the surviving method values (std / mean).
    pub agreement_cv: Option<Decimal>,
    pub agreement_bonus: Decimal,
    pub dispersion_bonus: Decimal,
    pub warning_penalty: Decimal,
    /// Final score, clipped to [floor, ceiling].
    pub score: Decimal,
}

pub fn calculate_confidence(
    config: &ConfidenceConfig,
    outcome: &BlendOutcome,
    mc_cv: Option<Decimal>,
    data_quality_warnings: usize,
) -> ConfidenceBreakdown {
    let values: Vec<Decimal> = outcome.surviving().filter_map(|c| c.value).collect();
    let method_bonus = config.per_method_bonus * Decimal::from(values.len() as u64);

    let agreement_cv = stats::coefficient_of_variation(&values);
    let agreement_bonus = match agreement_cv {
        Some(cv) if cv < config.tight_agreement_cv => config.tight_agreement_bonus,
        Some(cv) if cv < config.loose_agreement_cv => config.loose_agreement_bonus,
        _ => Decimal::ZERO,
    };

    let dispersion_bonus = match mc_cv {
        Some(cv) if cv >= Decimal::ZERO && cv < config.low_dispersion_cv => config.low_dispersion_bonus,
        _ => Decimal::ZERO,
    };

    let warning_penalty = config.warning_penalty * Decimal::from(data_quality_warnings as u64);
    let raw = config.base + method_bonus + agreement_bonus + dispersion_bonus - warning_penalty;

    ConfidenceBreakdown {
        base: config.base,
        method_bonus,
        agreement_cv,
        agreement_bonus,
        dispersion_bonus,
        warning_penalty,
        score: stats::clamp(raw, config.floor, config.ceiling),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blend::blender::ValuationBlender;
    use rust_decimal_macros::dec;

    #[test]
    fn test_agreeing_methods_reach_ceiling() {
        let blender = ValuationBlender::default();
        let out = blender.blend(Some(dec!(100)), Some(dec!(102)), Some(dec!(101))).unwrap();
        let c = blender.calculate_confidence(&out, Some(dec!(0.10)), 0);
        // 0.70 + 3*0.05 + 0.10 + 0.05 = 1.00
        assert_eq!(c.score, dec!(1.00));
    }

    #[test]
    fn test_single_method_has_no_agreement_bonus() {
        let blender = ValuationBlender::default();
        let out = blender.blend(Some(dec!(100)), None, None).unwrap();
        let c = blender.calculate_confidence(&out, None, 0);
        assert!(c.agreement_cv.is_none());
        assert_eq!(c.score, dec!(0.75));
    }

    #[test]
    fn test_warnings_floor_the_score() {
        let blender = ValuationBlender::default();
        let out = blender.blend(Some(dec!(100)), Some(dec!(300)), None).unwrap();
        let c = blender.calculate_confidence(&out, Some(dec!(0.9)), 40);
        assert_eq!(c.score, dec!(0.10));
    }

    #[test]
    fn test_score_always_within_bounds() {
        let blender = ValuationBlender::default();
        let out = blender.blend(Some(dec!(10)), Some(dec!(1000)), Some(dec!(50))).unwrap();
        for warnings in 0..20 {
            let c = blender.calculate_confidence(&out, Some(dec!(2)), warnings);
            assert!(c.score >= dec!(0.10) && c.score <= dec!(1.00));
        }
    }
}
