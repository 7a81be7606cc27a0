use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::{QualityRules, SectorConfig};
use crate::stats;
use crate::types::Rate;

/// Company facts the quality adjustment compares against sector benchmarks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityInputs {
    pub roce: Option<Rate>,
    /// Revenue growth used for the growth premium, usually the 3-year CAGR.
    pub growth: Option<Rate>,
    pub promoter_pledge: Option<Rate>,
    pub debt_to_equity: Option<Decimal>,
}

/// Additive premium (+) or discount (-) applied to the peer-implied value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityAdjustment {
    pub roce: Decimal,
    pub growth: Decimal,
    pub governance: Decimal,
    pub leverage: Decimal,
    /// Sum of the components, clipped to the total cap.
    pub total: Decimal,
}

pub fn quality_adjustment(inputs: &QualityInputs, sector: &SectorConfig, rules: &QualityRules) -> QualityAdjustment {
    let roce = inputs
        .roce
        .map(|r| {
            stats::clamp(
                (r - sector.roce_target) * rules.roce_sensitivity,
                -rules.roce_cap,
                rules.roce_cap,
            )
        })
        .unwrap_or(Decimal::ZERO);

    let growth = inputs
        .growth
        .map(|g| {
            stats::clamp(
                (g - sector.default_growth) * rules.growth_sensitivity,
                -rules.growth_cap,
                rules.growth_cap,
            )
        })
        .unwrap_or(Decimal::ZERO);

    let governance = inputs
        .promoter_pledge
        .map(|p| pledge_discount(p, &rules.pledge_discounts))
        .unwrap_or(Decimal::ZERO);

    let leverage = match inputs.debt_to_equity {
        Some(de) if de <= rules.low_leverage_de => rules.low_leverage_premium,
        Some(de) if de >= rules.high_leverage_de => -rules.high_leverage_discount,
        _ => Decimal::ZERO,
    };
    let leverage = stats::clamp(leverage, -rules.leverage_cap, rules.leverage_cap);

    let total = stats::clamp(
        roce + growth + governance + leverage,
        -rules.total_cap,
        rules.total_cap,
    );
    QualityAdjustment {
        roce,
        growth,
        governance,
        leverage,
        total,
    }
}

/// Discount for the highest pledge threshold reached, as a negative number.
fn pledge_discount(pledge: Rate, table: &[(Rate, Rate)]) -> Decimal {
    table
        .iter()
        .filter(|(threshold, _)| pledge >= *threshold)
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, discount)| -*discount)
        .unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_neutral_company_has_no_adjustment() {
        let sector = SectorConfig::default();
        let inputs = QualityInputs {
            roce: Some(sector.roce_target),
            growth: Some(sector.default_growth),
            promoter_pledge: Some(Decimal::ZERO),
            debt_to_equity: Some(dec!(0.8)),
        };
        let adj = quality_adjustment(&inputs, &sector, &QualityRules::default());
        assert_eq!(adj.total, Decimal::ZERO);
    }

    #[test]
    fn test_components_are_capped() {
        let adj = quality_adjustment(
            &QualityInputs {
                roce: Some(dec!(0.80)),
                growth: Some(dec!(0.90)),
                promoter_pledge: None,
                debt_to_equity: Some(dec!(0.1)),
            },
            &SectorConfig::default(),
            &QualityRules::default(),
        );
        assert_eq!(adj.roce, dec!(0.15));
        assert_eq!(adj.growth, dec!(0.10));
        assert_eq!(adj.leverage, dec!(0.03));
        assert_eq!(adj.total, dec!(0.28));
    }

    #[test]
    fn test_pledge_uses_highest_threshold() {
        let rules = QualityRules::default();
        assert_eq!(pledge_discount(dec!(0.60), &rules.pledge_discounts), dec!(-0.15));
        assert_eq!(pledge_discount(dec!(0.30), &rules.pledge_discounts), dec!(-0.08));
        assert_eq!(pledge_discount(dec!(0.05), &rules.pledge_discounts), Decimal::ZERO);
    }

    #[test]
    fn test_total_cap_limits_stacked_discounts() {
        let rules = QualityRules {
            total_cap: dec!(0.20),
            ..Default::default()
        };
        let adj = quality_adjustment(
            &QualityInputs {
                roce: Some(dec!(-0.5)),
                growth: Some(dec!(-0.5)),
                promoter_pledge: Some(dec!(0.9)),
                debt_to_equity: Some(dec!(3)),
            },
            &SectorConfig::default(),
            &rules,
        );
        assert_eq!(adj.total, dec!(-0.20));
    }
}
