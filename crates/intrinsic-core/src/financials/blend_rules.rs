//! Historical vs convergence weighting for margin and ROCE estimates.
//!
//! A pure function of the historical series, a few sector facts and the
//! rule table, so every band can be exercised in isolation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::{BlendRuleTable, BlendWeights, SegmentRule};
use crate::stats;
use crate::types::Rate;

/// Sector and company facts the rules may key on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectorTags {
    pub financial: bool,
    pub cyclical: bool,
    pub roe: Option<Rate>,
    pub npa: Option<Rate>,
}

/// Which rule produced the weights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendBand {
    Segment(String),
    Sparse,
    Declining,
    Stable,
    Moderate,
    Volatile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendSelection {
    pub weights: BlendWeights,
    pub band: BlendBand,
    /// Whether the cyclical cap lowered the historical weight.
    pub capped: bool,
}

pub fn select_blend_weights(
    series: &[Decimal],
    tags: &SectorTags,
    table: &BlendRuleTable,
) -> BlendSelection {
    if let Some(rule) = table.segments.iter().find(|r| segment_matches(r, tags)) {
        return BlendSelection {
            weights: rule.weights,
            band: BlendBand::Segment(rule.name.clone()),
            capped: false,
        };
    }

    let (weights, band) = if series.len() < 2 {
        (table.sparse, BlendBand::Sparse)
    } else {
        let slope = stats::slope(series).unwrap_or(Decimal::ZERO);
        let volatility = stats::std_dev(series).unwrap_or(Decimal::ZERO);
        if slope <= table.declining_slope {
            (table.declining, BlendBand::Declining)
        } else if volatility <= table.low_volatility {
            (table.stable, BlendBand::Stable)
        } else if volatility <= table.high_volatility {
            (table.moderate, BlendBand::Moderate)
        } else {
            (table.volatile, BlendBand::Volatile)
        }
    };

    if tags.cyclical && weights.historical > table.cyclical_cap {
        let historical = table.cyclical_cap;
        return BlendSelection {
            weights: BlendWeights::new(historical, Decimal::ONE - historical),
            band,
            capped: true,
        };
    }
    BlendSelection {
        weights,
        band,
        capped: false,
    }
}

fn segment_matches(rule: &SegmentRule, tags: &SectorTags) -> bool {
    if rule.financial_only && !tags.financial {
        return false;
    }
    let roe_ok = match rule.min_roe {
        Some(min) => tags.roe.is_some_and(|r| r >= min),
        None => true,
    };
    let npa_ok = match rule.max_npa {
        Some(max) => tags.npa.is_some_and(|n| n <= max),
        None => true,
    };
    roe_ok && npa_ok
}

/// `historical * w_h + target * w_c`.
pub fn blend_toward(historical: Decimal, target: Decimal, weights: &BlendWeights) -> Decimal {
    historical * weights.historical + target * weights.convergence
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn table() -> BlendRuleTable {
        BlendRuleTable::default()
    }

    #[test]
    fn test_sparse_series() {
        let sel = select_blend_weights(&[dec!(0.15)], &SectorTags::default(), &table());
        assert_eq!(sel.band, BlendBand::Sparse);
        assert_eq!(sel.weights, table().sparse);
    }

    #[test]
    fn test_stable_series() {
        let sel = select_blend_weights(
            &[dec!(0.150), dec!(0.152), dec!(0.151)],
            &SectorTags::default(),
            &table(),
        );
        assert_eq!(sel.band, BlendBand::Stable);
        assert_eq!(sel.weights.historical, dec!(0.80));
    }

    #[test]
    fn test_moderate_series() {
        let sel = select_blend_weights(
            &[dec!(0.15), dec!(0.19), dec!(0.16)],
            &SectorTags::default(),
            &table(),
        );
        assert_eq!(sel.band, BlendBand::Moderate);
    }

    #[test]
    fn test_volatile_series() {
        let sel = select_blend_weights(
            &[dec!(0.10), dec!(0.25), dec!(0.12)],
            &SectorTags::default(),
            &table(),
        );
        assert_eq!(sel.band, BlendBand::Volatile);
        assert_eq!(sel.weights.convergence, dec!(0.60));
    }

    #[test]
    fn test_declining_series() {
        let sel = select_blend_weights(
            &[dec!(0.20), dec!(0.17), dec!(0.14)],
            &SectorTags::default(),
            &table(),
        );
        assert_eq!(sel.band, BlendBand::Declining);
    }

    #[test]
    fn test_cyclical_cap() {
        let tags = SectorTags {
            cyclical: true,
            ..Default::default()
        };
        let sel = select_blend_weights(&[dec!(0.150), dec!(0.151), dec!(0.150)], &tags, &table());
        assert!(sel.capped);
        assert_eq!(sel.weights.historical, dec!(0.60));
        assert_eq!(sel.weights.historical + sel.weights.convergence, Decimal::ONE);
    }

    #[test]
    fn test_quality_lender_segment() {
        let tags = SectorTags {
            financial: true,
            roe: Some(dec!(0.18)),
            npa: Some(dec!(0.01)),
            ..Default::default()
        };
        let sel = select_blend_weights(&[dec!(0.10), dec!(0.30)], &tags, &table());
        assert_eq!(sel.band, BlendBand::Segment("quality_lender".into()));
        assert_eq!(sel.weights.historical, dec!(0.90));
    }

    #[test]
    fn test_segment_needs_all_facts() {
        let tags = SectorTags {
            financial: true,
            roe: Some(dec!(0.18)),
            npa: None,
            ..Default::default()
        };
        let sel = select_blend_weights(&[dec!(0.15)], &tags, &table());
        assert_eq!(sel.band, BlendBand::Sparse);
    }

    #[test]
    fn test_blend_toward() {
        let w = BlendWeights::new(dec!(0.6), dec!(0.4));
        assert_eq!(blend_toward(dec!(0.10), dec!(0.20), &w), dec!(0.14));
    }
}
