use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::debug;

use super::quality::{quality_adjustment, QualityAdjustment, QualityInputs};
use crate::config::{EngineConfig, MultipleBounds, MultipleWeights, PeerConfig, QualityRules, SectorConfig};
use crate::financials::CompanyFinancials;
use crate::peers::{PeerCandidate, PeerGroup, PeerMultiples, PeerTier};
use crate::stats;
use crate::types::{with_metadata, ComputationOutput, Money, Multiple};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultipleKind {
    PriceEarnings,
    PriceBook,
    EvEbitda,
    PriceSales,
}

impl MultipleKind {
    pub const ALL: [MultipleKind; 4] = [
        MultipleKind::PriceEarnings,
        MultipleKind::PriceBook,
        MultipleKind::EvEbitda,
        MultipleKind::PriceSales,
    ];

    fn of(&self, m: &PeerMultiples) -> Option<Multiple> {
        match self {
            MultipleKind::PriceEarnings => m.pe,
            MultipleKind::PriceBook => m.pb,
            MultipleKind::EvEbitda => m.ev_ebitda,
            MultipleKind::PriceSales => m.ps,
        }
    }

    fn upper_bound(&self, b: &MultipleBounds) -> Multiple {
        match self {
            MultipleKind::PriceEarnings => b.pe_max,
            MultipleKind::PriceBook => b.pb_max,
            MultipleKind::EvEbitda => b.ev_ebitda_max,
            MultipleKind::PriceSales => b.ps_max,
        }
    }

    fn sector_weight(&self, w: &MultipleWeights) -> Decimal {
        match self {
            MultipleKind::PriceEarnings => w.pe,
            MultipleKind::PriceBook => w.pb,
            MultipleKind::EvEbitda => w.ev_ebitda,
            MultipleKind::PriceSales => w.ps,
        }
    }
}

impl fmt::Display for MultipleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MultipleKind::PriceEarnings => write!(f, "P/E"),
            MultipleKind::PriceBook => write!(f, "P/B"),
            MultipleKind::EvEbitda => write!(f, "EV/EBITDA"),
            MultipleKind::PriceSales => write!(f, "P/S"),
        }
    }
}

/// Subject-company fundamentals the multiples are applied to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyMetrics {
    pub net_profit: Option<Money>,
    pub book_value: Option<Money>,
    pub ebitda: Option<Money>,
    pub revenue: Option<Money>,
    /// Interest-bearing debt less cash.
    pub net_debt: Money,
    pub shares_outstanding: Decimal,
}

impl CompanyMetrics {
    /// Latest annual figures; `shares` normally comes from the resolved DCF inputs.
    pub fn from_financials(fin: &CompanyFinancials, shares: Decimal) -> Self {
        let latest = fin.latest_annual().map(|(_, p)| p);
        let debt = latest.and_then(|p| p.total_debt).unwrap_or(Decimal::ZERO);
        let cash = latest.and_then(|p| p.cash).unwrap_or(Decimal::ZERO);
        CompanyMetrics {
            net_profit: latest.and_then(|p| p.net_profit),
            book_value: latest.and_then(|p| p.net_worth),
            ebitda: latest.and_then(|p| p.ebitda),
            revenue: latest.and_then(|p| p.revenue),
            net_debt: debt - cash,
            shares_outstanding: shares,
        }
    }
}

/// One peer's multiples and the weight its tier carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerMultipleSample {
    pub symbol: String,
    pub tier: PeerTier,
    pub weight: Decimal,
    pub multiples: PeerMultiples,
}

impl PeerMultipleSample {
    /// Samples for every peer in `group` that `lookup` can resolve.
    pub fn from_group(
        group: &PeerGroup,
        config: &PeerConfig,
        lookup: impl Fn(&str) -> Option<PeerCandidate>,
    ) -> Vec<PeerMultipleSample> {
        group
            .peers
            .iter()
            .filter_map(|p| {
                lookup(&p.symbol).map(|c| PeerMultipleSample {
                    symbol: p.symbol.clone(),
                    tier: p.tier,
                    weight: p.tier.weight(config),
                    multiples: c.multiples,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpliedValue {
    pub multiple: MultipleKind,
    /// Tier-weighted median of the peers' multiple.
    pub peer_median: Multiple,
    pub peer_count: usize,
    pub implied_per_share: Money,
    /// Sector weight after renormalization over available multiples.
    pub weight: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelativeValuation {
    pub relative_value_per_share: Option<Money>,
    pub base_value_before_adjustment: Option<Money>,
    pub implied_values: Vec<ImpliedValue>,
    pub quality: QualityAdjustment,
    pub peers_used: usize,
    /// Set when no multiple produced a value.
    pub error: Option<String>,
}

/// Peer-multiple valuation with a bounded quality overlay.
#[derive(Debug, Clone, Default)]
pub struct RelativeValuationEngine {
    bounds: MultipleBounds,
    quality: QualityRules,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl RelativeValuationEngine {
    pub fn new(bounds: MultipleBounds, quality: QualityRules) -> Self {
        RelativeValuationEngine { bounds, quality }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        RelativeValuationEngine::new(
            config.rules.multiple_bounds.clone(),
            config.rules.quality.clone(),
        )
    }

    /// Never fails: a company with no usable multiple gets `None` and an
    /// error string so the blend can proceed without this method.
    pub fn calculate_relative_value(
        &self,
        company: &CompanyMetrics,
        peers: &[PeerMultipleSample],
        sector: &SectorConfig,
        quality: &QualityInputs,
    ) -> ComputationOutput<RelativeValuation> {
        let start = Instant::now();
        let mut warnings: Vec<String> = Vec::new();

        let mut implied_values: Vec<ImpliedValue> = Vec::new();
        for kind in MultipleKind::ALL {
            let weight = kind.sector_weight(&sector.multiple_weights);
            if weight <= Decimal::ZERO {
                continue;
            }
            match self.implied(kind, company, peers, &mut warnings) {
                Some(mut iv) => {
                    iv.weight = weight;
                    implied_values.push(iv);
                }
                None => debug!(multiple = %kind, "multiple unavailable"),
            }
        }

        let total_weight: Decimal = implied_values.iter().map(|v| v.weight).sum();
        let adjustment = quality_adjustment(quality, sector, &self.quality);
        let peers_used = peers.len();

        let output = if implied_values.is_empty() || total_weight <= Decimal::ZERO {
            RelativeValuation {
                relative_value_per_share: None,
                base_value_before_adjustment: None,
                implied_values,
                quality: adjustment,
                peers_used,
                error: Some(if peers.is_empty() {
                    "No peers available".to_string()
                } else {
                    "No peer multiple with usable data".to_string()
                }),
            }
        } else {
            for iv in implied_values.iter_mut() {
                iv.weight /= total_weight;
            }
            let base: Money = implied_values
                .iter()
                .map(|v| v.implied_per_share * v.weight)
                .sum();
            let adjusted = base * (Decimal::ONE + adjustment.total);
            debug!(
                base = %base.round_dp(4),
                adjusted = %adjusted.round_dp(4),
                multiples = implied_values.len(),
                "relative value computed"
            );
            RelativeValuation {
                relative_value_per_share: Some(adjusted),
                base_value_before_adjustment: Some(base),
                implied_values,
                quality: adjustment,
                peers_used,
                error: None,
            }
        };

        let elapsed = start.elapsed().as_micros() as u64;
        with_metadata(
            "Tier-weighted peer median multiples with quality adjustment",
            &serde_json::json!({
                "company": company,
                "peer_count": peers.len(),
                "multiple_weights": sector.multiple_weights,
            }),
            warnings,
            elapsed,
            output,
        )
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

impl RelativeValuationEngine {
    fn implied(
        &self,
        kind: MultipleKind,
        company: &CompanyMetrics,
        peers: &[PeerMultipleSample],
        warnings: &mut Vec<String>,
    ) -> Option<ImpliedValue> {
        let shares = company.shares_outstanding;
        if shares <= Decimal::ZERO {
            return None;
        }

        let cap = kind.upper_bound(&self.bounds);
        let mut dropped = 0usize;
        let samples: Vec<(Decimal, Decimal)> = peers
            .iter()
            .filter_map(|p| kind.of(&p.multiples).map(|m| (m, p.weight)))
            .filter(|(m, _)| {
                let ok = *m > Decimal::ZERO && *m <= cap;
                if !ok {
                    dropped += 1;
                }
                ok
            })
            .collect();
        if dropped > 0 {
            warnings.push(format!("{dropped} peer {kind} multiples outside (0, {cap}] ignored"));
        }
        let peer_median = stats::weighted_median(&samples)?;

        let implied_per_share = match kind {
            MultipleKind::PriceEarnings => positive(company.net_profit)? * peer_median / shares,
            MultipleKind::PriceBook => positive(company.book_value)? * peer_median / shares,
            MultipleKind::PriceSales => positive(company.revenue)? * peer_median / shares,
            MultipleKind::EvEbitda => {
                (positive(company.ebitda)? * peer_median - company.net_debt) / shares
            }
        };
        if implied_per_share <= Decimal::ZERO {
            warnings.push(format!("{kind} implies a non-positive equity value; skipped"));
            return None;
        }

        Some(ImpliedValue {
            multiple: kind,
            peer_median,
            peer_count: samples.len(),
            implied_per_share,
            weight: Decimal::ZERO,
        })
    }
}

fn positive(value: Option<Money>) -> Option<Money> {
    value.filter(|v| *v > Decimal::ZERO)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn company() -> CompanyMetrics {
        CompanyMetrics {
            net_profit: Some(dec!(100)),
            book_value: Some(dec!(500)),
            ebitda: Some(dec!(200)),
            revenue: Some(dec!(1000)),
            net_debt: dec!(200),
            shares_outstanding: dec!(100),
        }
    }

    fn sample(symbol: &str, tier: PeerTier, pe: Decimal, pb: Decimal, ev: Decimal, ps: Decimal) -> PeerMultipleSample {
        PeerMultipleSample {
            symbol: symbol.into(),
            tier,
            weight: tier.weight(&PeerConfig::default()),
            multiples: PeerMultiples {
                pe: Some(pe),
                pb: Some(pb),
                ev_ebitda: Some(ev),
                ps: Some(ps),
            },
        }
    }

    #[test]
    fn test_single_peer_implied_values() {
        let engine = RelativeValuationEngine::default();
        let peers = vec![sample("A", PeerTier::Tight, dec!(20), dec!(4), dec!(10), dec!(2))];
        let out = engine.calculate_relative_value(
            &company(),
            &peers,
            &SectorConfig::default(),
            &QualityInputs::default(),
        );
        let r = &out.result;
        let by_kind = |k: MultipleKind| {
            r.implied_values
                .iter()
                .find(|v| v.multiple == k)
                .map(|v| v.implied_per_share)
                .unwrap()
        };
        assert_eq!(by_kind(MultipleKind::PriceEarnings), dec!(20));
        assert_eq!(by_kind(MultipleKind::PriceBook), dec!(20));
        // (200 * 10 - 200) / 100
        assert_eq!(by_kind(MultipleKind::EvEbitda), dec!(18));
        assert_eq!(by_kind(MultipleKind::PriceSales), dec!(20));
        // 0.35*20 + 0.15*20 + 0.35*18 + 0.15*20
        assert_eq!(r.base_value_before_adjustment, Some(dec!(19.30)));
        assert_eq!(r.relative_value_per_share, Some(dec!(19.30)));
    }

    #[test]
    fn test_tight_peers_outweigh_broad() {
        let engine = RelativeValuationEngine::default();
        let peers = vec![
            sample("T1", PeerTier::Tight, dec!(30), dec!(4), dec!(10), dec!(2)),
            sample("B1", PeerTier::Broad, dec!(10), dec!(4), dec!(10), dec!(2)),
        ];
        let out = engine.calculate_relative_value(
            &company(),
            &peers,
            &SectorConfig::default(),
            &QualityInputs::default(),
        );
        let pe = out
            .result
            .implied_values
            .iter()
            .find(|v| v.multiple == MultipleKind::PriceEarnings)
            .unwrap();
        assert_eq!(pe.peer_median, dec!(30));
    }

    #[test]
    fn test_out_of_bounds_multiples_dropped_and_weights_renormalized() {
        let engine = RelativeValuationEngine::default();
        let mut p = sample("A", PeerTier::Broad, dec!(250), dec!(4), dec!(10), dec!(2));
        p.multiples.ps = None;
        let out = engine.calculate_relative_value(
            &company(),
            &[p],
            &SectorConfig::default(),
            &QualityInputs::default(),
        );
        let r = &out.result;
        assert_eq!(r.implied_values.len(), 2);
        let total: Decimal = r.implied_values.iter().map(|v| v.weight).sum();
        assert_eq!(total, Decimal::ONE);
        assert!(out.warnings.iter().any(|w| w.contains("P/E")));
    }

    #[test]
    fn test_financial_sector_skips_ev_ebitda() {
        let engine = RelativeValuationEngine::default();
        let peers = vec![sample("A", PeerTier::Tight, dec!(20), dec!(4), dec!(10), dec!(2))];
        let out = engine.calculate_relative_value(
            &company(),
            &peers,
            &SectorConfig::financials(),
            &QualityInputs::default(),
        );
        assert!(out
            .result
            .implied_values
            .iter()
            .all(|v| v.multiple != MultipleKind::EvEbitda));
    }

    #[test]
    fn test_no_usable_multiple_returns_none_with_error() {
        let engine = RelativeValuationEngine::default();
        let loss_maker = CompanyMetrics {
            net_profit: Some(dec!(-5)),
            book_value: None,
            ebitda: Some(dec!(-1)),
            revenue: None,
            net_debt: Decimal::ZERO,
            shares_outstanding: dec!(100),
        };
        let peers = vec![sample("A", PeerTier::Tight, dec!(20), dec!(4), dec!(10), dec!(2))];
        let out = engine.calculate_relative_value(
            &loss_maker,
            &peers,
            &SectorConfig::default(),
            &QualityInputs::default(),
        );
        assert!(out.result.relative_value_per_share.is_none());
        assert!(out.result.error.is_some());
    }

    #[test]
    fn test_quality_adjustment_applied_on_top() {
        let engine = RelativeValuationEngine::default();
        let peers = vec![sample("A", PeerTier::Tight, dec!(20), dec!(4), dec!(12), dec!(2))];
        let quality = QualityInputs {
            promoter_pledge: Some(dec!(0.6)),
            ..Default::default()
        };
        let out = engine.calculate_relative_value(&company(), &peers, &SectorConfig::default(), &quality);
        let r = &out.result;
        let base = r.base_value_before_adjustment.unwrap();
        assert_eq!(r.quality.total, dec!(-0.15));
        assert_eq!(r.relative_value_per_share, Some(base * dec!(0.85)));
    }
}
