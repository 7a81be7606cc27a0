//! Weighted similarity between a subject company and a peer candidate.
//!
//! Each sub-score lies in [0, 1]; a metric missing on either side scores a
//! neutral 0.5 so incomplete data neither helps nor hurts a candidate.

use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::model::{PeerCandidate, SubjectMetrics};
use crate::config::{PeerConfig, SimilarityWeights};
use crate::stats;
use crate::types::Money;

const NEUTRAL: Decimal = dec!(0.5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityScore {
    pub market_cap: Decimal,
    pub roe: Decimal,
    pub debt_to_equity: Decimal,
    pub total: Decimal,
}

/// 1 - |log10(peer / subject)|, floored at zero.
pub fn market_cap_similarity(subject: Option<Money>, peer: Option<Money>) -> Decimal {
    match market_cap_ratio(subject, peer).and_then(|r| r.checked_log10()) {
        Some(log) => stats::clamp(Decimal::ONE - log.abs(), Decimal::ZERO, Decimal::ONE),
        None => NEUTRAL,
    }
}

/// 1 - |a - b| / scale, clipped to [0, 1].
pub fn linear_similarity(a: Option<Decimal>, b: Option<Decimal>, scale: Decimal) -> Decimal {
    match (a, b) {
        (Some(a), Some(b)) if scale > Decimal::ZERO => {
            stats::clamp(Decimal::ONE - (a - b).abs() / scale, Decimal::ZERO, Decimal::ONE)
        }
        _ => NEUTRAL,
    }
}

/// Peer market cap / subject market cap when both are positive.
pub fn market_cap_ratio(subject: Option<Money>, peer: Option<Money>) -> Option<Decimal> {
    match (subject, peer) {
        (Some(s), Some(p)) if s > Decimal::ZERO && p > Decimal::ZERO => Some(p / s),
        _ => None,
    }
}

/// Component weights scaled to sum to one; equal thirds when all are zero.
pub fn normalized_weights(weights: &SimilarityWeights) -> (Decimal, Decimal, Decimal) {
    let total = weights.market_cap + weights.roe + weights.debt_to_equity;
    if total <= Decimal::ZERO {
        let third = Decimal::ONE / dec!(3);
        return (third, third, Decimal::ONE - third - third);
    }
    let mcap = weights.market_cap / total;
    let roe = weights.roe / total;
    (mcap, roe, Decimal::ONE - mcap - roe)
}

pub fn score(subject: &SubjectMetrics, candidate: &PeerCandidate, config: &PeerConfig) -> SimilarityScore {
    let market_cap = market_cap_similarity(subject.market_cap, candidate.market_cap);
    let roe = linear_similarity(subject.roe, candidate.roe, config.roe_scale);
    let debt_to_equity = linear_similarity(
        subject.debt_to_equity,
        candidate.debt_to_equity,
        config.debt_to_equity_scale,
    );
    let (w_mcap, w_roe, w_de) = normalized_weights(&config.weights);
    let total = stats::clamp(
        w_mcap * market_cap + w_roe * roe + w_de * debt_to_equity,
        Decimal::ZERO,
        Decimal::ONE,
    );
    SimilarityScore {
        market_cap,
        roe,
        debt_to_equity,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> SubjectMetrics {
        SubjectMetrics {
            symbol: "SUBJ".into(),
            sector: "Industrials".into(),
            industry: "Machinery".into(),
            market_cap: Some(dec!(1000)),
            roe: Some(dec!(0.15)),
            debt_to_equity: Some(dec!(0.5)),
        }
    }

    #[test]
    fn test_identical_metrics_score_one() {
        let s = subject();
        let c = PeerCandidate {
            symbol: "PEER".into(),
            market_cap: s.market_cap,
            roe: s.roe,
            debt_to_equity: s.debt_to_equity,
            ..Default::default()
        };
        let sc = score(&s, &c, &PeerConfig::default());
        assert!((sc.total - Decimal::ONE).abs() < dec!(0.000001));
    }

    #[test]
    fn test_market_cap_tenfold_scores_zero() {
        assert!(market_cap_similarity(Some(dec!(100)), Some(dec!(1000))) < dec!(0.000001));
        assert_eq!(market_cap_similarity(Some(dec!(100)), Some(dec!(10000))), Decimal::ZERO);
        let half = market_cap_similarity(Some(dec!(100)), Some(dec!(200)));
        assert!(half > dec!(0.69) && half < dec!(0.70));
    }

    #[test]
    fn test_missing_metric_is_neutral() {
        assert_eq!(market_cap_similarity(None, Some(dec!(5))), dec!(0.5));
        assert_eq!(market_cap_similarity(Some(dec!(5)), Some(Decimal::ZERO)), dec!(0.5));
        assert_eq!(linear_similarity(Some(dec!(0.1)), None, dec!(0.2)), dec!(0.5));
        let c = PeerCandidate::default();
        let sc = score(&subject(), &c, &PeerConfig::default());
        assert_eq!(sc.total, dec!(0.5));
    }

    #[test]
    fn test_scores_stay_in_unit_interval() {
        let s = subject();
        let far = PeerCandidate {
            market_cap: Some(dec!(0.001)),
            roe: Some(dec!(-2)),
            debt_to_equity: Some(dec!(40)),
            ..Default::default()
        };
        let sc = score(&s, &far, &PeerConfig::default());
        assert_eq!(sc.total, Decimal::ZERO);
        for v in [sc.market_cap, sc.roe, sc.debt_to_equity] {
            assert!(v >= Decimal::ZERO && v <= Decimal::ONE);
        }
    }

    #[test]
    fn test_weights_normalize_to_one() {
        let (a, b, c) = normalized_weights(&SimilarityWeights {
            market_cap: dec!(2),
            roe: dec!(1),
            debt_to_equity: dec!(1),
        });
        assert_eq!(a + b + c, Decimal::ONE);
        assert_eq!(a, dec!(0.5));
        let (a, b, c) = normalized_weights(&SimilarityWeights {
            market_cap: Decimal::ZERO,
            roe: Decimal::ZERO,
            debt_to_equity: Decimal::ZERO,
        });
        assert_eq!(a + b + c, Decimal::ONE);
    }
}
