use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::PeerConfig;
use crate::types::{Money, Multiple, Rate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerTier {
    /// Same industry.
    Tight,
    /// Same sector, different industry, market cap within the band.
    Broad,
}

impl PeerTier {
    /// Weight a peer of this tier carries in the multiple medians.
    pub fn weight(&self, config: &PeerConfig) -> Decimal {
        match self {
            PeerTier::Tight => config.tight_weight,
            PeerTier::Broad => config.broad_weight,
        }
    }
}

impl fmt::Display for PeerTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerTier::Tight => write!(f, "tight"),
            PeerTier::Broad => write!(f, "broad"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerOrigin {
    #[default]
    Computed,
    /// Pinned by a reviewer; survives recomputation.
    Override,
}

/// Trading multiples of one listed company.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerMultiples {
    pub pe: Option<Multiple>,
    pub pb: Option<Multiple>,
    pub ev_ebitda: Option<Multiple>,
    pub ps: Option<Multiple>,
}

/// A company in the peer universe with its classification and metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerCandidate {
    pub symbol: String,
    pub sector: String,
    pub industry: String,
    pub market_cap: Option<Money>,
    pub roe: Option<Rate>,
    pub debt_to_equity: Option<Decimal>,
    pub multiples: PeerMultiples,
}

/// Subject-company metrics the similarity score compares against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubjectMetrics {
    pub symbol: String,
    pub sector: String,
    pub industry: String,
    pub market_cap: Option<Money>,
    pub roe: Option<Rate>,
    pub debt_to_equity: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub symbol: String,
    pub tier: PeerTier,
    /// Weighted similarity in [0, 1].
    pub similarity: Decimal,
    /// Peer market cap / subject market cap.
    pub market_cap_ratio: Option<Decimal>,
    #[serde(default)]
    pub origin: PeerOrigin,
    pub expires_at: DateTime<Utc>,
}

/// Ordered peer set for one company: tight peers first, then broad, each by
/// descending similarity. Overrides keep their own position at the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerGroup {
    pub subject: String,
    pub sector: String,
    pub industry: String,
    pub computed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub peers: Vec<PeerRecord>,
}

impl PeerGroup {
    pub fn empty(subject: &SubjectMetrics, now: DateTime<Utc>) -> Self {
        PeerGroup {
            subject: subject.symbol.clone(),
            sector: subject.sector.clone(),
            industry: subject.industry.clone(),
            computed_at: now,
            expires_at: now,
            peers: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn tier(&self, tier: PeerTier) -> impl Iterator<Item = &PeerRecord> + '_ {
        self.peers.iter().filter(move |p| p.tier == tier)
    }

    pub fn overrides(&self) -> impl Iterator<Item = &PeerRecord> + '_ {
        self.peers.iter().filter(|p| p.origin == PeerOrigin::Override)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.peers.iter().any(|p| p.symbol.eq_ignore_ascii_case(symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn record(symbol: &str, tier: PeerTier, origin: PeerOrigin) -> PeerRecord {
        PeerRecord {
            symbol: symbol.into(),
            tier,
            similarity: dec!(0.8),
            market_cap_ratio: Some(Decimal::ONE),
            origin,
            expires_at: Utc::now(),
        }
    }

    #[test]
    fn test_tier_weights_follow_config() {
        let cfg = PeerConfig::default();
        assert_eq!(PeerTier::Tight.weight(&cfg), dec!(2));
        assert_eq!(PeerTier::Broad.weight(&cfg), Decimal::ONE);
    }

    #[test]
    fn test_group_filters() {
        let now = Utc::now();
        let mut group = PeerGroup::empty(&SubjectMetrics::default(), now);
        group.expires_at = now + Duration::days(30);
        group.peers = vec![
            record("AAA", PeerTier::Tight, PeerOrigin::Computed),
            record("BBB", PeerTier::Broad, PeerOrigin::Computed),
            record("CCC", PeerTier::Broad, PeerOrigin::Override),
        ];
        assert_eq!(group.tier(PeerTier::Broad).count(), 2);
        assert_eq!(group.overrides().count(), 1);
        assert!(group.contains("bbb"));
        assert!(!group.is_expired(now));
        assert!(group.is_expired(now + Duration::days(31)));
    }

    #[test]
    fn test_tier_serializes_lowercase() {
        let json = serde_json::to_string(&PeerTier::Tight).unwrap();
        assert_eq!(json, "\"tight\"");
    }
}
