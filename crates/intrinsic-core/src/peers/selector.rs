use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use tracing::{debug, info};

use super::cache::{cache_key, PeerCache};
use super::model::{PeerCandidate, PeerGroup, PeerOrigin, PeerRecord, PeerTier, SubjectMetrics};
use super::similarity::{self, market_cap_ratio};
use crate::config::PeerConfig;

// ---------------------------------------------------------------------------
// Peer universe
// ---------------------------------------------------------------------------

/// Source of classification and metrics for listed companies.
pub trait PeerUniverse: Send + Sync {
    /// Candidates in `industry`; a blank industry matches nothing.
    fn by_industry(&self, industry: &str) -> Vec<PeerCandidate>;
    fn by_sector(&self, sector: &str) -> Vec<PeerCandidate>;
    fn lookup(&self, symbol: &str) -> Option<PeerCandidate>;
}

/// A fixed list of candidates, e.g. loaded from a JSON file.
#[derive(Debug, Clone, Default)]
pub struct StaticPeerUniverse {
    candidates: Vec<PeerCandidate>,
}

impl StaticPeerUniverse {
    pub fn new(candidates: Vec<PeerCandidate>) -> Self {
        StaticPeerUniverse { candidates }
    }

    pub fn candidates(&self) -> &[PeerCandidate] {
        &self.candidates
    }
}

impl PeerUniverse for StaticPeerUniverse {
    fn by_industry(&self, industry: &str) -> Vec<PeerCandidate> {
        let industry = industry.trim();
        if industry.is_empty() {
            return Vec::new();
        }
        self.candidates
            .iter()
            .filter(|c| c.industry.trim().eq_ignore_ascii_case(industry))
            .cloned()
            .collect()
    }

    fn by_sector(&self, sector: &str) -> Vec<PeerCandidate> {
        self.candidates
            .iter()
            .filter(|c| c.sector.eq_ignore_ascii_case(sector))
            .cloned()
            .collect()
    }

    fn lookup(&self, symbol: &str) -> Option<PeerCandidate> {
        self.candidates
            .iter()
            .find(|c| c.symbol.eq_ignore_ascii_case(symbol))
            .cloned()
    }
}

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

/// Builds two-tier peer groups, serving from the cache while fresh.
pub struct PeerSelector<'a> {
    cache: &'a dyn PeerCache,
    universe: &'a dyn PeerUniverse,
    config: &'a PeerConfig,
}

impl<'a> PeerSelector<'a> {
    pub fn new(cache: &'a dyn PeerCache, universe: &'a dyn PeerUniverse, config: &'a PeerConfig) -> Self {
        PeerSelector {
            cache,
            universe,
            config,
        }
    }

    pub fn build_peer_group(&self, subject: &SubjectMetrics) -> PeerGroup {
        self.build_peer_group_at(subject, Utc::now())
    }

    /// Cache-first: a fresh entry is returned as is, otherwise the group is
    /// recomputed and replaces the cached one.
    pub fn build_peer_group_at(&self, subject: &SubjectMetrics, now: DateTime<Utc>) -> PeerGroup {
        let key = cache_key(&subject.symbol);
        let cached = self.cache.get(&key);
        if let Some(entry) = &cached {
            if entry.is_fresh(now) {
                debug!(symbol = %key, peers = entry.group.len(), "peer cache hit");
                return entry.group.clone();
            }
        }
        debug!(symbol = %key, expired = cached.is_some(), "peer cache miss");
        let overrides: Vec<PeerRecord> = cached
            .map(|e| e.group.overrides().cloned().collect())
            .unwrap_or_default();
        self.recompute(subject, overrides, now)
    }

    /// Ignore any fresh entry and rebuild now. Overrides are kept.
    pub fn refresh(&self, subject: &SubjectMetrics, now: DateTime<Utc>) -> PeerGroup {
        let overrides: Vec<PeerRecord> = self
            .cache
            .get(&subject.symbol)
            .map(|e| e.group.overrides().cloned().collect())
            .unwrap_or_default();
        self.recompute(subject, overrides, now)
    }

    /// Drop the cached group, overrides included.
    pub fn invalidate(&self, symbol: &str) -> bool {
        let removed = self.cache.invalidate(symbol);
        if removed {
            info!(symbol, "peer group invalidated");
        }
        removed
    }

    /// Add a reviewer-chosen peer that survives recomputation.
    pub fn pin_peer(
        &self,
        subject: &SubjectMetrics,
        peer_symbol: &str,
        tier: PeerTier,
        now: DateTime<Utc>,
    ) -> PeerGroup {
        let mut group = self.build_peer_group_at(subject, now);
        group.peers.retain(|p| !p.symbol.eq_ignore_ascii_case(peer_symbol));

        let candidate = self.universe.lookup(peer_symbol);
        let (similarity, ratio) = match &candidate {
            Some(c) => (
                similarity::score(subject, c, self.config).total,
                market_cap_ratio(subject.market_cap, c.market_cap),
            ),
            None => (Decimal::ZERO, None),
        };
        group.peers.push(PeerRecord {
            symbol: peer_symbol.trim().to_uppercase(),
            tier,
            similarity,
            market_cap_ratio: ratio,
            origin: PeerOrigin::Override,
            expires_at: group.expires_at,
        });
        info!(symbol = %subject.symbol, peer = peer_symbol, tier = %tier, "peer pinned");
        self.cache.put(&subject.symbol, group.clone(), group.expires_at);
        group
    }

    fn recompute(&self, subject: &SubjectMetrics, overrides: Vec<PeerRecord>, now: DateTime<Utc>) -> PeerGroup {
        let expires_at = now + Duration::days(self.config.ttl_days.max(0));
        let excluded = |symbol: &str| {
            symbol.eq_ignore_ascii_case(&subject.symbol)
                || overrides.iter().any(|o| o.symbol.eq_ignore_ascii_case(symbol))
        };

        // Unclassified subjects get no tight tier.
        let industry = subject.industry.trim();
        let same_industry =
            |c: &PeerCandidate| !industry.is_empty() && c.industry.trim().eq_ignore_ascii_case(industry);
        let tight: Vec<PeerCandidate> = if industry.is_empty() {
            Vec::new()
        } else {
            self.universe
                .by_industry(industry)
                .into_iter()
                .filter(|c| !excluded(&c.symbol))
                .filter(|c| same_industry(c))
                .collect()
        };

        let broad: Vec<PeerCandidate> = self
            .universe
            .by_sector(&subject.sector)
            .into_iter()
            .filter(|c| !excluded(&c.symbol))
            .filter(|c| !same_industry(c))
            .filter(|c| self.within_band(subject, c))
            .collect();

        let mut peers = self.rank(subject, tight, PeerTier::Tight, expires_at);
        peers.extend(self.rank(subject, broad, PeerTier::Broad, expires_at));
        peers.extend(overrides.into_iter().map(|mut o| {
            o.expires_at = expires_at;
            o
        }));

        let group = PeerGroup {
            subject: subject.symbol.clone(),
            sector: subject.sector.clone(),
            industry: subject.industry.clone(),
            computed_at: now,
            expires_at,
            peers,
        };
        info!(
            symbol = %subject.symbol,
            tight = group.tier(PeerTier::Tight).count(),
            broad = group.tier(PeerTier::Broad).count(),
            "peer group recomputed"
        );
        self.cache.put(&subject.symbol, group.clone(), expires_at);
        group
    }

    /// Broad peers need a market cap on both sides inside the band.
    fn within_band(&self, subject: &SubjectMetrics, candidate: &PeerCandidate) -> bool {
        match market_cap_ratio(subject.market_cap, candidate.market_cap) {
            Some(r) => r >= self.config.band_low && r <= self.config.band_high,
            None => false,
        }
    }

    fn rank(
        &self,
        subject: &SubjectMetrics,
        candidates: Vec<PeerCandidate>,
        tier: PeerTier,
        expires_at: DateTime<Utc>,
    ) -> Vec<PeerRecord> {
        let mut scored: Vec<PeerRecord> = candidates
            .iter()
            .map(|c| PeerRecord {
                symbol: c.symbol.clone(),
                tier,
                similarity: similarity::score(subject, c, self.config).total,
                market_cap_ratio: market_cap_ratio(subject.market_cap, c.market_cap),
                origin: PeerOrigin::Computed,
                expires_at,
            })
            .collect();
        scored.sort_by(|a, b| match b.similarity.cmp(&a.similarity) {
            Ordering::Equal => a.symbol.cmp(&b.symbol),
            other => other,
        });
        scored.dedup_by(|a, b| a.symbol.eq_ignore_ascii_case(&b.symbol));
        scored.truncate(self.config.top_n);
        scored
    }
}
