use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::trace;

use super::model::PeerGroup;

/// A cached peer group and the instant it stops being served.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub group: PeerGroup,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Time-bounded store of peer groups keyed by subject symbol.
///
/// `put` replaces the whole entry for a key; concurrent writers resolve as
/// last-writer-wins. Expired entries are still returned by `get` so that
/// reviewer overrides can be carried into the recomputed group.
pub trait PeerCache: Send + Sync {
    fn get(&self, key: &str) -> Option<CacheEntry>;
    fn put(&self, key: &str, group: PeerGroup, expires_at: DateTime<Utc>);
    /// Returns true when an entry was removed.
    fn invalidate(&self, key: &str) -> bool;
}

pub fn cache_key(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

#[derive(Debug, Default)]
pub struct InMemoryPeerCache {
    entries: DashMap<String, CacheEntry>,
}

impl InMemoryPeerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry that expired before `now`.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_fresh(now));
        before - self.entries.len()
    }
}

impl PeerCache for InMemoryPeerCache {
    fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(&cache_key(key)).map(|e| e.value().clone())
    }

    fn put(&self, key: &str, group: PeerGroup, expires_at: DateTime<Utc>) {
        trace!(key, peers = group.len(), "peer cache put");
        self.entries
            .insert(cache_key(key), CacheEntry { group, expires_at });
    }

    fn invalidate(&self, key: &str) -> bool {
        self.entries.remove(&cache_key(key)).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peers::model::SubjectMetrics;
    use chrono::Duration;
    use std::sync::Arc;

    fn group(symbol: &str, now: DateTime<Utc>) -> PeerGroup {
        PeerGroup::empty(
            &SubjectMetrics {
                symbol: symbol.into(),
                ..Default::default()
            },
            now,
        )
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let cache = InMemoryPeerCache::new();
        let now = Utc::now();
        cache.put("abc", group("ABC", now), now + Duration::days(1));
        assert!(cache.get("ABC").is_some());
        assert!(cache.invalidate(" Abc "));
        assert!(cache.get("abc").is_none());
        assert!(!cache.invalidate("abc"));
    }

    #[test]
    fn test_put_replaces_entry() {
        let cache = InMemoryPeerCache::new();
        let now = Utc::now();
        cache.put("X", group("X", now), now + Duration::days(1));
        let later = now + Duration::hours(1);
        cache.put("X", group("X", later), later + Duration::days(2));
        let entry = cache.get("X").unwrap();
        assert_eq!(entry.group.computed_at, later);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_purge_expired() {
        let cache = InMemoryPeerCache::new();
        let now = Utc::now();
        cache.put("OLD", group("OLD", now), now - Duration::days(1));
        cache.put("NEW", group("NEW", now), now + Duration::days(1));
        assert!(!cache.get("OLD").unwrap().is_fresh(now));
        assert_eq!(cache.purge_expired(now), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_shared_across_threads() {
        let cache = Arc::new(InMemoryPeerCache::new());
        let now = Utc::now();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let c = Arc::clone(&cache);
                std::thread::spawn(move || {
                    let key = format!("S{i}");
                    c.put(&key, group(&key, now), now + Duration::days(1));
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), 4);
    }
}
