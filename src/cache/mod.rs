//! C9 — Analytics Cache.
//!
//! Out-of-band, in-process TTL-bounded hot store keyed by session id.
//! A miss is never an error here — callers always fall through to the
//! Artifact Store, so [`CacheError`] stays internal to this module.

use crate::types::AnalyticsCacheEntry;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
enum CacheError {
    #[error("entry expired")]
    Expired,
}

struct Entry {
    value: AnalyticsCacheEntry,
    inserted_at: Instant,
}

/// Dashmap-backed cache: a lock-free concurrent map, preferred over a
/// `Mutex<HashMap<_>>` wherever many readers contend with occasional
/// writers.
pub struct AnalyticsCache {
    entries: DashMap<Uuid, Entry>,
    ttl: Duration,
}

impl AnalyticsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn set(&self, session_id: Uuid, value: AnalyticsCacheEntry) {
        self.entries.insert(
            session_id,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Returns `None` on both a true miss and an expired entry — the
    /// caller has no reason to distinguish the two.
    pub fn get(&self, session_id: Uuid) -> Option<AnalyticsCacheEntry> {
        match self.get_checked(session_id) {
            Ok(value) => Some(value),
            Err(CacheError::Expired) => {
                self.entries.remove(&session_id);
                None
            }
        }
    }

    fn get_checked(&self, session_id: Uuid) -> Result<AnalyticsCacheEntry, CacheError> {
        let entry = self.entries.get(&session_id).ok_or(CacheError::Expired)?;
        if entry.inserted_at.elapsed() > self.ttl {
            return Err(CacheError::Expired);
        }
        Ok(entry.value.clone())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn invalidate(&self, session_id: Uuid) {
        self.entries.remove(&session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CacheSummary;
    use chrono::Utc;

    fn sample_entry(session_id: Uuid) -> AnalyticsCacheEntry {
        AnalyticsCacheEntry {
            session_id,
            analytics: serde_json::json!({}),
            summary: CacheSummary {
                channels: vec!["CH1".to_string()],
                total_channels: 1,
                overall_compliance: Some(80.0),
                processed_at: Utc::now(),
            },
            c3d_metadata: serde_json::json!({}),
            cache_version: 1,
            cached_at: Utc::now(),
        }
    }

    #[test]
    fn set_then_get_round_trips() {
        let cache = AnalyticsCache::new(Duration::from_secs(3600));
        let id = Uuid::new_v4();
        cache.set(id, sample_entry(id));
        assert!(cache.get(id).is_some());
    }

    #[test]
    fn miss_on_unknown_session_is_none_not_error() {
        let cache = AnalyticsCache::new(Duration::from_secs(3600));
        assert!(cache.get(Uuid::new_v4()).is_none());
    }

    #[test]
    fn expired_entry_is_treated_as_a_miss() {
        let cache = AnalyticsCache::new(Duration::from_millis(1));
        let id = Uuid::new_v4();
        cache.set(id, sample_entry(id));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(id).is_none());
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = AnalyticsCache::new(Duration::from_secs(3600));
        let id = Uuid::new_v4();
        cache.set(id, sample_entry(id));
        cache.invalidate(id);
        assert!(cache.get(id).is_none());
    }
}
