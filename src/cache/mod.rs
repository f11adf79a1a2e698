pub mod key;
pub mod metrics;
pub mod persister;

pub use key::generate_key;
pub use metrics::{ErrorRecord, MetricsSnapshot, RecognitionMetrics};
pub use persister::{CachePersister, SnapshotStore, StorageError};

use std::num::NonZeroUsize;
use std::time::Duration;

use chrono::Utc;
use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::utils::logging::short_signature;

const ENABLE_LOGS: bool = true;

use crate::log_debug;

pub const DEFAULT_CAPACITY: usize = 50;
pub const MAX_ENTRY_AGE_MS: i64 = 7 * 24 * 60 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub capacity: usize,
    /// Entries older than this read as misses
    pub max_age_ms: i64,
    /// How often dirty state is flushed to the snapshot store
    pub flush_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            max_age_ms: MAX_ENTRY_AGE_MS,
            flush_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    /// Recognised latex
    pub result: String,
    pub confidence: f64,
    /// Epoch ms of insertion
    pub timestamp: i64,
}

/// Persisted form: entries ordered least to most recently used, as a flat
/// list of `[signature, entry]` pairs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CacheSnapshot {
    pub entries: Vec<(String, CacheEntry)>,
    pub timestamp: i64,
}

/// Bounded LRU of recognition results keyed by stroke signature.
pub struct RecognitionCache {
    entries: LruCache<String, CacheEntry>,
    max_age_ms: i64,
    metrics: RecognitionMetrics,
    dirty: bool,
}

impl RecognitionCache {
    pub fn new(config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            max_age_ms: config.max_age_ms,
            metrics: RecognitionMetrics::default(),
            dirty: false,
        }
    }

    pub fn get(&mut self, key: &str) -> Option<CacheEntry> {
        self.get_at(key, Utc::now().timestamp_millis())
    }

    /// Look up `key` as of `now_ms`. Expired entries are evicted on read and
    /// count as misses; hits are promoted to most recently used.
    pub fn get_at(&mut self, key: &str, now_ms: i64) -> Option<CacheEntry> {
        let expired = match self.entries.peek(key) {
            None => {
                self.metrics.record_miss();
                return None;
            }
            Some(entry) => now_ms - entry.timestamp > self.max_age_ms,
        };

        if expired {
            self.entries.pop(key);
            self.dirty = true;
            self.metrics.record_miss();
            log_debug!("cache entry {} expired", short_signature(key));
            return None;
        }

        self.metrics.record_hit();
        self.entries.get(key).cloned()
    }

    pub fn set(&mut self, key: &str, result: &str, confidence: f64) {
        self.set_at(key, result, confidence, Utc::now().timestamp_millis());
    }

    /// Insert or overwrite at the most recently used position, evicting the
    /// least recently used entry when full.
    pub fn set_at(&mut self, key: &str, result: &str, confidence: f64, now_ms: i64) {
        let entry = CacheEntry {
            result: result.to_string(),
            confidence,
            timestamp: now_ms,
        };

        if let Some((evicted, _)) = self.entries.push(key.to_string(), entry) {
            if evicted != key {
                log_debug!("cache full, evicted {}", short_signature(&evicted));
            }
        }
        self.dirty = true;
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            entries: self
                .entries
                .iter()
                .rev()
                .map(|(key, entry)| (key.clone(), entry.clone()))
                .collect(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Load a persisted snapshot, skipping entries that already expired.
    pub fn restore(&mut self, snapshot: CacheSnapshot, now_ms: i64) -> usize {
        let mut restored = 0;
        for (key, entry) in snapshot.entries {
            if now_ms - entry.timestamp > self.max_age_ms {
                continue;
            }
            self.entries.push(key, entry);
            restored += 1;
        }
        restored
    }

    /// Sole mutator of recognition counters.
    pub fn record_recognition(&mut self, duration_ms: u64, success: bool, error: Option<&str>) {
        self.metrics.record_recognition(duration_ms, success, error);
    }

    pub fn metrics(&self) -> &RecognitionMetrics {
        &self.metrics
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.entries.len())
    }

    pub fn reset_metrics(&mut self) {
        self.metrics.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with_capacity(capacity: usize) -> RecognitionCache {
        RecognitionCache::new(&CacheConfig {
            capacity,
            ..CacheConfig::default()
        })
    }

    #[test]
    fn evicts_least_recently_accessed_key() {
        let mut cache = cache_with_capacity(3);
        cache.set_at("A", "a", 0.9, 0);
        cache.set_at("B", "b", 0.9, 0);
        cache.set_at("C", "c", 0.9, 0);

        assert!(cache.get_at("A", 1).is_some());
        cache.set_at("D", "d", 0.9, 2);

        assert!(!cache.contains("B"));
        for key in ["A", "C", "D"] {
            assert!(cache.contains(key), "{key} should remain");
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn stale_entries_read_as_misses() {
        let mut cache = cache_with_capacity(3);
        cache.set_at("old", "x+1", 0.8, 0);

        let eight_days = 8 * 24 * 60 * 60 * 1000;
        assert!(cache.get_at("old", eight_days).is_none());
        assert!(!cache.contains("old"));
        assert_eq!(cache.metrics().misses, 1);
        assert_eq!(cache.metrics().hits, 0);
    }

    #[test]
    fn hits_and_misses_are_counted() {
        let mut cache = cache_with_capacity(3);
        cache.set_at("k", "2+2", 0.9, 0);
        assert_eq!(cache.get_at("k", 10).map(|e| e.result), Some("2+2".to_string()));
        assert!(cache.get_at("missing", 10).is_none());
        assert_eq!(cache.metrics().hits, 1);
        assert_eq!(cache.metrics().misses, 1);
        assert_eq!(cache.metrics_snapshot().hit_rate, 0.5);
    }

    #[test]
    fn overwrite_does_not_evict() {
        let mut cache = cache_with_capacity(2);
        cache.set_at("a", "1", 0.5, 0);
        cache.set_at("b", "2", 0.5, 0);
        cache.set_at("a", "3", 0.7, 1);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get_at("a", 2).map(|e| e.result), Some("3".to_string()));
    }

    #[test]
    fn snapshot_restores_recency_order() {
        let mut cache = cache_with_capacity(3);
        cache.set_at("A", "a", 0.9, 0);
        cache.set_at("B", "b", 0.9, 0);
        cache.set_at("C", "c", 0.9, 0);
        cache.get_at("A", 1);

        let snapshot = cache.snapshot();
        let order: Vec<&str> = snapshot.entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(order, vec!["B", "C", "A"]);

        let mut restored = cache_with_capacity(3);
        assert_eq!(restored.restore(snapshot, 2), 3);
        restored.set_at("D", "d", 0.9, 3);
        assert!(!restored.contains("B"));
    }

    #[test]
    fn snapshot_serializes_as_flat_pairs() {
        let mut cache = cache_with_capacity(3);
        cache.set_at("sig", "x=1", 0.75, 42);
        let json = serde_json::to_value(cache.snapshot()).unwrap();
        assert_eq!(json["entries"][0][0], "sig");
        assert_eq!(json["entries"][0][1]["result"], "x=1");
        assert_eq!(json["entries"][0][1]["timestamp"], 42);
    }

    #[test]
    fn restore_skips_expired_entries() {
        let snapshot = CacheSnapshot {
            entries: vec![
                (
                    "old".into(),
                    CacheEntry {
                        result: "1".into(),
                        confidence: 0.9,
                        timestamp: 0,
                    },
                ),
                (
                    "new".into(),
                    CacheEntry {
                        result: "2".into(),
                        confidence: 0.9,
                        timestamp: MAX_ENTRY_AGE_MS,
                    },
                ),
            ],
            timestamp: 0,
        };
        let mut cache = cache_with_capacity(5);
        assert_eq!(cache.restore(snapshot, MAX_ENTRY_AGE_MS + 10), 1);
        assert!(cache.contains("new"));
    }

    #[test]
    fn writes_mark_cache_dirty() {
        let mut cache = cache_with_capacity(2);
        assert!(!cache.is_dirty());
        cache.set_at("a", "1", 0.5, 0);
        assert!(cache.is_dirty());
        cache.mark_clean();
        cache.get_at("a", 1);
        assert!(!cache.is_dirty());
    }
}
