use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::events::{Listeners, Subscription};
use crate::models::HistoryRecord;

pub const MAX_HISTORY: usize = 25;

/// Aggregates over the records currently held.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub avg_latency_ms: f64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    /// Record count per method name
    pub method_breakdown: BTreeMap<String, usize>,
}

/// Bounded ring of recent recognitions, oldest first.
pub struct HistoryLog {
    records: VecDeque<HistoryRecord>,
    capacity: usize,
    dirty: bool,
    listeners: Listeners<Vec<HistoryRecord>>,
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::with_capacity(MAX_HISTORY)
    }
}

impl HistoryLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            dirty: false,
            listeners: Listeners::new(),
        }
    }

    pub fn push(&mut self, record: HistoryRecord) {
        while self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
        self.dirty = true;
        self.notify();
    }

    /// Replace contents with persisted records, keeping the newest.
    pub fn restore(&mut self, records: Vec<HistoryRecord>) {
        let skip = records.len().saturating_sub(self.capacity);
        self.records = records.into_iter().skip(skip).collect();
        self.dirty = false;
        self.notify();
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.dirty = true;
        self.notify();
    }

    pub fn records(&self) -> Vec<HistoryRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&HistoryRecord> {
        self.records.back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
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

    /// Listener receives the full record list after every change.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Vec<HistoryRecord>) + Send + Sync + 'static,
    {
        self.listeners.subscribe(callback)
    }

    pub fn stats(&self) -> HistoryStats {
        if self.records.is_empty() {
            return HistoryStats::default();
        }

        let total = self.records.len();
        let successful = self.records.iter().filter(|r| r.is_success()).count();

        let mut latencies: Vec<u64> = self.records.iter().map(|r| r.duration_ms).collect();
        latencies.sort_unstable();

        let mut method_breakdown = BTreeMap::new();
        for record in &self.records {
            *method_breakdown
                .entry(record.method.as_str().to_string())
                .or_insert(0) += 1;
        }

        HistoryStats {
            total,
            successful,
            failed: total - successful,
            avg_latency_ms: latencies.iter().sum::<u64>() as f64 / total as f64,
            min_latency_ms: latencies[0],
            max_latency_ms: latencies[total - 1],
            p50: percentile(&latencies, 50.0),
            p90: percentile(&latencies, 90.0),
            p99: percentile(&latencies, 99.0),
            method_breakdown,
        }
    }

    fn notify(&self) {
        if !self.listeners.is_empty() {
            self.listeners.notify(&self.records());
        }
    }
}

/// Nearest-rank percentile over sorted, non-empty input.
fn percentile(sorted: &[u64], p: f64) -> u64 {
    let rank = (p / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RecognitionMethod, RecognitionMode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn record(id: usize, method: RecognitionMethod, duration_ms: u64, error: Option<&str>) -> HistoryRecord {
        HistoryRecord {
            id: format!("r{id}"),
            equation: if error.is_some() { String::new() } else { "1+1".into() },
            method,
            mode: RecognitionMode::Hybrid,
            confidence: 0.8,
            duration_ms,
            timestamp: id as i64,
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn keeps_only_the_newest_twenty_five() {
        let mut log = HistoryLog::default();
        for i in 0..30 {
            log.push(record(i, RecognitionMethod::Local, 10, None));
        }
        assert_eq!(log.len(), MAX_HISTORY);
        assert_eq!(log.records()[0].id, "r5");
        assert_eq!(log.latest().map(|r| r.id.as_str()), Some("r29"));
    }

    #[test]
    fn stats_cover_latency_and_methods() {
        let mut log = HistoryLog::default();
        for (i, ms) in [10, 20, 30, 40, 50, 60, 70, 80, 90, 100].into_iter().enumerate() {
            let method = if i % 2 == 0 {
                RecognitionMethod::Local
            } else {
                RecognitionMethod::Remote
            };
            log.push(record(i, method, ms, None));
        }
        log.push(record(10, RecognitionMethod::LocalFallback, 1000, Some("network failure: down")));

        let stats = log.stats();
        assert_eq!(stats.total, 11);
        assert_eq!(stats.successful, 10);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.min_latency_ms, 10);
        assert_eq!(stats.max_latency_ms, 1000);
        assert_eq!(stats.p50, 60);
        assert_eq!(stats.p90, 100);
        assert_eq!(stats.p99, 1000);
        assert!((stats.avg_latency_ms - 1550.0 / 11.0).abs() < 1e-9);
        assert_eq!(stats.method_breakdown.get("localFallback"), Some(&1));
        assert_eq!(stats.method_breakdown.get("local"), Some(&5));
    }

    #[test]
    fn empty_log_has_zeroed_stats() {
        assert_eq!(HistoryLog::default().stats(), HistoryStats::default());
    }

    #[test]
    fn listeners_see_changes_until_unsubscribed() {
        let mut log = HistoryLog::default();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let subscription = log.subscribe(move |records| {
            counter.store(records.len(), Ordering::SeqCst);
        });

        log.push(record(0, RecognitionMethod::Local, 5, None));
        log.push(record(1, RecognitionMethod::Local, 5, None));
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        subscription.unsubscribe();
        log.clear();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert!(log.is_empty());
    }

    #[test]
    fn restore_trims_and_starts_clean() {
        let mut log = HistoryLog::with_capacity(3);
        let records = (0..5).map(|i| record(i, RecognitionMethod::Cache, 1, None)).collect();
        log.restore(records);
        assert_eq!(log.len(), 3);
        assert_eq!(log.records()[0].id, "r2");
        assert!(!log.is_dirty());
    }
}
