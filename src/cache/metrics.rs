use std::collections::VecDeque;

use chrono::Utc;
use serde::{Deserialize, Serialize};

const MAX_RECENT_ERRORS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub message: String,
    pub timestamp: i64,
}

/// Running counters. Ratios are derived on read, never stored.
#[derive(Debug, Clone, Default)]
pub struct RecognitionMetrics {
    pub hits: u64,
    pub misses: u64,
    pub total_recognitions: u64,
    pub total_time_ms: u64,
    pub successful_recognitions: u64,
    errors: VecDeque<ErrorRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub total_recognitions: u64,
    pub avg_time_ms: f64,
    pub success_rate: f64,
    pub recent_errors: Vec<ErrorRecord>,
    pub cache_size: usize,
}

impl RecognitionMetrics {
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_recognition(&mut self, duration_ms: u64, success: bool, error: Option<&str>) {
        self.total_recognitions += 1;
        self.total_time_ms = self.total_time_ms.saturating_add(duration_ms);
        if success {
            self.successful_recognitions += 1;
        }

        if let Some(message) = error {
            self.errors.push_back(ErrorRecord {
                message: message.to_string(),
                timestamp: Utc::now().timestamp_millis(),
            });
            if self.errors.len() > MAX_RECENT_ERRORS {
                self.errors.pop_front();
            }
        }
    }

    pub fn hit_rate(&self) -> f64 {
        ratio(self.hits, self.hits + self.misses)
    }

    pub fn avg_time_ms(&self) -> f64 {
        if self.total_recognitions == 0 {
            0.0
        } else {
            self.total_time_ms as f64 / self.total_recognitions as f64
        }
    }

    pub fn success_rate(&self) -> f64 {
        ratio(self.successful_recognitions, self.total_recognitions)
    }

    pub fn recent_errors(&self) -> Vec<ErrorRecord> {
        self.errors.iter().cloned().collect()
    }

    pub fn snapshot(&self, cache_size: usize) -> MetricsSnapshot {
        MetricsSnapshot {
            hits: self.hits,
            misses: self.misses,
            hit_rate: self.hit_rate(),
            total_recognitions: self.total_recognitions,
            avg_time_ms: self.avg_time_ms(),
            success_rate: self.success_rate(),
            recent_errors: self.recent_errors(),
            cache_size,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
