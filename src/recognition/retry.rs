use std::future::Future;
use std::time::Duration;

use super::error::RecognitionError;

const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// Exponential backoff for remote recognition.
///
/// Attempt `n` (zero based) that fails transiently is followed by a delay of
/// `min(base_delay * 2^n, max_delay)`, so the defaults yield 1s, 2s and 4s
/// before giving up.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Policy that makes a single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }
}

/// What happened across all attempts.
#[derive(Debug)]
pub struct RetryReport<T> {
    pub result: Result<T, RecognitionError>,
    pub attempts: u32,
    pub delays: Vec<Duration>,
}

/// Run `operation` until it succeeds, fails with a non-transient error, the
/// policy runs out of attempts, or `still_wanted` reports the caller no
/// longer cares. Only the last error is returned.
pub async fn retry_with_backoff<T, F, Fut, W>(
    policy: &RetryPolicy,
    label: &str,
    mut still_wanted: W,
    mut operation: F,
) -> RetryReport<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, RecognitionError>>,
    W: FnMut() -> bool,
{
    let mut delays = Vec::new();
    let mut last_error =
        RecognitionError::Provider(format!("{label}: retry policy allows no attempts"));
    let mut attempts = 0;

    for attempt in 0..policy.max_attempts {
        attempts = attempt + 1;
        match operation(attempt).await {
            Ok(value) => {
                return RetryReport {
                    result: Ok(value),
                    attempts,
                    delays,
                }
            }
            Err(err) if err.is_transient() => {
                let delay = policy.delay_for(attempt);
                log_warn!(
                    "{label} attempt {}/{} failed: {err}; backing off {}ms",
                    attempts,
                    policy.max_attempts,
                    delay.as_millis()
                );
                last_error = err;
                tokio::time::sleep(delay).await;
                delays.push(delay);
                if !still_wanted() {
                    break;
                }
            }
            Err(err) => {
                return RetryReport {
                    result: Err(err),
                    attempts,
                    delays,
                }
            }
        }
    }

    RetryReport {
        result: Err(last_error),
        attempts,
        delays,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delays_double_and_cap() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..5).map(|n| policy.delay_for(n).as_millis() as u64).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 8000]);
    }

    #[tokio::test(start_paused = true)]
    async fn three_transient_failures_wait_one_two_four_seconds() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let report: RetryReport<()> =
            retry_with_backoff(&RetryPolicy::default(), "remote", || true, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RecognitionError::Network("connection reset".into())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.attempts, 3);
        let millis: Vec<u128> = report.delays.iter().map(Duration::as_millis).collect();
        assert_eq!(millis, vec![1000, 2000, 4000]);
        assert_eq!(started.elapsed(), Duration::from_secs(7));
        assert_eq!(
            report.result.unwrap_err(),
            RecognitionError::Network("connection reset".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn not_ready_is_not_retried() {
        let calls = AtomicU32::new(0);
        let report: RetryReport<()> =
            retry_with_backoff(&RetryPolicy::default(), "remote", || true, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RecognitionError::ProviderNotReady("trocr_not_ready".into())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(report.delays.is_empty());
        assert!(report.result.unwrap_err().is_not_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_one_transient_failure() {
        let report = retry_with_backoff(&RetryPolicy::default(), "remote", || true, |attempt| async move {
            if attempt == 0 {
                Err(RecognitionError::Network("timeout".into()))
            } else {
                Ok("x+1")
            }
        })
        .await;

        assert_eq!(report.result, Ok("x+1"));
        assert_eq!(report.attempts, 2);
        assert_eq!(report.delays, vec![Duration::from_secs(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_caller_loses_interest() {
        let calls = AtomicU32::new(0);
        let report: RetryReport<()> =
            retry_with_backoff(&RetryPolicy::default(), "remote", || false, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(RecognitionError::Network("down".into())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(report.result.is_err());
    }
}
