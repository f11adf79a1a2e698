use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::cache::{generate_key, RecognitionCache};
use crate::models::{Bounds, HistoryRecord, RecognitionMethod, RecognitionMode, Stroke};
use crate::settings::RecognitionSettings;
use crate::utils::logging::short_signature;
use crate::utils::timer::GenerationTicket;

use super::error::RecognitionError;
use super::history::HistoryLog;
use super::recognizer::{RecognizeOptions, Recognizer, RecognizerOutput};
use super::retry::{retry_with_backoff, RetryPolicy};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Strokes that cannot be real handwriting are dropped before recognition.
#[derive(Debug, Clone)]
pub struct StrokeFilterConfig {
    pub min_points: usize,
    /// Bounding area (px²) above which a stroke is treated as a palm touch
    pub max_area: f64,
}

impl Default for StrokeFilterConfig {
    fn default() -> Self {
        Self {
            min_points: 3,
            max_area: 150_000.0,
        }
    }
}

impl StrokeFilterConfig {
    pub fn accepts(&self, stroke: &Stroke) -> bool {
        stroke.point_count() >= self.min_points && stroke.bounds().area() <= self.max_area
    }
}

#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    pub mode: RecognitionMode,
    pub min_confidence: f64,
    pub cache_enabled: bool,
    /// Skip the cache lookup (results are still written back)
    pub force_refresh: bool,
    pub bounds: Option<Bounds>,
    /// When set, a result that completes after the ticket went stale is dropped
    pub ticket: Option<GenerationTicket>,
}

impl Default for RecognitionRequest {
    fn default() -> Self {
        Self::from_settings(&RecognitionSettings::default())
    }
}

impl RecognitionRequest {
    pub fn from_settings(settings: &RecognitionSettings) -> Self {
        Self {
            mode: settings.mode,
            min_confidence: settings.min_confidence,
            cache_enabled: settings.cache_enabled,
            force_refresh: false,
            bounds: None,
            ticket: None,
        }
    }

    fn is_stale(&self) -> bool {
        self.ticket.as_ref().is_some_and(|ticket| !ticket.is_current())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionOutcome {
    pub equation: String,
    pub latex: String,
    pub confidence: f64,
    pub method: RecognitionMethod,
    pub mode: RecognitionMode,
    pub signature: String,
    pub stroke_count: usize,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl RecognitionOutcome {
    pub fn from_cache(&self) -> bool {
        self.method == RecognitionMethod::Cache
    }
}

/// Whether a local result should be escalated to the remote recognizer.
pub fn should_escalate(mode: RecognitionMode, local_confidence: f64, min_confidence: f64, stroke_count: usize) -> bool {
    match mode {
        RecognitionMode::Local => false,
        RecognitionMode::Cloud => true,
        RecognitionMode::Hybrid => stroke_count > 0 && local_confidence < min_confidence,
    }
}

/// Local-first recognition with confidence-based cloud escalation, retries,
/// caching and history.
pub struct HybridOrchestrator {
    local: Arc<dyn Recognizer>,
    remote: Option<Arc<dyn Recognizer>>,
    cache: Arc<Mutex<RecognitionCache>>,
    history: Arc<Mutex<HistoryLog>>,
    retry: RetryPolicy,
    filter: StrokeFilterConfig,
}

impl HybridOrchestrator {
    pub fn new(
        local: Arc<dyn Recognizer>,
        remote: Option<Arc<dyn Recognizer>>,
        cache: Arc<Mutex<RecognitionCache>>,
        history: Arc<Mutex<HistoryLog>>,
    ) -> Self {
        Self {
            local,
            remote,
            cache,
            history,
            retry: RetryPolicy::default(),
            filter: StrokeFilterConfig::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_filter(mut self, filter: StrokeFilterConfig) -> Self {
        self.filter = filter;
        self
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn cache(&self) -> &Arc<Mutex<RecognitionCache>> {
        &self.cache
    }

    pub fn history(&self) -> &Arc<Mutex<HistoryLog>> {
        &self.history
    }

    /// Recognise `strokes`. Never fails; problems end up in
    /// [`RecognitionOutcome::error`]. Returns `None` only when the request's
    /// ticket went stale while a remote call was in flight.
    pub async fn recognize(&self, strokes: &[Stroke], request: &RecognitionRequest) -> Option<RecognitionOutcome> {
        let started = Instant::now();
        let valid: Vec<Stroke> = strokes
            .iter()
            .filter(|stroke| self.filter.accepts(stroke))
            .cloned()
            .collect();
        if valid.len() < strokes.len() {
            log_debug!("dropped {} invalid strokes", strokes.len() - valid.len());
        }

        let signature = generate_key(&valid);

        if valid.is_empty() {
            let outcome = self.outcome(
                &signature,
                request.mode,
                RecognizerOutput::failed("no valid strokes to recognize"),
                RecognitionMethod::Local,
                0,
                started,
            );
            self.record_metrics(&outcome).await;
            return Some(outcome);
        }

        if request.cache_enabled && !request.force_refresh {
            let cached = self.cache.lock().await.get(&signature);
            if let Some(entry) = cached {
                log_debug!("cache hit for {}", short_signature(&signature));
                let outcome = self.outcome(
                    &signature,
                    request.mode,
                    RecognizerOutput::success(entry.result, entry.confidence),
                    RecognitionMethod::Cache,
                    valid.len(),
                    started,
                );
                self.record_metrics(&outcome).await;
                return Some(outcome);
            }
        }

        let options = RecognizeOptions {
            cache_key: Some(signature.clone()),
            bypass_cache: request.force_refresh || !request.cache_enabled,
            bounds: request.bounds,
        };

        let local = match self.local.recognize(&valid, &options).await {
            Ok(output) => output,
            Err(err) => {
                log_warn!("local recognizer {} failed: {err}", self.local.id());
                RecognizerOutput::failed(err.to_string())
            }
        };

        let (output, method) = if should_escalate(request.mode, local.confidence, request.min_confidence, valid.len()) {
            log_info!(
                "escalating {} (mode {}, local confidence {:.2} < {:.2})",
                short_signature(&signature),
                request.mode,
                local.confidence,
                request.min_confidence
            );
            match self.escalate(&valid, &options, request).await? {
                Ok(remote) => (remote, RecognitionMethod::Remote),
                Err(message) => (
                    RecognizerOutput {
                        error: Some(message),
                        used_fallback: true,
                        ..local
                    },
                    RecognitionMethod::LocalFallback,
                ),
            }
        } else {
            (local, RecognitionMethod::Local)
        };

        let outcome = self.outcome(&signature, request.mode, output, method, valid.len(), started);

        if request.cache_enabled && !outcome.latex.is_empty() && outcome.confidence > 0.0 {
            self.cache
                .lock()
                .await
                .set(&signature, &outcome.latex, outcome.confidence);
        }

        self.history.lock().await.push(HistoryRecord {
            id: Uuid::new_v4().to_string(),
            equation: outcome.equation.clone(),
            method: outcome.method,
            mode: outcome.mode,
            confidence: outcome.confidence,
            duration_ms: outcome.duration_ms,
            timestamp: Utc::now().timestamp_millis(),
            error: outcome.error.clone(),
        });
        self.record_metrics(&outcome).await;

        log_info!(
            "recognized {} via {} in {}ms (confidence {:.2})",
            short_signature(&signature),
            outcome.method.as_str(),
            outcome.duration_ms,
            outcome.confidence
        );
        Some(outcome)
    }

    /// Outer `None`: the request went stale. Inner `Err`: the message to
    /// surface alongside the local fallback.
    async fn escalate(
        &self,
        strokes: &[Stroke],
        options: &RecognizeOptions,
        request: &RecognitionRequest,
    ) -> Option<Result<RecognizerOutput, String>> {
        let Some(remote) = self.remote.as_ref() else {
            return Some(Err("no remote recognizer configured".to_string()));
        };

        let report = retry_with_backoff(
            &self.retry,
            remote.id(),
            || !request.is_stale(),
            move |_| remote.recognize(strokes, options),
        )
        .await;

        if request.is_stale() {
            log_debug!("dropping stale remote result after {} attempts", report.attempts);
            return None;
        }

        Some(match report.result {
            Ok(output) => match output.error {
                Some(message) => Err(message),
                None => Ok(output),
            },
            Err(err @ RecognitionError::ProviderNotReady(_)) => {
                log_warn!("remote recognizer {} not ready; keeping local result", remote.id());
                Err(err.to_string())
            }
            Err(err) => {
                log_warn!(
                    "remote recognizer {} failed after {} attempts: {err}",
                    remote.id(),
                    report.attempts
                );
                Err(err.to_string())
            }
        })
    }

    fn outcome(
        &self,
        signature: &str,
        mode: RecognitionMode,
        output: RecognizerOutput,
        method: RecognitionMethod,
        stroke_count: usize,
        started: Instant,
    ) -> RecognitionOutcome {
        RecognitionOutcome {
            equation: latex_to_equation(&output.latex),
            latex: output.latex,
            confidence: output.confidence,
            method,
            mode,
            signature: signature.to_string(),
            stroke_count,
            duration_ms: started.elapsed().as_millis() as u64,
            error: output.error,
        }
    }

    async fn record_metrics(&self, outcome: &RecognitionOutcome) {
        let success = outcome.error.is_none() && !outcome.latex.is_empty();
        self.cache
            .lock()
            .await
            .record_recognition(outcome.duration_ms, success, outcome.error.as_deref());
    }
}

/// Plain-text rendering of simple recognised latex.
pub fn latex_to_equation(latex: &str) -> String {
    let mut text = latex.to_string();
    for (command, plain) in [
        ("\\times", "*"),
        ("\\cdot", "*"),
        ("\\div", "/"),
        ("\\backslash", "\\"),
        ("\\left", ""),
        ("\\right", ""),
    ] {
        text = text.replace(command, plain);
    }
    text.retain(|c| !c.is_whitespace());
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::models::Point;
    use crate::utils::timer::Generation;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Scripted {
        calls: AtomicUsize,
        replies: std::sync::Mutex<VecDeque<Result<RecognizerOutput, RecognitionError>>>,
        fallback: Result<RecognizerOutput, RecognitionError>,
    }

    impl Scripted {
        fn always(reply: Result<RecognizerOutput, RecognitionError>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                replies: std::sync::Mutex::new(VecDeque::new()),
                fallback: reply,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Recognizer for Scripted {
        fn id(&self) -> &str {
            "scripted"
        }

        async fn recognize(
            &self,
            _strokes: &[Stroke],
            _options: &RecognizeOptions,
        ) -> Result<RecognizerOutput, RecognitionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.replies.lock().unwrap().pop_front();
            next.unwrap_or_else(|| self.fallback.clone())
        }
    }

    fn strokes() -> Vec<Stroke> {
        (0..3)
            .map(|i| {
                let x = i as f64 * 30.0;
                Stroke::new(
                    format!("s{i}"),
                    i,
                    vec![
                        Point::new(x, 0.0, 0),
                        Point::new(x + 5.0, 10.0, 1),
                        Point::new(x + 10.0, 20.0, 2),
                    ],
                )
            })
            .collect()
    }

    fn orchestrator(local: Arc<Scripted>, remote: Option<Arc<Scripted>>) -> HybridOrchestrator {
        HybridOrchestrator::new(
            local,
            remote.map(|r| r as Arc<dyn Recognizer>),
            Arc::new(Mutex::new(RecognitionCache::new(&CacheConfig::default()))),
            Arc::new(Mutex::new(HistoryLog::default())),
        )
    }

    fn hybrid() -> RecognitionRequest {
        RecognitionRequest {
            mode: RecognitionMode::Hybrid,
            min_confidence: 0.7,
            ..RecognitionRequest::default()
        }
    }

    #[test]
    fn escalation_rule_follows_mode_and_threshold() {
        assert!(should_escalate(RecognitionMode::Hybrid, 0.65, 0.7, 3));
        assert!(!should_escalate(RecognitionMode::Hybrid, 0.75, 0.7, 3));
        assert!(!should_escalate(RecognitionMode::Hybrid, 0.1, 0.7, 0));
        assert!(should_escalate(RecognitionMode::Cloud, 0.99, 0.7, 3));
        assert!(!should_escalate(RecognitionMode::Local, 0.0, 0.7, 3));
    }

    #[tokio::test]
    async fn confident_local_result_is_not_escalated() {
        let local = Scripted::always(Ok(RecognizerOutput::success("1+1", 0.75)));
        let remote = Scripted::always(Ok(RecognizerOutput::success("1+7", 0.95)));
        let orchestrator = orchestrator(local, Some(remote.clone()));

        let outcome = orchestrator.recognize(&strokes(), &hybrid()).await.unwrap();
        assert_eq!(outcome.method, RecognitionMethod::Local);
        assert_eq!(outcome.equation, "1+1");
        assert_eq!(remote.calls(), 0);
    }

    #[tokio::test]
    async fn low_confidence_prefers_remote_result() {
        let local = Scripted::always(Ok(RecognizerOutput::success("1+l", 0.65)));
        let remote = Scripted::always(Ok(RecognizerOutput::success("1+1", 0.95)));
        let orchestrator = orchestrator(local, Some(remote.clone()));

        let outcome = orchestrator.recognize(&strokes(), &hybrid()).await.unwrap();
        assert_eq!(outcome.method, RecognitionMethod::Remote);
        assert_eq!(outcome.latex, "1+1");
        assert_eq!(outcome.confidence, 0.95);
        assert_eq!(remote.calls(), 1);
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let local = Scripted::always(Ok(RecognizerOutput::success("2x", 0.9)));
        let orchestrator = orchestrator(local.clone(), None);

        orchestrator.recognize(&strokes(), &hybrid()).await.unwrap();
        let again = orchestrator.recognize(&strokes(), &hybrid()).await.unwrap();

        assert!(again.from_cache());
        assert_eq!(again.latex, "2x");
        assert_eq!(local.calls(), 1);

        let forced = RecognitionRequest {
            force_refresh: true,
            ..hybrid()
        };
        let refreshed = orchestrator.recognize(&strokes(), &forced).await.unwrap();
        assert_eq!(refreshed.method, RecognitionMethod::Local);
        assert_eq!(local.calls(), 2);
    }

    #[tokio::test]
    async fn not_ready_falls_back_without_retry() {
        let local = Scripted::always(Ok(RecognizerOutput::success("x", 0.3)));
        let remote = Scripted::always(Err(RecognitionError::ProviderNotReady("trocr_not_ready".into())));
        let orchestrator = orchestrator(local, Some(remote.clone()));

        let outcome = orchestrator.recognize(&strokes(), &hybrid()).await.unwrap();
        assert_eq!(outcome.method, RecognitionMethod::LocalFallback);
        assert_eq!(outcome.latex, "x");
        assert_eq!(outcome.error.as_deref(), Some("provider not ready: trocr_not_ready"));
        assert_eq!(remote.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_then_fall_back() {
        let local = Scripted::always(Ok(RecognizerOutput::success("x", 0.3)));
        let remote = Scripted::always(Err(RecognitionError::Network("timeout".into())));
        let orchestrator = orchestrator(local, Some(remote.clone()));

        let outcome = orchestrator.recognize(&strokes(), &hybrid()).await.unwrap();
        assert_eq!(remote.calls(), 3);
        assert_eq!(outcome.method, RecognitionMethod::LocalFallback);
        assert_eq!(outcome.error.as_deref(), Some("network failure: timeout"));

        let history = orchestrator.history().lock().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().unwrap().method, RecognitionMethod::LocalFallback);
        drop(history);

        let metrics = orchestrator.cache().lock().await.metrics_snapshot();
        assert_eq!(metrics.total_recognitions, 1);
        assert_eq!(metrics.recent_errors.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_remote_result_is_dropped() {
        let local = Scripted::always(Ok(RecognizerOutput::success("x", 0.3)));
        let remote = Scripted::always(Err(RecognitionError::Network("timeout".into())));
        let orchestrator = Arc::new(orchestrator(local, Some(remote.clone())));
        let generation = Generation::new();

        let request = RecognitionRequest {
            ticket: Some(generation.advance()),
            ..hybrid()
        };
        let task = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.recognize(&strokes(), &request).await })
        };

        tokio::time::sleep(Duration::from_millis(500)).await;
        generation.advance();

        assert!(task.await.unwrap().is_none());
        assert_eq!(remote.calls(), 1);
        assert!(orchestrator.history().lock().await.is_empty());
    }

    #[tokio::test]
    async fn palm_and_tap_strokes_are_filtered() {
        let local = Scripted::always(Ok(RecognizerOutput::success("1", 0.9)));
        let orchestrator = orchestrator(local.clone(), None);
        let tap = Stroke::new("tap", 0, vec![Point::new(0.0, 0.0, 0)]);
        let palm = Stroke::new(
            "palm",
            0,
            vec![
                Point::new(0.0, 0.0, 0),
                Point::new(500.0, 200.0, 1),
                Point::new(600.0, 400.0, 2),
            ],
        );

        let outcome = orchestrator.recognize(&[tap, palm], &hybrid()).await.unwrap();
        assert_eq!(outcome.latex, "");
        assert_eq!(outcome.stroke_count, 0);
        assert!(outcome.error.is_some());
        assert_eq!(local.calls(), 0);
    }

    #[tokio::test]
    async fn missing_remote_keeps_local_with_error() {
        let local = Scripted::always(Ok(RecognizerOutput::success("7", 0.2)));
        let orchestrator = orchestrator(local, None);

        let outcome = orchestrator.recognize(&strokes(), &hybrid()).await.unwrap();
        assert_eq!(outcome.method, RecognitionMethod::LocalFallback);
        assert_eq!(outcome.latex, "7");
        assert_eq!(outcome.error.as_deref(), Some("no remote recognizer configured"));
    }

    #[test]
    fn latex_is_flattened_to_plain_text() {
        assert_eq!(latex_to_equation("12 \\div 4 ="), "12/4=");
        assert_eq!(latex_to_equation("3\\times x"), "3*x");
    }
}
