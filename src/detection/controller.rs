use std::{future::Future, pin::Pin, sync::Arc};

use chrono::Utc;
use tokio::{
    sync::{broadcast, Mutex},
    time::Instant,
};

use crate::cache::generate_key;
use crate::models::{Bounds, DetectionAnalysis, DetectionPayload, Stroke};
use crate::recognition::{HybridOrchestrator, RecognitionOutcome, RecognitionRequest};
use crate::settings::RecognitionSettings;
use crate::utils::logging::short_signature;
use crate::utils::timer::{schedule, Generation, TaskHandle};

use super::config::DetectorConfig;
use super::region::{locate_equation, DetectionRegion};
use super::state::DetectorState;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

const EVENT_CAPACITY: usize = 32;

type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;
type SettingsSource = Arc<dyn Fn() -> RecognitionSettings + Send + Sync>;

#[derive(Debug, Clone)]
pub enum DetectionEvent {
    /// An equals sign was found; the region is about to be recognised.
    Highlight {
        canvas_id: String,
        bounds: Bounds,
        stroke_ids: Vec<String>,
        confidence: f64,
    },
    /// Any previous highlight is void.
    Cleared { canvas_id: String, reason: String },
    Detected(Box<DetectionPayload>),
}

/// Identity of the last highlighted region.
#[derive(Debug, Clone, PartialEq)]
struct RegionKey {
    signature: String,
    equals_ids: [String; 2],
}

#[derive(Default)]
struct DetectorInner {
    state: DetectorState,
    strokes: Vec<Stroke>,
    debounce: Option<TaskHandle>,
    throttle: Option<TaskHandle>,
    processing: bool,
    pending: bool,
    last_run: Option<Instant>,
    last_region: Option<RegionKey>,
    last_payload: Option<DetectionPayload>,
    disposed: bool,
}

impl DetectorInner {
    fn settle(&mut self, next: DetectorState) {
        if self.state.is_busy() {
            self.state = next;
        }
    }
}

/// Watches one canvas's stroke buffer and emits equation detections.
#[derive(Clone)]
pub struct EquationDetector {
    canvas_id: Arc<str>,
    config: Arc<DetectorConfig>,
    inner: Arc<Mutex<DetectorInner>>,
    orchestrator: Arc<HybridOrchestrator>,
    settings: SettingsSource,
    generation: Generation,
    events: broadcast::Sender<DetectionEvent>,
    clock: Clock,
}

impl EquationDetector {
    pub fn new(canvas_id: impl Into<String>, orchestrator: Arc<HybridOrchestrator>, config: DetectorConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            canvas_id: Arc::from(canvas_id.into()),
            config: Arc::new(config),
            inner: Arc::new(Mutex::new(DetectorInner::default())),
            orchestrator,
            settings: Arc::new(RecognitionSettings::default),
            generation: Generation::new(),
            events,
            clock: Arc::new(|| Utc::now().timestamp_millis()),
        }
    }

    /// Read recognition settings from `source` at the start of every run.
    pub fn with_settings<F>(mut self, source: F) -> Self
    where
        F: Fn() -> RecognitionSettings + Send + Sync + 'static,
    {
        self.settings = Arc::new(source);
        self
    }

    /// Epoch-ms clock compared against stroke `created_at`.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn canvas_id(&self) -> &str {
        &self.canvas_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DetectionEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> DetectorState {
        self.inner.lock().await.state
    }

    pub async fn strokes(&self) -> Vec<Stroke> {
        self.inner.lock().await.strokes.clone()
    }

    pub async fn last_payload(&self) -> Option<DetectionPayload> {
        self.inner.lock().await.last_payload.clone()
    }

    /// Buffer a finished stroke and re-arm the debounce timer. A stroke
    /// whose id is already buffered replaces the earlier version.
    pub async fn add_stroke(&self, stroke: Stroke) {
        let mut inner = self.inner.lock().await;
        if inner.disposed {
            return;
        }

        let stroke_id = stroke.id.clone();
        match inner.strokes.iter().position(|s| s.id == stroke.id) {
            Some(index) => inner.strokes[index] = stroke,
            None => inner.strokes.push(stroke),
        }
        inner.state = DetectorState::Buffering;

        if let Some(handle) = inner.debounce.take() {
            handle.cancel();
        }
        inner.debounce = Some(schedule(self.config.debounce, self.request_detection()));
        log_debug!(
            "canvas {} buffered stroke {} ({} total), debounce {}ms",
            self.canvas_id,
            stroke_id,
            inner.strokes.len(),
            self.config.debounce.as_millis()
        );
    }

    pub async fn remove_stroke(&self, stroke_id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let before = inner.strokes.len();
        inner.strokes.retain(|s| s.id != stroke_id);
        before != inner.strokes.len()
    }

    /// Drop every buffered stroke and void any highlight or in-flight call.
    pub async fn clear(&self) {
        {
            let mut inner = self.inner.lock().await;
            inner.strokes.clear();
            inner.last_region = None;
            inner.last_payload = None;
            inner.state = DetectorState::Idle;
            cancel_timers(&mut inner);
        }
        self.generation.advance();
        self.emit(DetectionEvent::Cleared {
            canvas_id: self.canvas_id.to_string(),
            reason: "canvas cleared".into(),
        });
    }

    /// Skip the remaining debounce and detect now, still honouring the
    /// throttle and the single-run guard.
    pub async fn detect_now(&self) {
        if let Some(handle) = self.inner.lock().await.debounce.take() {
            handle.cancel();
        }
        self.detect_or_defer().await;
    }

    /// Stop timers and invalidate in-flight recognition. The detector
    /// ignores further strokes.
    pub async fn dispose(&self) {
        {
            let mut inner = self.inner.lock().await;
            inner.disposed = true;
            inner.state = DetectorState::Idle;
            cancel_timers(&mut inner);
        }
        self.generation.advance();
        log_debug!("canvas {} detector disposed", self.canvas_id);
    }

    fn request_detection(&self) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>> {
        let detector = self.clone();
        Box::pin(async move { detector.detect_or_defer().await })
    }

    async fn detect_or_defer(&self) {
        {
            let mut inner = self.inner.lock().await;
            if inner.disposed {
                return;
            }
            if inner.processing {
                inner.pending = true;
                log_debug!("canvas {} detection deferred, run in progress", self.canvas_id);
                return;
            }
            if let Some(last_run) = inner.last_run {
                let elapsed = last_run.elapsed();
                if elapsed < self.config.throttle {
                    let scheduled = inner
                        .throttle
                        .as_ref()
                        .is_some_and(|h| !h.is_finished() && !h.is_cancelled());
                    if !scheduled {
                        inner.throttle =
                            Some(schedule(self.config.throttle - elapsed, self.request_detection()));
                    }
                    return;
                }
            }
            inner.processing = true;
            inner.last_run = Some(Instant::now());
            inner.state = DetectorState::Detecting;
        }

        self.run_detection().await;

        let rerun = {
            let mut inner = self.inner.lock().await;
            inner.processing = false;
            std::mem::take(&mut inner.pending)
        };
        if rerun {
            tokio::spawn(self.request_detection());
        }
    }

    async fn run_detection(&self) {
        let started = Instant::now();
        let snapshot = self.inner.lock().await.strokes.clone();
        let ticket = self.generation.advance();

        let region = match locate_equation(&snapshot, (self.clock)(), &self.config) {
            Ok(region) => region,
            Err(reason) => {
                log_debug!("canvas {} detection aborted: {reason}", self.canvas_id);
                self.abort(reason.to_string()).await;
                return;
            }
        };

        let key = RegionKey {
            signature: generate_key(&region.strokes),
            equals_ids: region.equals.stroke_ids(),
        };
        {
            let mut inner = self.inner.lock().await;
            if inner.last_region.as_ref() == Some(&key) {
                log_debug!(
                    "canvas {} region {} unchanged, skipping",
                    self.canvas_id,
                    short_signature(&key.signature)
                );
                inner.settle(DetectorState::Quiescent);
                return;
            }
            inner.last_region = Some(key);
            inner.state = DetectorState::Escalating;
        }

        self.emit(DetectionEvent::Highlight {
            canvas_id: self.canvas_id.to_string(),
            bounds: region.bounds,
            stroke_ids: region.strokes.iter().map(|s| s.id.clone()).collect(),
            confidence: region.equals.confidence,
        });

        let mut request = RecognitionRequest::from_settings(&(self.settings)());
        request.bounds = Some(region.bounds);
        request.ticket = Some(ticket.clone());

        let outcome = self.orchestrator.recognize(&region.strokes, &request).await;
        let Some(outcome) = outcome.filter(|_| ticket.is_current()) else {
            log_debug!("canvas {} dropped stale recognition", self.canvas_id);
            return;
        };

        let payload = build_payload(&region, outcome, started.elapsed().as_millis() as u64);
        log_info!(
            "canvas {} detected '{}' via {} ({:.2})",
            self.canvas_id,
            payload.equation,
            payload.method.as_str(),
            payload.confidence
        );

        {
            let mut inner = self.inner.lock().await;
            inner.last_payload = Some(payload.clone());
            inner.settle(DetectorState::Quiescent);
        }
        self.emit(DetectionEvent::Detected(Box::new(payload)));
    }

    async fn abort(&self, reason: String) {
        self.generation.advance();
        {
            let mut inner = self.inner.lock().await;
            inner.last_region = None;
            inner.settle(DetectorState::Idle);
        }
        self.emit(DetectionEvent::Cleared {
            canvas_id: self.canvas_id.to_string(),
            reason,
        });
    }

    fn emit(&self, event: DetectionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

fn cancel_timers(inner: &mut DetectorInner) {
    if let Some(handle) = inner.debounce.take() {
        handle.cancel();
    }
    if let Some(handle) = inner.throttle.take() {
        handle.cancel();
    }
    inner.pending = false;
}

fn build_payload(region: &DetectionRegion, outcome: RecognitionOutcome, duration_ms: u64) -> DetectionPayload {
    let from_cache = outcome.from_cache();
    DetectionPayload {
        equation: outcome.equation,
        latex: outcome.latex,
        confidence: outcome.confidence,
        method: outcome.method,
        mode: outcome.mode,
        strokes: region.strokes.clone(),
        bounds: region.bounds,
        signature: outcome.signature,
        timestamp: Utc::now().timestamp_millis(),
        analysis: DetectionAnalysis {
            active_area: region.active_area,
            focused_stroke_count: region.focused_count,
            equation_stroke_count: region.strokes.len(),
            equals_bounds: region.equals.bounds,
            equals_confidence: region.equals.confidence,
            equals_stroke_ids: region.equals.stroke_ids(),
            measurements: region.equals.measurements,
            from_cache,
            duration_ms,
        },
        error: outcome.error,
    }
}
