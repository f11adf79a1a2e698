use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheConfig, CachePersister, MetricsSnapshot, RecognitionCache, SnapshotStore};
use crate::detection::{DetectorConfig, EquationDetector};
use crate::geometry::AnalyzerConfig;
use crate::models::{HistoryRecord, Stroke};
use crate::recognition::{
    GeometricRecognizer, HistoryLog, HistoryStats, HybridOrchestrator, RecognitionOutcome,
    RecognitionRequest, Recognizer, RetryPolicy, StrokeFilterConfig,
};
use crate::settings::SettingsStore;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Default)]
pub struct ContextConfig {
    pub cache: CacheConfig,
    pub detector: DetectorConfig,
    pub retry: RetryPolicy,
    pub filter: StrokeFilterConfig,
    pub analyzer: AnalyzerConfig,
}

struct FlushLoop {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns everything one recognition session shares: settings, cache,
/// history, orchestrator and the optional persistence loop. Contexts do
/// not share state with each other.
pub struct RecognitionContext {
    settings: Arc<SettingsStore>,
    orchestrator: Arc<HybridOrchestrator>,
    persister: Option<Arc<CachePersister>>,
    config: ContextConfig,
    flush_loop: Mutex<Option<FlushLoop>>,
    detectors: Mutex<Vec<EquationDetector>>,
}

impl RecognitionContext {
    pub fn new(
        settings: Arc<SettingsStore>,
        remote: Option<Arc<dyn Recognizer>>,
        store: Option<Arc<dyn SnapshotStore>>,
        config: ContextConfig,
    ) -> Self {
        let cache = Arc::new(Mutex::new(RecognitionCache::new(&config.cache)));
        let history = Arc::new(Mutex::new(HistoryLog::default()));
        let local: Arc<dyn Recognizer> = Arc::new(GeometricRecognizer::new(config.analyzer.clone()));

        let orchestrator = HybridOrchestrator::new(local, remote, cache.clone(), history.clone())
            .with_retry_policy(config.retry.clone())
            .with_filter(config.filter.clone());

        let persister = store.map(|store| Arc::new(CachePersister::new(cache, history, store)));

        Self {
            settings,
            orchestrator: Arc::new(orchestrator),
            persister,
            config,
            flush_loop: Mutex::new(None),
            detectors: Mutex::new(Vec::new()),
        }
    }

    /// Restore persisted state and start the periodic flush loop.
    pub async fn init(&self) -> Result<()> {
        let Some(persister) = &self.persister else {
            log_info!("recognition context running without persistence");
            return Ok(());
        };

        let mut flush_loop = self.flush_loop.lock().await;
        if flush_loop.is_some() {
            return Err(anyhow!("recognition context already initialised"));
        }

        persister.load().await;
        let cancel_token = CancellationToken::new();
        let handle = Arc::clone(persister).spawn(self.config.cache.flush_interval, cancel_token.clone());
        *flush_loop = Some(FlushLoop {
            cancel_token,
            handle,
        });
        log_info!(
            "persistence loop started ({}s interval)",
            self.config.cache.flush_interval.as_secs()
        );
        Ok(())
    }

    /// Stop every detector and the flush loop. The loop flushes once more
    /// on its way out.
    pub async fn dispose(&self) {
        for detector in self.detectors.lock().await.drain(..) {
            detector.dispose().await;
        }

        let running = self.flush_loop.lock().await.take();
        match running {
            Some(FlushLoop {
                cancel_token,
                handle,
            }) => {
                cancel_token.cancel();
                if let Err(err) = handle.await {
                    log_warn!("flush loop ended abnormally: {err}");
                }
            }
            None => self.flush().await,
        }
    }

    pub async fn flush(&self) {
        if let Some(persister) = &self.persister {
            persister.flush().await;
        }
    }

    /// New detector for `canvas_id` that reads live settings on every run.
    pub async fn detector(&self, canvas_id: &str) -> EquationDetector {
        let settings = Arc::clone(&self.settings);
        let detector = EquationDetector::new(
            canvas_id,
            Arc::clone(&self.orchestrator),
            self.config.detector.clone(),
        )
        .with_settings(move || settings.get());
        self.detectors.lock().await.push(detector.clone());
        detector
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    pub fn orchestrator(&self) -> &Arc<HybridOrchestrator> {
        &self.orchestrator
    }

    /// One-off recognition outside any detector, using current settings.
    pub async fn recognize(&self, strokes: &[Stroke], force_refresh: bool) -> Option<RecognitionOutcome> {
        let request = RecognitionRequest {
            force_refresh,
            ..RecognitionRequest::from_settings(&self.settings.get())
        };
        self.orchestrator.recognize(strokes, &request).await
    }

    pub async fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.orchestrator.cache().lock().await.metrics_snapshot()
    }

    pub async fn reset_metrics(&self) {
        self.orchestrator.cache().lock().await.reset_metrics();
    }

    pub async fn clear_cache(&self) {
        self.orchestrator.cache().lock().await.clear();
    }

    pub async fn history(&self) -> Vec<HistoryRecord> {
        self.orchestrator.history().lock().await.records()
    }

    pub async fn history_stats(&self) -> HistoryStats {
        self.orchestrator.history().lock().await.stats()
    }

    pub async fn clear_history(&self) {
        self.orchestrator.history().lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheSnapshot, StorageError};
    use crate::models::{Point, RecognitionMode};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingStore {
        cache_saves: AtomicUsize,
        history_saves: AtomicUsize,
    }

    #[async_trait]
    impl SnapshotStore for CountingStore {
        async fn load_cache(&self) -> Result<Option<CacheSnapshot>, StorageError> {
            Ok(None)
        }

        async fn save_cache(&self, _snapshot: &CacheSnapshot) -> Result<(), StorageError> {
            self.cache_saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn load_history(&self) -> Result<Vec<HistoryRecord>, StorageError> {
            Ok(Vec::new())
        }

        async fn save_history(&self, _records: &[HistoryRecord]) -> Result<(), StorageError> {
            self.history_saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn local_settings(dir: &tempfile::TempDir) -> Arc<SettingsStore> {
        let store = SettingsStore::with_env(dir.path().join("settings.json"), |_| None).unwrap();
        store.modify(|s| s.mode = RecognitionMode::Local).unwrap();
        Arc::new(store)
    }

    fn vertical_bar() -> Stroke {
        Stroke::new(
            "bar",
            0,
            vec![
                Point::new(10.0, 0.0, 0),
                Point::new(10.5, 20.0, 10),
                Point::new(10.0, 40.0, 20),
            ],
        )
    }

    #[tokio::test]
    async fn dispose_flushes_dirty_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CountingStore::default());
        let context = RecognitionContext::new(
            local_settings(&dir),
            None,
            Some(store.clone()),
            ContextConfig::default(),
        );
        context.init().await.unwrap();

        let outcome = context.recognize(&[vertical_bar()], false).await.unwrap();
        assert!(outcome.error.is_none());

        context.dispose().await;
        assert_eq!(store.cache_saves.load(Ordering::SeqCst), 1);
        assert_eq!(store.history_saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn double_init_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let context = RecognitionContext::new(
            local_settings(&dir),
            None,
            Some(Arc::new(CountingStore::default())),
            ContextConfig::default(),
        );
        context.init().await.unwrap();
        assert!(context.init().await.is_err());
        context.dispose().await;
    }

    #[tokio::test]
    async fn contexts_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let first = RecognitionContext::new(local_settings(&dir), None, None, ContextConfig::default());
        let second = RecognitionContext::new(local_settings(&dir), None, None, ContextConfig::default());

        first.recognize(&[vertical_bar()], false).await;
        assert_eq!(first.history().await.len(), 1);
        assert!(second.history().await.is_empty());
        assert_eq!(second.metrics_snapshot().await.total_recognitions, 0);
    }

    #[tokio::test]
    async fn operator_actions_reset_state() {
        let dir = tempfile::tempdir().unwrap();
        let context = RecognitionContext::new(local_settings(&dir), None, None, ContextConfig::default());
        context.recognize(&[vertical_bar()], false).await;
        context.recognize(&[vertical_bar()], false).await;

        assert_eq!(context.metrics_snapshot().await.hits, 1);
        context.reset_metrics().await;
        context.clear_cache().await;
        context.clear_history().await;

        assert_eq!(context.metrics_snapshot().await.hits, 0);
        assert_eq!(context.metrics_snapshot().await.cache_size, 0);
        assert_eq!(context.history_stats().await.total, 0);
    }
}
