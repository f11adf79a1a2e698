use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::models::HistoryRecord;
use crate::recognition::HistoryLog;

use super::{CacheSnapshot, RecognitionCache};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage quota exceeded")]
    QuotaExceeded,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Durable home for the cache snapshot and recognition history.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load_cache(&self) -> Result<Option<CacheSnapshot>, StorageError>;
    async fn save_cache(&self, snapshot: &CacheSnapshot) -> Result<(), StorageError>;
    async fn load_history(&self) -> Result<Vec<HistoryRecord>, StorageError>;
    async fn save_history(&self, records: &[HistoryRecord]) -> Result<(), StorageError>;
}

/// Flushes dirty cache and history state to a [`SnapshotStore`], either on
/// demand or from a periodic background loop.
pub struct CachePersister {
    cache: Arc<Mutex<RecognitionCache>>,
    history: Arc<Mutex<HistoryLog>>,
    store: Arc<dyn SnapshotStore>,
}

impl CachePersister {
    pub fn new(
        cache: Arc<Mutex<RecognitionCache>>,
        history: Arc<Mutex<HistoryLog>>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            cache,
            history,
            store,
        }
    }

    /// Restore persisted state. Failures leave the in-memory state empty.
    pub async fn load(&self) {
        match self.store.load_cache().await {
            Ok(Some(snapshot)) => {
                let mut cache = self.cache.lock().await;
                let restored = cache.restore(snapshot, Utc::now().timestamp_millis());
                cache.mark_clean();
                log_info!("restored {} cached recognitions", restored);
            }
            Ok(None) => log_debug!("no persisted cache snapshot"),
            Err(err) => log_warn!("failed to load cache snapshot: {err}"),
        }

        match self.store.load_history().await {
            Ok(records) => {
                let mut history = self.history.lock().await;
                history.restore(records);
            }
            Err(err) => log_warn!("failed to load recognition history: {err}"),
        }
    }

    pub async fn flush(&self) {
        self.flush_cache().await;
        self.flush_history().await;
    }

    async fn flush_cache(&self) {
        // Snapshot is taken in the same critical section that reads the flag.
        let snapshot = {
            let mut cache = self.cache.lock().await;
            if !cache.is_dirty() {
                return;
            }
            cache.mark_clean();
            cache.snapshot()
        };

        match self.store.save_cache(&snapshot).await {
            Ok(()) => log_debug!("persisted {} cache entries", snapshot.entries.len()),
            Err(StorageError::QuotaExceeded) => {
                log_warn!(
                    "storage quota exceeded persisting {} cache entries; clearing cache",
                    snapshot.entries.len()
                );
                {
                    let mut cache = self.cache.lock().await;
                    cache.clear();
                    cache.mark_clean();
                }
                let empty = CacheSnapshot {
                    entries: Vec::new(),
                    timestamp: Utc::now().timestamp_millis(),
                };
                if let Err(err) = self.store.save_cache(&empty).await {
                    log_error!("failed to persist empty cache after quota error: {err}");
                }
            }
            Err(err) => {
                log_error!("failed to persist cache snapshot: {err}");
                self.cache.lock().await.mark_dirty();
            }
        }
    }

    async fn flush_history(&self) {
        let records = {
            let mut history = self.history.lock().await;
            if !history.is_dirty() {
                return;
            }
            history.mark_clean();
            history.records()
        };

        if let Err(err) = self.store.save_history(&records).await {
            log_error!("failed to persist recognition history: {err}");
            self.history.lock().await.mark_dirty();
        }
    }

    /// Spawn the periodic flush loop. Cancelling the token performs one last
    /// flush before the task exits.
    pub fn spawn(self: Arc<Self>, interval: Duration, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.flush().await,
                    _ = cancel_token.cancelled() => {
                        self.flush().await;
                        log_info!("cache persister shutting down");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct QuotaStore {
        saves: AtomicUsize,
        last_len: std::sync::Mutex<Option<usize>>,
    }

    #[async_trait]
    impl SnapshotStore for QuotaStore {
        async fn load_cache(&self) -> Result<Option<CacheSnapshot>, StorageError> {
            Ok(None)
        }

        async fn save_cache(&self, snapshot: &CacheSnapshot) -> Result<(), StorageError> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            *self.last_len.lock().unwrap() = Some(snapshot.entries.len());
            if snapshot.entries.is_empty() {
                Ok(())
            } else {
                Err(StorageError::QuotaExceeded)
            }
        }

        async fn load_history(&self) -> Result<Vec<HistoryRecord>, StorageError> {
            Ok(Vec::new())
        }

        async fn save_history(&self, _records: &[HistoryRecord]) -> Result<(), StorageError> {
            Ok(())
        }
    }

    fn shared_state() -> (Arc<Mutex<RecognitionCache>>, Arc<Mutex<HistoryLog>>) {
        (
            Arc::new(Mutex::new(RecognitionCache::new(&CacheConfig::default()))),
            Arc::new(Mutex::new(HistoryLog::default())),
        )
    }

    #[tokio::test]
    async fn clean_cache_skips_write() {
        let (cache, history) = shared_state();
        let store = Arc::new(QuotaStore::default());
        let persister = CachePersister::new(cache, history, store.clone());

        persister.flush().await;
        assert_eq!(store.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn quota_error_clears_cache_and_writes_empty_snapshot() {
        let (cache, history) = shared_state();
        cache.lock().await.set("sig", "1+1", 0.9);
        let store = Arc::new(QuotaStore::default());
        let persister = CachePersister::new(cache.clone(), history, store.clone());

        persister.flush().await;

        assert_eq!(store.saves.load(Ordering::SeqCst), 2);
        assert_eq!(*store.last_len.lock().unwrap(), Some(0));
        let cache = cache.lock().await;
        assert!(cache.is_empty());
        assert!(!cache.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn background_loop_flushes_on_interval_and_cancel() {
        let (cache, history) = shared_state();
        let store = Arc::new(QuotaStore::default());
        let persister = Arc::new(CachePersister::new(cache.clone(), history, store.clone()));
        let token = CancellationToken::new();
        let handle = persister.spawn(Duration::from_secs(30), token.clone());

        cache.lock().await.set("sig", "1+1", 0.9);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(store.saves.load(Ordering::SeqCst), 2);

        token.cancel();
        handle.await.unwrap();
    }
}
