mod connection;
mod helpers;
mod migrations;
mod repositories;

pub use connection::Database;

use async_trait::async_trait;

use crate::cache::{CacheSnapshot, SnapshotStore, StorageError};
use crate::models::HistoryRecord;

use helpers::into_storage_error;

#[async_trait]
impl SnapshotStore for Database {
    async fn load_cache(&self) -> Result<Option<CacheSnapshot>, StorageError> {
        self.load_cache_snapshot().await.map_err(into_storage_error)
    }

    async fn save_cache(&self, snapshot: &CacheSnapshot) -> Result<(), StorageError> {
        self.save_cache_snapshot(snapshot)
            .await
            .map_err(into_storage_error)
    }

    async fn load_history(&self) -> Result<Vec<HistoryRecord>, StorageError> {
        self.fetch_history().await.map_err(into_storage_error)
    }

    async fn save_history(&self, records: &[HistoryRecord]) -> Result<(), StorageError> {
        self.replace_history(records).await.map_err(into_storage_error)
    }
}
