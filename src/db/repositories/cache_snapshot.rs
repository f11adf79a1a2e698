use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};

use crate::cache::CacheSnapshot;
use crate::db::connection::Database;

impl Database {
    /// The single persisted cache snapshot, if one was ever saved.
    pub async fn load_cache_snapshot(&self) -> Result<Option<CacheSnapshot>> {
        let payload: Option<String> = self
            .execute(|conn| {
                conn.query_row("SELECT payload FROM cache_snapshot WHERE id = 1", [], |row| {
                    row.get(0)
                })
                .optional()
                .context("failed to read cache snapshot")
            })
            .await?;

        payload
            .map(|raw| serde_json::from_str(&raw).context("failed to decode cache snapshot"))
            .transpose()
    }

    pub async fn save_cache_snapshot(&self, snapshot: &CacheSnapshot) -> Result<()> {
        let payload = serde_json::to_string(snapshot).context("failed to encode cache snapshot")?;
        let saved_at = snapshot.timestamp;
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO cache_snapshot (id, payload, saved_at) VALUES (1, ?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET payload = excluded.payload, saved_at = excluded.saved_at",
                params![payload, saved_at],
            )
            .context("failed to save cache snapshot")?;
            Ok(())
        })
        .await
    }
}
