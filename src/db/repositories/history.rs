use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{to_i64, to_u64},
};
use crate::models::HistoryRecord;
use crate::recognition::MAX_HISTORY;

fn row_to_record(row: &Row) -> Result<HistoryRecord> {
    let method: String = row.get("method")?;
    let mode: String = row.get("mode")?;

    Ok(HistoryRecord {
        id: row.get("id")?,
        equation: row.get("equation")?,
        method: method.parse().map_err(|err: String| anyhow!(err))?,
        mode: mode.parse().map_err(|err: String| anyhow!(err))?,
        confidence: row.get("confidence")?,
        duration_ms: to_u64(row.get("duration_ms")?, "duration_ms")?,
        timestamp: row.get("timestamp")?,
        error: row.get("error")?,
    })
}

impl Database {
    /// Persisted history, oldest first.
    pub async fn fetch_history(&self) -> Result<Vec<HistoryRecord>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, equation, method, mode, confidence, duration_ms, timestamp, error
                 FROM recognition_history
                 ORDER BY timestamp ASC, rowid ASC",
            )?;
            let mut rows = stmt.query([])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_record(row)?);
            }
            Ok(records)
        })
        .await
    }

    /// Replace the stored history with `records`, keeping only the newest
    /// entries that fit.
    pub async fn replace_history(&self, records: &[HistoryRecord]) -> Result<()> {
        let skip = records.len().saturating_sub(MAX_HISTORY);
        let records: Vec<HistoryRecord> = records[skip..].to_vec();

        self.execute(move |conn| {
            let tx = conn.transaction().context("failed to open history transaction")?;
            tx.execute("DELETE FROM recognition_history", [])?;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR REPLACE INTO recognition_history
                     (id, equation, method, mode, confidence, duration_ms, timestamp, error)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )?;
                for record in &records {
                    stmt.execute(params![
                        record.id,
                        record.equation,
                        record.method.as_str(),
                        record.mode.as_str(),
                        record.confidence,
                        to_i64(record.duration_ms)?,
                        record.timestamp,
                        record.error,
                    ])?;
                }
            }
            tx.commit().context("failed to save recognition history")?;
            Ok(())
        })
        .await
    }
}
