use std::convert::TryFrom;

use anyhow::{anyhow, Result};
use rusqlite::ErrorCode;

use crate::cache::StorageError;

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

/// Whether any error in the chain is SQLite reporting a full disk.
pub fn is_disk_full(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<rusqlite::Error>()
            .and_then(rusqlite::Error::sqlite_error_code)
            == Some(ErrorCode::DiskFull)
    })
}

pub fn into_storage_error(err: anyhow::Error) -> StorageError {
    if is_disk_full(&err) {
        StorageError::QuotaExceeded
    } else {
        StorageError::Backend(err)
    }
}
