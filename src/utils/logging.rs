//! Conditional logging macros gated by a module-level `ENABLE_LOGS` flag.
//!
//! The detection loop runs on every pen-up, so noisy modules can be muted
//! without touching `RUST_LOG`:
//! ```rust,ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_debug, log_info, log_warn};
//!
//! log_info!("canvas {} armed debounce ({}ms)", canvas_id, delay_ms);
//! ```

/// Debug-level log, only emitted when the calling module sets `ENABLE_LOGS`.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

/// Info-level log, only emitted when the calling module sets `ENABLE_LOGS`.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Warn-level log, only emitted when the calling module sets `ENABLE_LOGS`.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Error-level log, only emitted when the calling module sets `ENABLE_LOGS`.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}

/// Short, log-friendly prefix of a content signature.
pub fn short_signature(signature: &str) -> &str {
    let end = signature
        .char_indices()
        .nth(12)
        .map(|(idx, _)| idx)
        .unwrap_or(signature.len());
    &signature[..end]
}
