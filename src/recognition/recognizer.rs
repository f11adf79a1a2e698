use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{Bounds, Stroke};

use super::error::RecognitionError;

/// Per-call hints passed to a recognizer.
#[derive(Debug, Clone, Default)]
pub struct RecognizeOptions {
    pub cache_key: Option<String>,
    pub bypass_cache: bool,
    pub bounds: Option<Bounds>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecognizerOutput {
    pub latex: String,
    pub confidence: f64,
    pub error: Option<String>,
    pub used_fallback: bool,
}

impl RecognizerOutput {
    pub fn success(latex: impl Into<String>, confidence: f64) -> Self {
        Self {
            latex: latex.into(),
            confidence: confidence.clamp(0.0, 1.0),
            error: None,
            used_fallback: false,
        }
    }

    /// Structured failure: empty latex, zero confidence.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            latex: String::new(),
            confidence: 0.0,
            error: Some(error.into()),
            used_fallback: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.latex.trim().is_empty()
    }
}

/// A local or remote handwriting recognizer.
///
/// Recoverable problems (e.g. nothing to rasterise) come back as
/// `Ok(RecognizerOutput::failed(..))`; transport, provider and decode
/// failures come back as `Err` so the caller can decide whether to retry.
#[async_trait]
pub trait Recognizer: Send + Sync {
    fn id(&self) -> &str;

    async fn recognize(
        &self,
        strokes: &[Stroke],
        options: &RecognizeOptions,
    ) -> Result<RecognizerOutput, RecognitionError>;
}
