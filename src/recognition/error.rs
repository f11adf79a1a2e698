/// Failure taxonomy for recognition attempts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecognitionError {
    /// Strokes could not be rasterised (empty or degenerate input).
    #[error("render failure: {0}")]
    Render(String),

    /// Transport error reaching a remote recognizer.
    #[error("network failure: {0}")]
    Network(String),

    /// The provider says it cannot serve yet, e.g. its model is not loaded.
    #[error("provider not ready: {0}")]
    ProviderNotReady(String),

    /// The provider rejected the request.
    #[error("provider error: {0}")]
    Provider(String),

    /// The response could not be decoded.
    #[error("parse failure: {0}")]
    Parse(String),
}

impl RecognitionError {
    /// Only transport failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, RecognitionError::Network(_))
    }

    pub fn is_not_ready(&self) -> bool {
        matches!(self, RecognitionError::ProviderNotReady(_))
    }
}
