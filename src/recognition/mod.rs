pub mod error;
pub mod history;
pub mod local;
pub mod orchestrator;
pub mod raster;
pub mod recognizer;
pub mod remote;
pub mod retry;

pub use error::RecognitionError;
pub use history::{HistoryLog, HistoryStats, MAX_HISTORY};
pub use local::GeometricRecognizer;
pub use orchestrator::{
    latex_to_equation, should_escalate, HybridOrchestrator, RecognitionOutcome, RecognitionRequest,
    StrokeFilterConfig,
};
pub use recognizer::{RecognizeOptions, Recognizer, RecognizerOutput};
pub use raster::InkRasterizer;
pub use remote::{parse_recognize_response, HttpRecognizer, ProviderHealth, Rasterizer};
pub use retry::{retry_with_backoff, RetryPolicy, RetryReport};
