pub mod bounds;
pub mod payload;
pub mod recognition;
pub mod stroke;

pub use bounds::Bounds;
pub use payload::{DetectionAnalysis, DetectionPayload};
pub use recognition::{HistoryRecord, RecognitionMethod, RecognitionMode};
pub use stroke::{Point, Stroke};
