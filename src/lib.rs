//! Equals-sign detection and hybrid handwriting recognition for ink canvases.
//!
//! Strokes are buffered per canvas by an [`EquationDetector`]. Once the pen
//! rests, the detector looks for a freshly drawn equals sign, windows the
//! expression to its left and hands it to the [`HybridOrchestrator`], which
//! tries the local recognizer first and escalates to a remote one when
//! confidence is low.

pub mod cache;
pub mod context;
pub mod db;
pub mod detection;
pub mod equals;
pub mod events;
pub mod geometry;
pub mod models;
pub mod recognition;
pub mod settings;
pub mod utils;

pub use cache::{CacheConfig, RecognitionCache, SnapshotStore, StorageError};
pub use context::{ContextConfig, RecognitionContext};
pub use db::Database;
pub use detection::{DetectionEvent, DetectorConfig, EquationDetector};
pub use models::{Bounds, DetectionPayload, Point, RecognitionMethod, RecognitionMode, Stroke};
pub use recognition::{HybridOrchestrator, RecognitionError, RecognitionOutcome, Recognizer};
pub use settings::{RecognitionSettings, SettingsStore};
