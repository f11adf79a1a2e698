use serde::{Deserialize, Serialize};

use crate::equals::EqualsMeasurements;

use super::{Bounds, RecognitionMethod, RecognitionMode, Stroke};

/// Geometry that led to a detection, kept for UI overlays and debugging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionAnalysis {
    pub active_area: Bounds,
    pub focused_stroke_count: usize,
    pub equation_stroke_count: usize,
    pub equals_bounds: Bounds,
    pub equals_confidence: f64,
    pub equals_stroke_ids: [String; 2],
    pub measurements: EqualsMeasurements,
    pub from_cache: bool,
    pub duration_ms: u64,
}

/// The unit handed to downstream consumers once an equation was found and
/// recognised. Two payloads with the same `signature` describe the same ink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionPayload {
    pub equation: String,
    pub latex: String,
    pub confidence: f64,
    pub method: RecognitionMethod,
    pub mode: RecognitionMode,
    pub strokes: Vec<Stroke>,
    pub bounds: Bounds,
    pub signature: String,
    pub timestamp: i64,
    pub analysis: DetectionAnalysis,
    pub error: Option<String>,
}
