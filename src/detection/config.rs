use std::time::Duration;

use crate::equals::{EqualsConfig, PairingConfig};

/// Timing and geometry knobs for the per-canvas detector.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Quiet period after the last stroke before detection runs
    pub debounce: Duration,
    /// Minimum spacing between two detection runs
    pub throttle: Duration,
    /// Strokes newer than this (ms) define the active writing area
    pub active_writing_window_ms: i64,

    // Active area
    pub base_radius: f64,
    pub horizontal_radius_factor: f64,
    pub vertical_radius_factor: f64,
    /// Neighbours count as "same band" within this many vertical radii
    pub neighbor_band_factor: f64,
    pub min_side_radius: f64,
    pub neighbor_margin: f64,

    pub min_active_strokes: usize,
    pub max_working_strokes: usize,
    pub min_confidence: f64,
    /// Retry with [`EqualsConfig::lenient`] and `lenient_pairing` when the
    /// strict pass finds nothing
    pub lenient_fallback: bool,

    // Left-hand expansion, in multiples of the equals-sign height
    pub left_vertical_tolerance: f64,
    pub left_gap_factor: f64,
    pub padding_factor: f64,

    // Final region validation
    pub min_region_width: f64,
    pub min_region_height: f64,
    pub min_region_area: f64,
    pub wide_min_width: f64,
    pub wide_min_aspect: f64,
    pub wide_max_aspect: f64,

    pub equals: EqualsConfig,
    pub pairing: PairingConfig,
    pub lenient_pairing: PairingConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(2000),
            throttle: Duration::from_millis(300),
            active_writing_window_ms: 5000,
            base_radius: 80.0,
            horizontal_radius_factor: 2.5,
            vertical_radius_factor: 1.0,
            neighbor_band_factor: 2.0,
            min_side_radius: 20.0,
            neighbor_margin: 30.0,
            min_active_strokes: 3,
            max_working_strokes: 64,
            min_confidence: 0.55,
            lenient_fallback: true,
            left_vertical_tolerance: 3.0,
            left_gap_factor: 4.0,
            padding_factor: 0.5,
            min_region_width: 10.0,
            min_region_height: 5.0,
            min_region_area: 200.0,
            wide_min_width: 30.0,
            wide_min_aspect: 2.0,
            wide_max_aspect: 30.0,
            equals: EqualsConfig::default(),
            pairing: PairingConfig::default(),
            lenient_pairing: PairingConfig::lenient(),
        }
    }
}

impl DetectorConfig {
    pub fn horizontal_radius(&self) -> f64 {
        self.base_radius * self.horizontal_radius_factor
    }

    pub fn vertical_radius(&self) -> f64 {
        self.base_radius * self.vertical_radius_factor
    }
}
