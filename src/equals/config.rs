/// Thresholds for the two-stroke equals-sign heuristic.
#[derive(Debug, Clone)]
pub struct EqualsConfig {
    /// width / height each stroke must reach to count as a horizontal bar
    pub min_aspect_ratio: f64,

    /// Narrower bar width over wider bar width
    pub min_width_ratio: f64,

    /// Shared x-extent as a percentage of the narrower bar
    pub min_overlap_percent: f64,

    /// Gap / average height must fall inside the adaptive range when enabled
    pub check_spacing: bool,
    pub min_spacing_ratio: f64,
    pub max_spacing_ratio: f64,

    /// Each bar must be longer than average height times this
    pub min_length_ratio: f64,

    /// Aspect ratios above this earn no extra score
    pub max_aspect_score: f64,

    /// Lowest confidence reported for an accepted pair
    pub min_confidence: f64,
}

impl Default for EqualsConfig {
    fn default() -> Self {
        Self {
            min_aspect_ratio: 2.5,
            min_width_ratio: 0.65,
            min_overlap_percent: 60.0,
            check_spacing: false,
            min_spacing_ratio: 0.3,
            max_spacing_ratio: 3.0,
            min_length_ratio: 2.0,
            max_aspect_score: 10.0,
            min_confidence: 0.55,
        }
    }
}

impl EqualsConfig {
    /// Relaxed thresholds for a second pass when the strict pass found nothing.
    pub fn lenient() -> Self {
        Self {
            min_aspect_ratio: 1.8,
            min_width_ratio: 0.45,
            min_overlap_percent: 40.0,
            check_spacing: false,
            min_spacing_ratio: 0.1,
            max_spacing_ratio: 5.0,
            min_length_ratio: 1.2,
            ..Self::default()
        }
    }
}

/// Thresholds for picking candidate stroke pairs out of a larger pool.
#[derive(Debug, Clone)]
pub struct PairingConfig {
    pub min_aspect_ratio: f64,
    /// Center-to-center limits (px)
    pub max_vertical_distance: f64,
    pub max_horizontal_distance: f64,
    /// Shared x-extent over the narrower bar (0..1)
    pub min_overlap: f64,
    /// How many of the newest strokes the most-recent search considers
    pub recent_window: usize,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            min_aspect_ratio: 2.0,
            max_vertical_distance: 50.0,
            max_horizontal_distance: 40.0,
            min_overlap: 0.4,
            recent_window: 12,
        }
    }
}

impl PairingConfig {
    /// Pairing limits that let every pair [`EqualsConfig::lenient`] accepts
    /// reach the classifier.
    pub fn lenient() -> Self {
        Self {
            min_aspect_ratio: 1.8,
            max_vertical_distance: 60.0,
            max_horizontal_distance: 50.0,
            min_overlap: 0.3,
            ..Self::default()
        }
    }
}
