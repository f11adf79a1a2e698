/// Tunable thresholds for stroke analysis and symbol guessing.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Strokes whose boxes are closer than this (px) join the same symbol
    pub symbol_group_distance: f64,

    /// Boxes smaller than this on both axes are treated as dots
    pub dot_max_size: f64,

    /// chord / path length above which a stroke counts as straight
    pub straight_threshold: f64,

    /// width / height above which a stroke counts as horizontal
    pub horizontal_aspect: f64,

    /// Closedness above which a curved stroke counts as a loop
    pub closed_threshold: f64,

    /// Two bars further apart than this times their average width are
    /// never joined into an equals sign
    pub equals_max_gap_ratio: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            symbol_group_distance: 12.0,
            dot_max_size: 4.0,
            straight_threshold: 0.9,
            horizontal_aspect: 2.5,
            closed_threshold: 0.75,
            equals_max_gap_ratio: 0.5,
        }
    }
}
