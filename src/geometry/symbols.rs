use serde::Serialize;

use crate::equals::{classify_equals, EqualsConfig};
use crate::models::Stroke;

use super::config::AnalyzerConfig;
use super::grouping::SymbolGroup;

/// Placeholder symbol for shapes nothing matched.
pub const UNKNOWN_SYMBOL: &str = "?";

/// Best-effort guess for a single symbol. Low-confidence guesses are still
/// returned so callers can apply their own threshold.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SymbolGuess {
    pub symbol: String,
    pub confidence: f64,
}

impl SymbolGuess {
    fn new(symbol: &str, confidence: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.symbol == UNKNOWN_SYMBOL
    }
}

/// Guess a symbol from stroke count, aspect ratio and curvature.
pub fn classify_symbol(group: &SymbolGroup, config: &AnalyzerConfig) -> SymbolGuess {
    match group.strokes.as_slice() {
        [] => SymbolGuess::new(UNKNOWN_SYMBOL, 0.0),
        [single] => classify_single(single, config),
        [first, second] => classify_pair(first, second, config),
        strokes => classify_many(strokes, config),
    }
}

fn classify_single(stroke: &Stroke, config: &AnalyzerConfig) -> SymbolGuess {
    let bounds = stroke.bounds();
    let features = stroke.features();

    if bounds.width <= config.dot_max_size && bounds.height <= config.dot_max_size {
        return SymbolGuess::new(".", 0.5);
    }

    if features.straightness >= config.straight_threshold {
        let aspect = bounds.aspect_ratio();
        let tall = bounds.height / bounds.width.max(1.0);

        if aspect >= config.horizontal_aspect {
            let extra = ((aspect - config.horizontal_aspect) / 7.5).clamp(0.0, 1.0);
            return SymbolGuess::new("-", 0.6 + 0.3 * extra);
        }
        if tall >= 3.0 {
            return SymbolGuess::new("1", 0.6);
        }

        return match slope_direction(stroke) {
            Slope::DownRight => SymbolGuess::new("\\backslash", 0.35),
            Slope::UpRight => SymbolGuess::new("/", 0.45),
        };
    }

    if features.closedness >= config.closed_threshold && features.curvature > 0.2 {
        let ratio = bounds.width / bounds.height.max(1.0);
        let confidence = if (0.4..=1.3).contains(&ratio) { 0.6 } else { 0.45 };
        return SymbolGuess::new("0", confidence);
    }

    if features.curvature > 0.3 {
        return SymbolGuess::new("2", 0.25);
    }

    SymbolGuess::new(UNKNOWN_SYMBOL, 0.05)
}

fn classify_pair(first: &Stroke, second: &Stroke, config: &AnalyzerConfig) -> SymbolGuess {
    let (a, b) = (first.bounds(), second.bounds());
    let horizontal = |s: &Stroke| s.bounds().aspect_ratio() >= config.horizontal_aspect;
    let vertical = |s: &Stroke| {
        let bounds = s.bounds();
        bounds.height / bounds.width.max(1.0) >= 2.0
    };
    let straight = |s: &Stroke| s.features().straightness >= config.straight_threshold;

    if horizontal(first) && horizontal(second) {
        let pair = [first.clone(), second.clone()];
        if let Some(candidate) = classify_equals(&pair, &EqualsConfig::default()) {
            return SymbolGuess::new("=", candidate.confidence);
        }
        return SymbolGuess::new("=", 0.3);
    }

    if a.intersects(&b)
        && ((horizontal(first) && vertical(second)) || (vertical(first) && horizontal(second)))
    {
        return SymbolGuess::new("+", 0.75);
    }

    if a.intersects(&b) && straight(first) && straight(second) {
        let diagonal = |s: &Stroke| (0.4..config.horizontal_aspect).contains(&s.bounds().aspect_ratio());
        if diagonal(first) && diagonal(second) && slope_direction(first) != slope_direction(second) {
            return SymbolGuess::new("x", 0.7);
        }
    }

    SymbolGuess::new(UNKNOWN_SYMBOL, 0.1)
}

fn classify_many(strokes: &[Stroke], config: &AnalyzerConfig) -> SymbolGuess {
    // Division sign: one bar with a dot above and a dot below.
    if strokes.len() == 3 {
        let bar = strokes
            .iter()
            .position(|s| s.bounds().aspect_ratio() >= config.horizontal_aspect);
        if let Some(bar_index) = bar {
            let bar_bounds = strokes[bar_index].bounds();
            let dots: Vec<_> = strokes
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != bar_index)
                .map(|(_, s)| s.bounds())
                .collect();
            let above = dots.iter().any(|d| d.max_y <= bar_bounds.min_y);
            let below = dots.iter().any(|d| d.min_y >= bar_bounds.max_y);
            let small = dots
                .iter()
                .all(|d| d.width <= bar_bounds.width / 2.0 && d.height <= bar_bounds.width / 2.0);
            if above && below && small {
                return SymbolGuess::new("\\div", 0.5);
            }
        }
    }

    SymbolGuess::new(UNKNOWN_SYMBOL, 0.05)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slope {
    /// Screen coordinates: y grows downward.
    DownRight,
    UpRight,
}

fn slope_direction(stroke: &Stroke) -> Slope {
    let points = stroke.points();
    match (points.first(), points.last()) {
        (Some(first), Some(last)) if (last.x - first.x) * (last.y - first.y) > 0.0 => {
            Slope::DownRight
        }
        _ => Slope::UpRight,
    }
}
