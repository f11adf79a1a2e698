use serde::{Deserialize, Serialize};

use crate::models::{Bounds, Stroke};

use super::config::EqualsConfig;

/// Per-component scores, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentScores {
    pub aspect: f64,
    pub width: f64,
    pub overlap: f64,
    pub spacing: f64,
    pub length: f64,
}

impl ComponentScores {
    fn mean(&self) -> f64 {
        (self.aspect + self.width + self.overlap + self.spacing + self.length) / 5.0
    }
}

/// Raw geometry behind an equals decision.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EqualsMeasurements {
    pub top_aspect: f64,
    pub bottom_aspect: f64,
    pub width_ratio: f64,
    pub overlap_percent: f64,
    pub vertical_gap: f64,
    pub spacing_ratio: f64,
    pub length_factor: f64,
    pub avg_width: f64,
    pub avg_height: f64,
    pub scores: ComponentScores,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Two strokes accepted as an "=" glyph, upper bar first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EqualsCandidate {
    pub strokes: [Stroke; 2],
    pub bounds: Bounds,
    pub position: Position,
    pub confidence: f64,
    pub measurements: EqualsMeasurements,
}

impl EqualsCandidate {
    pub fn stroke_ids(&self) -> [String; 2] {
        [self.strokes[0].id.clone(), self.strokes[1].id.clone()]
    }

    /// Newest capture time among the two bars.
    pub fn latest_created_at(&self) -> i64 {
        self.strokes[0].created_at.max(self.strokes[1].created_at)
    }
}

/// Decide whether exactly two strokes form an equals sign.
///
/// Returns `None` for any other stroke count or when a geometric predicate
/// fails. Accepted candidates carry a confidence clamped to
/// `[config.min_confidence, 1.0]`.
pub fn classify_equals(strokes: &[Stroke], config: &EqualsConfig) -> Option<EqualsCandidate> {
    let [first, second] = strokes else {
        return None;
    };

    let (first_bounds, second_bounds) = (first.bounds(), second.bounds());
    let (top, bottom, top_bounds, bottom_bounds) = if first_bounds.center_y <= second_bounds.center_y
    {
        (first, second, first_bounds, second_bounds)
    } else {
        (second, first, second_bounds, first_bounds)
    };

    let measurements = measure(&top_bounds, &bottom_bounds, config)?;
    let confidence = measurements
        .scores
        .mean()
        .clamp(config.min_confidence, 1.0);
    let bounds = top_bounds.union(&bottom_bounds);

    Some(EqualsCandidate {
        strokes: [top.clone(), bottom.clone()],
        bounds,
        position: Position {
            x: bounds.center_x,
            y: bounds.center_y,
        },
        confidence,
        measurements,
    })
}

/// Run every predicate; `None` as soon as one fails.
fn measure(top: &Bounds, bottom: &Bounds, config: &EqualsConfig) -> Option<EqualsMeasurements> {
    let top_height = top.height.max(1.0);
    let bottom_height = bottom.height.max(1.0);

    let top_aspect = top.width / top_height;
    let bottom_aspect = bottom.width / bottom_height;
    if top_aspect < config.min_aspect_ratio || bottom_aspect < config.min_aspect_ratio {
        return None;
    }

    let wider = top.width.max(bottom.width);
    let narrower = top.width.min(bottom.width);
    if wider <= 0.0 {
        return None;
    }
    let width_ratio = narrower / wider;
    if width_ratio < config.min_width_ratio {
        return None;
    }

    let overlap_percent = top.horizontal_overlap(bottom) / narrower * 100.0;
    if overlap_percent < config.min_overlap_percent {
        return None;
    }

    let avg_height = (top_height + bottom_height) / 2.0;
    let avg_width = (top.width + bottom.width) / 2.0;
    let vertical_gap = top.vertical_gap(bottom);
    let spacing_ratio = vertical_gap / avg_height;
    let factor = length_factor(avg_width);

    if config.check_spacing
        && (spacing_ratio < config.min_spacing_ratio
            || spacing_ratio > config.max_spacing_ratio * factor)
    {
        return None;
    }

    let min_length = avg_height * config.min_length_ratio;
    if top.width <= min_length || bottom.width <= min_length {
        return None;
    }

    let avg_aspect = (top_aspect + bottom_aspect) / 2.0;
    let optimal = optimal_spacing(avg_aspect, config.max_aspect_score);
    let scores = ComponentScores {
        aspect: avg_aspect.min(config.max_aspect_score) / config.max_aspect_score,
        width: width_ratio,
        overlap: (overlap_percent / 100.0).min(1.0),
        spacing: (1.0 - (spacing_ratio - optimal).abs() / optimal).max(0.0),
        length: (narrower / (min_length * 2.0)).min(1.0),
    };

    Some(EqualsMeasurements {
        top_aspect,
        bottom_aspect,
        width_ratio,
        overlap_percent,
        vertical_gap,
        spacing_ratio,
        length_factor: factor,
        avg_width,
        avg_height,
        scores,
    })
}

/// Spacing tolerance multiplier by average bar width.
///
/// Piecewise linear and empirically tuned: short bars (< 60px) get 2.0x
/// falling to 1.5x, medium bars (60-100px) fall to 1.0x, long bars climb
/// back up to 2.5x by 200px. Needs recalibration against real samples.
pub fn length_factor(avg_width: f64) -> f64 {
    if avg_width < 60.0 {
        if avg_width <= 30.0 {
            2.0
        } else {
            2.0 - (avg_width - 30.0) / 30.0 * 0.5
        }
    } else if avg_width <= 100.0 {
        1.5 - (avg_width - 60.0) / 40.0 * 0.5
    } else {
        (1.0 + (avg_width - 100.0) / 100.0 * 1.5).min(2.5)
    }
}

/// Gap / height ratio that scores best; flatter bars are drawn further apart.
fn optimal_spacing(avg_aspect: f64, max_aspect: f64) -> f64 {
    1.0 + avg_aspect.min(max_aspect) * 0.15
}
