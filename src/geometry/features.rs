use serde::{Deserialize, Serialize};

use crate::models::{Bounds, Point};

/// Shape statistics derived once per stroke.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StrokeFeatures {
    pub point_count: usize,
    pub path_length: f64,
    /// Chord length over path length; 1.0 for a perfectly straight stroke.
    pub straightness: f64,
    /// Mean absolute turning angle between consecutive segments (radians).
    pub curvature: f64,
    /// 1.0 when the stroke ends where it started, 0.0 when the gap spans the box diagonal.
    pub closedness: f64,
    pub aspect_ratio: f64,
}

/// Bounding box of a point set. Empty input yields the degenerate zero box.
pub fn compute_bounds(points: &[Point]) -> Bounds {
    let Some(first) = points.first() else {
        return Bounds::empty();
    };

    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for point in &points[1..] {
        min_x = min_x.min(point.x);
        min_y = min_y.min(point.y);
        max_x = max_x.max(point.x);
        max_y = max_y.max(point.y);
    }

    Bounds::from_extents(min_x, min_y, max_x, max_y)
}

/// Union of all boxes, `None` for an empty list.
pub fn merge_bounds(bounds: &[Bounds]) -> Option<Bounds> {
    let (first, rest) = bounds.split_first()?;
    Some(rest.iter().fold(*first, |acc, b| acc.union(b)))
}

pub fn compute_features(points: &[Point]) -> StrokeFeatures {
    let bounds = compute_bounds(points);

    let path_length: f64 = points
        .windows(2)
        .map(|pair| (pair[1].x - pair[0].x).hypot(pair[1].y - pair[0].y))
        .sum();

    let chord = match (points.first(), points.last()) {
        (Some(first), Some(last)) => (last.x - first.x).hypot(last.y - first.y),
        _ => 0.0,
    };

    let straightness = if path_length > f64::EPSILON {
        (chord / path_length).min(1.0)
    } else {
        1.0
    };

    let diagonal = bounds.width.hypot(bounds.height).max(1.0);
    let closedness = if points.len() < 3 {
        0.0
    } else {
        1.0 - (chord / diagonal).min(1.0)
    };

    StrokeFeatures {
        point_count: points.len(),
        path_length,
        straightness,
        curvature: mean_turning_angle(points),
        closedness,
        aspect_ratio: bounds.aspect_ratio(),
    }
}

fn mean_turning_angle(points: &[Point]) -> f64 {
    let headings: Vec<f64> = points
        .windows(2)
        .filter_map(|pair| {
            let dx = pair[1].x - pair[0].x;
            let dy = pair[1].y - pair[0].y;
            (dx.abs() > f64::EPSILON || dy.abs() > f64::EPSILON).then(|| dy.atan2(dx))
        })
        .collect();

    if headings.len() < 2 {
        return 0.0;
    }

    let total: f64 = headings
        .windows(2)
        .map(|pair| {
            let mut delta = pair[1] - pair[0];
            while delta > std::f64::consts::PI {
                delta -= 2.0 * std::f64::consts::PI;
            }
            while delta < -std::f64::consts::PI {
                delta += 2.0 * std::f64::consts::PI;
            }
            delta.abs()
        })
        .sum();

    total / (headings.len() - 1) as f64
}
