use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::geometry::{self, StrokeFeatures};

use super::Bounds;

/// A captured ink sample: canvas position plus capture time in epoch ms.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub t: i64,
}

impl Point {
    pub fn new(x: f64, y: f64, t: i64) -> Self {
        Self { x, y, t }
    }
}

/// One pen-down to pen-up gesture.
///
/// Points are only reachable through accessors so the memoised bounds and
/// features can be dropped whenever the geometry changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stroke {
    pub id: String,
    pub created_at: i64,
    points: Vec<Point>,
    #[serde(skip)]
    bounds: OnceLock<Bounds>,
    #[serde(skip)]
    features: OnceLock<StrokeFeatures>,
}

impl Stroke {
    pub fn new(id: impl Into<String>, created_at: i64, points: Vec<Point>) -> Self {
        Self {
            id: id.into(),
            created_at,
            points,
            bounds: OnceLock::new(),
            features: OnceLock::new(),
        }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Append a sample and invalidate derived geometry.
    pub fn push_point(&mut self, point: Point) {
        self.points.push(point);
        self.invalidate();
    }

    /// Replace every sample and invalidate derived geometry.
    pub fn set_points(&mut self, points: Vec<Point>) {
        self.points = points;
        self.invalidate();
    }

    pub fn bounds(&self) -> Bounds {
        *self
            .bounds
            .get_or_init(|| geometry::compute_bounds(&self.points))
    }

    pub fn features(&self) -> &StrokeFeatures {
        self.features
            .get_or_init(|| geometry::compute_features(&self.points))
    }

    fn invalidate(&mut self) {
        self.bounds = OnceLock::new();
        self.features = OnceLock::new();
    }
}
