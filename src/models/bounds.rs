use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box. Derived fields are recomputed by every
/// constructor, so a `Bounds` value is always internally consistent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub width: f64,
    pub height: f64,
    pub center_x: f64,
    pub center_y: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self::empty()
    }
}

impl Bounds {
    /// Degenerate zero box at the origin.
    pub fn empty() -> Self {
        Self::from_extents(0.0, 0.0, 0.0, 0.0)
    }

    /// Build from extents; swapped min/max pairs are reordered so width and
    /// height are never negative.
    pub fn from_extents(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        let (min_x, max_x) = if min_x <= max_x { (min_x, max_x) } else { (max_x, min_x) };
        let (min_y, max_y) = if min_y <= max_y { (min_y, max_y) } else { (max_y, min_y) };

        Self {
            min_x,
            min_y,
            max_x,
            max_y,
            width: max_x - min_x,
            height: max_y - min_y,
            center_x: (min_x + max_x) / 2.0,
            center_y: (min_y + max_y) / 2.0,
        }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Width over height; height is floored at one pixel so a perfectly
    /// flat pen line still yields a finite ratio.
    pub fn aspect_ratio(&self) -> f64 {
        self.width / self.height.max(1.0)
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds::from_extents(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// Grow by `dx` on the left and right and `dy` on the top and bottom.
    pub fn expand(&self, dx: f64, dy: f64) -> Bounds {
        self.expand_sides(dx, dx, dy)
    }

    /// Grow with independent left/right margins.
    pub fn expand_sides(&self, left: f64, right: f64, vertical: f64) -> Bounds {
        Bounds::from_extents(
            self.min_x - left,
            self.min_y - vertical,
            self.max_x + right,
            self.max_y + vertical,
        )
    }

    /// Inclusive overlap test; touching edges count as intersecting.
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    /// Length of the shared x-interval, zero when disjoint.
    pub fn horizontal_overlap(&self, other: &Bounds) -> f64 {
        (self.max_x.min(other.max_x) - self.min_x.max(other.min_x)).max(0.0)
    }

    /// Empty space between the boxes along y, zero when they overlap.
    pub fn vertical_gap(&self, other: &Bounds) -> f64 {
        (other.min_y - self.max_y).max(self.min_y - other.max_y).max(0.0)
    }

    /// Euclidean gap between the two boxes, zero when they touch or overlap.
    pub fn gap_distance(&self, other: &Bounds) -> f64 {
        let dx = (other.min_x - self.max_x).max(self.min_x - other.max_x).max(0.0);
        let dy = self.vertical_gap(other);
        dx.hypot(dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_extents_normalises_swapped_coordinates() {
        let bounds = Bounds::from_extents(10.0, 20.0, 0.0, 5.0);
        assert_eq!(bounds.min_x, 0.0);
        assert_eq!(bounds.max_y, 20.0);
        assert_eq!(bounds.width, 10.0);
        assert_eq!(bounds.height, 15.0);
        assert_eq!(bounds.center_x, 5.0);
    }

    #[test]
    fn gap_distance_is_zero_for_overlapping_boxes() {
        let a = Bounds::from_extents(0.0, 0.0, 10.0, 10.0);
        let b = Bounds::from_extents(5.0, 5.0, 20.0, 20.0);
        assert_eq!(a.gap_distance(&b), 0.0);

        let c = Bounds::from_extents(13.0, 14.0, 20.0, 20.0);
        assert!((a.gap_distance(&c) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn aspect_ratio_survives_flat_lines() {
        let flat = Bounds::from_extents(0.0, 5.0, 40.0, 5.0);
        assert_eq!(flat.aspect_ratio(), 40.0);
    }
}
