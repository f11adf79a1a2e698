use crate::equals::{find_most_recent_equals, newest_strokes, EqualsCandidate, EqualsConfig};
use crate::geometry::merge_bounds;
use crate::models::{Bounds, Stroke};

use super::config::DetectorConfig;

/// Why a detection cycle produced nothing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DetectionAbort {
    #[error("no strokes in the active writing window")]
    NoRecentStrokes,
    #[error("insufficient strokes near the active area ({found} < {required})")]
    InsufficientStrokes { found: usize, required: usize },
    #[error("no equals sign among recent strokes")]
    NoEqualsSign,
    #[error("equation region too small ({width:.0}x{height:.0})")]
    InvalidRegion { width: f64, height: f64 },
}

/// The candidate equation found in one detection cycle.
#[derive(Debug, Clone)]
pub struct DetectionRegion {
    /// Equals strokes plus the accreted left-hand side, oldest first
    pub strokes: Vec<Stroke>,
    pub bounds: Bounds,
    pub active_area: Bounds,
    pub focused_count: usize,
    pub equals: EqualsCandidate,
}

/// Run the windowing pipeline over a snapshot of the stroke buffer.
pub fn locate_equation(
    strokes: &[Stroke],
    now_ms: i64,
    config: &DetectorConfig,
) -> Result<DetectionRegion, DetectionAbort> {
    let cutoff = now_ms - config.active_writing_window_ms;
    let (recent, older): (Vec<&Stroke>, Vec<&Stroke>) =
        strokes.iter().partition(|s| s.created_at >= cutoff);

    let active_area = active_area(&recent, &older, config).ok_or(DetectionAbort::NoRecentStrokes)?;

    let focused: Vec<Stroke> = strokes
        .iter()
        .filter(|s| s.bounds().intersects(&active_area))
        .cloned()
        .collect();
    if focused.len() < config.min_active_strokes {
        return Err(DetectionAbort::InsufficientStrokes {
            found: focused.len(),
            required: config.min_active_strokes,
        });
    }

    let working = newest_strokes(&focused, config.max_working_strokes);
    let equals = find_equals(&working, config).ok_or(DetectionAbort::NoEqualsSign)?;

    let left_side = expand_left(strokes, &equals, config);
    let equals_height = equals.bounds.height.max(1.0);
    let padding = equals_height * config.padding_factor;
    let bounds = left_side
        .iter()
        .fold(equals.bounds, |acc, s| acc.union(&s.bounds()))
        .expand(padding, padding);

    validate_region(&bounds, config)?;

    let mut region_strokes: Vec<Stroke> = left_side;
    region_strokes.extend(equals.strokes.iter().cloned());
    region_strokes.sort_by_key(|s| s.created_at);

    Ok(DetectionRegion {
        strokes: region_strokes,
        bounds,
        active_area,
        focused_count: focused.len(),
        equals,
    })
}

/// Recent strokes' bounds grown anisotropically, with each horizontal side
/// pulled in when an older neighbour sits on the same band.
pub fn active_area(recent: &[&Stroke], older: &[&Stroke], config: &DetectorConfig) -> Option<Bounds> {
    let boxes: Vec<Bounds> = recent.iter().map(|s| s.bounds()).collect();
    let core = merge_bounds(&boxes)?;

    let vertical_radius = config.vertical_radius();
    let band = vertical_radius * config.neighbor_band_factor;
    let mut left = config.horizontal_radius();
    let mut right = config.horizontal_radius();

    for stroke in older {
        let bounds = stroke.bounds();
        if (bounds.center_y - core.center_y).abs() > band {
            continue;
        }
        if bounds.max_x <= core.min_x {
            let distance = core.min_x - bounds.max_x;
            if distance < left {
                left = config.min_side_radius.max(distance - config.neighbor_margin);
            }
        } else if bounds.min_x >= core.max_x {
            let distance = bounds.min_x - core.max_x;
            if distance < right {
                right = config.min_side_radius.max(distance - config.neighbor_margin);
            }
        }
    }

    Some(core.expand_sides(left, right, vertical_radius))
}

fn find_equals(working: &[Stroke], config: &DetectorConfig) -> Option<EqualsCandidate> {
    let strict = find_most_recent_equals(working, &config.pairing, &config.equals)
        .filter(|c| c.confidence >= config.min_confidence);
    if strict.is_some() || !config.lenient_fallback {
        return strict;
    }

    let lenient = EqualsConfig {
        min_confidence: config.equals.min_confidence,
        ..EqualsConfig::lenient()
    };
    find_most_recent_equals(working, &config.lenient_pairing, &lenient)
        .filter(|c| c.confidence >= config.min_confidence)
}

/// Strokes left of the equals sign on the same line, accepted right to left
/// until the first gap wider than the limit.
fn expand_left(strokes: &[Stroke], equals: &EqualsCandidate, config: &DetectorConfig) -> Vec<Stroke> {
    let anchor = equals.bounds;
    let equals_height = anchor.height.max(1.0);
    let tolerance = equals_height * config.left_vertical_tolerance;
    let max_gap = equals_height * config.left_gap_factor;
    let equals_ids = equals.stroke_ids();

    let mut candidates: Vec<&Stroke> = strokes
        .iter()
        .filter(|s| !equals_ids.contains(&s.id))
        .filter(|s| {
            let bounds = s.bounds();
            bounds.center_x < anchor.min_x && (bounds.center_y - anchor.center_y).abs() <= tolerance
        })
        .collect();
    candidates.sort_by(|a, b| b.bounds().max_x.total_cmp(&a.bounds().max_x));

    let mut left_edge = anchor.min_x;
    let mut accepted = Vec::new();
    for stroke in candidates {
        let bounds = stroke.bounds();
        if left_edge - bounds.max_x >= max_gap {
            break;
        }
        left_edge = left_edge.min(bounds.min_x);
        accepted.push(stroke.clone());
    }
    accepted
}

fn validate_region(bounds: &Bounds, config: &DetectorConfig) -> Result<(), DetectionAbort> {
    let invalid = DetectionAbort::InvalidRegion {
        width: bounds.width,
        height: bounds.height,
    };
    if bounds.width <= config.min_region_width || bounds.height <= config.min_region_height {
        return Err(invalid);
    }

    let aspect = bounds.width / bounds.height;
    let wide = aspect > config.wide_min_aspect
        && aspect <= config.wide_max_aspect
        && bounds.width > config.wide_min_width;
    if bounds.area() < config.min_region_area && !wide {
        return Err(invalid);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Point;

    fn stroke(id: &str, created_at: i64, x: f64, y: f64, w: f64, h: f64) -> Stroke {
        Stroke::new(
            id,
            created_at,
            vec![
                Point::new(x, y, created_at),
                Point::new(x + w / 2.0, y + h, created_at + 1),
                Point::new(x + w, y + h / 2.0, created_at + 2),
            ],
        )
    }

    /// "1 1 =" written between t=8000 and t=9300.
    fn equation(offset_x: f64, t0: i64) -> Vec<Stroke> {
        vec![
            stroke("one-a", t0, offset_x + 20.0, 40.0, 2.0, 35.0),
            stroke("one-b", t0 + 400, offset_x + 60.0, 40.0, 2.0, 35.0),
            stroke("eq-top", t0 + 900, offset_x + 100.0, 50.0, 40.0, 4.0),
            stroke("eq-bottom", t0 + 1300, offset_x + 100.0, 62.0, 40.0, 4.0),
        ]
    }

    fn ids(strokes: &[Stroke]) -> Vec<&str> {
        strokes.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn finds_equation_with_left_hand_side() {
        let strokes = equation(0.0, 8000);
        let region = locate_equation(&strokes, 10_000, &DetectorConfig::default()).unwrap();

        assert_eq!(ids(&region.strokes), vec!["one-a", "one-b", "eq-top", "eq-bottom"]);
        assert_eq!(region.equals.stroke_ids(), ["eq-top".to_string(), "eq-bottom".to_string()]);
        // equals height 16 -> padding 8
        assert_eq!(region.bounds.min_x, 12.0);
        assert_eq!(region.bounds.max_x, 148.0);
        assert_eq!(region.focused_count, 4);
    }

    #[test]
    fn left_walk_stops_at_first_wide_gap() {
        let mut strokes = equation(0.0, 8000);
        // 100px left of "one-a": beyond 4x equals height.
        strokes.push(stroke("far", 8100, -100.0, 40.0, 2.0, 35.0));
        let region = locate_equation(&strokes, 10_000, &DetectorConfig::default()).unwrap();
        assert!(!ids(&region.strokes).contains(&"far"));
    }

    #[test]
    fn left_walk_ignores_other_lines() {
        let mut strokes = equation(0.0, 8000);
        strokes.push(stroke("above", 8100, 70.0, -120.0, 2.0, 35.0));
        let region = locate_equation(&strokes, 10_000, &DetectorConfig::default()).unwrap();
        assert!(!ids(&region.strokes).contains(&"above"));
    }

    #[test]
    fn aborts_with_too_few_strokes() {
        let strokes = vec![
            stroke("eq-top", 9000, 100.0, 50.0, 40.0, 4.0),
            stroke("eq-bottom", 9300, 100.0, 62.0, 40.0, 4.0),
        ];
        let err = locate_equation(&strokes, 10_000, &DetectorConfig::default()).unwrap_err();
        assert_eq!(err, DetectionAbort::InsufficientStrokes { found: 2, required: 3 });
    }

    #[test]
    fn aborts_when_no_recent_strokes() {
        let strokes = equation(0.0, 0);
        let err = locate_equation(&strokes, 60_000, &DetectorConfig::default()).unwrap_err();
        assert_eq!(err, DetectionAbort::NoRecentStrokes);
    }

    #[test]
    fn aborts_without_equals_sign() {
        let strokes = vec![
            stroke("a", 9000, 0.0, 0.0, 2.0, 35.0),
            stroke("b", 9100, 30.0, 0.0, 2.0, 35.0),
            stroke("c", 9200, 60.0, 0.0, 2.0, 35.0),
        ];
        let err = locate_equation(&strokes, 10_000, &DetectorConfig::default()).unwrap_err();
        assert_eq!(err, DetectionAbort::NoEqualsSign);
    }

    #[test]
    fn squat_equals_is_found_only_by_lenient_pass() {
        // 36x19 bars: aspect ~1.9, below the strict pairing floor.
        let strokes = vec![
            stroke("one-a", 8000, 20.0, 40.0, 2.0, 35.0),
            stroke("one-b", 8400, 60.0, 40.0, 2.0, 35.0),
            stroke("eq-top", 8900, 100.0, 40.0, 36.0, 19.0),
            stroke("eq-bottom", 9300, 100.0, 68.0, 36.0, 19.0),
        ];

        let strict_only = DetectorConfig {
            lenient_fallback: false,
            ..DetectorConfig::default()
        };
        let err = locate_equation(&strokes, 10_000, &strict_only).unwrap_err();
        assert_eq!(err, DetectionAbort::NoEqualsSign);

        let region = locate_equation(&strokes, 10_000, &DetectorConfig::default()).unwrap();
        assert_eq!(region.equals.stroke_ids(), ["eq-top".to_string(), "eq-bottom".to_string()]);
    }

    #[test]
    fn older_neighbour_shrinks_active_area() {
        let config = DetectorConfig::default();
        let recent_stroke = stroke("new", 9000, 300.0, 0.0, 40.0, 20.0);
        let old_left = stroke("old", 1000, 200.0, 0.0, 40.0, 20.0);

        let area = active_area(&[&recent_stroke], &[&old_left], &config).unwrap();
        // gap 60 -> radius max(20, 60 - 30) = 30
        assert_eq!(area.min_x, 270.0);
        // right side keeps the full horizontal radius
        assert_eq!(area.max_x, 340.0 + config.horizontal_radius());
        assert_eq!(area.min_y, -config.vertical_radius());
    }

    #[test]
    fn old_equation_next_door_is_not_swallowed() {
        // An earlier equation 120px to the left, written long ago.
        let mut strokes: Vec<Stroke> = equation(0.0, 0)
            .into_iter()
            .map(|mut s| {
                s.id = format!("old-{}", s.id);
                s
            })
            .collect();
        strokes.extend(equation(260.0, 8000));

        let region = locate_equation(&strokes, 10_000, &DetectorConfig::default()).unwrap();
        assert!(region.strokes.iter().all(|s| !s.id.starts_with("old-")));
        assert_eq!(region.strokes.len(), 4);
    }

    #[test]
    fn small_regions_are_rejected_unless_wide() {
        let config = DetectorConfig::default();
        let tiny = Bounds::from_extents(0.0, 0.0, 12.0, 12.0);
        assert!(validate_region(&tiny, &config).is_err());

        let wide = Bounds::from_extents(0.0, 0.0, 40.0, 6.0);
        assert!(validate_region(&wide, &config).is_ok());

        let flat = Bounds::from_extents(0.0, 0.0, 200.0, 4.0);
        assert!(validate_region(&flat, &config).is_err());
    }
}
