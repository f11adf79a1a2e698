use crate::models::Stroke;

use super::classifier::{classify_equals, EqualsCandidate};
use super::config::{EqualsConfig, PairingConfig};

/// Two indices into the pool handed to [`find_equals_pairs`], upper bar first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokePair {
    pub upper: usize,
    pub lower: usize,
    pub score: f64,
}

/// Greedy best-score matching of horizontal strokes into candidate pairs.
/// A stroke is never used in two pairs.
pub fn find_equals_pairs(strokes: &[Stroke], config: &PairingConfig) -> Vec<StrokePair> {
    let horizontals: Vec<usize> = strokes
        .iter()
        .enumerate()
        .filter(|(_, s)| {
            let bounds = s.bounds();
            bounds.width > 0.0 && bounds.aspect_ratio() >= config.min_aspect_ratio
        })
        .map(|(i, _)| i)
        .collect();

    let mut scored: Vec<StrokePair> = Vec::new();
    for (slot, &i) in horizontals.iter().enumerate() {
        for &j in &horizontals[slot + 1..] {
            if let Some(pair) = score_pair(strokes, i, j, config) {
                scored.push(pair);
            }
        }
    }

    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.upper.min(a.lower).cmp(&b.upper.min(b.lower)))
    });

    let mut used = vec![false; strokes.len()];
    let mut pairs = Vec::new();
    for pair in scored {
        if used[pair.upper] || used[pair.lower] {
            continue;
        }
        used[pair.upper] = true;
        used[pair.lower] = true;
        pairs.push(pair);
    }

    pairs
}

fn score_pair(strokes: &[Stroke], i: usize, j: usize, config: &PairingConfig) -> Option<StrokePair> {
    let (a, b) = (strokes[i].bounds(), strokes[j].bounds());

    let vertical_distance = (a.center_y - b.center_y).abs();
    let horizontal_distance = (a.center_x - b.center_x).abs();
    if vertical_distance >= config.max_vertical_distance
        || horizontal_distance >= config.max_horizontal_distance
    {
        return None;
    }

    let narrower = a.width.min(b.width);
    if narrower <= 0.0 {
        return None;
    }
    let overlap = a.horizontal_overlap(&b) / narrower;
    if overlap < config.min_overlap {
        return None;
    }

    let width_ratio = narrower / a.width.max(b.width);
    let score = overlap + width_ratio
        - 0.5 * vertical_distance / config.max_vertical_distance
        - 0.5 * horizontal_distance / config.max_horizontal_distance;

    let (upper, lower) = if a.center_y <= b.center_y { (i, j) } else { (j, i) };
    Some(StrokePair { upper, lower, score })
}

/// Every pair in the pool that also passes the equals classifier.
pub fn find_equals_candidates(
    strokes: &[Stroke],
    pairing: &PairingConfig,
    equals: &EqualsConfig,
) -> Vec<EqualsCandidate> {
    find_equals_pairs(strokes, pairing)
        .into_iter()
        .filter_map(|pair| {
            let two = [strokes[pair.upper].clone(), strokes[pair.lower].clone()];
            classify_equals(&two, equals)
        })
        .filter(|candidate| candidate.confidence >= equals.min_confidence)
        .collect()
}

/// Look only at the newest `pairing.recent_window` strokes and return the
/// valid equals sign whose newer bar was drawn last.
pub fn find_most_recent_equals(
    strokes: &[Stroke],
    pairing: &PairingConfig,
    equals: &EqualsConfig,
) -> Option<EqualsCandidate> {
    let recent = newest_strokes(strokes, pairing.recent_window);

    find_equals_candidates(&recent, pairing, equals)
        .into_iter()
        .max_by(|a, b| {
            a.latest_created_at()
                .cmp(&b.latest_created_at())
                .then(a.confidence.total_cmp(&b.confidence))
        })
}

/// The `limit` most recently created strokes, oldest first.
pub fn newest_strokes(strokes: &[Stroke], limit: usize) -> Vec<Stroke> {
    let mut ordered: Vec<&Stroke> = strokes.iter().collect();
    ordered.sort_by_key(|s| s.created_at);
    let skip = ordered.len().saturating_sub(limit);
    ordered.into_iter().skip(skip).cloned().collect()
}
