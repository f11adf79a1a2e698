use serde::Serialize;

use crate::equals::{classify_equals, EqualsConfig};
use crate::models::{Bounds, Stroke};

use super::features::merge_bounds;

/// Strokes that sit close enough together to be read as one symbol.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolGroup {
    pub strokes: Vec<Stroke>,
    pub bounds: Bounds,
}

impl SymbolGroup {
    fn from_strokes(strokes: Vec<Stroke>) -> Self {
        let boxes: Vec<Bounds> = strokes.iter().map(Stroke::bounds).collect();
        let bounds = merge_bounds(&boxes).unwrap_or_default();
        Self { strokes, bounds }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.bounds.center_x, self.bounds.center_y)
    }

    pub fn stroke_count(&self) -> usize {
        self.strokes.len()
    }
}

/// Partition strokes into transitively connected clusters: two strokes share
/// a group when a chain of strokes links them with box gaps of at most
/// `max_distance`. Groups come back in reading order (lines top to bottom,
/// left to right within a line) and member strokes keep their input order.
pub fn group_strokes(strokes: &[Stroke], max_distance: f64) -> Vec<SymbolGroup> {
    if strokes.is_empty() {
        return Vec::new();
    }

    let boxes: Vec<Bounds> = strokes.iter().map(Stroke::bounds).collect();
    let mut sets = DisjointSet::new(strokes.len());

    for i in 0..boxes.len() {
        for j in (i + 1)..boxes.len() {
            if boxes[i].gap_distance(&boxes[j]) <= max_distance {
                sets.union(i, j);
            }
        }
    }

    // Collect members per root, ordered by first appearance.
    let mut roots: Vec<usize> = Vec::new();
    let mut members: Vec<Vec<usize>> = Vec::new();
    for index in 0..strokes.len() {
        let root = sets.find(index);
        match roots.iter().position(|r| *r == root) {
            Some(slot) => members[slot].push(index),
            None => {
                roots.push(root);
                members.push(vec![index]);
            }
        }
    }

    let groups: Vec<SymbolGroup> = members
        .into_iter()
        .map(|indices| {
            SymbolGroup::from_strokes(indices.into_iter().map(|i| strokes[i].clone()).collect())
        })
        .collect();

    sort_reading_order(groups)
}

/// Order groups into text lines by vertical position, then left to right.
/// A group joins the first line whose running vertical band it overlaps, so
/// flat symbols drawn above or below a digit's middle stay on its line.
pub fn sort_reading_order(mut groups: Vec<SymbolGroup>) -> Vec<SymbolGroup> {
    groups.sort_by(|a, b| a.bounds.center_y.total_cmp(&b.bounds.center_y));

    let mut lines: Vec<(f64, f64, Vec<SymbolGroup>)> = Vec::new();

    for group in groups {
        let (top, bottom) = (group.bounds.min_y, group.bounds.max_y);
        let line = lines
            .iter_mut()
            .find(|(band_top, band_bottom, _)| top <= *band_bottom && bottom >= *band_top);
        match line {
            Some((band_top, band_bottom, members)) => {
                *band_top = band_top.min(top);
                *band_bottom = band_bottom.max(bottom);
                members.push(group);
            }
            None => lines.push((top, bottom, vec![group])),
        }
    }

    lines.sort_by(|a, b| a.0.total_cmp(&b.0));
    lines
        .into_iter()
        .flat_map(|(_, _, mut line)| {
            line.sort_by(|a, b| {
                a.bounds
                    .min_x
                    .total_cmp(&b.bounds.min_x)
                    .then(a.bounds.min_y.total_cmp(&b.bounds.min_y))
            });
            line
        })
        .collect()
}

/// Join pairs of single-stroke groups that together read as an equals sign.
/// The bars of a wide "=" often sit further apart than the grouping distance.
/// Pairs whose vertical gap exceeds `max_gap_ratio` times the average bar
/// width stay separate.
pub fn merge_equals_bars(
    groups: Vec<SymbolGroup>,
    config: &EqualsConfig,
    max_gap_ratio: f64,
) -> Vec<SymbolGroup> {
    let mut slots: Vec<Option<SymbolGroup>> = groups.into_iter().map(Some).collect();
    let mut merged = Vec::with_capacity(slots.len());

    for index in 0..slots.len() {
        let Some(group) = slots[index].take() else {
            continue;
        };
        if group.stroke_count() != 1 {
            merged.push(group);
            continue;
        }

        let partner = ((index + 1)..slots.len())
            .filter_map(|other_index| {
                let other = slots[other_index].as_ref().filter(|g| g.stroke_count() == 1)?;
                let pair = [group.strokes[0].clone(), other.strokes[0].clone()];
                let candidate = classify_equals(&pair, config)?;
                let m = &candidate.measurements;
                (m.vertical_gap <= m.avg_width * max_gap_ratio)
                    .then_some((other_index, candidate.confidence))
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(other_index, _)| other_index);

        match partner.and_then(|other_index| slots[other_index].take()) {
            Some(other) => {
                let mut strokes = group.strokes;
                strokes.extend(other.strokes);
                merged.push(SymbolGroup::from_strokes(strokes));
            }
            None => merged.push(group),
        }
    }

    sort_reading_order(merged)
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, mut index: usize) -> usize {
        while self.parent[index] != index {
            self.parent[index] = self.parent[self.parent[index]];
            index = self.parent[index];
        }
        index
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Smaller root wins so results do not depend on union order.
            let (keep, merge) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[merge] = keep;
        }
    }
}
