pub mod classifier;
pub mod config;
pub mod pairing;

pub use classifier::{
    classify_equals, length_factor, ComponentScores, EqualsCandidate, EqualsMeasurements, Position,
};
pub use config::{EqualsConfig, PairingConfig};
pub use pairing::{
    find_equals_candidates, find_equals_pairs, find_most_recent_equals, newest_strokes, StrokePair,
};
