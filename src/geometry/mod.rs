pub mod config;
pub mod features;
pub mod grouping;
pub mod symbols;

pub use config::AnalyzerConfig;
pub use features::{compute_bounds, compute_features, merge_bounds, StrokeFeatures};
pub use grouping::{group_strokes, merge_equals_bars, sort_reading_order, SymbolGroup};
pub use symbols::{classify_symbol, SymbolGuess, UNKNOWN_SYMBOL};
