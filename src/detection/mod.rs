pub mod config;
pub mod controller;
pub mod region;
pub mod state;

pub use config::DetectorConfig;
pub use controller::{DetectionEvent, EquationDetector};
pub use region::{active_area, locate_equation, DetectionAbort, DetectionRegion};
pub use state::DetectorState;
