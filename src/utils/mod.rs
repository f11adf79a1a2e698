pub mod logging;
pub mod timer;
