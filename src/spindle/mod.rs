//! Spindle encoder tracking and the spindle-to-axis gearing.

mod encoder;
mod gearing;
mod rpm;
mod tracker;

pub use encoder::SpindleEncoder;
pub use gearing::Gearing;
pub use rpm::RpmMeter;
pub use tracker::SpindleTracker;
