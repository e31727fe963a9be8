//! Configuration module for lathe-motion.
//!
//! Provides types for loading and validating the machine configuration (axes,
//! spindle encoder, timing constants) from TOML files or pre-parsed data.

mod axis;
mod loader;
mod machine;
pub mod units;
mod validation;

pub use axis::AxisConfig;
pub use loader::{load_config, parse_config};
pub use machine::{
    CommandConfig, EncoderConfig, HandwheelConfig, MachineConfig, OperationConfig, TimingConfig,
};
pub use validation::validate_config;

// Re-export unit types at config level
pub use units::{DeciMicrons, MeasureUnit};
