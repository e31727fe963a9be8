//! # lathe-motion
//!
//! Spindle-synchronized electronic leadscrew core for a lathe with up to three
//! stepper axes, with embedded-hal 1.0 step outputs.
//!
//! ## Features
//!
//! - **Configuration-driven**: axes, spindle encoder and timing from TOML
//! - **Spindle gearing**: the lead screw follows the encoder at any pitch, with
//!   multi-start phase offsets
//! - **Automatic operations**: turning, facing, threading, cutoff, cone,
//!   ellipse and constant-rate feeds with multi-pass sequencing
//! - **Bounded locking**: a global motion lock plus per-axis locks, all taken
//!   with timeouts, and a latched emergency stop
//! - **embedded-hal 1.0**: `OutputPin` for STEP/DIR/ENA
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lathe_motion::{load_config, Machine, MonotonicClock, MotionRuntime};
//!
//! let config = load_config("lathe.toml")?;
//! let machine = Arc::new(Machine::new(config)?);
//!
//! // Outputs and jog inputs in Z, X, C order.
//! let (runtime, settings) = MotionRuntime::spawn(machine, outputs, MonotonicClock::new(), jogs);
//!
//! settings.set_pitch(DeciMicrons::from_mm(1.5));
//! settings.set_running(true);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]
// Errors carry heapless strings
#![allow(clippy::result_large_err)]

pub mod axis;
pub mod clock;
pub mod command;
pub mod config;
pub mod control;
pub mod error;
pub mod estop;
pub mod machine;
pub mod manual;
pub mod modes;
pub mod persistence;
pub mod pulse;
pub mod runtime;
pub mod settings;
pub mod snapshot;
pub mod spindle;

// Re-exports for ergonomic API
pub use axis::{Axis, AxisId, AxisParams, AxisState, StopSide, Stops};
pub use clock::{Clock, MonotonicClock};
pub use command::{CommandStatus, CommandSurface, MachineCommand, Positioning};
pub use config::{load_config, parse_config, validate_config, MachineConfig};
pub use control::{ControlLoop, TickOutcome};
pub use error::{Error, Result};
pub use estop::{EmergencyStop, EstopCause};
pub use machine::{Machine, MotionState};
pub use manual::{HandwheelCounter, JogButtons, JogInput, ManualMover};
pub use modes::{Mode, OpProgress};
pub use persistence::{KeyValueStore, MemoryStore, PersistedState, StateSaver};
pub use pulse::{StepOutputs, StepperPins, Unconnected};
pub use runtime::MotionRuntime;
pub use settings::{SettingChange, SettingsHandle};
pub use snapshot::{AxisSnapshot, MachineSnapshot};

// Unit types
pub use config::units::{DeciMicrons, MeasureUnit};
