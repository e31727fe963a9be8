//! Error types for lathe-motion.
//!
//! Provides unified error handling across configuration, axis access, command
//! execution and persistence. Transient lock contention is never an error: the
//! affected operation reports `false` and is retried on the next tick.

use core::fmt;

use crate::axis::AxisId;
use crate::estop::EstopCause;

/// Result type alias using the library's Error type.
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for all lathe-motion operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Configuration parsing or validation error
    Config(ConfigError),
    /// Axis access or output error
    Axis(AxisError),
    /// Rejected or aborted machine command
    Command(CommandError),
    /// Persisted state could not be read or written
    Persist(PersistError),
    /// The emergency-stop latch is set; no further motion is possible
    EmergencyStop(EstopCause),
}

/// Configuration-related errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Failed to parse TOML configuration
    ParseError(heapless::String<128>),
    /// File I/O error
    IoError(heapless::String<128>),
    /// A mandatory axis section is missing
    MissingAxis(AxisId),
    /// Motor steps per revolution must be > 0
    InvalidMotorSteps {
        /// Offending axis
        axis: AxisId,
        /// Configured value
        value: u32,
    },
    /// Screw pitch must be > 0
    InvalidScrewPitch {
        /// Offending axis
        axis: AxisId,
        /// Configured value in deci-microns
        value: i64,
    },
    /// Start speed must be > 0 and not above the manual move speed
    InvalidSpeeds {
        /// Offending axis
        axis: AxisId,
        /// Configured start speed
        start: f32,
        /// Configured manual move speed
        manual: f32,
    },
    /// Acceleration must be > 0
    InvalidAcceleration {
        /// Offending axis
        axis: AxisId,
        /// Configured value
        value: f32,
    },
    /// Maximum travel must be > 0
    InvalidTravel {
        /// Offending axis
        axis: AxisId,
        /// Configured value in millimeters
        value: f32,
    },
    /// Encoder steps per revolution must be > 0
    InvalidEncoderSteps(u32),
    /// Interpolation precision must be > 0
    InvalidInterpolationPrecision(f32),
}

/// Axis access errors.
#[derive(Debug, Clone, PartialEq)]
pub enum AxisError {
    /// Axis is configured but not active
    Inactive(AxisId),
    /// Operator has switched the axis off
    Disabled(AxisId),
    /// Output pin operation failed
    PinError(AxisId),
}

/// Machine command errors.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandError {
    /// Command is not supported by the motion core
    Unsupported(heapless::String<32>),
    /// Axis letter does not name a configured axis
    UnknownAxis(char),
    /// Feed rate must be > 0
    InvalidFeed(f32),
    /// Motion was stopped before the command completed
    Aborted,
}

/// Persistence errors.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistError {
    /// Backing store failed
    Store(heapless::String<64>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Axis(e) => write!(f, "Axis error: {}", e),
            Error::Command(e) => write!(f, "Command error: {}", e),
            Error::Persist(e) => write!(f, "Persistence error: {}", e),
            Error::EmergencyStop(cause) => write!(f, "Emergency stop: {}", cause),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            ConfigError::IoError(msg) => write!(f, "I/O error: {}", msg),
            ConfigError::MissingAxis(axis) => write!(f, "Axis {} is not configured", axis),
            ConfigError::InvalidMotorSteps { axis, value } => {
                write!(f, "Axis {}: invalid motor steps {}. Must be > 0", axis, value)
            }
            ConfigError::InvalidScrewPitch { axis, value } => {
                write!(f, "Axis {}: invalid screw pitch {} du. Must be > 0", axis, value)
            }
            ConfigError::InvalidSpeeds { axis, start, manual } => write!(
                f,
                "Axis {}: start speed {} must be > 0 and <= manual move speed {}",
                axis, start, manual
            ),
            ConfigError::InvalidAcceleration { axis, value } => {
                write!(f, "Axis {}: invalid acceleration {}. Must be > 0", axis, value)
            }
            ConfigError::InvalidTravel { axis, value } => {
                write!(f, "Axis {}: invalid max travel {} mm. Must be > 0", axis, value)
            }
            ConfigError::InvalidEncoderSteps(v) => {
                write!(f, "Invalid encoder steps per revolution: {}. Must be > 0", v)
            }
            ConfigError::InvalidInterpolationPrecision(v) => {
                write!(f, "Invalid interpolation precision: {}. Must be > 0", v)
            }
        }
    }
}

impl fmt::Display for AxisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisError::Inactive(axis) => write!(f, "Axis {} is not active", axis),
            AxisError::Disabled(axis) => write!(f, "Axis {} is disabled", axis),
            AxisError::PinError(axis) => write!(f, "Axis {}: GPIO pin operation failed", axis),
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Unsupported(cmd) => write!(f, "Unsupported command: {}", cmd),
            CommandError::UnknownAxis(letter) => write!(f, "Unknown axis '{}'", letter),
            CommandError::InvalidFeed(v) => write!(f, "Invalid feed rate: {}. Must be > 0", v),
            CommandError::Aborted => write!(f, "Motion stopped before command completed"),
        }
    }
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistError::Store(msg) => write!(f, "Store failure: {}", msg),
        }
    }
}

// Conversion impls
impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<AxisError> for Error {
    fn from(e: AxisError) -> Self {
        Error::Axis(e)
    }
}

impl From<CommandError> for Error {
    fn from(e: CommandError) -> Self {
        Error::Command(e)
    }
}

impl From<PersistError> for Error {
    fn from(e: PersistError) -> Self {
        Error::Persist(e)
    }
}

impl From<EstopCause> for Error {
    fn from(cause: EstopCause) -> Self {
        Error::EmergencyStop(cause)
    }
}

impl std::error::Error for Error {}

impl std::error::Error for ConfigError {}

impl std::error::Error for AxisError {}

impl std::error::Error for CommandError {}

impl std::error::Error for PersistError {}
