//! Configuration loading from files.

use std::fs;
use std::path::Path;

use crate::error::{ConfigError, Error, Result};

use super::MachineConfig;

/// Load configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
///
/// # Example
///
/// ```rust,ignore
/// use lathe_motion::load_config;
///
/// let config = load_config("lathe.toml")?;
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<MachineConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "cannot read machine configuration");
        Error::Config(ConfigError::IoError(truncated(&e.to_string())))
    })?;

    parse_config(&content)
}

/// Parse configuration from a TOML string.
///
/// # Errors
///
/// Returns an error if the TOML is invalid or fails validation.
pub fn parse_config(content: &str) -> Result<MachineConfig> {
    let config: MachineConfig = toml::from_str(content)
        .map_err(|e| Error::Config(ConfigError::ParseError(truncated(e.message()))))?;

    super::validation::validate_config(&config)?;

    tracing::debug!(axes = config.axes.len(), "machine configuration loaded");
    Ok(config)
}

/// Longest prefix of `text` that fits the error buffer.
fn truncated<const N: usize>(text: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for c in text.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::AxisId;

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
[axes.z]
name = "Z"
motor_steps = 400
screw_pitch_du = 5386
speed_start = 2000.0
speed_manual_move = 8000.0
acceleration = 40000.0
max_travel_mm = 300.0

[axes.x]
name = "X"
motor_steps = 400
screw_pitch_du = 8445
speed_start = 1200.0
speed_manual_move = 4000.0
acceleration = 40000.0
max_travel_mm = 100.0
"#;

        let config = parse_config(toml).unwrap();
        let z = config.axis(AxisId::Z).unwrap();
        assert!(z.active);
        assert_eq!(z.backlash_steps(), 0);
        assert_eq!(config.encoder.steps_per_revolution, 1024);
        assert_eq!(config.timing.direction_setup_us, 5);
        assert!(config.axis(AxisId::C).is_none());
    }

    #[test]
    fn test_parse_rejects_invalid_axis() {
        let toml = r#"
[axes.z]
name = "Z"
motor_steps = 0
screw_pitch_du = 5386
speed_start = 2000.0
speed_manual_move = 8000.0
acceleration = 40000.0
max_travel_mm = 300.0
"#;

        assert!(parse_config(toml).is_err());
    }

    #[test]
    fn test_parse_reports_syntax_error() {
        let err = parse_config("[axes.z\nname = ").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_long_messages_truncated() {
        let text = "x".repeat(300);
        let msg: heapless::String<128> = truncated(&text);
        assert_eq!(msg.len(), 128);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config("/nonexistent/lathe.toml").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::IoError(_))));
    }
}
