//! Unit tests for configuration validation.

use lathe_motion::config::{validate_config, MachineConfig};
use lathe_motion::error::{ConfigError, Error};
use lathe_motion::{AxisId, Machine};

fn axis_block(letter: &str, motor_steps: u32, speed_start: f32, manual: f32) -> String {
    format!(
        r#"
[axes.{lower}]
name = "{letter}"
motor_steps = {motor_steps}
screw_pitch_du = 5000
speed_start = {speed_start:.1}
speed_manual_move = {manual:.1}
acceleration = 40000.0
max_travel_mm = 200.0
"#,
        lower = letter.to_lowercase(),
    )
}

/// Test that the stock machine validates.
#[test]
fn test_default_config_is_valid() {
    assert!(validate_config(&MachineConfig::default()).is_ok());
}

/// Test validation fails for a zero step count.
#[test]
fn test_zero_motor_steps() {
    let toml_str = axis_block("Z", 0, 1000.0, 4000.0) + &axis_block("X", 400, 1000.0, 4000.0);
    let config: MachineConfig = toml::from_str(&toml_str).expect("Failed to parse TOML");
    assert!(matches!(
        validate_config(&config),
        Err(Error::Config(ConfigError::InvalidMotorSteps { axis: AxisId::Z, .. }))
    ));
}

/// Test validation fails when the start speed exceeds the manual speed.
#[test]
fn test_start_speed_above_manual() {
    let toml_str = axis_block("Z", 400, 1000.0, 4000.0) + &axis_block("X", 400, 5000.0, 4000.0);
    let config: MachineConfig = toml::from_str(&toml_str).expect("Failed to parse TOML");
    assert!(validate_config(&config).is_err());
}

/// Test that a machine cannot be built without a cross slide.
#[test]
fn test_machine_requires_x() {
    let toml_str = axis_block("Z", 400, 1000.0, 4000.0);
    let config: MachineConfig = toml::from_str(&toml_str).expect("Failed to parse TOML");
    assert!(matches!(
        Machine::new(config),
        Err(Error::Config(ConfigError::MissingAxis(AxisId::X)))
    ));
}
