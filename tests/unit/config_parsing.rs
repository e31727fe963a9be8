//! Unit tests for TOML configuration parsing.

use lathe_motion::config::{parse_config, DeciMicrons, MachineConfig};
use lathe_motion::AxisId;

/// Test parsing every section of a machine configuration.
#[test]
fn test_parse_full_config() {
    let toml_str = r#"
[encoder]
steps_per_revolution = 600
backlash = 3

[timing]
enable_lead_ms = 50
motion_lock_timeout_us = 2000

[operation]
safe_distance_du = 2000
starts_max = 12

[command]
feed_default_du_per_sec = 5000.0
wait_epsilon_steps = 4

[handwheel]
pulses_per_revolution = 400.0
half_backlash = 1
first = "x"
second = "z"

[axes.z]
name = "Z"
motor_steps = 800
screw_pitch_du = 50000
speed_start = 2000.0
speed_manual_move = 16000.0
acceleration = 60000.0
max_travel_mm = 500.0
backlash_du = 625
needs_rest = true

[axes.x]
name = "X"
motor_steps = 400
screw_pitch_du = 20000
speed_start = 1000.0
speed_manual_move = 4000.0
acceleration = 20000.0
max_travel_mm = 120.0
invert_direction = true
"#;

    let config = parse_config(toml_str).expect("Failed to parse TOML");

    assert_eq!(config.encoder.steps_per_revolution, 600);
    assert_eq!(config.encoder.backlash, 3);
    assert_eq!(config.timing.enable_lead_ms, 50);
    assert_eq!(config.operation.safe_distance, DeciMicrons(2000));
    assert_eq!(config.operation.starts_max, 12);
    assert_eq!(config.command.wait_epsilon_steps, 4);
    assert_eq!(config.handwheel_for(AxisId::X), Some(0));
    assert_eq!(config.handwheel_for(AxisId::Z), Some(1));
    assert_eq!(config.handwheel_for(AxisId::C), None);

    let z = config.axis(AxisId::Z).expect("Z not found");
    assert_eq!(z.motor_steps, 800);
    assert!(z.needs_rest);
    // 625 du of slack on a 5 mm screw with 800 steps.
    assert_eq!(z.backlash_steps(), 10);

    let x = config.axis(AxisId::X).expect("X not found");
    assert!(x.invert_direction);
    assert!(!x.rotational);
}

/// Test that omitted sections take their defaults.
#[test]
fn test_defaults_for_missing_sections() {
    let toml_str = r#"
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

    let config: MachineConfig = toml::from_str(toml_str).expect("Failed to parse TOML");
    assert_eq!(config.encoder.steps_per_revolution, 1024);
    assert_eq!(config.operation.passes_max, 999);
    assert_eq!(config.operation.pitch_max, DeciMicrons(254_000));
    assert_eq!(config.handwheel.half_backlash, 2);
    assert!(config.handwheel.first.is_none());
}

/// Test parsing a rotary auxiliary axis.
#[test]
fn test_parse_rotary_axis() {
    let toml_str = r#"
[axes.c]
name = "C"
rotational = true
motor_steps = 300
screw_pitch_du = 20000
speed_start = 1600.0
speed_manual_move = 3200.0
acceleration = 16000.0
max_travel_mm = 360.0
"#;

    let config: MachineConfig = toml::from_str(toml_str).expect("Failed to parse TOML");
    let c = config.axis(AxisId::C).expect("C not found");
    assert!(c.rotational);
    assert!(c.active);
}
