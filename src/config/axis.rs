//! Axis configuration from TOML.

use serde::Deserialize;

use super::units::{DeciMicrons, DU_PER_MM};

/// Complete configuration of one stepper-driven axis.
#[derive(Debug, Clone, Deserialize)]
pub struct AxisConfig {
    /// Letter shown before the axis position and used by machine commands.
    pub name: char,

    /// Inactive axes are never stepped or enabled.
    #[serde(default = "default_active")]
    pub active: bool,

    /// Rotary axis (distances are 1/10000 degree instead of deci-microns).
    #[serde(default)]
    pub rotational: bool,

    /// Motor steps per lead screw revolution, including microstepping.
    pub motor_steps: u32,

    /// Carriage travel per lead screw revolution.
    #[serde(rename = "screw_pitch_du")]
    pub screw_pitch: DeciMicrons,

    /// Starting speed in steps per second.
    pub speed_start: f32,

    /// Maximum manual move speed in steps per second.
    pub speed_manual_move: f32,

    /// Acceleration in steps per second squared.
    pub acceleration: f32,

    /// Invert direction pin logic.
    #[serde(default)]
    pub invert_direction: bool,

    /// Invert enable pin logic.
    #[serde(default)]
    pub invert_enable: bool,

    /// Open-loop driver that should be de-energised while idle.
    #[serde(default)]
    pub needs_rest: bool,

    /// Longest travel the mechanics allow in one go, in millimeters.
    pub max_travel_mm: f32,

    /// Lead screw backlash.
    #[serde(default, rename = "backlash_du")]
    pub backlash: DeciMicrons,
}

fn default_active() -> bool {
    true
}

impl AxisConfig {
    /// Stock main lead screw: 8 TPI lead through a 2:1 gearbox and 3:1 pulleys.
    pub fn stock_z() -> Self {
        Self {
            name: 'Z',
            active: true,
            rotational: false,
            motor_steps: 400,
            screw_pitch: DeciMicrons(5386),
            speed_start: 5.0 * 400.0,
            speed_manual_move: 20.0 * 400.0,
            acceleration: 100.0 * 400.0,
            invert_direction: true,
            invert_enable: true,
            needs_rest: false,
            max_travel_mm: 300.0,
            backlash: DeciMicrons(8382),
        }
    }

    /// Stock cross slide: 10 TPI lead through 3:1 pulleys.
    pub fn stock_x() -> Self {
        Self {
            name: 'X',
            active: true,
            rotational: false,
            motor_steps: 400,
            screw_pitch: DeciMicrons(8445),
            speed_start: 3.0 * 400.0,
            speed_manual_move: 10.0 * 400.0,
            acceleration: 100.0 * 400.0,
            invert_direction: true,
            invert_enable: true,
            needs_rest: false,
            max_travel_mm: 100.0,
            backlash: DeciMicrons(4064),
        }
    }

    /// Stock auxiliary rotary table, disabled until wired.
    pub fn stock_c() -> Self {
        Self {
            name: 'C',
            active: false,
            rotational: true,
            motor_steps: 300,
            screw_pitch: DeciMicrons(20_000),
            speed_start: 1600.0,
            speed_manual_move: 3200.0,
            acceleration: 16_000.0,
            invert_direction: false,
            invert_enable: false,
            needs_rest: false,
            max_travel_mm: 360.0,
            backlash: DeciMicrons(0),
        }
    }

    /// Lost motion on direction reversal, in motor steps.
    pub fn backlash_steps(&self) -> i64 {
        self.backlash.0 * self.motor_steps as i64 / self.screw_pitch.0
    }

    /// Pending step count beyond which motion is a hard travel violation.
    pub fn estop_steps(&self) -> i64 {
        let travel_du = self.max_travel_mm as f64 * DU_PER_MM as f64;
        (travel_du / self.screw_pitch.0 as f64 * self.motor_steps as f64) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backlash_steps() {
        // 8382 * 400 / 5386 = 622.5
        assert_eq!(AxisConfig::stock_z().backlash_steps(), 622);
        assert_eq!(AxisConfig::stock_c().backlash_steps(), 0);
    }

    #[test]
    fn test_estop_steps() {
        // 300 mm = 3_000_000 du, / 8445 * 400
        let x = AxisConfig {
            max_travel_mm: 300.0,
            ..AxisConfig::stock_x()
        };
        assert_eq!(x.estop_steps(), 142_095);
        assert_eq!(AxisConfig::stock_z().estop_steps(), 222_799);
    }
}
