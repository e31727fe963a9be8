//! Constants derived once from an axis configuration.

use crate::config::units::{DeciMicrons, DU_PER_MM};
use crate::config::AxisConfig;

use super::profile::SpeedRamp;
use super::AxisId;

/// Immutable per-axis geometry, limits and ramp.
#[derive(Debug, Clone)]
pub struct AxisParams {
    /// Which axis.
    pub id: AxisId,
    /// Display and command letter.
    pub name: char,
    /// Inactive axes never step.
    pub active: bool,
    /// Rotary axis.
    pub rotational: bool,
    /// Motor steps per screw revolution.
    pub motor_steps: i64,
    /// Screw pitch in deci-microns.
    pub screw_pitch: i64,
    /// Speed ramp.
    pub ramp: SpeedRamp,
    /// Steps from target at which deceleration begins.
    pub decelerate_steps: i64,
    /// Lost motion on reversal, in steps.
    pub backlash_steps: i64,
    /// Pending steps beyond which the emergency stop latches.
    pub estop_steps: i64,
    /// Driver wants to be de-energised while idle.
    pub needs_rest: bool,
}

impl AxisParams {
    /// Derive parameters from configuration.
    pub fn from_config(id: AxisId, config: &AxisConfig) -> Self {
        let ramp = SpeedRamp::new(
            config.speed_start,
            config.speed_manual_move,
            config.acceleration,
        );
        Self {
            id,
            name: config.name,
            active: config.active,
            rotational: config.rotational,
            motor_steps: config.motor_steps as i64,
            screw_pitch: config.screw_pitch.0,
            ramp,
            decelerate_steps: ramp.decelerate_steps(),
            backlash_steps: config.backlash_steps(),
            estop_steps: config.estop_steps(),
            needs_rest: config.needs_rest,
        }
    }

    /// Convert steps to deci-microns.
    #[inline]
    pub fn steps_to_du(&self, steps: i64) -> DeciMicrons {
        DeciMicrons((steps as f64 * self.screw_pitch as f64 / self.motor_steps as f64).round() as i64)
    }

    /// Convert deci-microns to the nearest step.
    #[inline]
    pub fn du_to_steps(&self, du: DeciMicrons) -> i64 {
        (du.0 as f64 * self.motor_steps as f64 / self.screw_pitch as f64).round() as i64
    }

    /// Distance of `steps` in millimeters, or degrees for a rotary axis.
    pub fn steps_to_distance(&self, steps: i64) -> f32 {
        (steps as f64 * self.screw_pitch as f64 / self.motor_steps as f64 / DU_PER_MM as f64) as f32
    }

    /// Steps covering `distance` millimeters (or degrees).
    pub fn distance_to_steps(&self, distance: f32) -> i64 {
        (distance as f64 * DU_PER_MM as f64 / self.screw_pitch as f64 * self.motor_steps as f64)
            .round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_z_derived() {
        let z = AxisParams::from_config(AxisId::Z, &AxisConfig::stock_z());
        assert_eq!(z.backlash_steps, 622);
        assert!(z.decelerate_steps > 0);
        assert_eq!(z.name, 'Z');
    }

    #[test]
    fn test_distance_conversion() {
        let z = AxisParams::from_config(AxisId::Z, &AxisConfig::stock_z());
        // One screw revolution.
        assert!((z.steps_to_distance(400) - 0.5386).abs() < 1e-6);
        assert_eq!(z.distance_to_steps(0.5386), 400);
        assert_eq!(z.steps_to_du(400), DeciMicrons(5386));
        assert_eq!(z.du_to_steps(DeciMicrons(-5386)), -400);
    }

    #[test]
    fn test_rotary_reports_degrees() {
        let c = AxisParams::from_config(AxisId::C, &AxisConfig::stock_c());
        // 20000 du per revolution of the motor is 2 degrees.
        assert!((c.steps_to_distance(300) - 2.0).abs() < 1e-6);
    }
}
