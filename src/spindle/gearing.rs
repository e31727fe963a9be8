//! Spindle-to-axis gearing equations.
//!
//! Both directions use the same steps-per-tick ratio so that converting a
//! position to spindle ticks and back lands on the same step whenever the
//! encoder resolves finer than one step.

use crate::axis::{AxisParams, Stops};

/// Electronic gearbox setting between spindle and an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gearing {
    /// Deci-microns of travel per spindle revolution (signed).
    pub pitch: i64,
    /// Number of thread starts.
    pub starts: u32,
    /// Encoder ticks per spindle revolution.
    pub encoder_steps: i64,
}

impl Gearing {
    /// Gearing for `pitch` and `starts` on an encoder of `encoder_steps`.
    pub const fn new(pitch: i64, starts: u32, encoder_steps: i64) -> Self {
        Self {
            pitch,
            starts,
            encoder_steps,
        }
    }

    /// Axis steps per spindle tick.
    #[inline]
    pub fn steps_per_tick(&self, axis: &AxisParams) -> f64 {
        (axis.motor_steps as f64 * self.pitch as f64 * self.starts as f64)
            / (axis.screw_pitch as f64 * self.encoder_steps as f64)
    }

    /// Axis position for spindle position `spindle`, optionally clamped into
    /// the stops.
    pub fn pos_from_spindle(
        &self,
        axis: &AxisParams,
        stops: &Stops,
        spindle: i64,
        respect_stops: bool,
    ) -> i64 {
        let pos = (spindle as f64 * self.steps_per_tick(axis)).round() as i64;
        if respect_stops {
            stops.clamp(pos)
        } else {
            pos
        }
    }

    /// Spindle position that maps to axis position `pos`. Zero pitch maps
    /// everything to zero.
    pub fn spindle_from_pos(&self, axis: &AxisParams, pos: i64) -> i64 {
        let ratio = self.steps_per_tick(axis);
        if ratio == 0.0 {
            return 0;
        }
        (pos as f64 / ratio).round() as i64
    }

    /// Reduce `value` into `[0, encoder_steps)`.
    #[inline]
    pub fn modulo(&self, value: i64) -> i64 {
        value.rem_euclid(self.encoder_steps)
    }
}
