//! Constant-rate pulse generator for the asynchronous and divider modes.
//!
//! Independent of the spindle: the configured pitch is read as deci-microns
//! per second rather than per revolution.

use crate::axis::{AxisParams, AxisState};
use crate::error::Result;

use super::outputs::StepOutputs;

/// Free-running step source for one axis.
#[derive(Debug, Clone, Default)]
pub struct AsyncGenerator {
    enabled: bool,
    period_us: u64,
    forward: bool,
    last_step_us: u64,
}

impl AsyncGenerator {
    /// Stopped generator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generator is armed.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Interval between steps; zero when the rate is zero.
    #[inline]
    pub fn period_us(&self) -> u64 {
        self.period_us
    }

    /// Arm or disarm.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Derive rate and direction from `pitch` deci-microns per second.
    pub fn configure(&mut self, params: &AxisParams, pitch: i64) {
        self.forward = pitch > 0;
        self.period_us = if pitch == 0 {
            0
        } else {
            let steps_per_sec =
                params.motor_steps as f64 * pitch.unsigned_abs() as f64 / params.screw_pitch as f64;
            (1_000_000.0 / steps_per_sec) as u64
        };
    }

    /// Emit one step if due. Stops are honoured and manual moves pause the
    /// generator.
    pub fn tick<O: StepOutputs + ?Sized>(
        &mut self,
        params: &AxisParams,
        state: &mut AxisState,
        now_us: u64,
        out: &mut O,
    ) -> Result<bool> {
        if !self.enabled || self.period_us == 0 || !params.active {
            return Ok(false);
        }
        if state.moving_manually || !state.is_idle() || !state.output_enabled {
            return Ok(false);
        }
        if now_us < self.last_step_us + self.period_us {
            return Ok(false);
        }

        let stops = state.stops();
        let free = if self.forward {
            stops.left.map_or(true, |left| state.pos < left)
        } else {
            stops.right.map_or(true, |right| state.pos > right)
        };
        if !free {
            return Ok(false);
        }

        if state.direction != Some(self.forward) {
            out.set_direction(self.forward)?;
            state.direction = Some(self.forward);
        }
        out.step()?;
        state.record_step(self.forward, params.backlash_steps);
        state.last_step_us = now_us;

        // Resynchronise after a long gap instead of bursting.
        self.last_step_us = if now_us - self.last_step_us > 2 * self.period_us {
            now_us
        } else {
            self.last_step_us + self.period_us
        };
        Ok(true)
    }
}
