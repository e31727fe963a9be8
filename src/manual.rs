//! Manual moves from jog buttons and handwheels.
//!
//! One [`ManualMover`] per axis runs on its own thread. While it drives an
//! axis the axis is flagged as moving manually and the mode logic leaves it
//! alone.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::axis::{Axis, AxisId};
use crate::config::{DeciMicrons, MeasureUnit};
use crate::error::Result;
use crate::estop::EstopCause;
use crate::machine::Machine;
use crate::modes::Mode;
use crate::settings::SettingsHandle;

/// Pause while resting on a stop during an in-thread move.
const REST_DELAY: Duration = Duration::from_millis(200);

/// Pulse accumulator of one manual pulse generator.
///
/// Reversals inside the dead band are absorbed so that a wobbling hand does
/// not move the axis back and forth.
#[derive(Debug)]
pub struct HandwheelCounter {
    delta: AtomicI32,
    half_backlash: i32,
}

impl HandwheelCounter {
    /// Counter with a dead band of `half_backlash` pulses either way.
    pub const fn new(half_backlash: i32) -> Self {
        Self {
            delta: AtomicI32::new(0),
            half_backlash,
        }
    }

    /// Record one pulse. Called from the pulse source.
    pub fn on_pulse(&self, forward: bool) {
        self.add(if forward { 1 } else { -1 });
    }

    /// Record several pulses.
    pub fn add(&self, pulses: i32) {
        self.delta.fetch_add(pulses, Ordering::AcqRel);
    }

    /// Take the pulses beyond the dead band, leaving the counter on its
    /// edge.
    pub fn take(&self) -> i32 {
        let band = self.half_backlash;
        let mut current = self.delta.load(Ordering::Acquire);
        loop {
            let (taken, rest) = if current > band {
                (current - band, band)
            } else if current < -band {
                (current + band, -band)
            } else {
                return 0;
            };
            match self
                .delta
                .compare_exchange_weak(current, rest, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return taken,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Held jog direction for one axis.
pub trait JogInput: Send {
    /// `1` or `-1` while a button is held, `0` otherwise.
    fn direction(&self) -> i32;
}

/// Pair of jog buttons shared with whatever reads the keypad.
#[derive(Debug, Default)]
pub struct JogButtons {
    plus: AtomicBool,
    minus: AtomicBool,
}

impl JogButtons {
    /// Both released.
    pub fn new() -> Self {
        Self::default()
    }

    /// Press the button for `direction`; `0` releases both.
    pub fn press(&self, direction: i32) {
        self.plus.store(direction > 0, Ordering::Release);
        self.minus.store(direction < 0, Ordering::Release);
    }

    /// Release both buttons.
    pub fn release(&self) {
        self.press(0);
    }
}

impl JogInput for Arc<JogButtons> {
    fn direction(&self) -> i32 {
        match (
            self.plus.load(Ordering::Acquire),
            self.minus.load(Ordering::Acquire),
        ) {
            (true, false) => 1,
            (false, true) => -1,
            _ => 0,
        }
    }
}

/// Drives one axis from its jog input and handwheel.
pub struct ManualMover<J: JogInput> {
    axis: AxisId,
    machine: Arc<Machine>,
    settings: SettingsHandle,
    jog: J,
}

impl<J: JogInput> ManualMover<J> {
    /// Mover for `axis`.
    pub fn new(axis: AxisId, settings: SettingsHandle, jog: J) -> Self {
        Self {
            axis,
            machine: Arc::clone(settings.machine()),
            settings,
            jog,
        }
    }

    /// Axis this mover drives.
    #[inline]
    pub fn axis(&self) -> AxisId {
        self.axis
    }

    /// Poll until `shutdown` is set or the emergency stop latches.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        while !shutdown.load(Ordering::Acquire) && !self.machine.estop().is_latched() {
            match self.poll() {
                Ok(true) => {}
                Ok(false) => thread::sleep(Duration::from_millis(1)),
                Err(e) => {
                    tracing::debug!(axis = %self.axis, error = %e, "manual mover exiting");
                    break;
                }
            }
        }
    }

    /// Perform one manual move if input is pending. Returns `true` if the
    /// axis moved.
    pub fn poll(&mut self) -> Result<bool> {
        self.machine.estop().check()?;
        let axis = self.machine.axis(self.axis);
        if !axis.params().active {
            return Ok(false);
        }
        let pulses = self
            .machine
            .handwheel_for(self.axis)
            .map_or(0, HandwheelCounter::take);
        let held = self.jog.direction();
        if pulses == 0 && held == 0 {
            return Ok(false);
        }

        let (mode, running, pitch, in_sync) = {
            let motion = self.machine.motion();
            (
                motion.mode(),
                motion.running(),
                motion.pitch(),
                motion.spindle().sync() != 0,
            )
        };
        if self.axis == AxisId::C && mode != Mode::Divider {
            return Ok(false);
        }
        if in_sync && self.axis == mode.pitch_axis() {
            return Ok(false);
        }
        if running && mode.is_pass_mode() {
            self.settings.set_running(false);
        }

        let sign = if pulses == 0 { held } else { pulses.signum() };
        axis.hold_enable(true);
        axis.state().set_moving_manually(true);
        tracing::debug!(axis = %self.axis, sign, pulses, "manual move");

        let geared = running && pitch != 0 && mode == Mode::Normal;
        let result = if geared && self.axis == mode.pitch_axis() {
            self.move_in_thread(axis, sign)
        } else {
            self.move_stepped(axis, sign, pulses, running, mode)
        };

        {
            let mut state = axis.state();
            state.set_moving_manually(false);
            state.continuous = false;
            state.clear_speed_max();
        }
        axis.hold_enable(false);
        result.map(|()| true)
    }

    /// Move while staying on the thread: shift the spindle reference by
    /// whole revolutions and let the axis follow.
    fn move_in_thread(&self, axis: &Axis, sign: i32) -> Result<()> {
        let (diff, mut prev) = {
            let motion = self.machine.motion();
            let lead = (motion.pitch() * motion.starts() as i64).unsigned_abs().max(1);
            let revs = (motion.move_step().value().unsigned_abs() as f64 / lead as f64).ceil();
            let pitch_sign = if motion.pitch() > 0 { 1 } else { -1 };
            let diff = revs as i64 * motion.spindle().encoder_steps() * sign as i64 * pitch_sign;
            (diff, motion.spindle().pos())
        };
        let mut resting = false;
        let mut holding = true;

        loop {
            self.machine.estop().check()?;
            let gearing = {
                let Some(mut motion) = self.machine.try_motion() else {
                    continue;
                };
                if !resting {
                    motion.spindle.shift(diff);
                }
                // The spindle keeps moving meanwhile; stay ahead of it.
                loop {
                    let pos = motion.spindle.pos();
                    let behind = if diff > 0 { pos < prev } else { pos > prev };
                    if !behind {
                        break;
                    }
                    motion.spindle.shift(diff);
                }
                prev = motion.spindle.pos();
                motion.gearing()
            };

            let state = axis.snapshot();
            let target = gearing.pos_from_spindle(axis.params(), &state.stops(), prev, true);
            let stop = if sign > 0 {
                state.stops().left
            } else {
                state.stops().right
            };
            if target != state.pos() {
                {
                    let mut state = axis.state();
                    state.set_speed_max(axis.params().ramp.manual);
                    state.request_move(axis.params(), target, true);
                }
                self.wait_pending(axis, axis.params().motor_steps / 3)?;
            } else if stop == Some(state.pos()) {
                resting = true;
                if holding {
                    axis.hold_enable(false);
                    holding = false;
                }
                thread::sleep(REST_DELAY);
            }
            if self.jog.direction() != sign {
                break;
            }
        }
        if !holding {
            axis.hold_enable(true);
        }
        axis.state().continuous = false;
        Ok(())
    }

    /// Move by whole manual steps or handwheel pulses, clamped to the stops.
    fn move_stepped(
        &self,
        axis: &Axis,
        sign: i32,
        mut pulses: i32,
        running: bool,
        mode: Mode,
    ) -> Result<()> {
        let config = self.machine.config();
        let params = axis.params();
        let (move_step, measure) = {
            let motion = self.machine.motion();
            (motion.move_step(), motion.measure())
        };
        let coarse = move_step == measure.coarse_move_step();
        // Rotary axes read inch steps as degrees.
        let step_du = if params.rotational && measure != MeasureUnit::Metric {
            move_step.value() as f32 / 25.4
        } else {
            move_step.value() as f32
        };
        let speed_cap = if coarse {
            params.ramp.manual
        } else {
            let steps = params.du_to_steps(DeciMicrons(step_du.abs() as i64)).max(1);
            (steps as f32 * 1000.0 / config.timing.manual_step_time_ms.max(1) as f32)
                .min(params.ramp.manual)
        };
        let pause = Duration::from_millis(config.timing.manual_step_pause_ms as u64);
        let ppr = config.handwheel.pulses_per_revolution;

        let mut target = axis.pos();
        loop {
            self.machine.estop().check()?;
            let delta = {
                let mut state = axis.state();
                let revolutions = if pulses == 0 {
                    step_du * sign as f32 / params.screw_pitch as f32
                } else {
                    pulses as f32 / ppr
                };
                let fractional = revolutions * params.motor_steps as f32 + state.fractional_pos;
                let mut delta = fractional.round() as i64;
                state.fractional_pos = fractional - delta as f32;
                if delta == 0 {
                    delta = sign as i64;
                }
                let next = state.stops().clamp(target + delta);
                let delta = next - target;
                target = next;
                state.set_speed_max(speed_cap);
                state.request_move(params, target, coarse);
                delta
            };

            if coarse {
                self.wait_pending(axis, params.motor_steps / 3)?;
            } else {
                self.wait_pending(axis, 0)?;
                thread::sleep(pause);
            }

            pulses = self
                .machine
                .handwheel_for(self.axis)
                .map_or(0, HandwheelCounter::take);
            if delta == 0 || (pulses == 0 && self.jog.direction() != sign) {
                break;
            }
        }

        {
            let mut state = axis.state();
            state.request_move(params, target, false);
        }
        self.wait_pending(axis, 0)?;

        if running && mode == Mode::Cone {
            match self.machine.try_motion() {
                Some(mut motion) => {
                    self.machine.mark_origin_all(&mut motion);
                }
                None => self.machine.emergency_stop(EstopCause::OriginMarkLock),
            }
        } else if running && mode.is_async() {
            if let Some(mut motion) = self.machine.try_motion() {
                self.machine.configure_async(&mut motion);
            }
        }
        Ok(())
    }

    /// Wait until no more than `limit` steps are outstanding.
    fn wait_pending(&self, axis: &Axis, limit: i64) -> Result<()> {
        loop {
            self.machine.estop().check()?;
            if axis.pending().abs() <= limit {
                return Ok(());
            }
            thread::yield_now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handwheel_dead_band() {
        let counter = HandwheelCounter::new(2);
        counter.add(2);
        assert_eq!(counter.take(), 0);
        counter.add(3);
        assert_eq!(counter.take(), 3);
        // Reversal first has to cross the band.
        counter.add(-3);
        assert_eq!(counter.take(), 0);
        counter.add(-2);
        assert_eq!(counter.take(), -1);
    }

    #[test]
    fn test_jog_buttons() {
        let buttons = Arc::new(JogButtons::new());
        assert_eq!(buttons.direction(), 0);
        buttons.press(-1);
        assert_eq!(buttons.direction(), -1);
        buttons.release();
        assert_eq!(buttons.direction(), 0);
    }
}
