//! The periodic control loop.
//!
//! Each tick, under the global motion lock:
//!
//! 1. apply staged settings
//! 2. fold new encoder ticks into the spindle position
//! 3. discount whole revolutions wound up against a stop
//! 4. run the active mode
//! 5. run the constant-rate generator, then let every axis take at most
//!    one step
//! 6. check the travel watchdog
//!
//! A tick that cannot get the motion lock in time is skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;

use crate::axis::AxisId;
use crate::clock::Clock;
use crate::error::Result;
use crate::estop::EstopCause;
use crate::machine::{Machine, MotionState};
use crate::modes;
use crate::pulse::{PulseScheduler, StepOutputs};
use crate::settings::{SettingChange, SettingsHandle, SettingsTransaction};

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Full tick.
    Ran,
    /// Motion lock was busy.
    Skipped,
    /// Emergency stop is latched; nothing moves.
    Halted,
}

/// Owns the step outputs and drives the machine.
pub struct ControlLoop<O: StepOutputs, C: Clock> {
    machine: Arc<Machine>,
    changes: Receiver<SettingChange>,
    staged: SettingsTransaction,
    outputs: [O; 3],
    clock: C,
    scheduler: PulseScheduler,
}

impl<O: StepOutputs, C: Clock> ControlLoop<O, C> {
    /// Control loop for `machine` with outputs in Z, X, C order, plus the
    /// handle used to request setting changes.
    pub fn new(machine: Arc<Machine>, outputs: [O; 3], clock: C) -> (Self, SettingsHandle) {
        let (tx, rx) = mpsc::channel();
        let handle = SettingsHandle::new(tx, Arc::clone(&machine));
        let scheduler = PulseScheduler::new(&machine.config().timing);
        let control = Self {
            machine,
            changes: rx,
            staged: SettingsTransaction::new(),
            outputs,
            clock,
            scheduler,
        };
        (control, handle)
    }

    /// Shared machine.
    #[inline]
    pub fn machine(&self) -> &Arc<Machine> {
        &self.machine
    }

    /// Outputs in Z, X, C order.
    #[inline]
    pub fn outputs(&self) -> &[O; 3] {
        &self.outputs
    }

    /// One control-loop iteration.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        while let Ok(change) = self.changes.try_recv() {
            self.staged.stage(change);
        }

        if self.machine.estop().is_latched() {
            self.halt();
            return Ok(TickOutcome::Halted);
        }

        let machine = Arc::clone(&self.machine);
        let Some(mut motion) = machine.try_motion() else {
            return Ok(TickOutcome::Skipped);
        };
        let now = self.clock.now_us();

        self.staged.apply(&machine, &mut motion);
        track_spindle(&machine, &mut motion, now);
        machine.discount_full_turns(&mut motion);
        modes::run(&machine, &mut motion);
        self.step_axes(&machine, &mut motion, now)?;
        drop(motion);

        self.check_travel();
        Ok(TickOutcome::Ran)
    }

    /// Tick until `shutdown` is set or the emergency stop latches.
    ///
    /// An output failure latches the emergency stop.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        while !shutdown.load(Ordering::Acquire) {
            match self.tick() {
                Ok(TickOutcome::Halted) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "output failure");
                    self.machine.emergency_stop(EstopCause::Input);
                }
            }
            std::thread::yield_now();
        }
    }

    fn step_axes(&mut self, machine: &Machine, motion: &mut MotionState, now: u64) -> Result<()> {
        let async_axis = motion.mode.async_axis();
        for (id, out) in AxisId::ALL.into_iter().zip(self.outputs.iter_mut()) {
            let axis = machine.axis(id);
            let Some(mut state) = axis.try_state() else {
                continue;
            };
            self.scheduler.sync_enable(axis.params(), &mut state, now, out)?;
            if id == async_axis
                && motion.async_gen.is_enabled()
                && self.scheduler.ready(&state, now)
            {
                motion.async_gen.tick(axis.params(), &mut state, now, out)?;
            }
            self.scheduler.advance(axis.params(), &mut state, now, out)?;
        }
        Ok(())
    }

    /// Latch on any axis whose outstanding work exceeds its travel.
    fn check_travel(&self) {
        for axis in self.machine.axes() {
            let pending = axis.pending().abs();
            if axis.params().active && pending > axis.params().estop_steps {
                tracing::error!(axis = %axis.id(), pending, "travel limit exceeded");
                self.machine.emergency_stop(EstopCause::TravelLimit);
                return;
            }
        }
    }

    /// Stop everything the loop controls after an emergency stop.
    fn halt(&mut self) {
        if let Some(mut motion) = self.machine.try_motion() {
            if motion.running || motion.async_gen.is_enabled() {
                motion.async_gen.set_enabled(false);
                motion.running = false;
            }
        }
        for axis in self.machine.axes() {
            if let Some(mut state) = axis.try_state() {
                state.pending_pos = 0;
                state.continuous = false;
            }
        }
    }
}

/// Fold drained encoder ticks into the spindle tracker and refresh the RPM.
fn track_spindle(machine: &Machine, motion: &mut MotionState, now: u64) {
    let delta = machine.encoder().drain();
    let gearing = motion.gearing();
    let pitch_axis = machine.axis(motion.mode.pitch_axis());
    let snapped = motion.spindle.apply(delta, now, || {
        gearing.spindle_from_pos(pitch_axis.params(), pitch_axis.snapshot().pos())
    });
    if snapped {
        tracing::debug!(spindle = motion.spindle.pos(), "spindle in sync");
    }
    motion.rpm = motion.spindle.rpm(now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MachineConfig;
    use crate::pulse::Recorder;
    use std::cell::Cell;

    struct FakeClock(Cell<u64>);

    impl Clock for FakeClock {
        fn now_us(&self) -> u64 {
            let now = self.0.get();
            self.0.set(now + 1_000);
            now
        }
    }

    fn control() -> (ControlLoop<Recorder, FakeClock>, SettingsHandle) {
        let mut config = MachineConfig::default();
        config.timing.enable_lead_ms = 0;
        let machine = Arc::new(Machine::new(config).unwrap());
        let outputs = [Recorder::default(), Recorder::default(), Recorder::default()];
        ControlLoop::new(machine, outputs, FakeClock(Cell::new(1_000_000)))
    }

    #[test]
    fn test_settings_applied_on_tick() {
        let (mut control, handle) = control();
        handle.set_starts(3);
        assert_eq!(control.machine().motion().starts(), 1);
        assert_eq!(control.tick().unwrap(), TickOutcome::Ran);
        assert_eq!(control.machine().motion().starts(), 3);
    }

    #[test]
    fn test_skips_when_motion_lock_busy() {
        let (mut control, _handle) = control();
        let machine = Arc::clone(control.machine());
        let _held = machine.motion();
        assert_eq!(control.tick().unwrap(), TickOutcome::Skipped);
    }

    #[test]
    fn test_estop_halts_stepping() {
        let (mut control, _handle) = control();
        control.machine().axis(AxisId::X).request_move(100, false);
        control.tick().unwrap();
        control.tick().unwrap();
        let stepped = control.outputs()[1].steps.len();
        assert!(stepped > 0);

        control.machine().emergency_stop(EstopCause::Input);
        for _ in 0..100 {
            assert_eq!(control.tick().unwrap(), TickOutcome::Halted);
        }
        assert_eq!(control.outputs()[1].steps.len(), stepped);
    }

    #[test]
    fn test_travel_watchdog() {
        let (mut control, _handle) = control();
        let machine = Arc::clone(control.machine());
        let limit = machine.axis(AxisId::Z).params().estop_steps;
        machine.axis(AxisId::Z).request_move(limit + 10, false);
        control.tick().unwrap();
        assert_eq!(machine.estop().cause(), Some(EstopCause::TravelLimit));
    }

    #[test]
    fn test_gearbox_follows_spindle() {
        let (mut control, handle) = control();
        let machine = Arc::clone(control.machine());
        handle.set_pitch(crate::config::DeciMicrons(1000));
        handle.set_running(true);
        control.tick().unwrap();
        machine.encoder().add(1024);
        for _ in 0..2000 {
            control.tick().unwrap();
        }
        let z = machine.axis(AxisId::Z).snapshot();
        // One revolution at 0.1 mm, 400 steps per 5386 du.
        assert_eq!(z.pos(), 74);
        assert!(z.is_idle());
    }
}
