//! Shared machine state.
//!
//! Lock order: the global motion lock may be held while taking axis locks,
//! never the other way round. The emergency stop takes neither for longer
//! than a bounded try.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::axis::{Axis, AxisId};
use crate::config::{validate_config, AxisConfig, DeciMicrons, MachineConfig, MeasureUnit};
use crate::error::{ConfigError, Error, Result};
use crate::estop::{EmergencyStop, EstopCause};
use crate::manual::HandwheelCounter;
use crate::modes::{Mode, OpProgress};
use crate::pulse::AsyncGenerator;
use crate::spindle::{Gearing, SpindleEncoder, SpindleTracker};

/// Pass count restored by a reset.
pub const DEFAULT_TURN_PASSES: u32 = 3;

/// Everything guarded by the global motion lock.
#[derive(Debug, Clone)]
pub struct MotionState {
    pub(crate) spindle: SpindleTracker,
    pub(crate) pitch: i64,
    pub(crate) starts: u32,
    pub(crate) cone_ratio: f32,
    pub(crate) turn_passes: u32,
    pub(crate) aux_forward: bool,
    pub(crate) mode: Mode,
    pub(crate) running: bool,
    pub(crate) measure: MeasureUnit,
    pub(crate) move_step: DeciMicrons,
    pub(crate) progress: OpProgress,
    pub(crate) async_gen: AsyncGenerator,
    pub(crate) rpm: u32,
}

impl MotionState {
    /// Power-on state.
    pub fn new(config: &MachineConfig) -> Self {
        Self {
            spindle: SpindleTracker::new(
                config.encoder.steps_per_revolution,
                config.encoder.backlash,
            ),
            pitch: 0,
            starts: 1,
            cone_ratio: 1.0,
            turn_passes: DEFAULT_TURN_PASSES,
            aux_forward: true,
            mode: Mode::Normal,
            running: false,
            measure: MeasureUnit::Metric,
            move_step: MeasureUnit::Metric.coarse_move_step(),
            progress: OpProgress::default(),
            async_gen: AsyncGenerator::new(),
            rpm: 0,
        }
    }

    /// Spindle-to-axis coupling for the current pitch and starts.
    pub fn gearing(&self) -> Gearing {
        Gearing::new(self.pitch, self.starts, self.spindle.encoder_steps())
    }

    /// Spindle tracker.
    #[inline]
    pub fn spindle(&self) -> &SpindleTracker {
        &self.spindle
    }

    /// Current mode.
    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Operation is running.
    #[inline]
    pub fn running(&self) -> bool {
        self.running
    }

    /// Pitch in deci-microns per revolution (per second in async modes).
    #[inline]
    pub fn pitch(&self) -> i64 {
        self.pitch
    }

    /// Thread starts.
    #[inline]
    pub fn starts(&self) -> u32 {
        self.starts
    }

    /// Manual move step.
    #[inline]
    pub fn move_step(&self) -> DeciMicrons {
        self.move_step
    }

    /// Display unit.
    #[inline]
    pub fn measure(&self) -> MeasureUnit {
        self.measure
    }

    /// Spindle speed as of the last tick.
    #[inline]
    pub fn rpm(&self) -> u32 {
        self.rpm
    }

    /// Multi-pass progress.
    #[inline]
    pub fn progress(&self) -> OpProgress {
        self.progress
    }
}

/// The machine: axes, spindle, shared motion state and the emergency latch.
#[derive(Debug)]
pub struct Machine {
    config: MachineConfig,
    axes: [Axis; 3],
    encoder: SpindleEncoder,
    handwheels: [HandwheelCounter; 2],
    motion: Mutex<MotionState>,
    motion_timeout: Duration,
    estop: EmergencyStop,
    alert: AtomicBool,
}

impl Machine {
    /// Build a machine from a validated configuration.
    ///
    /// A missing C axis is filled in as an inactive rotary axis.
    pub fn new(config: MachineConfig) -> Result<Self> {
        validate_config(&config)?;

        let axis_timeout = Duration::from_micros(config.timing.axis_lock_timeout_us as u64);
        let build = |id: AxisId| -> Result<Axis> {
            match config.axis(id) {
                Some(axis) => Ok(Axis::new(id, axis, axis_timeout)),
                None if id == AxisId::C => {
                    let mut c = AxisConfig::stock_c();
                    c.active = false;
                    Ok(Axis::new(id, &c, axis_timeout))
                }
                None => Err(Error::Config(ConfigError::MissingAxis(id))),
            }
        };
        let axes = [build(AxisId::Z)?, build(AxisId::X)?, build(AxisId::C)?];

        let half_backlash = config.handwheel.half_backlash;
        let motion = MotionState::new(&config);
        tracing::info!(
            encoder_steps = config.encoder.steps_per_revolution,
            c_active = axes[2].params().active,
            "machine initialised"
        );

        Ok(Self {
            motion_timeout: Duration::from_micros(config.timing.motion_lock_timeout_us as u64),
            config,
            axes,
            encoder: SpindleEncoder::new(),
            handwheels: [
                HandwheelCounter::new(half_backlash),
                HandwheelCounter::new(half_backlash),
            ],
            motion: Mutex::new(motion),
            estop: EmergencyStop::new(),
            alert: AtomicBool::new(false),
        })
    }

    /// Configuration the machine was built from.
    #[inline]
    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// One axis.
    #[inline]
    pub fn axis(&self, id: AxisId) -> &Axis {
        &self.axes[id.index()]
    }

    /// All axes in Z, X, C order.
    #[inline]
    pub fn axes(&self) -> &[Axis; 3] {
        &self.axes
    }

    /// Spindle encoder accumulator.
    #[inline]
    pub fn encoder(&self) -> &SpindleEncoder {
        &self.encoder
    }

    /// Handwheel counter in `slot` (0 or 1).
    pub fn handwheel(&self, slot: usize) -> Option<&HandwheelCounter> {
        self.handwheels.get(slot)
    }

    /// Handwheel counter wired to `id`.
    pub fn handwheel_for(&self, id: AxisId) -> Option<&HandwheelCounter> {
        self.config
            .handwheel_for(id)
            .and_then(|slot| self.handwheels.get(slot))
    }

    /// Emergency latch.
    #[inline]
    pub fn estop(&self) -> &EmergencyStop {
        &self.estop
    }

    /// Latch the emergency stop and drop all outstanding work.
    ///
    /// Axis locks are only tried: a holder that keeps one sees the latch and
    /// stops on its own.
    pub fn emergency_stop(&self, cause: EstopCause) {
        if !self.estop.trigger(cause) {
            return;
        }
        for axis in &self.axes {
            if let Some(mut state) = axis.try_state() {
                state.pending_pos = 0;
                state.continuous = false;
            }
        }
    }

    /// Flag an operator-visible alert.
    pub fn raise_alert(&self) {
        self.alert.store(true, Ordering::Release);
    }

    /// Consume the alert flag.
    pub fn take_alert(&self) -> bool {
        self.alert.swap(false, Ordering::AcqRel)
    }

    /// Take the global motion lock, giving up after the configured timeout.
    pub fn try_motion(&self) -> Option<MutexGuard<'_, MotionState>> {
        self.motion.try_lock_for(self.motion_timeout)
    }

    /// Take the global motion lock, waiting as long as needed.
    pub fn motion(&self) -> MutexGuard<'_, MotionState> {
        self.motion.lock()
    }

    /// Current mode and run flag.
    pub fn status(&self) -> (Mode, bool) {
        let motion = self.motion.lock();
        (motion.mode, motion.running)
    }

    /// Both stops are set on every axis `mode` needs bounded.
    pub fn stops_ready(&self, mode: Mode) -> bool {
        let bounded = |id: AxisId| self.axis(id).snapshot().stops().both_set();
        (!mode.needs_z_stops() || bounded(AxisId::Z)) && (!mode.needs_x_stops() || bounded(AxisId::X))
    }

    /// Re-base every axis and the spindle to zero.
    ///
    /// An axis whose lock times out raises the alert and is re-based once
    /// its holder lets go, so axes and spindle always move to the new origin
    /// together.
    pub(crate) fn mark_origin_all(&self, motion: &mut MotionState) {
        for axis in &self.axes {
            if !axis.mark_origin() {
                tracing::warn!(axis = %axis.id(), "axis busy during origin mark");
                self.raise_alert();
                axis.state().mark_origin();
            }
        }
        motion.spindle.zero();
    }

    /// Start or stop the current operation.
    ///
    /// Stopping leaves `moving_manually` alone: the manual mover that set it
    /// clears it when its move ends.
    pub(crate) fn set_running(&self, motion: &mut MotionState, on: bool) {
        if motion.running == on {
            return;
        }
        motion.running = on;
        if on {
            motion.progress = OpProgress::start(motion.pitch);
            self.mark_origin_all(motion);
            for axis in &self.axes {
                axis.hold_enable(true);
            }
            if motion.mode.is_async() {
                self.configure_async(motion);
            }
            motion.async_gen.set_enabled(motion.mode.is_async());
            tracing::info!(mode = ?motion.mode, pitch = motion.pitch, "started");
        } else {
            motion.progress = OpProgress::default();
            motion.async_gen.set_enabled(false);
            for axis in &self.axes {
                let mut state = axis.state();
                state.hold_enable(axis.params(), false);
                state.continuous = false;
            }
            tracing::info!(mode = ?motion.mode, "stopped");
        }
    }

    /// Switch mode, stopping any running operation first.
    pub(crate) fn set_mode(&self, motion: &mut MotionState, mode: Mode) {
        if motion.mode == mode {
            return;
        }
        self.set_running(motion, false);
        let previous = motion.mode;
        motion.mode = mode;
        motion.progress = OpProgress::default();
        if previous == Mode::Thread && motion.starts != 1 {
            motion.starts = 1;
            self.mark_origin_all(motion);
        }
        if mode.is_async() {
            self.configure_async(motion);
        }
        tracing::info!(from = ?previous, to = ?mode, "mode changed");
    }

    /// Point the constant-rate generator at the current pitch.
    pub(crate) fn configure_async(&self, motion: &mut MotionState) {
        let axis = self.axis(motion.mode.async_axis());
        motion.async_gen.configure(axis.params(), motion.pitch);
    }

    /// Drop whole revolutions the spindle made while the pitch axis sat on a
    /// stop, so that it leaves the stop on the next revolution.
    pub(crate) fn discount_full_turns(&self, motion: &mut MotionState) {
        if motion.pitch == 0 || !matches!(motion.mode, Mode::Normal | Mode::Cone) {
            return;
        }
        let axis = self.axis(motion.mode.pitch_axis());
        let state = axis.snapshot();
        if !state.is_idle() {
            return;
        }
        let gearing = motion.gearing();
        let stops = state.stops();
        let (stop, toward_left) = if stops.left == Some(state.pos()) {
            (state.pos(), true)
        } else if stops.right == Some(state.pos()) {
            (state.pos(), false)
        } else {
            return;
        };
        let stop_spindle = gearing.spindle_from_pos(axis.params(), stop);
        motion.spindle.discount_full_turns(&gearing, stop_spindle, toward_left);
    }

    /// Return to power-on settings and forget all stops and origins.
    pub(crate) fn reset(&self, motion: &mut MotionState) {
        self.set_running(motion, false);
        self.set_mode(motion, Mode::Normal);
        for axis in &self.axes {
            axis.state().reset();
        }
        motion.pitch = 0;
        motion.starts = 1;
        motion.cone_ratio = 1.0;
        motion.turn_passes = DEFAULT_TURN_PASSES;
        motion.aux_forward = true;
        motion.measure = MeasureUnit::Metric;
        motion.move_step = MeasureUnit::Metric.coarse_move_step();
        motion.spindle.zero();
        tracing::info!("settings reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::StopSide;

    fn machine() -> Machine {
        Machine::new(MachineConfig::default()).unwrap()
    }

    #[test]
    fn test_missing_c_is_inactive() {
        let mut config = MachineConfig::default();
        let mut axes = heapless::FnvIndexMap::new();
        for id in [AxisId::Z, AxisId::X] {
            let axis = config.axis(id).unwrap().clone();
            axes.insert(heapless::String::try_from(id.key()).unwrap(), axis)
                .unwrap();
        }
        config.axes = axes;
        let machine = Machine::new(config).unwrap();
        assert!(!machine.axis(AxisId::C).params().active);
    }

    #[test]
    fn test_start_marks_origin_and_snapshots_pitch() {
        let machine = machine();
        let mut motion = machine.motion();
        machine.axis(AxisId::Z).state().pos = 120;
        motion.pitch = -500;
        machine.set_running(&mut motion, true);
        assert!(motion.running);
        assert_eq!(motion.progress.pitch_sign, -1);
        assert_eq!(motion.progress.pitch, -500);
        let z = machine.axis(AxisId::Z).snapshot();
        assert_eq!(z.pos(), 0);
        assert_eq!(z.origin_pos(), 120);
    }

    #[test]
    fn test_origin_mark_waits_for_busy_axis() {
        let machine = machine();
        machine.axis(AxisId::Z).state().pos = 5000;
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        std::thread::scope(|s| {
            let m = &machine;
            s.spawn(move || {
                let _guard = m.axis(AxisId::Z).state();
                locked_tx.send(()).unwrap();
                std::thread::sleep(Duration::from_millis(50));
            });
            locked_rx.recv().unwrap();

            let mut motion = machine.motion();
            motion.spindle.snap_to(70_000);
            let mut txn = crate::settings::SettingsTransaction::new();
            txn.stage(crate::settings::SettingChange::Pitch(1000));
            txn.apply(&machine, &mut motion);
            assert_eq!(motion.spindle.pos(), 0);
            assert!(machine.take_alert());
        });

        let z = machine.axis(AxisId::Z).snapshot();
        assert_eq!(z.pos(), 0);
        assert_eq!(z.origin_pos(), 5000);
        // The gearbox now holds Z where it is.
        let motion = machine.motion();
        let target = motion.gearing().pos_from_spindle(
            machine.axis(AxisId::Z).params(),
            &z.stops(),
            motion.spindle.avg(),
            true,
        );
        assert_eq!(target, z.pos());
    }

    #[test]
    fn test_leaving_thread_resets_starts() {
        let machine = machine();
        let mut motion = machine.motion();
        machine.set_mode(&mut motion, Mode::Thread);
        motion.starts = 4;
        machine.set_running(&mut motion, true);
        machine.set_mode(&mut motion, Mode::Turn);
        assert!(!motion.running);
        assert_eq!(motion.starts, 1);
    }

    #[test]
    fn test_async_generator_follows_run_flag() {
        let machine = machine();
        let mut motion = machine.motion();
        motion.pitch = 10_000;
        machine.set_mode(&mut motion, Mode::Async);
        assert!(!motion.async_gen.is_enabled());
        machine.set_running(&mut motion, true);
        assert!(motion.async_gen.is_enabled());
        assert!(motion.async_gen.period_us() > 0);
        machine.set_running(&mut motion, false);
        assert!(!motion.async_gen.is_enabled());
    }

    #[test]
    fn test_stops_ready() {
        let machine = machine();
        assert!(machine.stops_ready(Mode::Normal));
        assert!(!machine.stops_ready(Mode::Cut));
        {
            let mut x = machine.axis(AxisId::X).state();
            x.set_stop(StopSide::Left, Some(100));
            x.set_stop(StopSide::Right, Some(-100));
        }
        assert!(machine.stops_ready(Mode::Cut));
        assert!(!machine.stops_ready(Mode::Turn));
    }

    #[test]
    fn test_emergency_stop_drops_pending() {
        let machine = machine();
        machine.axis(AxisId::X).request_move(500, true);
        machine.emergency_stop(EstopCause::Input);
        assert!(machine.estop().is_latched());
        assert_eq!(machine.axis(AxisId::X).pending(), 0);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let machine = machine();
        let mut motion = machine.motion();
        motion.pitch = 1234;
        motion.turn_passes = 9;
        machine.axis(AxisId::Z).state().set_stop(StopSide::Left, Some(5));
        machine.set_mode(&mut motion, Mode::Cone);
        machine.reset(&mut motion);
        assert_eq!(motion.pitch, 0);
        assert_eq!(motion.turn_passes, DEFAULT_TURN_PASSES);
        assert_eq!(motion.mode, Mode::Normal);
        assert_eq!(machine.axis(AxisId::Z).snapshot().stops().left, None);
    }
}
