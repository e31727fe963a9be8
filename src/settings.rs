//! Deferred settings.
//!
//! Any thread may request a change through a [`SettingsHandle`]. Requests
//! are staged in a [`SettingsTransaction`] and applied by the control loop
//! at the start of its next tick, while it holds the motion lock.

use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::axis::{AxisId, StopSide};
use crate::config::{DeciMicrons, MeasureUnit};
use crate::estop::EstopCause;
use crate::machine::{Machine, MotionState};
use crate::modes::Mode;
use crate::snapshot::MachineSnapshot;

/// One requested change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettingChange {
    /// Pitch in deci-microns per revolution.
    Pitch(i64),
    /// Thread starts.
    Starts(u32),
    /// Set or clear a stop.
    Stop {
        /// Axis.
        axis: AxisId,
        /// Which stop.
        side: StopSide,
        /// New value, `None` to clear.
        value: Option<i64>,
    },
    /// Diameter change per unit length in cone mode.
    ConeRatio(f32),
    /// Pass count of multi-pass modes.
    TurnPasses(u32),
    /// Direction of the cross axis in pass and cone modes.
    AuxForward(bool),
    /// Operating mode.
    Mode(Mode),
    /// Start or stop the operation.
    Running(bool),
    /// Operator enable switch of one axis.
    Disabled {
        /// Axis.
        axis: AxisId,
        /// Switched off.
        disabled: bool,
    },
    /// Display unit.
    Measure(MeasureUnit),
    /// Manual move step.
    MoveStep(DeciMicrons),
    /// Move on to the next depth of a running multi-pass operation.
    AdvancePass,
    /// Back to power-on settings.
    Reset,
}

/// Changes staged between two ticks. Later requests for the same setting
/// replace earlier ones.
#[derive(Debug, Clone, Default)]
pub struct SettingsTransaction {
    reset: bool,
    mode: Option<Mode>,
    pitch: Option<i64>,
    starts: Option<u32>,
    cone_ratio: Option<f32>,
    turn_passes: Option<u32>,
    aux_forward: Option<bool>,
    measure: Option<MeasureUnit>,
    move_step: Option<DeciMicrons>,
    stops: [[Option<Option<i64>>; 2]; 3],
    disabled: [Option<bool>; 3],
    running: Option<bool>,
    advance_pass: bool,
}

fn side_index(side: StopSide) -> usize {
    match side {
        StopSide::Left => 0,
        StopSide::Right => 1,
    }
}

impl SettingsTransaction {
    /// Empty transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Nothing staged.
    pub fn is_empty(&self) -> bool {
        !self.reset
            && self.mode.is_none()
            && self.pitch.is_none()
            && self.starts.is_none()
            && self.cone_ratio.is_none()
            && self.turn_passes.is_none()
            && self.aux_forward.is_none()
            && self.measure.is_none()
            && self.move_step.is_none()
            && self.stops.iter().flatten().all(Option::is_none)
            && self.disabled.iter().all(Option::is_none)
            && self.running.is_none()
            && !self.advance_pass
    }

    /// Stage one change.
    pub fn stage(&mut self, change: SettingChange) {
        match change {
            SettingChange::Pitch(v) => self.pitch = Some(v),
            SettingChange::Starts(v) => self.starts = Some(v),
            SettingChange::Stop { axis, side, value } => {
                self.stops[axis.index()][side_index(side)] = Some(value)
            }
            SettingChange::ConeRatio(v) => self.cone_ratio = Some(v),
            SettingChange::TurnPasses(v) => self.turn_passes = Some(v),
            SettingChange::AuxForward(v) => self.aux_forward = Some(v),
            SettingChange::Mode(v) => self.mode = Some(v),
            SettingChange::Running(v) => self.running = Some(v),
            SettingChange::Disabled { axis, disabled } => {
                self.disabled[axis.index()] = Some(disabled)
            }
            SettingChange::Measure(v) => self.measure = Some(v),
            SettingChange::MoveStep(v) => self.move_step = Some(v),
            SettingChange::AdvancePass => self.advance_pass = true,
            SettingChange::Reset => {
                // A reset supersedes everything staged before it.
                *self = Self {
                    reset: true,
                    ..Self::default()
                }
            }
        }
    }

    /// Apply and clear everything staged. The caller holds the motion lock.
    pub fn apply(&mut self, machine: &Machine, motion: &mut MotionState) {
        let staged = std::mem::take(self);
        if staged.reset {
            machine.reset(motion);
        }
        if let Some(mode) = staged.mode {
            machine.set_mode(motion, mode);
        }
        if let Some(pitch) = staged.pitch {
            apply_pitch(machine, motion, pitch);
        }
        if let Some(starts) = staged.starts {
            let starts = starts.clamp(1, machine.config().operation.starts_max.max(1));
            if starts != motion.starts {
                motion.starts = starts;
                machine.mark_origin_all(motion);
            }
        }
        if let Some(ratio) = staged.cone_ratio {
            if ratio != motion.cone_ratio {
                motion.cone_ratio = ratio;
                machine.mark_origin_all(motion);
            }
        }
        if let Some(passes) = staged.turn_passes {
            motion.turn_passes = passes.min(machine.config().operation.passes_max);
        }
        if let Some(forward) = staged.aux_forward {
            motion.aux_forward = forward;
        }
        if let Some(measure) = staged.measure {
            motion.measure = measure;
        }
        if let Some(step) = staged.move_step {
            motion.move_step = step;
        }
        for id in AxisId::ALL {
            for side in [StopSide::Left, StopSide::Right] {
                if let Some(value) = staged.stops[id.index()][side_index(side)] {
                    apply_stop(machine, motion, id, side, value);
                }
            }
            if let Some(disabled) = staged.disabled[id.index()] {
                machine.axis(id).state().set_disabled(disabled);
            }
        }
        if let Some(on) = staged.running {
            apply_running(machine, motion, on);
        }
        if staged.advance_pass && motion.running {
            motion.progress.advance_requested = true;
        }
    }
}

fn apply_pitch(machine: &Machine, motion: &mut MotionState, pitch: i64) {
    let max = machine.config().operation.pitch_max.value().abs();
    let pitch = pitch.clamp(-max, max);
    if pitch == motion.pitch {
        return;
    }
    motion.pitch = pitch;
    machine.mark_origin_all(motion);
    if motion.mode.is_async() {
        machine.configure_async(motion);
    }
    tracing::debug!(pitch, "pitch changed");
}

fn apply_stop(
    machine: &Machine,
    motion: &mut MotionState,
    id: AxisId,
    side: StopSide,
    value: Option<i64>,
) {
    let axis = machine.axis(id);
    let (old, pos) = {
        let mut state = axis.state();
        let old = state.stops().get(side);
        state.set_stop(side, value);
        (old, state.pos())
    };
    if old == value || old.is_none() {
        return;
    }
    // Leaving a stop.
    if motion.mode == Mode::Cone {
        machine.mark_origin_all(motion);
    } else if motion.mode == Mode::Normal
        && id == motion.mode.pitch_axis()
        && old == Some(pos)
        && motion.pitch != 0
    {
        // The spindle kept turning while the axis sat on the stop; resume on
        // the thread instead of jumping to where the spindle now points.
        let gearing = motion.gearing();
        let sync = gearing
            .modulo(motion.spindle.pos() - gearing.spindle_from_pos(axis.params(), pos));
        motion.spindle.start_sync(sync);
        tracing::debug!(axis = %id, sync, "resyncing after leaving stop");
    }
}

fn apply_running(machine: &Machine, motion: &mut MotionState, on: bool) {
    if on && !motion.running {
        if let Some(reason) = start_refusal(machine, motion) {
            tracing::warn!(mode = ?motion.mode, reason, "start refused");
            machine.raise_alert();
            return;
        }
    }
    machine.set_running(motion, on);
}

/// Why the current mode cannot start, if it cannot.
fn start_refusal(machine: &Machine, motion: &MotionState) -> Option<&'static str> {
    let mode = motion.mode;
    if !machine.stops_ready(mode) {
        return Some("stops not set");
    }
    if mode.is_pass_mode() && (motion.pitch == 0 || motion.turn_passes == 0) {
        return Some("pitch or pass count is zero");
    }
    None
}

/// Cloneable front end for requesting changes from any thread.
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    tx: Sender<SettingChange>,
    machine: Arc<Machine>,
}

impl SettingsHandle {
    pub(crate) fn new(tx: Sender<SettingChange>, machine: Arc<Machine>) -> Self {
        Self { tx, machine }
    }

    /// Machine this handle controls.
    #[inline]
    pub fn machine(&self) -> &Arc<Machine> {
        &self.machine
    }

    /// Stage a change for the next tick. Returns `false` once the control
    /// loop is gone.
    pub fn request(&self, change: SettingChange) -> bool {
        self.tx.send(change).is_ok()
    }

    /// Set pitch in deci-microns per revolution.
    pub fn set_pitch(&self, pitch: DeciMicrons) -> bool {
        self.request(SettingChange::Pitch(pitch.value()))
    }

    /// Set thread starts.
    pub fn set_starts(&self, starts: u32) -> bool {
        self.request(SettingChange::Starts(starts))
    }

    /// Set or clear a stop, in axis steps.
    pub fn set_stop(&self, axis: AxisId, side: StopSide, value: Option<i64>) -> bool {
        self.request(SettingChange::Stop { axis, side, value })
    }

    /// Put a stop where the axis currently is.
    pub fn set_stop_here(&self, axis: AxisId, side: StopSide) -> bool {
        let pos = self.machine.axis(axis).pos();
        self.set_stop(axis, side, Some(pos))
    }

    /// Set cone ratio.
    pub fn set_cone_ratio(&self, ratio: f32) -> bool {
        self.request(SettingChange::ConeRatio(ratio))
    }

    /// Set pass count.
    pub fn set_turn_passes(&self, passes: u32) -> bool {
        self.request(SettingChange::TurnPasses(passes))
    }

    /// Set cross axis direction.
    pub fn set_aux_forward(&self, forward: bool) -> bool {
        self.request(SettingChange::AuxForward(forward))
    }

    /// Switch mode.
    pub fn set_mode(&self, mode: Mode) -> bool {
        self.request(SettingChange::Mode(mode))
    }

    /// Start or stop.
    pub fn set_running(&self, on: bool) -> bool {
        self.request(SettingChange::Running(on))
    }

    /// Operator enable switch.
    pub fn set_disabled(&self, axis: AxisId, disabled: bool) -> bool {
        self.request(SettingChange::Disabled { axis, disabled })
    }

    /// Display unit.
    pub fn set_measure(&self, measure: MeasureUnit) -> bool {
        self.request(SettingChange::Measure(measure))
    }

    /// Manual move step.
    pub fn set_move_step(&self, step: DeciMicrons) -> bool {
        self.request(SettingChange::MoveStep(step))
    }

    /// Move a running multi-pass operation on to its next depth.
    pub fn advance_pass(&self) -> bool {
        self.request(SettingChange::AdvancePass)
    }

    /// Back to power-on settings.
    pub fn reset(&self) -> bool {
        self.request(SettingChange::Reset)
    }

    /// Operator on/off button.
    ///
    /// Refuses to start without the stops the mode needs, turns "on" during a
    /// running turn, face or thread into a pass advance, and treats "off"
    /// during a manual move as an emergency.
    pub fn operator_on_off(&self, on: bool) -> bool {
        let (mode, running) = self.machine.status();
        if on && !running && !self.machine.stops_ready(mode) {
            tracing::warn!(?mode, "stops not set");
            self.machine.raise_alert();
            return false;
        }
        if on && running && matches!(mode, Mode::Turn | Mode::Face | Mode::Thread) {
            return self.advance_pass();
        }
        if !on
            && self
                .machine
                .axes()
                .iter()
                .any(|axis| axis.snapshot().moving_manually())
        {
            self.machine.emergency_stop(EstopCause::OnOffDuringManualMove);
            return false;
        }
        self.set_running(on)
    }

    /// Consume the alert flag.
    pub fn take_alert(&self) -> bool {
        self.machine.take_alert()
    }

    /// Consistent view of the machine.
    pub fn snapshot(&self) -> MachineSnapshot {
        MachineSnapshot::capture(&self.machine)
    }
}
