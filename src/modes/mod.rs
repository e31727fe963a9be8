//! Operating modes and the per-mode motion state machines.
//!
//! Every tick the active mode re-derives its start and end positions from the
//! current stops. Origin marks shift stops under a running operation, so
//! nothing positional is cached between ticks.

mod cone;
mod cut;
mod ellipse;
mod gearbox;
mod turn;

use serde::{Deserialize, Serialize};

use crate::axis::{Axis, AxisId, AxisState};
use crate::machine::{Machine, MotionState};

/// Operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Plain thread-following gearbox.
    #[default]
    Normal,
    /// Constant-rate feed independent of the spindle.
    Async,
    /// Simultaneous two-axis taper.
    Cone,
    /// Multi-pass turning along Z.
    Turn,
    /// Multi-pass facing along X.
    Face,
    /// Multi-pass plunge along X.
    Cut,
    /// Multi-pass, multi-start threading along Z.
    Thread,
    /// Multi-pass quarter-ellipse profile.
    Ellipse,
    /// Externally commanded linear moves.
    Command,
    /// Constant-rate feed of the auxiliary rotary axis.
    Divider,
}

impl Mode {
    /// All modes.
    pub const ALL: [Mode; 10] = [
        Mode::Normal,
        Mode::Async,
        Mode::Cone,
        Mode::Turn,
        Mode::Face,
        Mode::Cut,
        Mode::Thread,
        Mode::Ellipse,
        Mode::Command,
        Mode::Divider,
    ];

    /// Multi-pass operation with a pass counter.
    pub fn is_pass_mode(self) -> bool {
        matches!(
            self,
            Mode::Turn | Mode::Face | Mode::Cut | Mode::Thread | Mode::Ellipse
        )
    }

    /// Driven by the constant-rate generator.
    pub fn is_async(self) -> bool {
        matches!(self, Mode::Async | Mode::Divider)
    }

    /// Axis geared to the spindle.
    pub fn pitch_axis(self) -> AxisId {
        match self {
            Mode::Face => AxisId::X,
            _ => AxisId::Z,
        }
    }

    /// Axis driven by the constant-rate generator.
    pub fn async_axis(self) -> AxisId {
        match self {
            Mode::Divider => AxisId::C,
            _ => AxisId::Z,
        }
    }

    /// Both Z stops must be set before running.
    pub fn needs_z_stops(self) -> bool {
        matches!(self, Mode::Turn | Mode::Face | Mode::Thread | Mode::Ellipse)
    }

    /// Both X stops must be set before running.
    pub fn needs_x_stops(self) -> bool {
        self.is_pass_mode()
    }

    /// Stable numeric code used by the persisted-state record.
    pub fn code(self) -> i64 {
        match self {
            Mode::Normal => 0,
            Mode::Async => 2,
            Mode::Cone => 3,
            Mode::Turn => 4,
            Mode::Face => 5,
            Mode::Cut => 6,
            Mode::Thread => 7,
            Mode::Ellipse => 8,
            Mode::Command => 9,
            Mode::Divider => 10,
        }
    }

    /// Inverse of [`Mode::code`].
    pub fn from_code(code: i64) -> Option<Self> {
        Mode::ALL.into_iter().find(|m| m.code() == code)
    }
}

/// Progress of a multi-pass operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpProgress {
    /// Pass counter, 0 during setup.
    pub index: u32,
    /// Step within the current pass.
    pub sub_index: u32,
    /// Pitch sign when the operation started.
    pub pitch_sign: i64,
    /// Pitch when the operation started.
    pub pitch: i64,
    /// Operator asked to move on to the next depth.
    pub advance_requested: bool,
    pub(crate) sync_armed: bool,
}

impl OpProgress {
    /// Fresh progress for an operation started at `pitch`.
    pub fn start(pitch: i64) -> Self {
        Self {
            pitch_sign: if pitch >= 0 { 1 } else { -1 },
            pitch,
            ..Self::default()
        }
    }
}

/// Speed cap for a mode-driven move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cap {
    /// Manual move speed, for positioning.
    Manual,
    /// Only the acceleration ramp limits speed, for spindle coupling.
    Unlimited,
}

/// Point `axis` at `target`. Axes under manual control are left alone.
pub(crate) fn drive(axis: &Axis, target: i64, cap: Cap) -> bool {
    let Some(mut state) = axis.try_state() else {
        return false;
    };
    if state.moving_manually() {
        return false;
    }
    match cap {
        Cap::Manual => state.set_speed_max(axis.params().ramp.manual),
        Cap::Unlimited => state.clear_speed_max(),
    }
    state.request_move(axis.params(), target, false);
    true
}

/// Tool sits on `target` with nothing left to issue.
#[inline]
pub(crate) fn arrived(state: &AxisState, target: i64) -> bool {
    state.pos() == target && state.is_idle()
}

/// Stop the operation and sound the alert.
pub(crate) fn self_stop(machine: &Machine, motion: &mut MotionState, reason: &'static str) {
    tracing::warn!(mode = ?motion.mode, reason, "operation stopped");
    machine.raise_alert();
    machine.set_running(motion, false);
}

/// Finish the operation normally.
pub(crate) fn complete(machine: &Machine, motion: &mut MotionState) {
    tracing::info!(mode = ?motion.mode, passes = motion.progress.index, "operation complete");
    machine.raise_alert();
    machine.set_running(motion, false);
}

/// Shared guards of the pass modes. Returns `false` after self-stopping.
pub(crate) fn check_pass_preconditions(machine: &Machine, motion: &mut MotionState) -> bool {
    let mode = motion.mode;
    if motion.pitch == 0 {
        self_stop(machine, motion, "pitch is zero");
        return false;
    }
    if motion.turn_passes == 0 {
        self_stop(machine, motion, "pass count is zero");
        return false;
    }
    let sign = if motion.pitch > 0 { 1 } else { -1 };
    if sign != motion.progress.pitch_sign {
        self_stop(machine, motion, "pitch sign changed");
        return false;
    }
    if !machine.stops_ready(mode) {
        self_stop(machine, motion, "stops not set");
        return false;
    }
    true
}

/// Run the active mode for one tick.
pub(crate) fn run(machine: &Machine, motion: &mut MotionState) {
    if !motion.running {
        return;
    }
    match motion.mode {
        Mode::Normal => gearbox::run(machine, motion),
        Mode::Turn | Mode::Face | Mode::Thread => turn::run(machine, motion),
        Mode::Cut => cut::run(machine, motion),
        Mode::Cone => cone::run(machine, motion),
        Mode::Ellipse => ellipse::run(machine, motion),
        Mode::Async | Mode::Divider | Mode::Command => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_codes_roundtrip() {
        for mode in Mode::ALL {
            assert_eq!(Mode::from_code(mode.code()), Some(mode));
        }
        assert_eq!(Mode::from_code(1), None);
    }

    #[test]
    fn test_axis_roles() {
        assert_eq!(Mode::Face.pitch_axis(), AxisId::X);
        assert_eq!(Mode::Thread.pitch_axis(), AxisId::Z);
        assert_eq!(Mode::Divider.async_axis(), AxisId::C);
        assert!(!Mode::Cut.needs_z_stops());
        assert!(Mode::Cut.needs_x_stops());
        assert!(!Mode::Cone.is_pass_mode());
    }

    #[test]
    fn test_progress_start_sign() {
        assert_eq!(OpProgress::start(-5).pitch_sign, -1);
        assert_eq!(OpProgress::start(0).pitch_sign, 1);
    }
}
