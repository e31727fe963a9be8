//! Multi-pass turning, facing and threading.
//!
//! One pass is five steps: approach with a one-step overshoot, move to the
//! pass depth, wait for the spindle angle of this start, cut geared to the
//! spindle, then retract and return.

use crate::axis::{Axis, AxisId, Stops};
use crate::machine::{Machine, MotionState};

use super::{arrived, check_pass_preconditions, complete, drive, Cap, Mode};

const APPROACH: u32 = 0;
const DEPTH: u32 = 1;
const SYNC: u32 = 2;
const CUT: u32 = 3;
const RETURN: u32 = 4;

/// Start and end positions of one axis of a pass, read from its stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Span {
    pub start: i64,
    pub end: i64,
}

impl Span {
    /// Start on the right stop when `from_right`, otherwise on the left one.
    /// Both stops must be set.
    pub fn from_stops(stops: Stops, from_right: bool) -> Option<Self> {
        let (left, right) = (stops.left?, stops.right?);
        Some(if from_right {
            Span { start: right, end: left }
        } else {
            Span { start: left, end: right }
        })
    }

    /// Direction from start to end, `1` when they coincide.
    pub fn direction(&self) -> i64 {
        if self.end < self.start {
            -1
        } else {
            1
        }
    }

    /// Position `num / den` of the way from start to end.
    pub fn at(&self, num: i64, den: i64) -> i64 {
        if den == 0 {
            return self.end;
        }
        self.start + (self.end - self.start) * num / den
    }
}

/// Main (cutting) axis and cross (depth) axis for a pass mode.
fn roles(mode: Mode) -> (AxisId, AxisId) {
    match mode {
        Mode::Face => (AxisId::X, AxisId::Z),
        _ => (AxisId::Z, AxisId::X),
    }
}

/// Spindle ticks to wait past a revolution boundary before cutting start
/// `start_index` of `starts`.
pub(crate) fn start_offset(encoder_steps: i64, starts: u32, start_index: u32) -> i64 {
    (encoder_steps as f64 / starts as f64 * start_index as f64).round() as i64
}

pub(super) fn run(machine: &Machine, motion: &mut MotionState) {
    if !check_pass_preconditions(machine, motion) {
        return;
    }
    let (main_id, cross_id) = roles(motion.mode);
    let main = machine.axis(main_id);
    let cross = machine.axis(cross_id);
    let main_state = main.snapshot();
    let cross_state = cross.snapshot();
    let (Some(main_span), Some(cross_span)) = (
        Span::from_stops(main_state.stops(), motion.progress.pitch_sign > 0),
        Span::from_stops(cross_state.stops(), motion.aux_forward),
    ) else {
        return;
    };

    let starts = if motion.mode == Mode::Thread {
        motion.starts.max(1)
    } else {
        1
    };
    let passes = motion.turn_passes;
    let total = passes * starts;

    if motion.progress.index == 0 {
        motion.progress.index = 1;
        motion.progress.sub_index = APPROACH;
    }
    if motion.progress.advance_requested {
        motion.progress.advance_requested = false;
        if motion.progress.index + starts <= total {
            motion.progress.index += starts;
            tracing::debug!(index = motion.progress.index, "pass advanced");
        }
    }

    if motion.progress.index > total {
        finish(machine, motion, main, cross, main_span, cross_span);
        return;
    }

    let index = motion.progress.index;
    let depth = (index - 1) / starts + 1;
    let cross_target = cross_span.at(depth as i64, passes as i64);

    match motion.progress.sub_index {
        APPROACH => {
            let overshoot = main_span.start - main_span.direction();
            drive(main, overshoot, Cap::Manual);
            drive(cross, cross_span.start, Cap::Manual);
            if arrived(&main_state, overshoot) && arrived(&cross_state, cross_span.start) {
                motion.progress.sub_index = DEPTH;
            }
        }
        DEPTH => {
            drive(main, main_span.start, Cap::Manual);
            drive(cross, cross_target, Cap::Manual);
            if arrived(&main_state, main_span.start) && arrived(&cross_state, cross_target) {
                motion.progress.sub_index = SYNC;
                motion.progress.sync_armed = false;
            }
        }
        SYNC => {
            if !motion.progress.sync_armed {
                let gearing = motion.gearing();
                let offset =
                    start_offset(motion.spindle.encoder_steps(), starts, (index - 1) % starts);
                let sync = gearing.modulo(motion.spindle.global() + offset);
                motion.spindle.start_sync(sync);
                motion.progress.sync_armed = true;
                tracing::debug!(index, sync, "waiting for spindle angle");
                return;
            }
            if motion.spindle.sync() != 0 {
                return;
            }
            // Keep whatever the spindle overshot the boundary by.
            let gearing = motion.gearing();
            let carry = motion.spindle.avg()
                - gearing.spindle_from_pos(main.params(), main_state.pos());
            machine.mark_origin_all(motion);
            motion.spindle.snap_to(carry);
            motion.progress.sync_armed = false;
            motion.progress.sub_index = CUT;
        }
        CUT => {
            if main_state.moving_manually() {
                return;
            }
            let target = motion.gearing().pos_from_spindle(
                main.params(),
                &main_state.stops(),
                motion.spindle.avg(),
                true,
            );
            drive(main, target, Cap::Unlimited);
            drive(cross, cross_target, Cap::Manual);
            if arrived(&main_state, main_span.end) {
                motion.progress.sub_index = RETURN;
            }
        }
        RETURN => {
            let safe = cross.params().du_to_steps(machine.config().operation.safe_distance);
            let away = -cross_span.direction();
            let retract = cross_target + away * safe;
            if main_state.pos() != main_span.start {
                if !arrived(&cross_state, retract) {
                    drive(cross, retract, Cap::Manual);
                    return;
                }
                drive(main, main_span.start, Cap::Manual);
                return;
            }
            if !main_state.is_idle() || !cross_state.is_idle() {
                return;
            }
            motion.progress.index += 1;
            motion.progress.sub_index = APPROACH;
            if motion.progress.index <= total {
                tracing::debug!(index = motion.progress.index, total, "next pass");
            }
        }
        _ => motion.progress.sub_index = APPROACH,
    }
}

/// Bring both axes back to their start stops, then stop.
fn finish(
    machine: &Machine,
    motion: &mut MotionState,
    main: &Axis,
    cross: &Axis,
    main_span: Span,
    cross_span: Span,
) {
    let main_state = main.snapshot();
    let cross_state = cross.snapshot();
    if !arrived(&cross_state, cross_span.start) {
        drive(cross, cross_span.start, Cap::Manual);
        return;
    }
    if !arrived(&main_state, main_span.start) {
        drive(main, main_span.start, Cap::Manual);
        return;
    }
    complete(machine, motion);
}
