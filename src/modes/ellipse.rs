//! Multi-pass quarter-ellipse profile.
//!
//! Progress along the arc is the share of this pass's spindle budget used so
//! far; the budget is the spindle travel the main axis would need at the
//! current pitch.

use std::f64::consts::FRAC_PI_2;

use crate::axis::AxisId;
use crate::machine::{Machine, MotionState};

use super::turn::Span;
use super::{arrived, check_pass_preconditions, complete, drive, Cap};

const APPROACH: u32 = 0;
const ARC: u32 = 1;
const RETURN: u32 = 2;

/// Fractions of the main and cross travel at arc angle `theta`.
///
/// `(sin, 1 - cos)` leaves along the main axis and ends moving across it,
/// the outside quarter of the ellipse. `(1 - cos, sin)` leaves across and
/// ends along the main axis, the inside quarter. Reversing either the cross
/// direction or the pitch flips which quarter is cut.
pub(crate) fn arc_fractions(theta: f64, aux_forward: bool, pitch_forward: bool) -> (f64, f64) {
    let (sin, one_minus_cos) = (theta.sin(), 1.0 - theta.cos());
    match (aux_forward, pitch_forward) {
        // Cross forward, cutting toward the right stop: outside quarter.
        (true, true) => (sin, one_minus_cos),
        // Cross forward, cutting toward the left stop: inside quarter.
        (true, false) => (one_minus_cos, sin),
        // Cross backward, cutting toward the right stop: inside quarter.
        (false, true) => (one_minus_cos, sin),
        // Cross backward, cutting toward the left stop: outside quarter.
        (false, false) => (sin, one_minus_cos),
    }
}

pub(super) fn run(machine: &Machine, motion: &mut MotionState) {
    if !check_pass_preconditions(machine, motion) {
        return;
    }
    let z = machine.axis(AxisId::Z);
    let x = machine.axis(AxisId::X);
    let z_state = z.snapshot();
    let x_state = x.snapshot();
    let pitch_forward = motion.progress.pitch_sign > 0;
    let (Some(main), Some(cross)) = (
        Span::from_stops(z_state.stops(), !pitch_forward),
        Span::from_stops(x_state.stops(), true),
    ) else {
        return;
    };
    let passes = motion.turn_passes;

    if motion.progress.index == 0 {
        motion.progress.index = 1;
        motion.progress.sub_index = APPROACH;
    }
    let index = motion.progress.index;

    match motion.progress.sub_index {
        APPROACH => {
            drive(z, main.start, Cap::Manual);
            drive(x, cross.start, Cap::Manual);
            if arrived(&z_state, main.start) && arrived(&x_state, cross.start) {
                machine.mark_origin_all(motion);
                motion.progress.sub_index = ARC;
            }
        }
        ARC => {
            let main_delta = (main.end - main.start) * index as i64 / passes as i64;
            let cross_delta = (cross.end - cross.start) * index as i64 / passes as i64;
            let budget = motion
                .gearing()
                .spindle_from_pos(z.params(), main_delta)
                .abs();
            // Only forward spindle travel since the pass origin counts.
            let done = if budget == 0 {
                1.0
            } else {
                (motion.spindle.avg() as f64 / budget as f64).clamp(0.0, 1.0)
            };
            let (main_frac, cross_frac) =
                arc_fractions(done * FRAC_PI_2, motion.aux_forward, pitch_forward);
            let z_target = main.start + (main_delta as f64 * main_frac).round() as i64;
            let x_target = cross.start + (cross_delta as f64 * cross_frac).round() as i64;
            drive(z, z_target, Cap::Unlimited);
            drive(x, x_target, Cap::Unlimited);
            if done >= 1.0 && arrived(&z_state, z_target) && arrived(&x_state, x_target) {
                motion.progress.sub_index = RETURN;
            }
        }
        RETURN => {
            if !arrived(&x_state, cross.start) {
                drive(x, cross.start, Cap::Manual);
                return;
            }
            if index >= passes {
                complete(machine, motion);
                return;
            }
            drive(z, main.start, Cap::Manual);
            if arrived(&z_state, main.start) {
                motion.progress.index += 1;
                motion.progress.sub_index = APPROACH;
                tracing::debug!(index = motion.progress.index, passes, "next pass");
            }
        }
        _ => motion.progress.sub_index = APPROACH,
    }
}
