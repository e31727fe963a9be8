//! Taper: Z follows the spindle, X follows Z at the cone ratio.

use crate::axis::{AxisId, Stops};
use crate::machine::{Machine, MotionState};
use crate::spindle::Gearing;

use super::{drive, Cap};

/// X steps per Z step for a cone of `cone_ratio` (diameter change per unit
/// of length).
pub(crate) fn z_to_x_ratio(machine: &Machine, cone_ratio: f32, aux_forward: bool) -> f64 {
    let z = machine.axis(AxisId::Z).params();
    let x = machine.axis(AxisId::X).params();
    let direction = if aux_forward { 1.0 } else { -1.0 };
    -(cone_ratio as f64) / 2.0 / z.motor_steps as f64 * x.motor_steps as f64
        / x.screw_pitch as f64
        * z.screw_pitch as f64
        * direction
}

/// Spindle interval that keeps Z inside its stops and X inside its stops
/// after scaling. Unset stops leave that side open.
fn spindle_bounds(
    machine: &Machine,
    gearing: &Gearing,
    z_stops: Stops,
    x_stops: Stops,
    ratio: f64,
) -> (i64, i64) {
    let z = machine.axis(AxisId::Z).params();
    let mut lo = i64::MIN;
    let mut hi = i64::MAX;
    let mut narrow = |a: Option<i64>, b: Option<i64>| {
        let a = a.map(|p| gearing.spindle_from_pos(z, p));
        let b = b.map(|p| gearing.spindle_from_pos(z, p));
        // Which end is the lower bound depends on the pitch sign.
        let (low, high) = match (a, b) {
            (Some(a), Some(b)) => (Some(a.min(b)), Some(a.max(b))),
            (a, b) => {
                let value = a.or(b);
                let is_upper = if a.is_some() {
                    gearing.pitch > 0
                } else {
                    gearing.pitch < 0
                };
                if is_upper {
                    (None, value)
                } else {
                    (value, None)
                }
            }
        };
        if let Some(low) = low {
            lo = lo.max(low);
        }
        if let Some(high) = high {
            hi = hi.min(high);
        }
    };

    narrow(z_stops.left, z_stops.right);

    if ratio != 0.0 {
        let to_z = |x: Option<i64>| x.map(|x| (x as f64 / ratio).round() as i64);
        // A negative ratio swaps which X stop bounds Z from above.
        let (upper, lower) = if ratio > 0.0 {
            (to_z(x_stops.left), to_z(x_stops.right))
        } else {
            (to_z(x_stops.right), to_z(x_stops.left))
        };
        narrow(upper, lower);
    }
    (lo, hi)
}

pub(super) fn run(machine: &Machine, motion: &mut MotionState) {
    if motion.pitch == 0 || motion.spindle.sync() != 0 {
        return;
    }
    let ratio = z_to_x_ratio(machine, motion.cone_ratio, motion.aux_forward);
    let gearing = motion.gearing();
    let z_axis = machine.axis(AxisId::Z);
    let x_axis = machine.axis(AxisId::X);
    let z_stops = z_axis.snapshot().stops();
    let x_stops = x_axis.snapshot().stops();

    let (lo, hi) = spindle_bounds(machine, &gearing, z_stops, x_stops, ratio);
    let spindle = if lo > hi {
        lo
    } else {
        motion.spindle.avg().clamp(lo, hi)
    };

    let z = gearing.pos_from_spindle(z_axis.params(), &z_stops, spindle, true);
    let x = (z as f64 * ratio).round() as i64;
    drive(z_axis, z, Cap::Unlimited);
    drive(x_axis, x, Cap::Unlimited);
}
