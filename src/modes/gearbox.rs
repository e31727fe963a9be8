//! Plain gearbox: the pitch axis follows the spindle.

use crate::machine::{Machine, MotionState};

use super::{drive, Cap};

pub(super) fn run(machine: &Machine, motion: &mut MotionState) {
    if motion.pitch == 0 || motion.spindle.sync() != 0 {
        return;
    }
    let axis = machine.axis(motion.mode.pitch_axis());
    let stops = axis.snapshot().stops();
    let target = motion
        .gearing()
        .pos_from_spindle(axis.params(), &stops, motion.spindle.avg(), true);
    drive(axis, target, Cap::Unlimited);
}
