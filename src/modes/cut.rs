//! Multi-pass plunge cut along X, each pass a little deeper.

use crate::axis::AxisId;
use crate::machine::{Machine, MotionState};

use super::turn::Span;
use super::{arrived, check_pass_preconditions, complete, drive, Cap};

const APPROACH: u32 = 0;
const FEED: u32 = 1;
const RETURN: u32 = 2;

pub(super) fn run(machine: &Machine, motion: &mut MotionState) {
    if !check_pass_preconditions(machine, motion) {
        return;
    }
    let x = machine.axis(AxisId::X);
    let state = x.snapshot();
    let Some(span) = Span::from_stops(state.stops(), motion.progress.pitch_sign > 0) else {
        return;
    };
    let passes = motion.turn_passes;

    if motion.progress.index == 0 {
        motion.progress.index = 1;
        motion.progress.sub_index = APPROACH;
    }
    let index = motion.progress.index;
    let pass_end = span.at(index as i64, passes as i64);

    match motion.progress.sub_index {
        APPROACH => {
            drive(x, span.start, Cap::Manual);
            if arrived(&state, span.start) {
                // Feed starts from here regardless of where the spindle is.
                let spindle = motion.gearing().spindle_from_pos(x.params(), state.pos());
                motion.spindle.snap_to(spindle);
                motion.progress.sub_index = FEED;
            }
        }
        FEED => {
            let target = motion.gearing().pos_from_spindle(
                x.params(),
                &state.stops(),
                motion.spindle.avg(),
                true,
            );
            let target = if span.direction() > 0 {
                target.min(pass_end)
            } else {
                target.max(pass_end)
            };
            drive(x, target, Cap::Unlimited);
            if arrived(&state, pass_end) {
                motion.progress.sub_index = RETURN;
            }
        }
        RETURN => {
            drive(x, span.start, Cap::Manual);
            if !arrived(&state, span.start) {
                return;
            }
            if index >= passes {
                complete(machine, motion);
            } else {
                motion.progress.index += 1;
                motion.progress.sub_index = APPROACH;
                tracing::debug!(index = motion.progress.index, passes, "next pass");
            }
        }
        _ => motion.progress.sub_index = APPROACH,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::StopSide;
    use crate::config::MachineConfig;
    use crate::modes::Mode;

    fn park(machine: &Machine, pos: i64) {
        let mut x = machine.axis(AxisId::X).state();
        x.pos = pos;
        x.motor_pos = pos;
        x.pending_pos = 0;
    }

    #[test]
    fn test_passes_step_deeper() {
        let machine = Machine::new(MachineConfig::default()).unwrap();
        {
            let mut x = machine.axis(AxisId::X).state();
            x.set_stop(StopSide::Left, Some(30));
            x.set_stop(StopSide::Right, Some(0));
        }
        let mut motion = machine.motion();
        machine.set_mode(&mut motion, Mode::Cut);
        motion.pitch = 1000;
        motion.turn_passes = 2;
        machine.set_running(&mut motion, true);

        run(&machine, &mut motion);
        assert_eq!(motion.progress.index, 1);
        assert_eq!(motion.progress.sub_index, FEED);

        // Spindle far ahead: the first pass still stops halfway.
        motion.spindle.snap_to(1_000_000);
        run(&machine, &mut motion);
        assert_eq!(machine.axis(AxisId::X).pending(), 15);

        park(&machine, 15);
        run(&machine, &mut motion);
        assert_eq!(motion.progress.sub_index, RETURN);

        park(&machine, 0);
        run(&machine, &mut motion);
        assert_eq!(motion.progress.index, 2);
        assert_eq!(motion.progress.sub_index, APPROACH);
        assert!(motion.running);
    }
}
