//! Consistent read-only views for display and persistence.

use crate::axis::{AxisId, Stops};
use crate::config::{DeciMicrons, MeasureUnit};
use crate::estop::EstopCause;
use crate::machine::Machine;
use crate::modes::{Mode, OpProgress};

/// One axis as seen from outside the control loop.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisSnapshot {
    /// Which axis.
    pub id: AxisId,
    /// Axis is configured active.
    pub active: bool,
    /// Tool position in steps from the origin.
    pub pos: i64,
    /// Motor position in steps.
    pub motor_pos: i64,
    /// Origin offset.
    pub origin_pos: i64,
    /// Steps since power-on, origin-independent.
    pub pos_global: i64,
    /// Steps not yet issued.
    pub pending: i64,
    /// Soft limits.
    pub stops: Stops,
    /// Current step rate.
    pub speed: f32,
    /// Manual move in progress.
    pub moving_manually: bool,
    /// Operator switched the axis off.
    pub disabled: bool,
    /// Driver enable output is asserted.
    pub enabled: bool,
    /// Tool position converted to deci-microns.
    pub position_du: DeciMicrons,
}

/// The whole machine at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineSnapshot {
    /// Operating mode.
    pub mode: Mode,
    /// Operation running.
    pub running: bool,
    /// Pitch in deci-microns.
    pub pitch: i64,
    /// Thread starts.
    pub starts: u32,
    /// Cone ratio.
    pub cone_ratio: f32,
    /// Pass count.
    pub turn_passes: u32,
    /// Cross axis direction.
    pub aux_forward: bool,
    /// Display unit.
    pub measure: MeasureUnit,
    /// Manual move step.
    pub move_step: DeciMicrons,
    /// Multi-pass progress.
    pub progress: OpProgress,
    /// Spindle position since origin.
    pub spindle_pos: i64,
    /// Backlash-filtered spindle position.
    pub spindle_avg: i64,
    /// Pending phase catch-up.
    pub spindle_sync: i64,
    /// Angle within the revolution.
    pub spindle_global: i64,
    /// Spindle speed.
    pub rpm: u32,
    /// Axes in Z, X, C order.
    pub axes: [AxisSnapshot; 3],
    /// Latched emergency cause.
    pub estop: Option<EstopCause>,
}

impl MachineSnapshot {
    /// Take the motion lock and copy everything out.
    pub fn capture(machine: &Machine) -> Self {
        let motion = machine.motion();
        let axis = |id: AxisId| {
            let axis = machine.axis(id);
            let state = axis.snapshot();
            AxisSnapshot {
                id,
                active: axis.params().active,
                pos: state.pos(),
                motor_pos: state.motor_pos(),
                origin_pos: state.origin_pos(),
                pos_global: state.pos_global(),
                pending: state.pending(),
                stops: state.stops(),
                speed: state.speed(),
                moving_manually: state.moving_manually(),
                disabled: state.disabled(),
                enabled: state.output_enabled,
                position_du: axis.params().steps_to_du(state.pos()),
            }
        };
        let spindle = motion.spindle();
        Self {
            mode: motion.mode(),
            running: motion.running(),
            pitch: motion.pitch(),
            starts: motion.starts(),
            cone_ratio: motion.cone_ratio,
            turn_passes: motion.turn_passes,
            aux_forward: motion.aux_forward,
            measure: motion.measure(),
            move_step: motion.move_step(),
            progress: motion.progress(),
            spindle_pos: spindle.pos(),
            spindle_avg: spindle.avg(),
            spindle_sync: spindle.sync(),
            spindle_global: spindle.global(),
            rpm: motion.rpm(),
            axes: [axis(AxisId::Z), axis(AxisId::X), axis(AxisId::C)],
            estop: machine.estop().cause(),
        }
    }

    /// One axis.
    pub fn axis(&self, id: AxisId) -> &AxisSnapshot {
        &self.axes[id.index()]
    }
}
