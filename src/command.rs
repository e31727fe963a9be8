//! Execution of already-parsed machine commands.
//!
//! Linear moves are split into chunks; every chunk is issued to all axes at
//! once and the next one waits until all axes are close to it, so that the
//! axes arrive together.

use std::sync::Arc;
use std::thread;

use heapless::{String, Vec};

use crate::axis::{Axis, AxisId};
use crate::config::MeasureUnit;
use crate::error::{AxisError, CommandError, Error, Result};
use crate::machine::Machine;
use crate::settings::SettingsHandle;

/// How move targets are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Positioning {
    /// Targets are positions in the absolute frame.
    #[default]
    Absolute,
    /// Targets are offsets from the current position.
    Relative,
}

/// One command, already parsed by the command-language front end.
#[derive(Debug, Clone, PartialEq)]
pub enum MachineCommand {
    /// Move the named axes (letter, value in the active unit) in a straight
    /// line, optionally setting the feed first.
    LinearMove {
        /// Axis letter and target.
        targets: Vec<(char, f32), 3>,
        /// Feed in units per minute.
        feed: Option<f32>,
    },
    /// Feed in units per minute.
    SetFeed(f32),
    /// Active unit.
    SetUnits(MeasureUnit),
    /// Absolute or relative targets.
    SetPositioning(Positioning),
    /// End of program; stops the machine.
    ProgramEnd,
    /// Anything the core does not implement.
    Unsupported(String<32>),
}

/// Answer to a status query.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandStatus {
    /// Machine is running.
    pub running: bool,
    /// Work position of each active axis in the active unit.
    pub positions: Vec<(char, f32), 3>,
    /// Feed in units per minute.
    pub feed: f32,
    /// Spindle speed.
    pub rpm: u32,
}

/// Executes commands against the machine.
#[derive(Debug)]
pub struct CommandSurface {
    machine: Arc<Machine>,
    settings: SettingsHandle,
    feed_du_per_sec: f32,
    positioning: Positioning,
    measure: MeasureUnit,
}

impl CommandSurface {
    /// Surface with the configured default feed and absolute positioning.
    pub fn new(settings: SettingsHandle) -> Self {
        let machine = Arc::clone(settings.machine());
        let feed_du_per_sec = machine.config().command.feed_default;
        let measure = machine.motion().measure();
        Self {
            machine,
            settings,
            feed_du_per_sec,
            positioning: Positioning::default(),
            measure,
        }
    }

    /// Feed in deci-microns per second.
    #[inline]
    pub fn feed_du_per_sec(&self) -> f32 {
        self.feed_du_per_sec
    }

    /// Active positioning.
    #[inline]
    pub fn positioning(&self) -> Positioning {
        self.positioning
    }

    /// Active unit.
    #[inline]
    pub fn measure(&self) -> MeasureUnit {
        self.measure
    }

    /// Run one command to completion.
    pub fn execute(&mut self, command: &MachineCommand) -> Result<()> {
        self.machine.estop().check()?;
        match command {
            MachineCommand::LinearMove { targets, feed } => {
                if let Some(feed) = feed {
                    self.set_feed(*feed)?;
                }
                self.linear_move(targets)
            }
            MachineCommand::SetFeed(feed) => self.set_feed(*feed),
            MachineCommand::SetUnits(measure) => {
                self.measure = *measure;
                self.settings.set_measure(*measure);
                Ok(())
            }
            MachineCommand::SetPositioning(positioning) => {
                self.positioning = *positioning;
                Ok(())
            }
            MachineCommand::ProgramEnd => {
                self.settings.set_running(false);
                Ok(())
            }
            MachineCommand::Unsupported(text) => {
                tracing::warn!(command = %text, "unsupported command");
                if self.machine.status().1 {
                    self.settings.set_running(false);
                }
                Err(Error::Command(CommandError::Unsupported(text.clone())))
            }
        }
    }

    /// Set the feed from units per minute.
    pub fn set_feed(&mut self, per_minute: f32) -> Result<()> {
        if per_minute <= 0.0 || !per_minute.is_finite() {
            return Err(Error::Command(CommandError::InvalidFeed(per_minute)));
        }
        self.feed_du_per_sec = (per_minute * self.measure.du_per_unit() / 60.0).round();
        Ok(())
    }

    /// Step position of `value` (in the active unit) on `id`, taking the
    /// positioning mode into account.
    pub fn absolute_position_from_relative_offset(&self, id: AxisId, value: f32) -> i64 {
        let axis = self.machine.axis(id);
        let state = axis.snapshot();
        let base = match self.positioning {
            Positioning::Absolute => -state.origin_pos(),
            Positioning::Relative => state.pos(),
        };
        let params = axis.params();
        let steps = value as f64 * self.measure.du_per_unit() as f64 / params.screw_pitch as f64
            * params.motor_steps as f64;
        base + steps.round() as i64
    }

    /// Block until every active axis has at most `epsilon` steps left.
    pub fn wait_until_within_tolerance(&self, epsilon: i64) -> Result<()> {
        loop {
            self.machine.estop().check()?;
            let settled = self
                .machine
                .axes()
                .iter()
                .filter(|axis| axis.params().active)
                .all(|axis| axis.pending().abs() <= epsilon);
            if settled {
                return Ok(());
            }
            thread::yield_now();
        }
    }

    /// Block until every active axis is idle.
    pub fn wait_until_exact(&self) -> Result<()> {
        self.wait_until_within_tolerance(0)
    }

    /// Current status.
    pub fn status(&self) -> CommandStatus {
        let (running, rpm) = {
            let motion = self.machine.motion();
            (motion.running(), motion.rpm())
        };
        let mut positions = Vec::new();
        for axis in self.machine.axes().iter().filter(|a| a.params().active) {
            let params = axis.params();
            let du = params.steps_to_du(axis.snapshot().absolute_pos());
            let value = du.value() as f32 / self.measure.du_per_unit();
            // At most three axes.
            let _ = positions.push((params.name, value));
        }
        CommandStatus {
            running,
            positions,
            feed: self.feed_du_per_sec * 60.0 / self.measure.du_per_unit(),
            rpm,
        }
    }

    fn resolve(&self, letter: char) -> Result<&Axis> {
        let axis = self
            .machine
            .axes()
            .iter()
            .find(|axis| axis.params().name.eq_ignore_ascii_case(&letter))
            .ok_or(Error::Command(CommandError::UnknownAxis(letter)))?;
        if !axis.params().active {
            return Err(Error::Axis(AxisError::Inactive(axis.id())));
        }
        if axis.snapshot().disabled() {
            return Err(Error::Axis(AxisError::Disabled(axis.id())));
        }
        Ok(axis)
    }

    fn linear_move(&mut self, targets: &[(char, f32)]) -> Result<()> {
        let mut start = [0i64; 3];
        let mut end = [0i64; 3];
        for id in AxisId::ALL {
            start[id.index()] = self.machine.axis(id).pos();
            end[id.index()] = start[id.index()];
        }
        for &(letter, value) in targets {
            let id = self.resolve(letter)?.id();
            end[id.index()] = self.absolute_position_from_relative_offset(id, value);
        }
        if !self.machine.status().1 {
            return Err(Error::Command(CommandError::Aborted));
        }

        let config = &self.machine.config().command;
        let diff: [i64; 3] = core::array::from_fn(|i| end[i] - start[i]);

        // The slowest axis sets the duration for all.
        let mut seconds = 0.0f32;
        for axis in self.machine.axes().iter().filter(|a| a.params().active) {
            let params = axis.params();
            let to_steps = params.motor_steps as f32 / params.screw_pitch as f32;
            let min = config.feed_min * to_steps;
            let rate = (self.feed_du_per_sec * to_steps)
                .min(params.ramp.manual)
                .max(min);
            seconds = seconds.max(diff[axis.id().index()].abs() as f32 / rate);
        }
        let caps: [f32; 3] = core::array::from_fn(|i| {
            let manual = self.machine.axes()[i].params().ramp.manual;
            if seconds > 0.0 {
                diff[i].abs() as f32 / seconds
            } else {
                manual
            }
        });

        let longest = diff.iter().map(|d| d.abs()).max().unwrap_or(0);
        let chunks = (longest as f32 * config.interpolation_precision).round() as i64;
        tracing::debug!(?end, chunks, seconds, "linear move");

        for chunk in 0..chunks {
            if !self.machine.status().1 {
                tracing::info!(chunk, chunks, "linear move aborted");
                return Err(Error::Command(CommandError::Aborted));
            }
            let scale = chunk as f64 / chunks as f64;
            for id in AxisId::ALL {
                let i = id.index();
                let target = start[i] + (diff[i] as f64 * scale) as i64;
                self.issue(id, target, true, caps[i])?;
            }
            self.wait_until_within_tolerance(config.wait_epsilon_steps)?;
        }

        for id in AxisId::ALL {
            self.issue(id, end[id.index()], false, caps[id.index()])?;
        }
        self.wait_until_exact()?;
        for axis in self.machine.axes() {
            axis.state().clear_speed_max();
        }
        Ok(())
    }

    /// Request a move, retrying while the axis lock is contended.
    fn issue(&self, id: AxisId, target: i64, continuous: bool, cap: f32) -> Result<()> {
        let axis = self.machine.axis(id);
        if !axis.params().active {
            return Ok(());
        }
        loop {
            self.machine.estop().check()?;
            if let Some(mut state) = axis.try_state() {
                state.set_speed_max(cap);
                state.request_move(axis.params(), target, continuous);
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MachineConfig;
    use std::sync::mpsc;

    fn surface() -> CommandSurface {
        let machine = Arc::new(Machine::new(MachineConfig::default()).unwrap());
        let (tx, _rx) = mpsc::channel();
        CommandSurface::new(SettingsHandle::new(tx, machine))
    }

    #[test]
    fn test_feed_per_minute() {
        let mut surface = surface();
        surface.set_feed(120.0).unwrap();
        assert_eq!(surface.feed_du_per_sec(), 20_000.0);
        assert!(surface.set_feed(0.0).is_err());
    }

    #[test]
    fn test_absolute_and_relative_offsets() {
        let mut surface = surface();
        {
            let mut z = surface.machine.axis(AxisId::Z).state();
            z.pos = 10;
            z.mark_origin();
            z.pos = 5;
        }
        // 5386 du per 400 steps: 1 mm is 742.67 steps.
        assert_eq!(
            surface.absolute_position_from_relative_offset(AxisId::Z, 1.0),
            -10 + 743
        );
        surface
            .execute(&MachineCommand::SetPositioning(Positioning::Relative))
            .unwrap();
        assert_eq!(
            surface.absolute_position_from_relative_offset(AxisId::Z, 1.0),
            5 + 743
        );
    }

    #[test]
    fn test_unknown_and_inactive_axes_rejected() {
        let mut surface = surface();
        let mut targets = Vec::new();
        targets.push(('Q', 1.0)).unwrap();
        let err = surface
            .execute(&MachineCommand::LinearMove {
                targets,
                feed: None,
            })
            .unwrap_err();
        assert_eq!(err, Error::Command(CommandError::UnknownAxis('Q')));

        let mut targets = Vec::new();
        targets.push(('c', 1.0)).unwrap();
        let err = surface
            .execute(&MachineCommand::LinearMove {
                targets,
                feed: None,
            })
            .unwrap_err();
        assert_eq!(err, Error::Axis(AxisError::Inactive(AxisId::C)));
    }

    #[test]
    fn test_move_while_stopped_is_aborted() {
        let mut surface = surface();
        let mut targets = Vec::new();
        targets.push(('x', 1.0)).unwrap();
        let err = surface
            .execute(&MachineCommand::LinearMove {
                targets,
                feed: None,
            })
            .unwrap_err();
        assert_eq!(err, Error::Command(CommandError::Aborted));
    }

    #[test]
    fn test_unsupported_rejected() {
        let mut surface = surface();
        let text = String::try_from("G2").unwrap();
        assert!(surface
            .execute(&MachineCommand::Unsupported(text))
            .is_err());
    }
}
