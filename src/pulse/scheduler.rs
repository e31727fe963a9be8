//! Acceleration-ramped step timing.
//!
//! Runs once per axis per control-loop tick and emits at most one step.

use crate::axis::{AxisParams, AxisState, SpeedRamp};
use crate::config::TimingConfig;
use crate::error::Result;

use super::outputs::StepOutputs;

/// Step timing shared by all axes.
#[derive(Debug, Clone, Copy)]
pub struct PulseScheduler {
    slack_us: u64,
    enable_lead_us: u64,
}

impl PulseScheduler {
    /// Scheduler using the machine timing constants.
    pub fn new(timing: &TimingConfig) -> Self {
        Self {
            slack_us: timing.step_slack_us as u64,
            enable_lead_us: timing.enable_lead_ms as u64 * 1000,
        }
    }

    /// Bring the enable line in line with the rest policy.
    pub fn sync_enable<O: StepOutputs + ?Sized>(
        &self,
        params: &AxisParams,
        state: &mut AxisState,
        now_us: u64,
        out: &mut O,
    ) -> Result<()> {
        let wanted = state.wants_enabled(params);
        if wanted != state.output_enabled {
            out.set_enabled(wanted)?;
            state.output_enabled = wanted;
            if wanted {
                state.enabled_at_us = now_us;
            }
        }
        Ok(())
    }

    /// Driver is energised and past its enable lead time.
    #[inline]
    pub fn ready(&self, state: &AxisState, now_us: u64) -> bool {
        state.output_enabled && now_us >= state.enabled_at_us + self.enable_lead_us
    }

    /// Issue the next step if one is due. Returns `true` if a step was emitted.
    pub fn advance<O: StepOutputs + ?Sized>(
        &self,
        params: &AxisParams,
        state: &mut AxisState,
        now_us: u64,
        out: &mut O,
    ) -> Result<bool> {
        if state.pending_pos == 0 {
            // Idle cool-down.
            if state.speed > params.ramp.start {
                state.speed = (state.speed - 1.0).max(params.ramp.start);
            }
            return Ok(false);
        }

        if !params.active || !self.ready(state, now_us) {
            return Ok(false);
        }

        let delay_us = SpeedRamp::delay_us(state.speed);
        if now_us + self.slack_us < state.last_step_us + delay_us {
            return Ok(false);
        }

        let forward = state.pending_pos > 0;
        if state.direction != Some(forward) {
            state.speed = params.ramp.start.min(state.speed_max);
            out.set_direction(forward)?;
            state.direction = Some(forward);
        }

        out.step()?;
        state.pending_pos -= if forward { 1 } else { -1 };
        state.record_step(forward, params.backlash_steps);
        state.last_step_us = now_us;

        let accelerate = state.continuous || state.pending_pos.abs() >= params.decelerate_steps;
        state.speed = params.ramp.next_speed(state.speed, accelerate, state.speed_max);
        Ok(true)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::axis::AxisId;
    use crate::config::{AxisConfig, DeciMicrons};
    use proptest::prelude::*;

    /// Records edges instead of driving pins.
    #[derive(Debug, Default)]
    pub(crate) struct Recorder {
        pub steps: Vec<bool>,
        pub direction: Option<bool>,
        pub direction_changes: usize,
        pub enabled: Option<bool>,
    }

    impl StepOutputs for Recorder {
        fn set_direction(&mut self, forward: bool) -> Result<()> {
            self.direction = Some(forward);
            self.direction_changes += 1;
            Ok(())
        }

        fn step(&mut self) -> Result<()> {
            self.steps.push(self.direction.unwrap_or(true));
            Ok(())
        }

        fn set_enabled(&mut self, enabled: bool) -> Result<()> {
            self.enabled = Some(enabled);
            Ok(())
        }
    }

    fn setup(backlash_du: i64) -> (PulseScheduler, AxisParams, AxisState) {
        let timing = TimingConfig {
            enable_lead_ms: 0,
            ..TimingConfig::default()
        };
        let config = AxisConfig {
            backlash: DeciMicrons(backlash_du),
            ..AxisConfig::stock_z()
        };
        let params = AxisParams::from_config(AxisId::Z, &config);
        let mut state = AxisState::new(&params);
        state.output_enabled = true;
        (PulseScheduler::new(&timing), params, state)
    }

    /// Tick with a clock that is always far enough ahead for the next step.
    fn drain(
        scheduler: &PulseScheduler,
        params: &AxisParams,
        state: &mut AxisState,
        out: &mut Recorder,
        now: &mut u64,
    ) {
        while state.pending() != 0 {
            *now += 10_000;
            scheduler.advance(params, state, *now, out).unwrap();
        }
    }

    #[test]
    fn test_waits_for_step_interval() {
        let (scheduler, params, mut state) = setup(0);
        let mut out = Recorder::default();
        state.request_move(&params, 10, false);
        assert!(scheduler.advance(&params, &mut state, 1_000_000, &mut out).unwrap());
        // Start speed 2000 steps/s means 500 us between steps.
        assert!(!scheduler.advance(&params, &mut state, 1_000_100, &mut out).unwrap());
        assert!(scheduler.advance(&params, &mut state, 1_000_500, &mut out).unwrap());
        assert_eq!(out.steps.len(), 2);
    }

    #[test]
    fn test_reversal_restarts_slow_and_sets_direction() {
        let (scheduler, params, mut state) = setup(0);
        let mut out = Recorder::default();
        let mut now = 0;
        state.request_move(&params, 2000, false);
        for _ in 0..1000 {
            now += 10_000;
            scheduler.advance(&params, &mut state, now, &mut out).unwrap();
        }
        assert!(state.speed() > params.ramp.start);
        state.request_move(&params, 0, false);
        now += 10_000;
        scheduler.advance(&params, &mut state, now, &mut out).unwrap();
        assert_eq!(out.direction, Some(false));
        assert_eq!(out.direction_changes, 2);
        assert!(state.speed() <= params.ramp.start + params.ramp.delta(params.ramp.start));
    }

    #[test]
    fn test_idle_speed_decays() {
        let (scheduler, params, mut state) = setup(0);
        let mut out = Recorder::default();
        state.speed = params.ramp.start + 2.5;
        scheduler.advance(&params, &mut state, 0, &mut out).unwrap();
        assert_eq!(state.speed(), params.ramp.start + 1.5);
        scheduler.advance(&params, &mut state, 0, &mut out).unwrap();
        scheduler.advance(&params, &mut state, 0, &mut out).unwrap();
        assert_eq!(state.speed(), params.ramp.start);
        assert!(out.steps.is_empty());
    }

    #[test]
    fn test_disabled_output_holds_steps() {
        let (scheduler, params, mut state) = setup(0);
        let mut out = Recorder::default();
        state.output_enabled = false;
        state.request_move(&params, 5, false);
        assert!(!scheduler.advance(&params, &mut state, 100_000, &mut out).unwrap());
        assert_eq!(state.pending(), 5);
    }

    #[test]
    fn test_enable_lead_time() {
        let timing = TimingConfig::default();
        let scheduler = PulseScheduler::new(&timing);
        let params = AxisParams::from_config(AxisId::X, &AxisConfig::stock_x());
        let mut state = AxisState::new(&params);
        let mut out = Recorder::default();
        scheduler.sync_enable(&params, &mut state, 1_000, &mut out).unwrap();
        assert_eq!(out.enabled, Some(true));
        state.request_move(&params, 1, false);
        assert!(!scheduler.advance(&params, &mut state, 50_000, &mut out).unwrap());
        assert!(scheduler.advance(&params, &mut state, 101_000, &mut out).unwrap());
    }

    #[test]
    fn test_deceleration_onset() {
        let (scheduler, params, mut state) = setup(0);
        let mut out = Recorder::default();
        let decel = params.decelerate_steps;
        state.set_speed_max(params.ramp.manual);
        state.request_move(&params, decel * 4, false);

        let mut now = 0;
        while state.pending() != decel {
            now += 10_000;
            scheduler.advance(&params, &mut state, now, &mut out).unwrap();
        }
        assert_eq!(state.speed(), state.speed_max());

        drain(&scheduler, &params, &mut state, &mut out, &mut now);
        assert_eq!(state.speed(), params.ramp.start);
        assert_eq!(state.pos(), decel * 4);
    }

    #[test]
    fn test_continuous_keeps_accelerating() {
        let (scheduler, params, mut state) = setup(0);
        let mut out = Recorder::default();
        state.set_speed_max(params.ramp.manual);
        state.request_move(&params, 3, true);
        let mut now = 0;
        drain(&scheduler, &params, &mut state, &mut out, &mut now);
        assert!(state.speed() > params.ramp.start);
    }

    #[test]
    fn test_small_reversal_keeps_pos() {
        let (scheduler, params, mut state) = setup(8382);
        let mut out = Recorder::default();
        let mut now = 0;
        state.request_move(&params, 1000, false);
        drain(&scheduler, &params, &mut state, &mut out, &mut now);

        state.request_move(&params, 999, false);
        for _ in 0..params.backlash_steps {
            now += 10_000;
            scheduler.advance(&params, &mut state, now, &mut out).unwrap();
            assert_eq!(state.pos(), 1000);
        }
        now += 10_000;
        scheduler.advance(&params, &mut state, now, &mut out).unwrap();
        assert_eq!(state.pos(), 999);
        assert!(state.is_idle());
    }

    proptest! {
        #[test]
        fn prop_backlash_bound_holds(targets in proptest::collection::vec(-1500i64..1500, 1..6)) {
            let (scheduler, params, mut state) = setup(8382);
            let mut out = Recorder::default();
            let mut now = 0;
            for target in targets {
                state.request_move(&params, target, false);
                while state.pending() != 0 {
                    now += 10_000;
                    scheduler.advance(&params, &mut state, now, &mut out).unwrap();
                    let lag = state.pos() - state.motor_pos();
                    prop_assert!(lag >= 0 && lag <= params.backlash_steps);
                }
                prop_assert_eq!(state.pos(), target);
            }
        }
    }
}
