//! Mutable per-axis kinematic state and the origin/backlash algebra.
//!
//! `motor_pos` is where the motor shaft is. `pos` is where the tool is: it
//! follows `motor_pos` only once the lead screw backlash has been taken up, so
//! `motor_pos` always lies in `[pos - backlash_steps, pos]`.

use super::params::AxisParams;
use super::stops::{StopSide, Stops};

/// Kinematic state of one axis, guarded by the axis lock.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisState {
    pub(crate) pos: i64,
    pub(crate) motor_pos: i64,
    pub(crate) fractional_pos: f32,
    pub(crate) origin_pos: i64,
    pub(crate) pos_global: i64,
    pub(crate) pending_pos: i64,
    pub(crate) stops: Stops,
    pub(crate) continuous: bool,
    pub(crate) moving_manually: bool,
    pub(crate) disabled: bool,
    pub(crate) enable_count: u32,
    pub(crate) speed: f32,
    pub(crate) speed_max: f32,
    /// Last direction written to the driver; `None` until the first step.
    pub(crate) direction: Option<bool>,
    pub(crate) last_step_us: u64,
    /// Enable level currently driven and when it last went active.
    pub(crate) output_enabled: bool,
    pub(crate) enabled_at_us: u64,
}

impl AxisState {
    /// Fresh state at position zero with no stops.
    pub fn new(params: &AxisParams) -> Self {
        Self {
            pos: 0,
            motor_pos: 0,
            fractional_pos: 0.0,
            origin_pos: 0,
            pos_global: 0,
            pending_pos: 0,
            stops: Stops::unconstrained(),
            continuous: false,
            moving_manually: false,
            disabled: false,
            enable_count: 0,
            speed: params.ramp.start,
            speed_max: f32::INFINITY,
            direction: None,
            last_step_us: 0,
            output_enabled: false,
            enabled_at_us: 0,
        }
    }

    /// Tool position relative to the current origin.
    #[inline]
    pub fn pos(&self) -> i64 {
        self.pos
    }

    /// Motor shaft position relative to the current origin.
    #[inline]
    pub fn motor_pos(&self) -> i64 {
        self.motor_pos
    }

    /// Offset of the current origin in the absolute frame.
    #[inline]
    pub fn origin_pos(&self) -> i64 {
        self.origin_pos
    }

    /// Origin-independent step counter.
    #[inline]
    pub fn pos_global(&self) -> i64 {
        self.pos_global
    }

    /// Steps not yet issued.
    #[inline]
    pub fn pending(&self) -> i64 {
        self.pending_pos
    }

    /// Sub-step remainder carried between manual increments.
    #[inline]
    pub fn fractional_pos(&self) -> f32 {
        self.fractional_pos
    }

    /// Soft travel stops.
    #[inline]
    pub fn stops(&self) -> Stops {
        self.stops
    }

    /// Current step rate.
    #[inline]
    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Externally imposed speed cap.
    #[inline]
    pub fn speed_max(&self) -> f32 {
        self.speed_max
    }

    /// Operator-controlled move in progress.
    #[inline]
    pub fn moving_manually(&self) -> bool {
        self.moving_manually
    }

    /// De-energised by the operator.
    #[inline]
    pub fn disabled(&self) -> bool {
        self.disabled
    }

    /// Move without fixed length in progress.
    #[inline]
    pub fn continuous(&self) -> bool {
        self.continuous
    }

    /// No steps outstanding.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.pending_pos == 0
    }

    /// Position in the absolute frame.
    #[inline]
    pub fn absolute_pos(&self) -> i64 {
        self.pos + self.origin_pos
    }

    /// Re-base `pos` to zero without moving the motor.
    ///
    /// Set stops shift by the same amount so they keep pointing at the same
    /// physical location.
    pub fn mark_origin(&mut self) {
        let offset = self.pos;
        self.stops.rebase(offset);
        self.motor_pos -= offset;
        self.origin_pos += offset;
        self.pos = 0;
        self.fractional_pos = 0.0;
        self.pending_pos = 0;
    }

    /// Replace the outstanding work with a move to `target`.
    ///
    /// Moving backwards asks the motor for `backlash_steps` extra so that the
    /// tool lands on `target` once the slack is consumed.
    pub fn request_move(&mut self, params: &AxisParams, target: i64, continuous: bool) {
        self.continuous = continuous;
        self.pending_pos = if target == self.pos {
            0
        } else if target > self.pos {
            target - self.motor_pos
        } else {
            target - self.motor_pos - params.backlash_steps
        };
    }

    /// Account for one motor step in the given direction.
    pub(crate) fn record_step(&mut self, forward: bool, backlash_steps: i64) {
        if forward {
            if self.motor_pos >= self.pos {
                self.pos += 1;
            }
            self.motor_pos += 1;
            self.pos_global += 1;
        } else {
            if self.motor_pos <= self.pos - backlash_steps {
                self.pos -= 1;
            }
            self.motor_pos -= 1;
            self.pos_global -= 1;
        }
    }

    pub(crate) fn set_stop(&mut self, side: StopSide, value: Option<i64>) {
        self.stops.set(side, value);
    }

    /// Driver should be energised under the rest policy.
    pub fn wants_enabled(&self, params: &AxisParams) -> bool {
        params.active && !self.disabled && (!params.needs_rest || self.enable_count > 0)
    }

    /// Take or release one enable reference. Only open-loop drivers count.
    pub fn hold_enable(&mut self, params: &AxisParams, on: bool) {
        if !params.needs_rest || !params.active {
            return;
        }
        if on {
            self.enable_count += 1;
        } else {
            self.enable_count = self.enable_count.saturating_sub(1);
        }
    }

    /// Cap the step rate.
    pub fn set_speed_max(&mut self, speed_max: f32) {
        self.speed_max = speed_max;
    }

    /// Remove the step rate cap.
    pub fn clear_speed_max(&mut self) {
        self.speed_max = f32::INFINITY;
    }

    pub(crate) fn set_moving_manually(&mut self, value: bool) {
        self.moving_manually = value;
    }

    pub(crate) fn set_disabled(&mut self, value: bool) {
        self.disabled = value;
    }

    /// Forget the origin and return to a fresh, unconstrained frame.
    pub(crate) fn reset(&mut self) {
        self.stops = Stops::unconstrained();
        self.origin_pos = 0;
        self.pos_global = 0;
        self.motor_pos = 0;
        self.pos = 0;
        self.pending_pos = 0;
        self.fractional_pos = 0.0;
        self.disabled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::AxisId;
    use crate::config::{AxisConfig, DeciMicrons};

    fn params(backlash_du: i64) -> AxisParams {
        let config = AxisConfig {
            backlash: DeciMicrons(backlash_du),
            ..AxisConfig::stock_z()
        };
        AxisParams::from_config(AxisId::Z, &config)
    }

    fn run(state: &mut AxisState, params: &AxisParams) {
        while state.pending_pos != 0 {
            let forward = state.pending_pos > 0;
            state.record_step(forward, params.backlash_steps);
            state.pending_pos -= if forward { 1 } else { -1 };
        }
    }

    #[test]
    fn test_forward_move_has_no_backlash() {
        let p = params(8382);
        let mut s = AxisState::new(&p);
        s.request_move(&p, 100, false);
        assert_eq!(s.pending(), 100);
        run(&mut s, &p);
        assert_eq!(s.pos(), 100);
        assert_eq!(s.motor_pos(), 100);
    }

    #[test]
    fn test_reverse_takes_up_backlash() {
        let p = params(8382);
        let mut s = AxisState::new(&p);
        s.request_move(&p, 100, false);
        run(&mut s, &p);
        s.request_move(&p, 40, false);
        assert_eq!(s.pending(), -60 - p.backlash_steps);
        run(&mut s, &p);
        assert_eq!(s.pos(), 40);
        assert_eq!(s.motor_pos(), 40 - p.backlash_steps);
        // And forward again consumes the slack before the tool moves.
        s.request_move(&p, 50, false);
        assert_eq!(s.pending(), 10 + p.backlash_steps);
        run(&mut s, &p);
        assert_eq!(s.pos(), 50);
        assert_eq!(s.motor_pos(), 50);
    }

    #[test]
    fn test_target_equal_to_pos_clears_pending() {
        let p = params(8382);
        let mut s = AxisState::new(&p);
        s.pending_pos = 12;
        s.request_move(&p, 0, false);
        assert!(s.is_idle());
    }

    #[test]
    fn test_mark_origin_shifts_stops() {
        let p = params(0);
        let mut s = AxisState::new(&p);
        s.request_move(&p, 250, false);
        run(&mut s, &p);
        s.stops = Stops {
            left: Some(1000),
            right: None,
        };
        s.mark_origin();
        assert_eq!(s.pos(), 0);
        assert_eq!(s.motor_pos(), 0);
        assert_eq!(s.origin_pos(), 250);
        assert_eq!(s.stops().left, Some(750));
        assert_eq!(s.absolute_pos(), 250);
        assert_eq!(s.pos_global(), 250);
    }

    #[test]
    fn test_mark_origin_is_idempotent() {
        let p = params(8382);
        let mut s = AxisState::new(&p);
        s.request_move(&p, 300, false);
        run(&mut s, &p);
        s.stops.right = Some(-200);
        s.mark_origin();
        let once = s.clone();
        s.mark_origin();
        assert_eq!(s, once);
    }

    #[test]
    fn test_enable_policy() {
        let closed = params(0);
        let mut s = AxisState::new(&closed);
        assert!(s.wants_enabled(&closed));
        s.set_disabled(true);
        assert!(!s.wants_enabled(&closed));

        let open = AxisParams {
            needs_rest: true,
            ..params(0)
        };
        let mut s = AxisState::new(&open);
        assert!(!s.wants_enabled(&open));
        s.hold_enable(&open, true);
        s.hold_enable(&open, true);
        s.hold_enable(&open, false);
        assert!(s.wants_enabled(&open));
        s.hold_enable(&open, false);
        s.hold_enable(&open, false);
        assert!(!s.wants_enabled(&open));
    }
}
