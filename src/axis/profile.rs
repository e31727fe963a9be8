//! Acceleration ramp shared by all axes.
//!
//! Every step changes the speed by `acceleration / speed`, which is
//! `acceleration * delay` for a step taking `delay = 1 / speed` seconds. The
//! deceleration distance is found by running that same recurrence down from
//! the manual move speed, so the scheduler and the precompute agree exactly.

/// Per-axis speed ramp parameters in steps per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedRamp {
    /// Speed of the first step after a standstill or reversal.
    pub start: f32,
    /// Speed used to derive the deceleration distance.
    pub manual: f32,
    /// Steps per second squared.
    pub acceleration: f32,
}

impl SpeedRamp {
    /// Create a ramp.
    pub const fn new(start: f32, manual: f32, acceleration: f32) -> Self {
        Self {
            start,
            manual,
            acceleration,
        }
    }

    /// Speed change applied after one step taken at `speed`.
    #[inline]
    pub fn delta(&self, speed: f32) -> f32 {
        self.acceleration / speed
    }

    /// Steps needed to slow from the manual speed down to the start speed.
    pub fn decelerate_steps(&self) -> i64 {
        let mut speed = self.manual;
        let mut steps = 0;
        while speed > self.start {
            steps += 1;
            speed -= self.delta(speed);
        }
        steps
    }

    /// Speed after one more step, clamped into `[start, cap]`.
    #[inline]
    pub fn next_speed(&self, speed: f32, accelerate: bool, cap: f32) -> f32 {
        let next = if accelerate {
            speed + self.delta(speed)
        } else {
            speed - self.delta(speed)
        };
        next.max(self.start).min(cap)
    }

    /// Step interval at `speed`, in microseconds.
    #[inline]
    pub fn delay_us(speed: f32) -> u64 {
        (1_000_000.0 / speed) as u64
    }
}
