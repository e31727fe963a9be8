//! Spindle position bookkeeping.

use super::gearing::Gearing;
use super::rpm::RpmMeter;

/// Spindle position as seen by the motion math.
#[derive(Debug, Clone)]
pub struct SpindleTracker {
    pos: i64,
    avg: i64,
    global: i64,
    sync: i64,
    encoder_steps: i64,
    encoder_backlash: i64,
    rpm: RpmMeter,
}

impl SpindleTracker {
    /// Tracker at zero for an encoder with `encoder_steps` ticks per
    /// revolution and `encoder_backlash` ticks of slack.
    pub fn new(encoder_steps: u32, encoder_backlash: u32) -> Self {
        Self {
            pos: 0,
            avg: 0,
            global: 0,
            sync: 0,
            encoder_steps: encoder_steps as i64,
            encoder_backlash: encoder_backlash as i64,
            rpm: RpmMeter::new(encoder_steps),
        }
    }

    /// Ticks since the last origin mark.
    #[inline]
    pub fn pos(&self) -> i64 {
        self.pos
    }

    /// Backlash-filtered position used by all motion math.
    #[inline]
    pub fn avg(&self) -> i64 {
        self.avg
    }

    /// Angle within the current revolution, origin-independent.
    #[inline]
    pub fn global(&self) -> i64 {
        self.global
    }

    /// Remaining phase catch-up; zero when the thread is engaged.
    #[inline]
    pub fn sync(&self) -> i64 {
        self.sync
    }

    /// Encoder ticks per revolution.
    #[inline]
    pub fn encoder_steps(&self) -> i64 {
        self.encoder_steps
    }

    /// Current RPM estimate.
    pub fn rpm(&mut self, now_us: u64) -> u32 {
        self.rpm.rpm(now_us)
    }

    /// Fold `delta` drained encoder ticks into the position.
    ///
    /// While a sync is pending the position is frozen and the ticks count the
    /// sync toward the next whole revolution. Once it gets there the position
    /// snaps to `anchor()` plus whatever overshot the revolution boundary.
    /// Returns `true` when that snap happened.
    pub fn apply(&mut self, delta: i64, now_us: u64, anchor: impl FnOnce() -> i64) -> bool {
        if delta == 0 {
            return false;
        }
        self.rpm.record(delta, now_us);
        self.global = (self.global + delta).rem_euclid(self.encoder_steps);

        if self.sync != 0 {
            let next = self.sync + delta;
            let boundary = if delta > 0 {
                next.div_euclid(self.encoder_steps) * self.encoder_steps
            } else {
                -((-next).div_euclid(self.encoder_steps) * self.encoder_steps)
            };
            let crossed = if delta > 0 {
                boundary > self.sync
            } else {
                boundary < self.sync
            };
            if crossed {
                let overshoot = next - boundary;
                self.sync = 0;
                self.pos = anchor() + overshoot;
                self.avg = self.pos;
                return true;
            }
            self.sync = next;
            return false;
        }

        self.pos += delta;
        if self.pos > self.avg {
            self.avg = self.pos;
        } else if self.pos < self.avg - self.encoder_backlash {
            self.avg = self.pos + self.encoder_backlash;
        }
        false
    }

    /// Zero position, filtered position and any pending sync.
    pub fn zero(&mut self) {
        self.pos = 0;
        self.avg = 0;
        self.sync = 0;
    }

    /// Arm a phase catch-up.
    pub fn start_sync(&mut self, sync: i64) {
        self.sync = sync;
    }

    /// Shift both positions by `ticks`.
    pub fn shift(&mut self, ticks: i64) {
        self.pos += ticks;
        self.avg += ticks;
    }

    /// Set the filtered and raw position to the same value.
    pub fn snap_to(&mut self, pos: i64) {
        self.pos = pos;
        self.avg = pos;
    }

    /// Undo whole revolutions wound up while the pitch axis waited on a stop.
    ///
    /// `stop_spindle` is the spindle position corresponding to the stop the
    /// axis is parked on; `toward_left` says whether that stop is the left
    /// one. Only the direction that moves the spindle away from the stop
    /// accumulates slack.
    pub fn discount_full_turns(&mut self, gearing: &Gearing, stop_spindle: i64, toward_left: bool) {
        let rev = self.encoder_steps;
        let forward = gearing.pitch > 0;
        let diff = match (toward_left, forward) {
            (false, true) if self.pos < stop_spindle - rev => rev,
            (false, false) if self.pos > stop_spindle + rev => -rev,
            (true, true) if self.pos > stop_spindle + rev => -rev,
            (true, false) if self.pos < stop_spindle - rev => rev,
            _ => 0,
        };
        if diff != 0 {
            self.shift(diff);
        }
    }

    /// Restore persisted values.
    pub fn restore(&mut self, pos: i64, avg: i64, sync: i64, global: i64) {
        self.pos = pos;
        self.avg = avg;
        self.sync = sync;
        self.global = global.rem_euclid(self.encoder_steps);
    }
}
