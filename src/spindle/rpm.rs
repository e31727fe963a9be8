//! Spindle speed estimate.
//!
//! Times each block of one revolution's worth of ticks. The reported value
//! refreshes at most once per second and ignores changes of a couple of RPM.

/// Spindle considered stopped after this long without ticks.
const STALL_US: u64 = 100_000;

/// Minimum interval between reported value changes.
const REFRESH_US: u64 = 1_000_000;

/// Block-averaged RPM estimator.
#[derive(Debug, Clone)]
pub struct RpmMeter {
    bulk: u64,
    index: u64,
    block_start_us: u64,
    block_us: u64,
    last_tick_us: u64,
    shown: u32,
    shown_at_us: Option<u64>,
}

impl RpmMeter {
    /// Estimator timing blocks of `bulk` ticks (one revolution).
    pub fn new(bulk: u32) -> Self {
        Self {
            bulk: bulk.max(1) as u64,
            index: 0,
            block_start_us: 0,
            block_us: 0,
            last_tick_us: 0,
            shown: 0,
            shown_at_us: None,
        }
    }

    /// Account for `delta` ticks observed at `now_us`.
    pub fn record(&mut self, delta: i64, now_us: u64) {
        if self.index >= self.bulk {
            self.block_us = now_us.saturating_sub(self.block_start_us);
            self.block_start_us = now_us;
            self.index = 0;
        }
        self.index += delta.unsigned_abs();
        self.last_tick_us = now_us;
    }

    /// Current estimate.
    pub fn rpm(&mut self, now_us: u64) -> u32 {
        if now_us > self.last_tick_us + STALL_US {
            return 0;
        }
        if let Some(at) = self.shown_at_us {
            if now_us < at + REFRESH_US {
                return self.shown;
            }
        }
        let mut rpm = 0;
        if self.block_us > 0 {
            rpm = (60_000_000 / self.block_us) as u32;
            let hysteresis = if rpm < 1000 { 2 } else { 5 };
            if rpm.abs_diff(self.shown) < hysteresis {
                rpm = self.shown;
            }
        }
        self.shown = rpm;
        self.shown_at_us = Some(now_us);
        rpm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spin(meter: &mut RpmMeter, ticks_per_rev: u64, rev_us: u64, revs: u64, start: u64) -> u64 {
        let step_us = rev_us / ticks_per_rev;
        let mut now = start;
        for _ in 0..ticks_per_rev * revs {
            now += step_us;
            meter.record(1, now);
        }
        now
    }

    #[test]
    fn test_steady_speed() {
        let mut meter = RpmMeter::new(1000);
        // 100 ms per revolution is 600 RPM.
        let now = spin(&mut meter, 1000, 100_000, 3, 0);
        assert_eq!(meter.rpm(now), 600);
    }

    #[test]
    fn test_stalled_reads_zero() {
        let mut meter = RpmMeter::new(1000);
        let now = spin(&mut meter, 1000, 100_000, 3, 0);
        assert_eq!(meter.rpm(now + 200_000), 0);
    }

    #[test]
    fn test_holds_value_within_refresh_interval() {
        let mut meter = RpmMeter::new(1000);
        let now = spin(&mut meter, 1000, 100_000, 3, 0);
        assert_eq!(meter.rpm(now), 600);
        // Speed doubles but the display holds for a second.
        let later = spin(&mut meter, 1000, 50_000, 3, now);
        assert_eq!(meter.rpm(later), 600);
        let much_later = spin(&mut meter, 1000, 50_000, 30, later);
        assert_eq!(meter.rpm(much_later), 1200);
    }
}
