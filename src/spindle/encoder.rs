//! Lock-free encoder tick accumulator.

use core::sync::atomic::{AtomicI64, Ordering};

/// Unprocessed spindle encoder ticks.
///
/// Written from the encoder interrupt, drained once per control-loop tick.
#[derive(Debug, Default)]
pub struct SpindleEncoder {
    delta: AtomicI64,
}

impl SpindleEncoder {
    /// Empty accumulator.
    pub const fn new() -> Self {
        Self {
            delta: AtomicI64::new(0),
        }
    }

    /// Record one encoder edge. `forward` is the phase-B level decoded as
    /// direction.
    #[inline]
    pub fn on_edge(&self, forward: bool) {
        self.delta.fetch_add(if forward { 1 } else { -1 }, Ordering::Relaxed);
    }

    /// Record several ticks at once.
    #[inline]
    pub fn add(&self, ticks: i64) {
        self.delta.fetch_add(ticks, Ordering::Relaxed);
    }

    /// Take all accumulated ticks.
    #[inline]
    pub fn drain(&self) -> i64 {
        self.delta.swap(0, Ordering::Acquire)
    }
}
