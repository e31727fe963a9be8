//! Axis model.
//!
//! An [`Axis`] pairs immutable [`AxisParams`] with an [`AxisState`] behind a
//! short-timeout lock. Manual move tasks, the command surface and the control
//! loop all take that lock independently of the global motion lock.

mod params;
mod profile;
mod state;
mod stops;

use core::fmt;
use core::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

pub use params::AxisParams;
pub use profile::SpeedRamp;
pub use state::AxisState;
pub use stops::{StopSide, Stops};

use crate::config::AxisConfig;

/// Identity of one of the three axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisId {
    /// Main lead screw, along the bed.
    Z,
    /// Cross slide.
    X,
    /// Auxiliary rotary axis.
    C,
}

impl AxisId {
    /// All axes in index order.
    pub const ALL: [AxisId; 3] = [AxisId::Z, AxisId::X, AxisId::C];

    /// Position in per-axis arrays.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            AxisId::Z => 0,
            AxisId::X => 1,
            AxisId::C => 2,
        }
    }

    /// Configuration and persistence key.
    pub const fn key(self) -> &'static str {
        match self {
            AxisId::Z => "z",
            AxisId::X => "x",
            AxisId::C => "c",
        }
    }
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            AxisId::Z => 'Z',
            AxisId::X => 'X',
            AxisId::C => 'C',
        };
        write!(f, "{}", letter)
    }
}

/// One axis: fixed parameters plus lock-guarded state.
#[derive(Debug)]
pub struct Axis {
    params: AxisParams,
    state: Mutex<AxisState>,
    lock_timeout: Duration,
}

impl Axis {
    /// Build an axis from configuration.
    pub fn new(id: AxisId, config: &AxisConfig, lock_timeout: Duration) -> Self {
        let params = AxisParams::from_config(id, config);
        let state = AxisState::new(&params);
        Self {
            params,
            state: Mutex::new(state),
            lock_timeout,
        }
    }

    /// Fixed parameters.
    #[inline]
    pub fn params(&self) -> &AxisParams {
        &self.params
    }

    /// Which axis this is.
    #[inline]
    pub fn id(&self) -> AxisId {
        self.params.id
    }

    /// Lock the state, giving up after the configured timeout.
    pub fn try_state(&self) -> Option<MutexGuard<'_, AxisState>> {
        self.state.try_lock_for(self.lock_timeout)
    }

    /// Lock the state, waiting as long as needed.
    ///
    /// Every holder of an axis lock releases it without taking other locks.
    pub fn state(&self) -> MutexGuard<'_, AxisState> {
        self.state.lock()
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> AxisState {
        self.state.lock().clone()
    }

    /// Steps not yet issued.
    pub fn pending(&self) -> i64 {
        self.state.lock().pending()
    }

    /// Current tool position.
    pub fn pos(&self) -> i64 {
        self.state.lock().pos()
    }

    /// Replace the outstanding work with a move to `target`.
    ///
    /// Returns `false` when the axis lock could not be taken in time; the
    /// caller retries.
    pub fn request_move(&self, target: i64, continuous: bool) -> bool {
        match self.try_state() {
            Some(mut state) => {
                state.request_move(&self.params, target, continuous);
                true
            }
            None => false,
        }
    }

    /// Re-base this axis to position zero.
    ///
    /// Returns `false` when the axis lock could not be taken in time.
    pub fn mark_origin(&self) -> bool {
        match self.try_state() {
            Some(mut state) => {
                state.mark_origin();
                true
            }
            None => false,
        }
    }

    /// Take or release an enable reference.
    pub fn hold_enable(&self, on: bool) {
        self.state.lock().hold_enable(&self.params, on);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn z() -> Axis {
        Axis::new(AxisId::Z, &AxisConfig::stock_z(), Duration::from_millis(10))
    }

    #[test]
    fn test_axis_id_lookup() {
        for (i, id) in AxisId::ALL.iter().enumerate() {
            assert_eq!(id.index(), i);
        }
        assert_eq!(AxisId::X.to_string(), "X");
        assert_eq!(AxisId::C.key(), "c");
    }

    #[test]
    fn test_request_move_under_lock() {
        let axis = z();
        assert!(axis.request_move(500, false));
        assert_eq!(axis.pending(), 500);
    }

    #[test]
    fn test_contended_request_is_rejected() {
        let axis = Axis::new(AxisId::Z, &AxisConfig::stock_z(), Duration::from_millis(1));
        let guard = axis.state();
        std::thread::scope(|s| {
            let handle = s.spawn(|| axis.request_move(500, false));
            assert!(!handle.join().unwrap());
        });
        drop(guard);
        assert_eq!(axis.pending(), 0);
    }
}
