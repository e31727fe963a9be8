//! Process-wide emergency-stop latch.
//!
//! Once set the latch never clears; recovery is a restart. The first cause
//! recorded wins.

use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

/// Why the emergency stop latched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstopCause {
    /// Input device fault, such as a key held at boot.
    Input,
    /// Pending steps exceeded the axis travel limit.
    TravelLimit,
    /// The motion lock could not be taken to re-mark the origin.
    OriginMarkLock,
    /// Stop requested while an axis was moving manually.
    OnOffDuringManualMove,
}

impl EstopCause {
    fn code(self) -> u8 {
        match self {
            EstopCause::Input => 1,
            EstopCause::TravelLimit => 2,
            EstopCause::OriginMarkLock => 3,
            EstopCause::OnOffDuringManualMove => 4,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(EstopCause::Input),
            2 => Some(EstopCause::TravelLimit),
            3 => Some(EstopCause::OriginMarkLock),
            4 => Some(EstopCause::OnOffDuringManualMove),
            _ => None,
        }
    }
}

impl fmt::Display for EstopCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstopCause::Input => write!(f, "input device fault"),
            EstopCause::TravelLimit => write!(f, "travel limit exceeded"),
            EstopCause::OriginMarkLock => write!(f, "origin mark could not lock motion"),
            EstopCause::OnOffDuringManualMove => write!(f, "on/off pressed during manual move"),
        }
    }
}

/// Terminal latch shared by every task.
#[derive(Debug, Default)]
pub struct EmergencyStop {
    cause: AtomicU8,
}

impl EmergencyStop {
    /// Unlatched.
    pub const fn new() -> Self {
        Self {
            cause: AtomicU8::new(0),
        }
    }

    /// Latch with `cause`. Returns `true` if this call set the latch.
    pub fn trigger(&self, cause: EstopCause) -> bool {
        let set = self
            .cause
            .compare_exchange(0, cause.code(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if set {
            tracing::error!(%cause, "emergency stop");
        }
        set
    }

    /// Latch is set.
    #[inline]
    pub fn is_latched(&self) -> bool {
        self.cause.load(Ordering::Acquire) != 0
    }

    /// First recorded cause, if latched.
    #[inline]
    pub fn cause(&self) -> Option<EstopCause> {
        EstopCause::from_code(self.cause.load(Ordering::Acquire))
    }

    /// `Err` with the recorded cause if latched.
    pub fn check(&self) -> crate::Result<()> {
        match self.cause() {
            Some(cause) => Err(cause.into()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_cause_wins() {
        let estop = EmergencyStop::new();
        assert!(!estop.is_latched());
        assert!(estop.check().is_ok());
        assert!(estop.trigger(EstopCause::TravelLimit));
        assert!(!estop.trigger(EstopCause::Input));
        assert_eq!(estop.cause(), Some(EstopCause::TravelLimit));
        assert!(estop.check().is_err());
    }
}
