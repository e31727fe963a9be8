//! Soft travel stops.

use serde::{Deserialize, Serialize};

/// Which of the two stops of an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSide {
    /// Upper bound (positive direction).
    Left,
    /// Lower bound (negative direction).
    Right,
}

/// Inclusive soft travel bounds in steps. `None` means unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stops {
    /// Upper bound.
    pub left: Option<i64>,
    /// Lower bound.
    pub right: Option<i64>,
}

impl Stops {
    /// Stops with neither side set.
    pub const fn unconstrained() -> Self {
        Self {
            left: None,
            right: None,
        }
    }

    /// Get one side.
    #[inline]
    pub fn get(&self, side: StopSide) -> Option<i64> {
        match side {
            StopSide::Left => self.left,
            StopSide::Right => self.right,
        }
    }

    /// Set or clear one side.
    #[inline]
    pub fn set(&mut self, side: StopSide, value: Option<i64>) {
        match side {
            StopSide::Left => self.left = value,
            StopSide::Right => self.right = value,
        }
    }

    /// Both sides are set.
    #[inline]
    pub fn both_set(&self) -> bool {
        self.left.is_some() && self.right.is_some()
    }

    /// Clamp a position into `[right, left]`, ignoring unset sides.
    pub fn clamp(&self, pos: i64) -> i64 {
        let mut pos = pos;
        if let Some(left) = self.left {
            pos = pos.min(left);
        }
        if let Some(right) = self.right {
            pos = pos.max(right);
        }
        pos
    }

    /// Position lies within the set bounds.
    pub fn contains(&self, pos: i64) -> bool {
        self.left.map_or(true, |l| pos <= l) && self.right.map_or(true, |r| pos >= r)
    }

    /// Re-express both set stops relative to a new origin located at `offset`.
    pub fn rebase(&mut self, offset: i64) {
        if let Some(left) = self.left.as_mut() {
            *left -= offset;
        }
        if let Some(right) = self.right.as_mut() {
            *right -= offset;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconstrained_clamp_is_identity() {
        let stops = Stops::unconstrained();
        assert_eq!(stops.clamp(i64::MAX), i64::MAX);
        assert_eq!(stops.clamp(-42), -42);
        assert!(stops.contains(i64::MIN));
    }

    #[test]
    fn test_clamp_single_side() {
        let stops = Stops {
            left: Some(100),
            right: None,
        };
        assert_eq!(stops.clamp(150), 100);
        assert_eq!(stops.clamp(-150), -150);
    }

    #[test]
    fn test_rebase_skips_unset() {
        let mut stops = Stops {
            left: Some(100),
            right: None,
        };
        stops.rebase(40);
        assert_eq!(stops.left, Some(60));
        assert_eq!(stops.right, None);
    }
}
