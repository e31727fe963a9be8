//! Unit types for lathe quantities.
//!
//! Linear distances are carried in deci-microns (du, 10⁻⁷ m). Rotational axes
//! reuse the same scale with one du meaning 1/10000 of a degree.

use core::ops::{Add, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Deci-microns per millimeter.
pub const DU_PER_MM: i64 = 10_000;

/// Deci-microns per inch.
pub const DU_PER_INCH: i64 = 254_000;

/// Distance in deci-microns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct DeciMicrons(pub i64);

impl DeciMicrons {
    /// Create a new value.
    #[inline]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the raw value.
    #[inline]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Convert from millimeters, rounding to the nearest deci-micron.
    #[inline]
    pub fn from_mm(mm: f32) -> Self {
        Self((mm * DU_PER_MM as f32).round() as i64)
    }

    /// Convert to millimeters (or degrees on a rotational axis).
    #[inline]
    pub fn to_mm(self) -> f32 {
        self.0 as f32 / DU_PER_MM as f32
    }

    /// Convert to inches.
    #[inline]
    pub fn to_inch(self) -> f32 {
        self.0 as f32 / DU_PER_INCH as f32
    }

    /// Absolute value.
    #[inline]
    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }
}

impl Add for DeciMicrons {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for DeciMicrons {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Neg for DeciMicrons {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

/// Measurement system used for operator-facing values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasureUnit {
    /// Millimeters.
    #[default]
    Metric,
    /// Inches.
    Inch,
    /// Threads per inch (distances still shown in inches).
    Tpi,
}

impl MeasureUnit {
    /// Deci-microns in one unit of this measurement system.
    #[inline]
    pub fn du_per_unit(self) -> f32 {
        match self {
            MeasureUnit::Metric => DU_PER_MM as f32,
            MeasureUnit::Inch | MeasureUnit::Tpi => DU_PER_INCH as f32,
        }
    }

    /// Stable numeric code used by the persisted-state record.
    pub fn code(self) -> i64 {
        match self {
            MeasureUnit::Metric => 0,
            MeasureUnit::Inch => 1,
            MeasureUnit::Tpi => 2,
        }
    }

    /// Inverse of [`MeasureUnit::code`].
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(MeasureUnit::Metric),
            1 => Some(MeasureUnit::Inch),
            2 => Some(MeasureUnit::Tpi),
            _ => None,
        }
    }

    /// The coarsest manual move increment in this system (1 mm or 0.1").
    pub fn coarse_move_step(self) -> DeciMicrons {
        match self {
            MeasureUnit::Metric => DeciMicrons(DU_PER_MM),
            MeasureUnit::Inch | MeasureUnit::Tpi => DeciMicrons(DU_PER_INCH / 10),
        }
    }
}
