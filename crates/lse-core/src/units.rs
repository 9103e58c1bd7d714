//! Unit newtypes for phasor quantities.
//!
//! Phasor data mixes magnitudes in per-unit or kilovolts with angles that
//! arrive in degrees from some devices and radians from others. Wrapping the
//! raw `f64` keeps the two apart at compile time:
//!
//! ```
//! use lse_core::units::{Degrees, Radians};
//!
//! let lag = Degrees(-120.0).to_radians();
//! assert!((lag.value() + 2.0 * std::f64::consts::FRAC_PI_3).abs() < 1e-12);
//!
//! // Angles are wrapped into (-pi, pi] after corrections are applied.
//! let wrapped = (Radians::PI + Radians(0.5)).wrapped();
//! assert!(wrapped.value() < 0.0);
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Neg, Sub};

macro_rules! impl_unit_ops {
    ($type:ty, $unit_name:literal) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Neg for $type {
            type Output = Self;
            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }

        impl Mul<f64> for $type {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:.4} {}", self.0, $unit_name)
            }
        }

        impl $type {
            #[inline]
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            /// Raw numeric value
            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }
        }
    };
}

// =============================================================================
// Voltage Units
// =============================================================================

/// Line-to-line voltage in kilovolts (kV)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Kilovolts(pub f64);

impl_unit_ops!(Kilovolts, "kV");

// =============================================================================
// Angle Units
// =============================================================================

/// Angle in radians
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Radians(pub f64);

impl_unit_ops!(Radians, "rad");

/// Angle in degrees, as most phasor measurement units report it
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Degrees(pub f64);

impl_unit_ops!(Degrees, "°");

impl Radians {
    #[inline]
    pub fn to_degrees(self) -> Degrees {
        Degrees(self.0.to_degrees())
    }

    /// Wrap into the half-open interval (-pi, pi].
    pub fn wrapped(self) -> Self {
        let tau = std::f64::consts::TAU;
        let mut angle = self.0 % tau;
        if angle <= -std::f64::consts::PI {
            angle += tau;
        } else if angle > std::f64::consts::PI {
            angle -= tau;
        }
        Self(angle)
    }

    pub const ZERO: Self = Self(0.0);
    pub const PI: Self = Self(std::f64::consts::PI);
}

impl Degrees {
    #[inline]
    pub fn to_radians(self) -> Radians {
        Radians(self.0.to_radians())
    }

    pub const ZERO: Self = Self(0.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_angle_conversion() {
        let rad = Degrees(180.0).to_radians();
        assert!((rad.value() - std::f64::consts::PI).abs() < 1e-10);
        assert!((rad.to_degrees().value() - 180.0).abs() < 1e-10);
    }

    #[test]
    fn test_wrapped_angles() {
        assert!((Radians(3.0 * std::f64::consts::PI).wrapped().value() - std::f64::consts::PI)
            .abs()
            < 1e-12);
        let wrapped = Radians(-std::f64::consts::PI).wrapped();
        assert!((wrapped.value() - std::f64::consts::PI).abs() < 1e-12);
        assert!((Radians(0.25).wrapped().value() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Degrees(45.0)), "45.0000 °");
        assert_eq!(format!("{}", Kilovolts(230.0)), "230.0000 kV");
    }
}
