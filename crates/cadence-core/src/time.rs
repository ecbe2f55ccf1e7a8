//! Frame rate representation for frame-accurate retiming.
//!
//! Rates are stored as numerator/denominator pairs so that ratios between
//! a scene rate and a media rate stay exact until the final conversion.

use num_rational::Rational64;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Frame rate as a rational number (e.g., 24000/1001 for 23.976 fps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    /// Numerator (e.g., 24000)
    pub numerator: u32,
    /// Denominator (e.g., 1001)
    pub denominator: u32,
}

impl FrameRate {
    /// Create a new frame rate.
    #[inline]
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Convert to frames per second as f64.
    #[inline]
    pub fn to_fps_f64(self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// Whether this rate can be used for arithmetic (non-zero terms).
    #[inline]
    pub fn is_valid(self) -> bool {
        self.numerator != 0 && self.denominator != 0
    }

    /// Exact ratio `self / other`.
    ///
    /// Returns `None` when either rate is degenerate.
    pub fn ratio_to(self, other: FrameRate) -> Option<Rational64> {
        if !self.is_valid() || !other.is_valid() {
            return None;
        }
        let a = Rational64::new(self.numerator as i64, self.denominator as i64);
        let b = Rational64::new(other.numerator as i64, other.denominator as i64);
        Some(a / b)
    }

    /// Ratio `self / other` as a float, `1.0` for degenerate rates.
    pub fn ratio_f64(self, other: FrameRate) -> f64 {
        self.ratio_to(other)
            .map(|r| *r.numer() as f64 / *r.denom() as f64)
            .unwrap_or(1.0)
    }

    /// Common frame rates
    pub const FPS_23_976: Self = Self::new(24000, 1001);
    pub const FPS_24: Self = Self::new(24, 1);
    pub const FPS_25: Self = Self::new(25, 1);
    pub const FPS_29_97: Self = Self::new(30000, 1001);
    pub const FPS_30: Self = Self::new(30, 1);
    pub const FPS_50: Self = Self::new(50, 1);
    pub const FPS_59_94: Self = Self::new(60000, 1001);
    pub const FPS_60: Self = Self::new(60, 1);
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::FPS_24
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fps = self.to_fps_f64();
        if (fps - fps.round()).abs() < 0.001 {
            write!(f, "{} fps", fps.round() as u32)
        } else {
            write!(f, "{:.3} fps", fps)
        }
    }
}
