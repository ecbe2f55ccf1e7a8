//! Interpolation laws for speed transition segments.
//!
//! A transition blends the speed of the segment before it into the speed of
//! the segment after it. Whatever the shape, the content position must hit
//! both transition keys exactly and never run backwards.

use serde::{Deserialize, Serialize};

/// The two keys of a transition plus the speeds of its neighbours.
///
/// Speeds are in retiming factor per strip frame, the unit the key store
/// works in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionSpan {
    pub start_frame: f64,
    pub end_frame: f64,
    pub start_factor: f64,
    pub end_factor: f64,
    pub speed_in: f64,
    pub speed_out: f64,
}

/// Interpolation used inside transition segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransitionCurve {
    /// Monotone cubic Hermite between the neighbouring speeds.
    ///
    /// When the transition keys sit on the extended neighbour segments (as
    /// they do right after creation) this is exactly a linear speed ramp.
    #[default]
    SpeedRamp,
    /// Straight line between the two keys (constant speed inside).
    Linear,
}

impl TransitionCurve {
    /// Evaluate the retiming factor at `frame` inside `span`.
    pub fn evaluate(self, span: &TransitionSpan, frame: f64) -> f64 {
        let width = span.end_frame - span.start_frame;
        if width <= 0.0 {
            return span.start_factor;
        }
        let u = ((frame - span.start_frame) / width).clamp(0.0, 1.0);
        let delta = span.end_factor - span.start_factor;
        if delta <= 0.0 {
            return span.start_factor;
        }

        match self {
            Self::Linear => span.start_factor + delta * u,
            Self::SpeedRamp => {
                let (m0, m1) = monotone_tangents(span.speed_in * width, span.speed_out * width, delta);
                let value = hermite(span.start_factor, m0, span.end_factor, m1, u);
                value.clamp(span.start_factor, span.end_factor)
            }
        }
    }
}

/// Limit tangents so the Hermite segment stays monotone (Fritsch-Carlson).
fn monotone_tangents(m0: f64, m1: f64, delta: f64) -> (f64, f64) {
    let mut alpha = (m0 / delta).max(0.0);
    let mut beta = (m1 / delta).max(0.0);
    let tau = alpha * alpha + beta * beta;
    if tau > 9.0 {
        let scale = 3.0 / tau.sqrt();
        alpha *= scale;
        beta *= scale;
    }
    (alpha * delta, beta * delta)
}

/// Cubic Hermite basis evaluation.
fn hermite(p0: f64, m0: f64, p1: f64, m1: f64, t: f64) -> f64 {
    let t2 = t * t;
    let t3 = t2 * t;

    let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
    let h10 = t3 - 2.0 * t2 + t;
    let h01 = -2.0 * t3 + 3.0 * t2;
    let h11 = t3 - t2;

    h00 * p0 + h10 * m0 + h01 * p1 + h11 * m1
}
