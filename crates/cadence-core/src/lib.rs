//! Cadence Core - Foundation types for strip retiming
//!
//! This crate provides the primitives shared by the retiming engine:
//! - Frame rates with exact rational ratios
//! - View-space rectangles and points for hit testing

pub mod geometry;
pub mod time;

pub use geometry::{Rect, ViewPoint};
pub use time::FrameRate;
