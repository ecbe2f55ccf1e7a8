//! Cadence Retiming - Strip retiming engine
//!
//! Remaps timeline time to content time for sequencer strips:
//! - Ordered retiming keys with constant, freeze and transition segments
//! - Timeline/content frame mapping
//! - Edit operations and the commands built on them
//! - Cross-strip key selection
//! - Drag-to-retime through a generic transform tool

pub mod context;
pub mod curve;
pub mod edit;
pub mod editing;
pub mod error;
pub mod keys;
pub mod mapping;
pub mod selection;
pub mod strip;
pub mod transform;

pub use context::{
    EditingContext, LogReports, NoCache, OverlapResolver, ReportLevel, ReportSink, StripCache,
};
pub use curve::{TransitionCurve, TransitionSpan};
pub use edit::{CommandStatus, RetimingCommand};
pub use editing::{Editing, RetimingState, Scene};
pub use error::{ErrorKind, Result, RetimingError};
pub use keys::{
    KeyId, KeyRole, KeyStore, RetimingKey, Segment, SegmentKind, FRAME_EPSILON,
    MIN_SEGMENT_LENGTH,
};
pub use selection::{ClickParams, KeyHit, RetimingSelection, SelectAction, SelectOp};
pub use strip::{Boundary, KeyHandle, KeyPoint, Strip, StripId};
pub use transform::{DragMode, TransformItem, TransformSession};
