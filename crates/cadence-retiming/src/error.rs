//! Error types for retiming operations.
//!
//! The `Display` text of every variant doubles as the user-facing report
//! message, so keep them short and name the rule that was violated.

use thiserror::Error;

use crate::keys::KeyId;
use crate::strip::StripId;

/// Broad classes of failure, used to decide how a command reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The operation would break a key store invariant. Reported as a warning.
    Structural,
    /// Nothing to act on (empty selection, no strip). Cancelled silently.
    NoTarget,
    /// A parameter is out of its valid domain. Reported as a warning.
    InvalidInput,
}

/// Main error type for retiming operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetimingError {
    #[error("Cannot create key inside of speed transition")]
    InsideTransition,

    #[error("Cannot create transition from first or last key")]
    TransitionAtBoundary,

    #[error("Cannot create transition from a transition key")]
    TransitionFromTransition,

    #[error("Not enough space to create transition")]
    TransitionTooLong,

    #[error("Cannot create freeze frame from speed transition")]
    FreezeOnTransition,

    #[error("Cannot remove first or last retiming key")]
    BoundaryKey,

    #[error("Speed of freeze frame or transition segment cannot be changed")]
    SegmentNotConstant,

    #[error("Not enough space to change segment speed")]
    SegmentTooLong,

    #[error("Frame {frame} is outside of strip")]
    FrameOutOfRange { frame: f64 },

    #[error("Duration must be greater than zero, got {0}")]
    InvalidDuration(i64),

    #[error("Speed must be a positive number, got {0}")]
    InvalidSpeed(f64),

    #[error("Retiming of locked strip cannot be edited")]
    StripLocked,

    #[error("Retiming key {0} not found")]
    KeyNotFound(KeyId),

    #[error("Strip {0} not found")]
    StripNotFound(StripId),

    #[error("No active strip")]
    NoActiveStrip,

    #[error("No retiming keys selected")]
    NoSelection,
}

impl RetimingError {
    /// Classify the error according to how it should be surfaced.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InsideTransition
            | Self::TransitionAtBoundary
            | Self::TransitionFromTransition
            | Self::TransitionTooLong
            | Self::FreezeOnTransition
            | Self::BoundaryKey
            | Self::SegmentNotConstant
            | Self::SegmentTooLong
            | Self::StripLocked => ErrorKind::Structural,
            Self::FrameOutOfRange { .. } | Self::InvalidDuration(_) | Self::InvalidSpeed(_) => {
                ErrorKind::InvalidInput
            }
            Self::KeyNotFound(_)
            | Self::StripNotFound(_)
            | Self::NoActiveStrip
            | Self::NoSelection => ErrorKind::NoTarget,
        }
    }

    /// Whether the error should be shown to the user.
    pub fn is_reported(&self) -> bool {
        self.kind() != ErrorKind::NoTarget
    }
}

/// Result type alias for retiming operations.
pub type Result<T> = std::result::Result<T, RetimingError>;
