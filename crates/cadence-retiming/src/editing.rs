//! Scene settings and the strip container being edited.

use cadence_core::FrameRate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RetimingError};
use crate::selection::RetimingSelection;
use crate::strip::{Strip, StripId};

/// Scene-wide values the retiming core reads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Frame rate of the timeline.
    pub frame_rate: FrameRate,
    /// Playhead position.
    pub current_frame: i64,
}

impl Scene {
    /// Create a scene with the playhead at frame 0.
    pub fn new(frame_rate: FrameRate) -> Self {
        Self {
            frame_rate,
            current_frame: 0,
        }
    }

    /// Move the playhead.
    pub fn with_current_frame(mut self, frame: i64) -> Self {
        self.current_frame = frame;
        self
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(FrameRate::FPS_24)
    }
}

/// Retiming mode of a single strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetimingState {
    /// Keys are hidden or the strip is locked.
    Inactive,
    /// Keys are shown and can be edited.
    Editable { has_selection: bool },
}

/// The sequence container currently open for editing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Editing {
    /// Strips in display order.
    pub strips: Vec<Strip>,
    pub active_strip: Option<StripId>,
    /// Selected retiming keys. Not persisted.
    #[serde(skip)]
    pub selection: RetimingSelection,
}

impl Editing {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a strip and return its ID.
    pub fn add_strip(&mut self, strip: Strip) -> StripId {
        let id = strip.id;
        self.strips.push(strip);
        id
    }

    pub fn strip(&self, id: StripId) -> Option<&Strip> {
        self.strips.iter().find(|s| s.id == id)
    }

    pub fn strip_mut(&mut self, id: StripId) -> Option<&mut Strip> {
        self.strips.iter_mut().find(|s| s.id == id)
    }

    /// Look up a strip, failing with `StripNotFound`.
    pub fn require_strip_mut(&mut self, id: StripId) -> Result<&mut Strip> {
        self.strip_mut(id).ok_or(RetimingError::StripNotFound(id))
    }

    /// The active strip, if one is set and still present.
    pub fn active_strip(&self) -> Option<&Strip> {
        self.strip(self.active_strip?)
    }

    pub fn active_strip_mut(&mut self) -> Option<&mut Strip> {
        let id = self.active_strip?;
        self.strip_mut(id)
    }

    pub fn set_active_strip(&mut self, id: Option<StripId>) {
        self.active_strip = id;
    }

    /// Clear the ordinary strip selection.
    pub fn deselect_all_strips(&mut self) {
        for strip in &mut self.strips {
            strip.selected = false;
        }
    }

    /// Open another container. The retiming selection does not carry over.
    ///
    /// Returns the strips of the container that was open before.
    pub fn switch_container(&mut self, strips: Vec<Strip>) -> Vec<Strip> {
        self.selection.clear();
        self.active_strip = None;
        debug!(strips = strips.len(), "switched editing container");
        std::mem::replace(&mut self.strips, strips)
    }

    /// Drop selected keys whose strip or key no longer exists.
    pub fn prune_selection(&mut self) -> bool {
        let strips = &self.strips;
        self.selection.retain(|key, strip_id| {
            strips
                .iter()
                .find(|s| s.id == strip_id)
                .is_some_and(|s| s.key(key).is_some())
        })
    }

    /// Whether any retiming key is selected.
    pub fn retiming_mode_active(&self) -> bool {
        !self.selection.is_empty()
    }

    /// Retiming mode of a strip.
    pub fn retiming_state(&self, id: StripId) -> RetimingState {
        match self.strip(id) {
            Some(strip) if strip.is_retiming_editable() => RetimingState::Editable {
                has_selection: self.selection.iter().any(|(_, owner)| owner == id),
            },
            _ => RetimingState::Inactive,
        }
    }

    /// Repair every strip after loading older data.
    pub fn sanitize(&mut self) -> bool {
        let mut changed = false;
        for strip in &mut self.strips {
            changed |= strip.sanitize();
        }
        changed
    }
}
