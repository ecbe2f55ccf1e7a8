//! Strips that carry retiming data.

use cadence_core::FrameRate;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use tracing::warn;
use uuid::Uuid;

use crate::curve::TransitionCurve;
use crate::keys::{KeyId, KeyRole, KeyStore, RetimingKey, Segment};

/// Stable handle to a strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StripId(pub Uuid);

impl StripId {
    /// Create a new random strip ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StripId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StripId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which end of an unretimed strip a virtual key stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Boundary {
    Left,
    Right,
}

/// Reference to a key as seen by selection and drawing code.
///
/// Strips without retiming data still expose their two boundary keys; those
/// are virtual until something materializes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyHandle {
    Stored(KeyId),
    Virtual(Boundary),
}

/// A key position, stored or virtual.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPoint {
    pub handle: KeyHandle,
    pub strip_frame_index: f64,
    pub retiming_factor: f64,
    pub role: KeyRole,
}

impl KeyPoint {
    fn stored(key: &RetimingKey) -> Self {
        Self {
            handle: KeyHandle::Stored(key.id),
            strip_frame_index: key.strip_frame_index,
            retiming_factor: key.retiming_factor,
            role: key.role,
        }
    }
}

/// A media strip in the sequencer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strip {
    pub id: StripId,
    pub name: String,
    /// Channel (row) the strip sits on.
    pub channel: u32,
    /// Timeline frame where content begins.
    pub start: f64,
    /// Source content length in frames.
    pub length: f64,
    /// Legacy uniform playback speed, only meaningful without retiming keys.
    #[serde(default = "default_speed")]
    pub speed_factor: f64,
    /// Native rate of the media, if it differs from the scene.
    #[serde(default)]
    pub media_frame_rate: Option<FrameRate>,
    #[serde(default)]
    pub show_retiming: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub transition_curve: TransitionCurve,
    #[serde(default)]
    pub retiming: Option<KeyStore>,
}

fn default_speed() -> f64 {
    1.0
}

impl Strip {
    /// Create a new strip without retiming data.
    pub fn new(name: impl Into<String>, channel: u32, start: f64, length: f64) -> Self {
        Self {
            id: StripId::new(),
            name: name.into(),
            channel,
            start,
            length,
            speed_factor: 1.0,
            media_frame_rate: None,
            show_retiming: true,
            locked: false,
            selected: false,
            transition_curve: TransitionCurve::default(),
            retiming: None,
        }
    }

    /// Set the media frame rate.
    pub fn with_media_frame_rate(mut self, rate: FrameRate) -> Self {
        self.media_frame_rate = Some(rate);
        self
    }

    /// Set the legacy uniform speed.
    pub fn with_speed_factor(mut self, speed: f64) -> Self {
        self.speed_factor = speed;
        self
    }

    /// Whether the strip carries stored retiming keys.
    pub fn has_retiming(&self) -> bool {
        self.retiming.is_some()
    }

    /// Stored keys, empty for strips without retiming.
    pub fn keys(&self) -> &[RetimingKey] {
        self.retiming.as_ref().map(KeyStore::keys).unwrap_or(&[])
    }

    /// Find a stored key by ID.
    pub fn key(&self, id: KeyId) -> Option<&RetimingKey> {
        self.retiming.as_ref()?.key(id)
    }

    /// Index of a stored key by ID.
    pub fn key_index(&self, id: KeyId) -> Option<usize> {
        self.retiming.as_ref()?.index_of(id)
    }

    /// Whether retiming keys of this strip can be selected and edited.
    pub fn is_retiming_editable(&self) -> bool {
        self.show_retiming && !self.locked
    }

    /// Legacy speed, with unusable values read as normal speed.
    pub fn legacy_speed(&self) -> f64 {
        if self.speed_factor.is_finite() && self.speed_factor > 0.0 {
            self.speed_factor
        } else {
            1.0
        }
    }

    /// Strip frame of the content end.
    pub fn end_frame(&self) -> f64 {
        match &self.retiming {
            Some(store) => store.end_frame(),
            None => self.length / self.legacy_speed(),
        }
    }

    /// Average playback speed over the whole strip.
    pub fn effective_speed_factor(&self) -> f64 {
        let Some(store) = &self.retiming else {
            return self.legacy_speed();
        };
        let (Some(first), Some(last)) = (store.first(), store.last()) else {
            return 1.0;
        };
        let end = last.strip_frame_index;
        if end <= 0.0 {
            return 1.0;
        }
        (last.retiming_factor - first.retiming_factor) * self.length / end
    }

    /// Derived segments. Strips without retiming have one constant segment.
    pub fn segments(&self) -> SmallVec<[Segment; 8]> {
        match &self.retiming {
            Some(store) => store.segments(self.length).collect(),
            None => KeyStore::new(self.end_frame()).segments(self.length).collect(),
        }
    }

    /// Keys for display and selection, including virtual boundary keys.
    pub fn key_points(&self) -> SmallVec<[KeyPoint; 4]> {
        match &self.retiming {
            Some(store) => store.keys().iter().map(KeyPoint::stored).collect(),
            None => smallvec::smallvec![
                KeyPoint {
                    handle: KeyHandle::Virtual(Boundary::Left),
                    strip_frame_index: 0.0,
                    retiming_factor: 0.0,
                    role: KeyRole::Ordinary,
                },
                KeyPoint {
                    handle: KeyHandle::Virtual(Boundary::Right),
                    strip_frame_index: self.end_frame(),
                    retiming_factor: 1.0,
                    role: KeyRole::Ordinary,
                },
            ],
        }
    }

    /// Make sure the strip has stored keys.
    ///
    /// A strip without retiming gets two keys that reproduce its legacy
    /// speed; the legacy speed is then reset because the keys supersede it.
    pub fn ensure_retiming(&mut self) -> &mut KeyStore {
        if self.retiming.is_none() {
            self.retiming = Some(KeyStore::new(self.length / self.legacy_speed()));
            self.speed_factor = 1.0;
        }
        self.retiming.get_or_insert_with(|| KeyStore::new(1.0))
    }

    /// Turn a key handle into a stored key, creating retiming data if the
    /// handle is virtual.
    pub fn materialize(&mut self, handle: KeyHandle) -> Option<KeyId> {
        match handle {
            KeyHandle::Stored(id) => self.key(id).map(|key| key.id),
            KeyHandle::Virtual(boundary) => {
                let store = self.ensure_retiming();
                let key = match boundary {
                    Boundary::Left => store.first(),
                    Boundary::Right => store.last(),
                };
                key.map(|key| key.id)
            }
        }
    }

    /// Drop all keys and restore normal speed.
    pub fn reset_retiming(&mut self) {
        self.retiming = Some(KeyStore::new(self.length));
        self.speed_factor = 1.0;
    }

    /// Repair values that older data may carry.
    ///
    /// Returns whether anything changed.
    pub fn sanitize(&mut self) -> bool {
        let mut changed = false;
        if !(self.speed_factor.is_finite() && self.speed_factor > 0.0) {
            warn!(strip = %self.id, speed = self.speed_factor, "invalid legacy speed reset to 1.0");
            self.speed_factor = 1.0;
            changed = true;
        }
        if !self.length.is_finite() || self.length < 0.0 {
            warn!(strip = %self.id, length = self.length, "invalid strip length clamped");
            self.length = 0.0;
            changed = true;
        }
        if !self.start.is_finite() {
            warn!(strip = %self.id, "non-finite strip start reset");
            self.start = 0.0;
            changed = true;
        }
        let default_end = self.length / self.legacy_speed();
        if let Some(store) = &mut self.retiming {
            changed |= store.sanitize(default_end);
        }
        changed
    }
}
