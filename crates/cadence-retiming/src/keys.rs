//! Retiming keys and the per-strip key store.
//!
//! Keys are kept in a contiguous vector sorted by `strip_frame_index`.
//! Positions are strip frames (offsets from the strip start, scaled by the
//! playback rate factor); `retiming_factor` is the normalized content
//! position in `[0, 1]`. Everything in this module works in those units; the
//! conversion from timeline frames happens in [`crate::mapping`].

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use tracing::warn;
use uuid::Uuid;

use crate::curve::{TransitionCurve, TransitionSpan};
use crate::error::{Result, RetimingError};

/// Keys may not be dragged closer than this (strip frames).
pub const MIN_SEGMENT_LENGTH: f64 = 1.0;

/// Two positions closer than this are the same frame.
pub const FRAME_EPSILON: f64 = 1e-4;

/// Stable handle to a retiming key, unique across strips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyId(pub Uuid);

impl KeyId {
    /// Create a new random key ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for KeyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a key means for the segments around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum KeyRole {
    #[default]
    Ordinary,
    /// Left key of a speed transition, always followed by `TransitionEnd`.
    TransitionStart,
    /// Right key of a speed transition.
    TransitionEnd,
}

/// A single retiming data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetimingKey {
    pub id: KeyId,
    pub strip_frame_index: f64,
    pub retiming_factor: f64,
    #[serde(default)]
    pub role: KeyRole,
}

impl RetimingKey {
    /// Create an ordinary key.
    pub fn new(strip_frame_index: f64, retiming_factor: f64) -> Self {
        Self {
            id: KeyId::new(),
            strip_frame_index,
            retiming_factor,
            role: KeyRole::Ordinary,
        }
    }

    /// Set the role.
    pub fn with_role(mut self, role: KeyRole) -> Self {
        self.role = role;
        self
    }

    pub fn is_transition_start(&self) -> bool {
        self.role == KeyRole::TransitionStart
    }

    pub fn is_transition_end(&self) -> bool {
        self.role == KeyRole::TransitionEnd
    }

    /// Whether the key is either end of a transition.
    pub fn is_transition(&self) -> bool {
        self.role != KeyRole::Ordinary
    }
}

/// Playback behaviour of a segment, derived from its bounding keys.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentKind {
    /// Constant speed in content frames per strip frame.
    Constant { speed: f64 },
    /// Both keys map to the same content position.
    Freeze,
    /// Smooth blend between the neighbouring speeds.
    Transition,
}

/// The interval between two consecutive keys.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// Index of the key the segment starts at.
    pub start_index: usize,
    pub start_frame: f64,
    pub end_frame: f64,
    pub start_factor: f64,
    pub end_factor: f64,
    pub kind: SegmentKind,
}

impl Segment {
    /// Duration in strip frames.
    pub fn duration(&self) -> f64 {
        self.end_frame - self.start_frame
    }

    /// Whether `frame` lies strictly inside the segment.
    pub fn contains_interior(&self, frame: f64) -> bool {
        frame > self.start_frame + FRAME_EPSILON && frame < self.end_frame - FRAME_EPSILON
    }

    /// Playback speed, `0.0` for freezes. Transitions report their average.
    pub fn speed(&self, content_length: f64) -> f64 {
        match self.kind {
            SegmentKind::Constant { speed } => speed,
            SegmentKind::Freeze => 0.0,
            SegmentKind::Transition => {
                let duration = self.duration();
                if duration <= 0.0 {
                    return 0.0;
                }
                (self.end_factor - self.start_factor) * content_length / duration
            }
        }
    }
}

/// Ordered retiming keys owned by one strip.
///
/// A store always holds at least the two boundary keys: the first at strip
/// frame 0 and the last at the strip's final frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyStore {
    keys: Vec<RetimingKey>,
}

impl KeyStore {
    /// Create a store with a single full-length segment ending at `end_frame`.
    pub fn new(end_frame: f64) -> Self {
        Self {
            keys: vec![
                RetimingKey::new(0.0, 0.0),
                RetimingKey::new(end_frame.max(MIN_SEGMENT_LENGTH), 1.0),
            ],
        }
    }

    /// Build a store from raw keys, e.g. from older data. Call
    /// [`KeyStore::sanitize`] before using it.
    pub fn from_keys(keys: Vec<RetimingKey>) -> Self {
        Self { keys }
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the store has no keys at all (only possible for corrupt data).
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// All keys in order.
    pub fn keys(&self) -> &[RetimingKey] {
        &self.keys
    }

    /// Key at the given index.
    pub fn get(&self, index: usize) -> Option<&RetimingKey> {
        self.keys.get(index)
    }

    /// Index of a key by ID.
    pub fn index_of(&self, id: KeyId) -> Option<usize> {
        self.keys.iter().position(|key| key.id == id)
    }

    /// Find a key by ID.
    pub fn key(&self, id: KeyId) -> Option<&RetimingKey> {
        self.keys.iter().find(|key| key.id == id)
    }

    pub fn first(&self) -> Option<&RetimingKey> {
        self.keys.first()
    }

    pub fn last(&self) -> Option<&RetimingKey> {
        self.keys.last()
    }

    /// Whether `id` is the last key.
    pub fn is_last(&self, id: KeyId) -> bool {
        self.last().is_some_and(|key| key.id == id)
    }

    /// Whether `id` is the first key.
    pub fn is_first(&self, id: KeyId) -> bool {
        self.first().is_some_and(|key| key.id == id)
    }

    /// Strip frame of the last key.
    pub fn end_frame(&self) -> f64 {
        self.last().map_or(0.0, |key| key.strip_frame_index)
    }

    /// Index of the key located at `frame`, if any.
    pub fn find_at(&self, frame: f64) -> Option<usize> {
        self.keys
            .iter()
            .position(|key| (key.strip_frame_index - frame).abs() < FRAME_EPSILON)
    }

    /// Index of the key that begins the segment containing `frame`.
    ///
    /// Frames outside the keyed range resolve to the first or last segment.
    pub fn segment_start_index(&self, frame: f64) -> Option<usize> {
        if self.keys.len() < 2 {
            return None;
        }
        let index = self
            .keys
            .partition_point(|key| key.strip_frame_index <= frame)
            .saturating_sub(1);
        Some(index.min(self.keys.len() - 2))
    }

    /// Slope of a segment in retiming factor per strip frame.
    pub fn segment_slope(&self, start_index: usize) -> f64 {
        match (self.keys.get(start_index), self.keys.get(start_index + 1)) {
            (Some(a), Some(b)) => {
                let span = b.strip_frame_index - a.strip_frame_index;
                if span <= 0.0 {
                    0.0
                } else {
                    (b.retiming_factor - a.retiming_factor) / span
                }
            }
            _ => 0.0,
        }
    }

    /// Derived segment starting at `start_index`.
    pub fn segment(&self, start_index: usize, content_length: f64) -> Option<Segment> {
        let a = self.keys.get(start_index)?;
        let b = self.keys.get(start_index + 1)?;
        let kind = if a.is_transition_start() {
            SegmentKind::Transition
        } else if (b.retiming_factor - a.retiming_factor).abs() < f64::EPSILON {
            SegmentKind::Freeze
        } else {
            SegmentKind::Constant {
                speed: self.segment_slope(start_index) * content_length,
            }
        };
        Some(Segment {
            start_index,
            start_frame: a.strip_frame_index,
            end_frame: b.strip_frame_index,
            start_factor: a.retiming_factor,
            end_factor: b.retiming_factor,
            kind,
        })
    }

    /// All segments in order.
    pub fn segments(&self, content_length: f64) -> impl Iterator<Item = Segment> + '_ {
        (0..self.keys.len().saturating_sub(1)).filter_map(move |i| self.segment(i, content_length))
    }

    /// Whether `frame` lies strictly inside a transition segment.
    pub fn is_inside_transition(&self, frame: f64) -> bool {
        let Some(index) = self.segment_start_index(frame) else {
            return false;
        };
        let (a, b) = (&self.keys[index], &self.keys[index + 1]);
        a.is_transition_start()
            && frame > a.strip_frame_index + FRAME_EPSILON
            && frame < b.strip_frame_index - FRAME_EPSILON
    }

    /// Indices `(start, end)` of the transition the key at `index` belongs to.
    pub fn transition_pair(&self, index: usize) -> Option<(usize, usize)> {
        let key = self.keys.get(index)?;
        let (start, end) = match key.role {
            KeyRole::Ordinary => return None,
            KeyRole::TransitionStart => (index, index + 1),
            KeyRole::TransitionEnd => (index.checked_sub(1)?, index),
        };
        let valid = self.keys.get(start)?.is_transition_start()
            && self.keys.get(end)?.is_transition_end();
        valid.then_some((start, end))
    }

    /// Geometry of the transition starting at `start_index`.
    fn transition_span(&self, start_index: usize) -> Option<TransitionSpan> {
        if start_index == 0 || start_index + 2 >= self.keys.len() {
            return None;
        }
        let a = &self.keys[start_index];
        let b = &self.keys[start_index + 1];
        Some(TransitionSpan {
            start_frame: a.strip_frame_index,
            end_frame: b.strip_frame_index,
            start_factor: a.retiming_factor,
            end_factor: b.retiming_factor,
            speed_in: self.segment_slope(start_index - 1),
            speed_out: self.segment_slope(start_index + 1),
        })
    }

    /// Evaluate the retiming factor at a strip frame.
    pub fn evaluate(&self, frame: f64, curve: TransitionCurve) -> f64 {
        let Some(index) = self.segment_start_index(frame) else {
            return self.first().map_or(0.0, |key| key.retiming_factor);
        };
        let a = &self.keys[index];
        let b = &self.keys[index + 1];
        let span = b.strip_frame_index - a.strip_frame_index;
        if span <= 0.0 {
            return a.retiming_factor;
        }
        let frame = frame.clamp(a.strip_frame_index, b.strip_frame_index);

        if a.is_transition_start() {
            if let Some(transition) = self.transition_span(index) {
                return curve.evaluate(&transition, frame);
            }
        }
        let step = (b.retiming_factor - a.retiming_factor) / span;
        a.retiming_factor + step * (frame - a.strip_frame_index)
    }

    /// Point where the transition's neighbour segments would meet if the
    /// transition did not exist, as `(strip_frame, factor)`.
    ///
    /// Falls back to the midpoint of the transition keys when the
    /// neighbours are parallel or meet outside the transition.
    pub fn transition_corner(&self, start_index: usize) -> Option<(f64, f64)> {
        let span = self.transition_span(start_index)?;
        let midpoint = (
            (span.start_frame + span.end_frame) * 0.5,
            (span.start_factor + span.end_factor) * 0.5,
        );
        let slope_diff = span.speed_in - span.speed_out;
        if slope_diff.abs() < 1e-12 {
            return Some(midpoint);
        }
        let x = (span.end_factor - span.start_factor + span.speed_in * span.start_frame
            - span.speed_out * span.end_frame)
            / slope_diff;
        if !x.is_finite() || x <= span.start_frame || x >= span.end_frame {
            return Some(midpoint);
        }
        Some((x, span.start_factor + span.speed_in * (x - span.start_frame)))
    }

    /// Whether positions strictly increase from key to key.
    pub fn is_strictly_increasing(&self) -> bool {
        self.keys
            .windows(2)
            .all(|pair| pair[0].strip_frame_index < pair[1].strip_frame_index)
    }

    // ── Mutation primitives ─────────────────────────────────────
    //
    // Each primitive validates before it mutates, so an `Err` leaves the
    // store untouched.

    /// Insert a key at `frame`, keeping the mapping unchanged everywhere.
    ///
    /// Returns the index of the existing key when one is already there.
    pub(crate) fn insert_key(&mut self, frame: f64, curve: TransitionCurve) -> Result<usize> {
        if let Some(index) = self.find_at(frame) {
            return Ok(index);
        }
        if frame < 0.0 || frame > self.end_frame() {
            return Err(RetimingError::FrameOutOfRange { frame });
        }
        if self.is_inside_transition(frame) {
            return Err(RetimingError::InsideTransition);
        }
        let factor = self.evaluate(frame, curve);
        Ok(self.insert_sorted(RetimingKey::new(frame, factor)))
    }

    fn insert_sorted(&mut self, key: RetimingKey) -> usize {
        let index = self
            .keys
            .partition_point(|k| k.strip_frame_index < key.strip_frame_index);
        self.keys.insert(index, key);
        index
    }

    /// Remove the key at `index`. Transition keys take their partner with
    /// them and leave the corner key behind.
    pub(crate) fn remove_key(&mut self, index: usize) -> Result<SmallVec<[KeyId; 2]>> {
        if index == 0 || index + 1 >= self.keys.len() {
            return Err(RetimingError::BoundaryKey);
        }
        let mut removed = SmallVec::new();
        match self.transition_pair(index) {
            Some((start, end)) => {
                let corner = self.transition_corner(start);
                removed.push(self.keys.remove(end).id);
                removed.push(self.keys.remove(start).id);
                if let Some((frame, factor)) = corner {
                    let prev = self.keys[start - 1].strip_frame_index;
                    let next = self.keys[start].strip_frame_index;
                    if frame > prev + FRAME_EPSILON && frame < next - FRAME_EPSILON {
                        self.keys.insert(start, RetimingKey::new(frame, factor));
                    }
                }
            }
            None => {
                removed.push(self.keys.remove(index).id);
            }
        }
        Ok(removed)
    }

    /// Hold the content of the key at `anchor` for `span` strip frames.
    ///
    /// Every later key is delayed by `span`; returns the index of the key
    /// that ends the freeze.
    pub(crate) fn insert_freeze(&mut self, anchor: usize, span: f64) -> Result<usize> {
        let key = self
            .keys
            .get(anchor)
            .ok_or(RetimingError::FrameOutOfRange { frame: span })?;
        if key.is_transition_start() {
            return Err(RetimingError::FreezeOnTransition);
        }
        let frame = key.strip_frame_index + span;
        let factor = key.retiming_factor;
        self.shift_from(anchor + 1, span);
        self.keys.insert(anchor + 1, RetimingKey::new(frame, factor));
        Ok(anchor + 1)
    }

    /// Replace the ordinary key at `anchor` by a transition spanning
    /// `half_span` strip frames on each side.
    pub(crate) fn insert_transition(
        &mut self,
        anchor: usize,
        half_span: f64,
        curve: TransitionCurve,
    ) -> Result<(KeyId, KeyId)> {
        if anchor == 0 || anchor + 1 >= self.keys.len() {
            return Err(RetimingError::TransitionAtBoundary);
        }
        let key = &self.keys[anchor];
        if key.is_transition() {
            return Err(RetimingError::TransitionFromTransition);
        }
        let start_frame = key.strip_frame_index - half_span;
        let end_frame = key.strip_frame_index + half_span;
        let prev = self.keys[anchor - 1].strip_frame_index;
        let next = self.keys[anchor + 1].strip_frame_index;
        if start_frame <= prev + FRAME_EPSILON || end_frame >= next - FRAME_EPSILON {
            return Err(RetimingError::TransitionTooLong);
        }

        let start = RetimingKey::new(start_frame, self.evaluate(start_frame, curve))
            .with_role(KeyRole::TransitionStart);
        let end = RetimingKey::new(end_frame, self.evaluate(end_frame, curve))
            .with_role(KeyRole::TransitionEnd);
        let ids = (start.id, end.id);
        self.keys.splice(anchor..=anchor, [start, end]);
        Ok(ids)
    }

    /// Give the constant segment ending at `end_index` a new speed.
    ///
    /// With `ripple` every later key follows the moved key; otherwise only
    /// the segment's right key moves and the next segment absorbs it.
    pub(crate) fn set_segment_speed(
        &mut self,
        end_index: usize,
        speed: f64,
        content_length: f64,
        ripple: bool,
    ) -> Result<()> {
        if end_index == 0 || end_index >= self.keys.len() {
            return Err(RetimingError::SegmentNotConstant);
        }
        let segment = self
            .segment(end_index - 1, content_length)
            .ok_or(RetimingError::SegmentNotConstant)?;
        if !matches!(segment.kind, SegmentKind::Constant { .. }) {
            return Err(RetimingError::SegmentNotConstant);
        }

        let content = (segment.end_factor - segment.start_factor) * content_length;
        let new_duration = (content / speed).round().max(MIN_SEGMENT_LENGTH);
        let new_frame = segment.start_frame + new_duration;

        if ripple {
            self.shift_from(end_index, new_frame - segment.end_frame);
        } else {
            if let Some(next) = self.keys.get(end_index + 1) {
                if new_frame > next.strip_frame_index - MIN_SEGMENT_LENGTH {
                    return Err(RetimingError::SegmentTooLong);
                }
            }
            self.keys[end_index].strip_frame_index = new_frame;
        }
        Ok(())
    }

    /// Scale all positions so the whole strip plays at `speed`.
    pub(crate) fn rescale_to_speed(&mut self, speed: f64, content_length: f64) {
        let (Some(first), Some(last)) = (self.first(), self.last()) else {
            return;
        };
        let end = last.strip_frame_index;
        let content = (last.retiming_factor - first.retiming_factor) * content_length;
        if end <= 0.0 || content <= 0.0 {
            return;
        }
        let scale = (content / end) / speed;

        for key in &mut self.keys {
            let scaled = key.strip_frame_index * scale;
            key.strip_frame_index = if key.is_transition() {
                scaled
            } else {
                scaled.round()
            };
        }
        for i in 1..self.keys.len() {
            let floor = self.keys[i - 1].strip_frame_index + MIN_SEGMENT_LENGTH;
            if self.keys[i].strip_frame_index < floor {
                self.keys[i].strip_frame_index = floor;
            }
        }
    }

    /// Move an ordinary key, clamped between its neighbours.
    ///
    /// Returns the strip frame the key ended up at.
    pub(crate) fn move_key(&mut self, index: usize, frame: f64) -> f64 {
        let lower = match index.checked_sub(1).and_then(|i| self.keys.get(i)) {
            Some(prev) => prev.strip_frame_index + MIN_SEGMENT_LENGTH,
            None => 0.0,
        };
        let upper = self
            .keys
            .get(index + 1)
            .map_or(f64::INFINITY, |next| next.strip_frame_index - MIN_SEGMENT_LENGTH);
        let frame = if lower <= upper {
            frame.clamp(lower, upper)
        } else {
            self.keys[index].strip_frame_index
        };
        self.keys[index].strip_frame_index = frame;
        frame
    }

    /// Shift every key except the first by `-offset`, so the first key can
    /// stay at frame 0 while the strip start moves by `offset`.
    ///
    /// Returns the offset actually applied.
    pub(crate) fn rebase(&mut self, offset: f64) -> f64 {
        let Some(second) = self.keys.get(1) else {
            return 0.0;
        };
        let offset = offset.min(second.strip_frame_index - MIN_SEGMENT_LENGTH);
        self.shift_from(1, -offset);
        offset
    }

    /// Resize the transition containing the key at `index` so that key lands
    /// on `frame`. The transition stays centred on its corner.
    ///
    /// Returns the strip frame the dragged key ended up at.
    pub(crate) fn resize_transition(&mut self, index: usize, frame: f64) -> Option<f64> {
        let (start, end) = self.transition_pair(index)?;
        let (corner, _) = self.transition_corner(start)?;
        let speed_in = self.segment_slope(start - 1);
        let speed_out = self.segment_slope(end);
        let prev = self.keys[start - 1].strip_frame_index;
        let next = self.keys[end + 1].strip_frame_index;

        let requested = if index == start {
            corner - frame
        } else {
            frame - corner
        };
        let max_half = (corner - prev - MIN_SEGMENT_LENGTH).min(next - MIN_SEGMENT_LENGTH - corner);
        let min_half = MIN_SEGMENT_LENGTH * 0.5;
        if max_half < min_half {
            return None;
        }
        let half = requested.clamp(min_half, max_half);

        let (in_frame, in_factor) = (
            self.keys[start].strip_frame_index,
            self.keys[start].retiming_factor,
        );
        let (out_frame, out_factor) = (
            self.keys[end].strip_frame_index,
            self.keys[end].retiming_factor,
        );
        let new_in = corner - half;
        let new_out = corner + half;
        self.keys[start].strip_frame_index = new_in;
        self.keys[start].retiming_factor = in_factor + speed_in * (new_in - in_frame);
        self.keys[end].strip_frame_index = new_out;
        self.keys[end].retiming_factor = out_factor + speed_out * (new_out - out_frame);

        Some(if index == start { new_in } else { new_out })
    }

    /// Move both keys of a transition by the same amount.
    ///
    /// Returns the offset actually applied.
    pub(crate) fn move_transition(&mut self, index: usize, offset: f64) -> Option<f64> {
        let (start, end) = self.transition_pair(index)?;
        let prev = self.keys.get(start.checked_sub(1)?)?.strip_frame_index;
        let next = self.keys.get(end + 1)?.strip_frame_index;
        let lower = prev + MIN_SEGMENT_LENGTH - self.keys[start].strip_frame_index;
        let upper = next - MIN_SEGMENT_LENGTH - self.keys[end].strip_frame_index;
        if lower > upper {
            return Some(0.0);
        }
        let offset = offset.clamp(lower, upper);
        self.keys[start].strip_frame_index += offset;
        self.keys[end].strip_frame_index += offset;
        Some(offset)
    }

    fn shift_from(&mut self, index: usize, offset: f64) {
        for key in self.keys.iter_mut().skip(index) {
            key.strip_frame_index += offset;
        }
    }

    /// Repair keys loaded from older or damaged data.
    ///
    /// Returns whether anything had to change.
    pub fn sanitize(&mut self, default_end: f64) -> bool {
        let before = self.keys.clone();

        self.keys.retain(|key| key.strip_frame_index.is_finite() && key.retiming_factor.is_finite());
        for key in &mut self.keys {
            if key.strip_frame_index < 0.0 {
                warn!(key = %key.id, frame = key.strip_frame_index, "negative key offset clamped");
                key.strip_frame_index = 0.0;
            }
            key.retiming_factor = key.retiming_factor.clamp(0.0, 1.0);
        }
        self.keys
            .sort_by(|a, b| a.strip_frame_index.total_cmp(&b.strip_frame_index));
        self.keys
            .dedup_by(|b, a| (b.strip_frame_index - a.strip_frame_index).abs() < FRAME_EPSILON);

        if self.keys.len() < 2 {
            warn!(keys = self.keys.len(), "too few retiming keys, resetting");
            *self = Self::new(default_end);
            return true;
        }
        self.keys[0].strip_frame_index = 0.0;

        for i in 1..self.keys.len() {
            let floor = self.keys[i - 1].retiming_factor;
            if self.keys[i].retiming_factor < floor {
                self.keys[i].retiming_factor = floor;
            }
        }

        let count = self.keys.len();
        for i in 0..count {
            let paired = match self.keys[i].role {
                KeyRole::Ordinary => true,
                KeyRole::TransitionStart => {
                    i > 0 && i + 2 < count && self.keys[i + 1].role == KeyRole::TransitionEnd
                }
                KeyRole::TransitionEnd => {
                    i > 1 && i + 1 < count && self.keys[i - 1].role == KeyRole::TransitionStart
                }
            };
            if !paired {
                warn!(key = %self.keys[i].id, "unpaired transition key demoted");
                self.keys[i].role = KeyRole::Ordinary;
            }
        }

        self.keys != before
    }
}
