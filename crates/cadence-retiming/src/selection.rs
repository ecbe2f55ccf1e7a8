//! Cross-strip selection of retiming keys.
//!
//! The selection lives in [`Editing`], not in strips or keys, so ordinary
//! strip selection and key selection never interfere. Click, box and
//! select-all gestures operate on an [`EditingContext`].

use cadence_core::{Rect, ViewPoint};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use tracing::debug;

use crate::context::EditingContext;
use crate::edit::CommandStatus;
use crate::editing::{Editing, Scene};
use crate::keys::KeyId;
use crate::mapping;
use crate::strip::{KeyHandle, Strip, StripId};

/// Selected keys and the strip owning each.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetimingSelection {
    keys: BTreeMap<KeyId, StripId>,
}

impl RetimingSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the selection.
    pub fn get(&self) -> &BTreeMap<KeyId, StripId> {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (KeyId, StripId)> + '_ {
        self.keys.iter().map(|(key, strip)| (*key, *strip))
    }

    pub fn append(&mut self, key: KeyId, strip: StripId) {
        self.keys.insert(key, strip);
    }

    pub fn remove(&mut self, key: KeyId) -> bool {
        self.keys.remove(&key).is_some()
    }

    pub fn contains(&self, key: KeyId) -> bool {
        self.keys.contains_key(&key)
    }

    /// Deselect everything. Returns whether anything was selected.
    pub fn clear(&mut self) -> bool {
        let changed = !self.keys.is_empty();
        self.keys.clear();
        changed
    }

    /// Keep only entries matching `keep`. Returns whether anything was dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(KeyId, StripId) -> bool) -> bool {
        let before = self.keys.len();
        self.keys.retain(|key, strip| keep(*key, *strip));
        self.keys.len() != before
    }

    /// Selected keys grouped by owning strip.
    pub fn by_strip(&self) -> BTreeMap<StripId, SmallVec<[KeyId; 4]>> {
        let mut groups: BTreeMap<StripId, SmallVec<[KeyId; 4]>> = BTreeMap::new();
        for (key, strip) in self.iter() {
            groups.entry(strip).or_default().push(key);
        }
        groups
    }
}

impl Editing {
    /// Click-style selection of one key.
    ///
    /// `deselect_all` clears the selection first; `toggle` flips membership
    /// instead of setting it.
    pub fn select_key(&mut self, strip: StripId, key: KeyId, toggle: bool, deselect_all: bool) {
        if deselect_all {
            self.selection.clear();
        }
        if toggle && self.selection.contains(key) {
            self.selection.remove(key);
        } else {
            self.selection.append(key, strip);
        }
    }

    /// Select `key` and every later key of the same strip.
    pub fn select_linked_time(&mut self, strip: StripId, key: KeyId) {
        let Some(owner) = self.strip(strip) else {
            return;
        };
        let Some(index) = owner.key_index(key) else {
            return;
        };
        let linked: SmallVec<[KeyId; 8]> = owner.keys()[index..].iter().map(|k| k.id).collect();
        for id in linked {
            self.selection.append(id, strip);
        }
    }
}

/// A key found under the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyHit {
    pub strip: StripId,
    pub handle: KeyHandle,
}

/// Modifiers of a click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClickParams {
    pub toggle: bool,
    pub deselect_all: bool,
    /// Defer deselecting others until release when clicking a selected key,
    /// so a drag can start on the existing selection.
    pub wait_to_deselect_others: bool,
    pub linked_time: bool,
}

/// Select the key under the cursor.
///
/// A miss clears the key selection and hands the click on to ordinary
/// strip selection.
pub fn click_select(
    ctx: &mut EditingContext<'_>,
    hit: Option<KeyHit>,
    params: ClickParams,
) -> CommandStatus {
    let editing = &mut *ctx.editing;
    let Some(hit) = hit else {
        if editing.selection.clear() {
            debug!("retiming selection cleared by click on empty space");
        }
        return CommandStatus::PassThrough;
    };

    let Some(key) = editing
        .strip_mut(hit.strip)
        .filter(|s| s.is_retiming_editable())
        .and_then(|s| s.materialize(hit.handle))
    else {
        return CommandStatus::Cancelled;
    };

    if !editing.retiming_mode_active() {
        editing.deselect_all_strips();
    }
    if params.wait_to_deselect_others && editing.selection.contains(key) {
        return CommandStatus::Running;
    }

    editing.select_key(hit.strip, key, params.toggle, params.deselect_all);
    if params.linked_time {
        editing.select_linked_time(hit.strip, key);
    }
    debug!(strip = %hit.strip, key = %key, "retiming key clicked");
    CommandStatus::Finished
}

/// How a box selection combines with the existing selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectOp {
    /// Replace the selection.
    #[default]
    Set,
    Add,
    Sub,
    Xor,
    /// Keep only keys that are selected and inside the box.
    And,
}

/// View-space position of a key: timeline frame, channel centre.
pub fn key_view_point(scene: &Scene, strip: &Strip, strip_frame: f64) -> ViewPoint {
    ViewPoint::new(
        mapping::timeline_frame_at(scene, strip, strip_frame),
        strip.channel as f64 + 0.5,
    )
}

/// Select keys inside a view-space rectangle.
///
/// Virtual keys under the box are materialized before they can be
/// selected, but only for ops that may add keys.
pub fn box_select(ctx: &mut EditingContext<'_>, rect: Rect, op: SelectOp) -> CommandStatus {
    let scene = ctx.scene;
    let editing = &mut *ctx.editing;

    let mut inside: SmallVec<[(StripId, KeyHandle); 16]> = SmallVec::new();
    for strip in editing.strips.iter().filter(|s| s.is_retiming_editable()) {
        for point in strip.key_points() {
            if rect.contains(key_view_point(scene, strip, point.strip_frame_index)) {
                inside.push((strip.id, point.handle));
            }
        }
    }

    let adds = matches!(op, SelectOp::Set | SelectOp::Add | SelectOp::Xor);
    let mut hits: SmallVec<[(StripId, KeyId); 16]> = SmallVec::new();
    for (strip_id, handle) in inside {
        let key = match handle {
            KeyHandle::Stored(id) => Some(id),
            KeyHandle::Virtual(_) if adds => editing
                .strip_mut(strip_id)
                .and_then(|s| s.materialize(handle)),
            KeyHandle::Virtual(_) => None,
        };
        if let Some(key) = key {
            hits.push((strip_id, key));
        }
    }

    let before = editing.selection.clone();
    match op {
        SelectOp::Set => {
            editing.selection.clear();
            for (strip, key) in &hits {
                editing.selection.append(*key, *strip);
            }
        }
        SelectOp::Add => {
            for (strip, key) in &hits {
                editing.selection.append(*key, *strip);
            }
        }
        SelectOp::Sub => {
            for (_, key) in &hits {
                editing.selection.remove(*key);
            }
        }
        SelectOp::Xor => {
            for (strip, key) in &hits {
                if !editing.selection.remove(*key) {
                    editing.selection.append(*key, *strip);
                }
            }
        }
        SelectOp::And => {
            editing
                .selection
                .retain(|key, _| hits.iter().any(|(_, hit)| *hit == key));
        }
    }

    debug!(hits = hits.len(), op = ?op, "retiming box select");
    if editing.selection == before {
        CommandStatus::Cancelled
    } else {
        CommandStatus::Finished
    }
}

/// Select-all actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectAction {
    Select,
    Deselect,
    Invert,
    /// Deselect if anything is selected, otherwise select everything.
    #[default]
    Toggle,
}

/// Apply a select-all action to the stored keys of every editable strip.
pub fn select_all(ctx: &mut EditingContext<'_>, action: SelectAction) -> CommandStatus {
    let editing = &mut *ctx.editing;
    let action = match action {
        SelectAction::Toggle if editing.selection.is_empty() => SelectAction::Select,
        SelectAction::Toggle => SelectAction::Deselect,
        other => other,
    };

    let all: Vec<(StripId, KeyId)> = editing
        .strips
        .iter()
        .filter(|s| s.is_retiming_editable())
        .flat_map(|s| s.keys().iter().map(move |k| (s.id, k.id)))
        .collect();

    match action {
        SelectAction::Select => {
            for (strip, key) in all {
                editing.selection.append(key, strip);
            }
        }
        SelectAction::Deselect => {
            editing.selection.clear();
        }
        SelectAction::Invert => {
            for (strip, key) in all {
                if !editing.selection.remove(key) {
                    editing.selection.append(key, strip);
                }
            }
        }
        SelectAction::Toggle => {}
    }
    debug!(action = ?action, selected = editing.selection.len(), "retiming select all");
    CommandStatus::Finished
}
