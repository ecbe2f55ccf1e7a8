//! Retiming edit operations.
//!
//! The strip-level functions are the building blocks: each validates on a
//! staged copy of the key store and only writes it back when every check
//! passed, so an `Err` leaves the strip untouched. `RetimingCommand` is the
//! entry point the editor's command handlers use; it resolves targets from
//! the selection or the active strip, stages every affected strip, and
//! reports failures instead of returning them.

use smallvec::{smallvec, SmallVec};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::context::EditingContext;
use crate::editing::{Editing, Scene};
use crate::error::{Result, RetimingError};
use crate::keys::{KeyId, KeyStore, FRAME_EPSILON};
use crate::mapping;
use crate::strip::{Strip, StripId};

// ── Strip-level operations ──────────────────────────────────────

fn check_editable(strip: &Strip) -> Result<()> {
    if strip.locked {
        return Err(RetimingError::StripLocked);
    }
    Ok(())
}

/// Copy of the strip's keys, or fresh keys reproducing its legacy speed.
fn staged_store(strip: &Strip) -> KeyStore {
    strip
        .retiming
        .clone()
        .unwrap_or_else(|| KeyStore::new(strip.length / strip.legacy_speed()))
}

fn commit(strip: &mut Strip, store: KeyStore) {
    if strip.retiming.is_none() {
        strip.speed_factor = 1.0;
    }
    strip.retiming = Some(store);
}

fn validate_duration(duration: i64) -> Result<()> {
    if duration <= 0 {
        return Err(RetimingError::InvalidDuration(duration));
    }
    Ok(())
}

fn validate_speed(speed: f64) -> Result<()> {
    if !speed.is_finite() || speed <= 0.0 {
        return Err(RetimingError::InvalidSpeed(speed));
    }
    Ok(())
}

/// Add a key at a timeline frame without changing playback anywhere.
///
/// Returns the existing key if one is already at that frame.
pub fn add_key(scene: &Scene, strip: &mut Strip, timeline_frame: f64) -> Result<KeyId> {
    check_editable(strip)?;
    let (start, end) = mapping::timeline_range(scene, strip);
    if timeline_frame < start || timeline_frame > end {
        return Err(RetimingError::FrameOutOfRange {
            frame: timeline_frame,
        });
    }

    let frame = mapping::strip_frame_at(scene, strip, timeline_frame);
    check_outside_transition(strip, frame)?;
    let mut store = staged_store(strip);
    let index = store.insert_key(frame, strip.transition_curve)?;
    let id = store.keys()[index].id;
    commit(strip, store);
    debug!(strip = %strip.id, frame = timeline_frame, "retiming key added");
    Ok(id)
}

/// Remove keys. Removing one key of a transition removes the whole
/// transition. Boundary keys are skipped.
///
/// Returns the IDs of all removed keys.
pub fn remove_keys(strip: &mut Strip, keys: &[KeyId]) -> Result<SmallVec<[KeyId; 4]>> {
    check_editable(strip)?;
    let Some(current) = &strip.retiming else {
        return Ok(SmallVec::new());
    };
    let mut store = current.clone();

    let mut indices: SmallVec<[usize; 8]> = keys
        .iter()
        .filter_map(|id| store.index_of(*id))
        .map(|index| store.transition_pair(index).map_or(index, |(start, _)| start))
        .collect();
    indices.sort_unstable_by(|a, b| b.cmp(a));
    indices.dedup();

    let mut removed = SmallVec::new();
    let mut skipped_boundary = false;
    for index in indices {
        match store.remove_key(index) {
            Ok(ids) => removed.extend(ids),
            Err(RetimingError::BoundaryKey) => skipped_boundary = true,
            Err(err) => return Err(err),
        }
    }
    if removed.is_empty() {
        return if skipped_boundary {
            Err(RetimingError::BoundaryKey)
        } else {
            Ok(removed)
        };
    }

    commit(strip, store);
    debug!(strip = %strip.id, removed = removed.len(), "retiming keys removed");
    Ok(removed)
}

/// Key that begins the segment containing `strip_frame`.
///
/// `strip_frame` is in strip frames (media frames from the strip start),
/// not timeline frames; convert with `mapping::strip_frame_at` first.
pub fn find_segment_start(strip: &Strip, strip_frame: f64) -> Option<KeyId> {
    let store = strip.retiming.as_ref()?;
    let index = store.segment_start_index(strip_frame)?;
    store.get(index).map(|key| key.id)
}

/// Reject a strip frame strictly between a transition's two keys.
fn check_outside_transition(strip: &Strip, strip_frame: f64) -> Result<()> {
    let Some(store) = &strip.retiming else {
        return Ok(());
    };
    let Some(start) = find_segment_start(strip, strip_frame) else {
        return Ok(());
    };
    let Some(index) = store.index_of(start) else {
        return Ok(());
    };
    let keys = store.keys();
    let (a, b) = (&keys[index], &keys[index + 1]);
    if a.is_transition_start()
        && strip_frame > a.strip_frame_index + FRAME_EPSILON
        && strip_frame < b.strip_frame_index - FRAME_EPSILON
    {
        return Err(RetimingError::InsideTransition);
    }
    Ok(())
}

/// The strip's last key.
pub fn last_key(strip: &Strip) -> Option<KeyId> {
    strip.retiming.as_ref()?.last().map(|key| key.id)
}

/// Whether `key` is the strip's last key.
pub fn is_last_key(strip: &Strip, key: KeyId) -> bool {
    strip.retiming.as_ref().is_some_and(|store| store.is_last(key))
}

/// Freeze the content at a timeline frame for `duration` timeline frames.
///
/// A key is added at the frame first if needed. Everything after the freeze
/// is delayed, so the strip gets longer. Returns the key ending the freeze.
pub fn add_freeze_frame(
    scene: &Scene,
    strip: &mut Strip,
    timeline_frame: f64,
    duration: i64,
) -> Result<KeyId> {
    validate_duration(duration)?;
    check_editable(strip)?;
    let (start, end) = mapping::timeline_range(scene, strip);
    if timeline_frame < start || timeline_frame > end {
        return Err(RetimingError::FrameOutOfRange {
            frame: timeline_frame,
        });
    }

    let frame = mapping::strip_frame_at(scene, strip, timeline_frame);
    check_outside_transition(strip, frame)?;
    let mut store = staged_store(strip);
    let anchor = store.insert_key(frame, strip.transition_curve)?;
    freeze_staged(scene, strip, store, anchor, duration)
}

/// Freeze the content at an existing key.
pub fn add_freeze_frame_at_key(
    scene: &Scene,
    strip: &mut Strip,
    key: KeyId,
    duration: i64,
) -> Result<KeyId> {
    validate_duration(duration)?;
    check_editable(strip)?;
    let store = staged_store(strip);
    let anchor = store.index_of(key).ok_or(RetimingError::KeyNotFound(key))?;
    freeze_staged(scene, strip, store, anchor, duration)
}

fn freeze_staged(
    scene: &Scene,
    strip: &mut Strip,
    mut store: KeyStore,
    anchor: usize,
    duration: i64,
) -> Result<KeyId> {
    let span = duration as f64 * mapping::playback_rate_factor(scene, strip);
    let index = store.insert_freeze(anchor, span)?;
    let id = store.keys()[index].id;
    commit(strip, store);
    info!(strip = %strip.id, duration, "freeze frame added");
    Ok(id)
}

/// Replace `key` by a speed transition `duration` timeline frames long,
/// centred on the key.
///
/// Returns the transition's start and end keys.
pub fn add_transition(
    scene: &Scene,
    strip: &mut Strip,
    key: KeyId,
    duration: i64,
) -> Result<(KeyId, KeyId)> {
    validate_duration(duration)?;
    check_editable(strip)?;
    let mut store = strip
        .retiming
        .clone()
        .ok_or(RetimingError::KeyNotFound(key))?;
    let anchor = store.index_of(key).ok_or(RetimingError::KeyNotFound(key))?;

    let half_span = duration as f64 * mapping::playback_rate_factor(scene, strip) * 0.5;
    let ids = store.insert_transition(anchor, half_span, strip.transition_curve)?;
    commit(strip, store);
    info!(strip = %strip.id, duration, "speed transition added");
    Ok(ids)
}

/// Set the speed of the segment designated by `key`.
///
/// A key designates the segment ending at it; the first key designates the
/// segment starting at it. `speed` is a ratio (1.0 is native speed).
///
/// With `keep_retiming` every later key moves along: the other segments keep
/// their speed and the strip length changes. Without it only the segment's
/// right key moves and the following segment absorbs the difference; that
/// fails with `SegmentTooLong` when the next key leaves no room.
pub fn set_segment_speed(
    strip: &mut Strip,
    key: KeyId,
    speed: f64,
    keep_retiming: bool,
) -> Result<()> {
    validate_speed(speed)?;
    check_editable(strip)?;
    let mut store = strip
        .retiming
        .clone()
        .ok_or(RetimingError::KeyNotFound(key))?;
    let index = store.index_of(key).ok_or(RetimingError::KeyNotFound(key))?;
    let end_index = index.max(1);

    store.set_segment_speed(end_index, speed, strip.length, keep_retiming)?;
    commit(strip, store);
    info!(strip = %strip.id, speed, keep_retiming, "segment speed set");
    Ok(())
}

/// Rescale the whole strip so its average speed is `speed`.
pub fn set_strip_speed(strip: &mut Strip, speed: f64) -> Result<()> {
    validate_speed(speed)?;
    check_editable(strip)?;
    let mut store = staged_store(strip);
    store.rescale_to_speed(speed, strip.length);
    commit(strip, store);
    info!(strip = %strip.id, speed, "strip speed set");
    Ok(())
}

/// Back to a single full-length segment at normal speed.
pub fn reset_retiming(strip: &mut Strip) -> Result<()> {
    check_editable(strip)?;
    strip.reset_retiming();
    info!(strip = %strip.id, "retiming reset");
    Ok(())
}

// ── Commands ────────────────────────────────────────────────────

/// Outcome of a command or selection gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// Done, state changed.
    Finished,
    /// Nothing changed.
    Cancelled,
    /// Not handled; the editor should run its ordinary strip command.
    PassThrough,
    /// Waiting for the gesture to complete (e.g. mouse release).
    Running,
}

/// A retiming command, as issued by the editor's UI handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum RetimingCommand {
    /// Show or hide the active strip's keys. Always clears the selection.
    ToggleShow,
    /// Reset the active strip's retiming.
    Reset,
    /// Add a key to the active strip, at the playhead by default.
    AddKey { timeline_frame: Option<i64> },
    /// Freeze at every selected key, or at the playhead on the active strip.
    AddFreezeFrame { duration: i64 },
    /// Turn every selected key into a transition.
    AddTransition { duration: i64 },
    /// Set the speed of selected segments, or of the whole active strip when
    /// nothing is selected. `speed` is a percentage.
    SetSpeed { speed: f64, keep_retiming: bool },
    /// Remove all selected keys.
    RemoveSelected,
}

impl RetimingCommand {
    /// `SetSpeed` with its defaults: 100% and keep_retiming on.
    pub fn set_speed_default() -> Self {
        Self::SetSpeed {
            speed: 100.0,
            keep_retiming: true,
        }
    }

    /// Run the command. Failures are reported through the context, never
    /// returned.
    pub fn execute(&self, ctx: &mut EditingContext<'_>) -> CommandStatus {
        match self.apply(ctx) {
            Ok(()) => CommandStatus::Finished,
            Err(err) if err.is_reported() => {
                warn!(command = ?self, error = %err, "retiming command rejected");
                ctx.warn(&err.to_string());
                CommandStatus::Cancelled
            }
            Err(err) => {
                debug!(command = ?self, error = %err, "retiming command has no target");
                CommandStatus::Cancelled
            }
        }
    }

    fn apply(&self, ctx: &mut EditingContext<'_>) -> Result<()> {
        let scene = ctx.scene;
        match self {
            Self::ToggleShow => {
                let strip = active_strip_mut(ctx.editing)?;
                strip.show_retiming = !strip.show_retiming;
                ctx.editing.selection.clear();
                Ok(())
            }
            Self::Reset => {
                let strip = active_strip_mut(ctx.editing)?;
                reset_retiming(strip)?;
                let id = strip.id;
                ctx.editing.prune_selection();
                ctx.invalidate(id);
                ctx.resolve_overlap(id);
                Ok(())
            }
            Self::AddKey { timeline_frame } => {
                let frame = timeline_frame.unwrap_or(scene.current_frame) as f64;
                let strip = active_strip_mut(ctx.editing)?;
                add_key(scene, strip, frame)?;
                let id = strip.id;
                ctx.invalidate(id);
                Ok(())
            }
            Self::AddFreezeFrame { duration } => {
                let duration = *duration;
                let created = if ctx.editing.selection.is_empty() {
                    let frame = scene.current_frame as f64;
                    let strip = active_strip_mut(ctx.editing)?;
                    let key = add_freeze_frame(scene, strip, frame, duration)?;
                    vec![(strip.id, smallvec![key])]
                } else {
                    let groups = ctx.editing.selection.by_strip();
                    apply_per_strip(ctx.editing, &groups, |strip, keys| {
                        keys.iter()
                            .map(|key| add_freeze_frame_at_key(scene, strip, *key, duration))
                            .collect()
                    })?
                };
                finish_insertion(ctx, created);
                Ok(())
            }
            Self::AddTransition { duration } => {
                let duration = *duration;
                if ctx.editing.selection.is_empty() {
                    return Err(RetimingError::NoSelection);
                }
                let groups = ctx.editing.selection.by_strip();
                let created = apply_per_strip(ctx.editing, &groups, |strip, keys| {
                    let mut created = SmallVec::new();
                    for key in keys {
                        let (start, end) = add_transition(scene, strip, *key, duration)?;
                        created.push(start);
                        created.push(end);
                    }
                    Ok(created)
                })?;
                finish_insertion(ctx, created);
                Ok(())
            }
            Self::SetSpeed {
                speed,
                keep_retiming,
            } => {
                let ratio = speed / 100.0;
                let touched: Vec<StripId> = if ctx.editing.selection.is_empty() {
                    let strip = active_strip_mut(ctx.editing)?;
                    set_strip_speed(strip, ratio)?;
                    vec![strip.id]
                } else {
                    let groups = ctx.editing.selection.by_strip();
                    apply_per_strip(ctx.editing, &groups, |strip, keys| {
                        for key in keys {
                            set_segment_speed(strip, *key, ratio, *keep_retiming)?;
                        }
                        Ok(SmallVec::new())
                    })?
                    .into_iter()
                    .map(|(id, _)| id)
                    .collect()
                };
                for id in touched {
                    ctx.invalidate(id);
                    ctx.resolve_overlap(id);
                }
                Ok(())
            }
            Self::RemoveSelected => {
                if ctx.editing.selection.is_empty() {
                    return Err(RetimingError::NoSelection);
                }
                let groups = ctx.editing.selection.by_strip();
                let removed = apply_per_strip(ctx.editing, &groups, |strip, keys| {
                    remove_keys(strip, keys)
                })?;
                ctx.editing.prune_selection();
                for (id, _) in removed {
                    ctx.invalidate(id);
                }
                Ok(())
            }
        }
    }
}

fn active_strip_mut(editing: &mut Editing) -> Result<&mut Strip> {
    let id = editing.active_strip.ok_or(RetimingError::NoActiveStrip)?;
    editing.require_strip_mut(id)
}

type Created = Vec<(StripId, SmallVec<[KeyId; 4]>)>;

/// Run `op` on a copy of every strip in `groups` and write the copies back
/// only if all of them succeeded.
fn apply_per_strip<F>(
    editing: &mut Editing,
    groups: &BTreeMap<StripId, SmallVec<[KeyId; 4]>>,
    mut op: F,
) -> Result<Created>
where
    F: FnMut(&mut Strip, &[KeyId]) -> Result<SmallVec<[KeyId; 4]>>,
{
    let mut staged = Vec::with_capacity(groups.len());
    for (id, keys) in groups {
        let mut copy = editing
            .strip(*id)
            .ok_or(RetimingError::StripNotFound(*id))?
            .clone();
        let created = op(&mut copy, keys)?;
        staged.push((copy, created));
    }

    let mut results = Vec::with_capacity(staged.len());
    for (copy, created) in staged {
        let id = copy.id;
        if let Some(slot) = editing.strip_mut(id) {
            *slot = copy;
        }
        results.push((id, created));
    }
    Ok(results)
}

/// Select the keys a freeze or transition created, then refresh caches and
/// resolve overlaps for the lengthened strips.
fn finish_insertion(ctx: &mut EditingContext<'_>, created: Created) {
    ctx.editing.selection.clear();
    for (strip, keys) in &created {
        for key in keys {
            ctx.editing.selection.append(*key, *strip);
        }
    }
    for (strip, _) in created {
        ctx.invalidate(strip);
        ctx.resolve_overlap(strip);
    }
}
