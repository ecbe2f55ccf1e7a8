//! Dragging selected keys with the editor's generic transform tool.
//!
//! The tool moves 2D points; each selected key is exposed as
//! `(timeline frame, retiming factor)` and only the x offset is written
//! back. Every recalculation starts again from the state captured when the
//! drag began, so the result depends only on the current offset.

use glam::DVec2;
use smallvec::SmallVec;
use tracing::debug;

use crate::context::EditingContext;
use crate::edit::CommandStatus;
use crate::editing::{Editing, Scene};
use crate::keys::{KeyId, KeyStore};
use crate::mapping;
use crate::strip::StripId;

/// How a dragged key is written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragMode {
    /// Ordinary key, moved through `timeline_frame_set`.
    FrameSet,
    /// One key of a transition, resizing it about its corner.
    TransitionResize,
    /// Both keys of a transition selected; the pair moves rigidly.
    WholeTransition,
}

/// A key taking part in the drag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformItem {
    pub strip: StripId,
    pub key: KeyId,
    /// Position when the drag began.
    pub origin: DVec2,
    pub mode: DragMode,
}

#[derive(Debug, Clone)]
struct StripSnapshot {
    strip: StripId,
    start: f64,
    retiming: Option<KeyStore>,
}

/// An active drag of retiming keys.
#[derive(Debug, Clone)]
pub struct TransformSession {
    items: Vec<TransformItem>,
    snapshots: SmallVec<[StripSnapshot; 4]>,
}

impl TransformSession {
    /// Start dragging the selected keys of editable strips.
    ///
    /// Returns `None` when there is nothing to drag.
    pub fn begin(scene: &Scene, editing: &Editing) -> Option<Self> {
        let mut items = Vec::new();
        let mut snapshots: SmallVec<[StripSnapshot; 4]> = SmallVec::new();

        for (strip_id, keys) in editing.selection.by_strip() {
            let Some(strip) = editing.strip(strip_id) else {
                continue;
            };
            let Some(store) = strip.retiming.as_ref() else {
                continue;
            };
            if !strip.is_retiming_editable() {
                continue;
            }

            for key in &keys {
                let Some(index) = store.index_of(*key) else {
                    continue;
                };
                let mode = match store.transition_pair(index) {
                    None => DragMode::FrameSet,
                    Some((start, end)) => {
                        let start_id = store.keys()[start].id;
                        let end_id = store.keys()[end].id;
                        if keys.contains(&start_id) && keys.contains(&end_id) {
                            if index != start {
                                continue;
                            }
                            DragMode::WholeTransition
                        } else {
                            DragMode::TransitionResize
                        }
                    }
                };
                let data = &store.keys()[index];
                items.push(TransformItem {
                    strip: strip_id,
                    key: *key,
                    origin: DVec2::new(
                        mapping::timeline_frame_at(scene, strip, data.strip_frame_index),
                        data.retiming_factor,
                    ),
                    mode,
                });
            }
            snapshots.push(StripSnapshot {
                strip: strip_id,
                start: strip.start,
                retiming: strip.retiming.clone(),
            });
        }

        if items.is_empty() {
            return None;
        }
        debug!(keys = items.len(), strips = snapshots.len(), "retiming drag started");
        Some(Self { items, snapshots })
    }

    /// Keys being dragged.
    pub fn items(&self) -> &[TransformItem] {
        &self.items
    }

    /// Points handed to the transform tool.
    pub fn points(&self) -> impl Iterator<Item = DVec2> + '_ {
        self.items.iter().map(|item| item.origin)
    }

    fn restore(&self, editing: &mut Editing) {
        for snapshot in &self.snapshots {
            if let Some(strip) = editing.strip_mut(snapshot.strip) {
                strip.start = snapshot.start;
                strip.retiming = snapshot.retiming.clone();
            }
        }
    }

    /// Apply the tool's current offset from the drag origin.
    pub fn recalc(&mut self, ctx: &mut EditingContext<'_>, delta: DVec2) {
        let scene = ctx.scene;
        self.restore(ctx.editing);

        // Keys nearest the drag direction move first so they never clamp
        // against a neighbour that is about to move too.
        let mut order: SmallVec<[usize; 16]> = (0..self.items.len()).collect();
        order.sort_by(|&a, &b| {
            let (xa, xb) = (self.items[a].origin.x, self.items[b].origin.x);
            if delta.x > 0.0 {
                xb.total_cmp(&xa)
            } else {
                xa.total_cmp(&xb)
            }
        });

        for index in order {
            let item = self.items[index];
            let Some(strip) = ctx.editing.strip_mut(item.strip) else {
                continue;
            };
            let target = item.origin.x + delta.x;
            let result = match item.mode {
                DragMode::FrameSet => mapping::timeline_frame_set(scene, strip, item.key, target),
                DragMode::TransitionResize => {
                    mapping::transition_key_frame_set(scene, strip, item.key, target)
                }
                DragMode::WholeTransition => {
                    mapping::transition_move(scene, strip, item.key, delta.x)
                }
            };
            if let Err(err) = result {
                debug!(key = %item.key, error = %err, "drag step skipped key");
            }
        }

        for snapshot in &self.snapshots {
            ctx.cache.invalidate_preprocessed(snapshot.strip);
        }
    }

    /// Abort the drag, restoring every touched strip.
    pub fn cancel(self, ctx: &mut EditingContext<'_>) -> CommandStatus {
        self.restore(ctx.editing);
        for snapshot in &self.snapshots {
            ctx.cache.invalidate_preprocessed(snapshot.strip);
        }
        debug!("retiming drag cancelled");
        CommandStatus::Cancelled
    }

    /// Commit the drag and resolve overlaps caused by changed lengths.
    pub fn finish(self, ctx: &mut EditingContext<'_>) -> CommandStatus {
        for snapshot in &self.snapshots {
            ctx.invalidate(snapshot.strip);
            ctx.resolve_overlap(snapshot.strip);
        }
        ctx.editing.prune_selection();
        debug!(keys = self.items.len(), "retiming drag finished");
        CommandStatus::Finished
    }
}
