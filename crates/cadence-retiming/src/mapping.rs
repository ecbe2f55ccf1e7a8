//! Conversion between timeline frames and content frames.
//!
//! Three spaces are involved:
//! - timeline frames, absolute in the scene;
//! - strip frames, `(timeline - strip.start) * rate` where `rate` is the media
//!   frame rate over the scene frame rate;
//! - content frames, `retiming_factor * strip.length`.
//!
//! Key positions are stored in strip frames, so every function here that
//! takes or returns a timeline frame needs the scene.

use crate::editing::Scene;
use crate::error::{Result, RetimingError};
use crate::keys::KeyId;
use crate::strip::{KeyPoint, Strip};

/// Strip frames per timeline frame.
pub fn playback_rate_factor(scene: &Scene, strip: &Strip) -> f64 {
    match strip.media_frame_rate {
        Some(rate) => rate.ratio_f64(scene.frame_rate),
        None => 1.0,
    }
}

/// Strip frame at a timeline frame.
pub fn strip_frame_at(scene: &Scene, strip: &Strip, timeline_frame: f64) -> f64 {
    (timeline_frame - strip.start) * playback_rate_factor(scene, strip)
}

/// Timeline frame at a strip frame.
pub fn timeline_frame_at(scene: &Scene, strip: &Strip, strip_frame: f64) -> f64 {
    strip.start + strip_frame / playback_rate_factor(scene, strip)
}

/// Timeline frame of a stored key.
pub fn timeline_frame_get(scene: &Scene, strip: &Strip, key: KeyId) -> Result<f64> {
    let key = strip.key(key).ok_or(RetimingError::KeyNotFound(key))?;
    Ok(timeline_frame_at(scene, strip, key.strip_frame_index))
}

/// Timeline frame of a stored or virtual key.
pub fn key_point_timeline_frame(scene: &Scene, strip: &Strip, point: &KeyPoint) -> f64 {
    timeline_frame_at(scene, strip, point.strip_frame_index)
}

/// Timeline frames covered by the strip's content, `[start, end)`.
pub fn timeline_range(scene: &Scene, strip: &Strip) -> (f64, f64) {
    (strip.start, timeline_frame_at(scene, strip, strip.end_frame()))
}

/// Whether two strips share a channel and overlap in time.
pub fn strips_overlap(scene: &Scene, a: &Strip, b: &Strip) -> bool {
    if a.channel != b.channel {
        return false;
    }
    let (a_start, a_end) = timeline_range(scene, a);
    let (b_start, b_end) = timeline_range(scene, b);
    a_start < b_end && b_start < a_end
}

/// Content frame shown at a strip frame.
pub fn content_frame_at(strip: &Strip, strip_frame: f64) -> f64 {
    let content = match &strip.retiming {
        Some(store) => store.evaluate(strip_frame, strip.transition_curve) * strip.length,
        None => strip_frame * strip.legacy_speed(),
    };
    content.clamp(0.0, strip.length.max(0.0))
}

/// Content frame shown at a timeline frame.
pub fn give_frame_index(scene: &Scene, strip: &Strip, timeline_frame: f64) -> f64 {
    content_frame_at(strip, strip_frame_at(scene, strip, timeline_frame))
}

/// Move a key so it sits at `timeline_frame`, leaving every other key's
/// timeline frame unchanged.
///
/// Ordinary keys snap to whole timeline frames and are clamped between their
/// neighbours. Moving the first key moves the strip start instead. Transition
/// keys resize their transition, see [`transition_key_frame_set`].
///
/// Returns the timeline frame the key ended up at.
pub fn timeline_frame_set(
    scene: &Scene,
    strip: &mut Strip,
    key: KeyId,
    timeline_frame: f64,
) -> Result<f64> {
    let index = strip.key_index(key).ok_or(RetimingError::KeyNotFound(key))?;
    if strip.keys()[index].is_transition() {
        return transition_key_frame_set(scene, strip, key, timeline_frame);
    }

    let rate = playback_rate_factor(scene, strip);
    let start = strip.start;
    let target = (timeline_frame.round() - start) * rate;
    let store = strip
        .retiming
        .as_mut()
        .ok_or(RetimingError::KeyNotFound(key))?;

    if index == 0 {
        let offset = store.rebase(target);
        strip.start += offset / rate;
        return Ok(strip.start);
    }
    let landed = store.move_key(index, target);
    Ok(start + landed / rate)
}

/// Resize the transition owning `key` so that `key` sits at
/// `timeline_frame`. Both transition keys move symmetrically about the
/// corner of the neighbouring segments.
///
/// Returns the timeline frame the key ended up at.
pub fn transition_key_frame_set(
    scene: &Scene,
    strip: &mut Strip,
    key: KeyId,
    timeline_frame: f64,
) -> Result<f64> {
    let index = strip.key_index(key).ok_or(RetimingError::KeyNotFound(key))?;
    let rate = playback_rate_factor(scene, strip);
    let start = strip.start;
    let store = strip
        .retiming
        .as_mut()
        .ok_or(RetimingError::KeyNotFound(key))?;
    let landed = store
        .resize_transition(index, (timeline_frame - start) * rate)
        .ok_or(RetimingError::TransitionTooLong)?;
    Ok(start + landed / rate)
}

/// Move a whole transition by `offset` timeline frames.
///
/// Returns the offset actually applied, in timeline frames.
pub fn transition_move(scene: &Scene, strip: &mut Strip, key: KeyId, offset: f64) -> Result<f64> {
    let index = strip.key_index(key).ok_or(RetimingError::KeyNotFound(key))?;
    let rate = playback_rate_factor(scene, strip);
    let store = strip
        .retiming
        .as_mut()
        .ok_or(RetimingError::KeyNotFound(key))?;
    let applied = store
        .move_transition(index, offset * rate)
        .ok_or(RetimingError::KeyNotFound(key))?;
    Ok(applied / rate)
}
