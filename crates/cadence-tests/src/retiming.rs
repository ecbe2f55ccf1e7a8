//! Integration tests for retiming edit commands.
//!
//! Exercises the command layer together with the key store, frame mapping
//! and the editor collaborators.

use cadence_core::FrameRate;
use cadence_retiming::edit::{add_freeze_frame, add_key, add_transition, remove_keys};
use cadence_retiming::mapping::{give_frame_index, timeline_frame_get, timeline_range};
use cadence_retiming::{
    CommandStatus, KeyRole, RetimingCommand, RetimingError, Scene, SegmentKind, Strip,
    TransitionCurve,
};
use uuid::Uuid;

use crate::Harness;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

// ── Key / freeze / speed scenario ──────────────────────────────

#[test]
fn key_freeze_speed_scenario() {
    let mut h = Harness::new(Scene::default().with_current_frame(40));
    let id = h.add_active(Strip::new("shot", 1, 0.0, 100.0));

    assert_eq!(h.run(RetimingCommand::AddKey { timeline_frame: None }), CommandStatus::Finished);
    let segments = h.strip(id).segments();
    assert_eq!(segments.len(), 2);
    assert!(segments
        .iter()
        .all(|s| matches!(s.kind, SegmentKind::Constant { speed } if close(speed, 1.0))));
    assert!(close(give_frame_index(&h.scene, h.strip(id), 40.0), 40.0));

    assert_eq!(
        h.run(RetimingCommand::AddFreezeFrame { duration: 20 }),
        CommandStatus::Finished
    );
    let strip = h.strip(id);
    let keys = strip.keys();
    assert_eq!(keys.len(), 4);
    assert_eq!(keys[2].strip_frame_index, 60.0);
    assert_eq!(keys[1].retiming_factor, keys[2].retiming_factor);
    assert!(close(
        give_frame_index(&h.scene, strip, 50.0),
        give_frame_index(&h.scene, strip, 40.0)
    ));

    // The freeze selected the key at 60, which ends the freeze; select the
    // last key instead to address the segment after it.
    let last = keys[3].id;
    h.editing.selection.clear();
    h.editing.selection.append(last, id);
    assert_eq!(
        h.run(RetimingCommand::SetSpeed {
            speed: 200.0,
            keep_retiming: false,
        }),
        CommandStatus::Finished
    );

    let strip = h.strip(id);
    // 60 remaining content frames at double speed after the freeze.
    assert_eq!(timeline_range(&h.scene, strip).1, 90.0);
    assert!(close(give_frame_index(&h.scene, strip, 90.0), 100.0));
    assert!(close(give_frame_index(&h.scene, strip, 75.0), 70.0));
}

#[test]
fn speed_on_freeze_segment_is_rejected() {
    let mut h = Harness::new(Scene::default().with_current_frame(40));
    let id = h.add_active(Strip::new("shot", 1, 0.0, 100.0));
    h.run(RetimingCommand::AddFreezeFrame { duration: 20 });
    let before = h.strip(id).retiming.clone();

    let status = h.run(RetimingCommand::SetSpeed {
        speed: 50.0,
        keep_retiming: true,
    });
    assert_eq!(status, CommandStatus::Cancelled);
    assert_eq!(h.strip(id).retiming, before);
    assert_eq!(
        h.warnings(),
        vec!["Speed of freeze frame or transition segment cannot be changed"]
    );
}

#[test]
fn keep_retiming_keeps_other_segments_and_moves_end() {
    let scene = Scene::default();
    let mut h = Harness::new(scene);
    let id = h.add_active(Strip::new("shot", 1, 0.0, 100.0));
    let strip = h.editing.strip_mut(id).unwrap();
    let a = add_key(&scene, strip, 30.0).unwrap();
    add_key(&scene, strip, 60.0).unwrap();

    h.editing.selection.append(a, id);
    assert_eq!(h.run(RetimingCommand::set_speed_default()), CommandStatus::Finished);
    assert_eq!(h.strip(id).end_frame(), 100.0);

    h.run(RetimingCommand::SetSpeed {
        speed: 300.0,
        keep_retiming: true,
    });

    let strip = h.strip(id);
    assert_eq!(strip.keys()[1].strip_frame_index, 10.0);
    assert_eq!(strip.keys()[2].strip_frame_index, 40.0);
    assert_eq!(strip.end_frame(), 80.0);
    let segments = strip.segments();
    assert!(close(segments[0].speed(strip.length), 3.0));
    assert!(close(segments[1].speed(strip.length), 1.0));
    assert!(close(segments[2].speed(strip.length), 1.0));
    // Content after the edited segment plays unchanged, only earlier.
    assert!(close(give_frame_index(&h.scene, strip, 50.0), 70.0));
}

#[test]
fn fixed_length_speed_moves_only_segment_end() {
    let scene = Scene::default();
    let mut h = Harness::new(scene);
    let id = h.add_active(Strip::new("shot", 1, 0.0, 100.0));
    let strip = h.editing.strip_mut(id).unwrap();
    let a = add_key(&scene, strip, 30.0).unwrap();
    add_key(&scene, strip, 60.0).unwrap();

    h.editing.selection.append(a, id);
    h.run(RetimingCommand::SetSpeed {
        speed: 300.0,
        keep_retiming: false,
    });

    let strip = h.strip(id);
    assert_eq!(strip.keys()[1].strip_frame_index, 10.0);
    assert_eq!(strip.keys()[2].strip_frame_index, 60.0);
    assert_eq!(strip.end_frame(), 100.0);
}

#[test]
fn fixed_length_speed_without_room_warns() {
    let scene = Scene::default();
    let mut h = Harness::new(scene);
    let id = h.add_active(Strip::new("shot", 1, 0.0, 100.0));
    let strip = h.editing.strip_mut(id).unwrap();
    let a = add_key(&scene, strip, 30.0).unwrap();
    add_key(&scene, strip, 60.0).unwrap();

    h.editing.selection.append(a, id);
    let status = h.run(RetimingCommand::SetSpeed {
        speed: 25.0,
        keep_retiming: false,
    });
    assert_eq!(status, CommandStatus::Cancelled);
    assert_eq!(h.warnings(), vec!["Not enough space to change segment speed"]);

    // Rippling has room for the same change.
    let status = h.run(RetimingCommand::SetSpeed {
        speed: 25.0,
        keep_retiming: true,
    });
    assert_eq!(status, CommandStatus::Finished);
    assert_eq!(h.strip(id).end_frame(), 190.0);
}

#[test]
fn strip_speed_without_selection_resolves_overlap() {
    let mut h = Harness::new(Scene::default());
    let id = h.add_active(Strip::new("shot", 1, 0.0, 100.0));
    h.editing.add_strip(Strip::new("next", 1, 110.0, 50.0));

    h.run(RetimingCommand::SetSpeed {
        speed: 50.0,
        keep_retiming: true,
    });

    let strip = h.strip(id);
    assert!(close(strip.effective_speed_factor(), 0.5));
    assert_eq!(strip.channel, 2);
    assert_eq!(h.overlap.shuffled, vec![id]);
    assert!(h.recorder.preprocessed_invalidations.contains(&id));
}

#[test]
fn reset_restores_single_segment() {
    let mut h = Harness::new(Scene::default().with_current_frame(30));
    let id = h.add_active(Strip::new("shot", 1, 0.0, 100.0).with_speed_factor(2.0));
    h.run(RetimingCommand::AddFreezeFrame { duration: 15 });
    assert!(!h.editing.selection.is_empty());

    assert_eq!(h.run(RetimingCommand::Reset), CommandStatus::Finished);
    let strip = h.strip(id);
    assert_eq!(strip.keys().len(), 2);
    assert_eq!(strip.end_frame(), 100.0);
    assert_eq!(strip.effective_speed_factor(), 1.0);
    assert!(h.editing.selection.is_empty());
}

#[test]
fn legacy_speed_becomes_keys() {
    let scene = Scene::default();
    let mut strip = Strip::new("shot", 1, 0.0, 100.0).with_speed_factor(2.0);
    add_key(&scene, &mut strip, 25.0).unwrap();

    assert_eq!(strip.speed_factor, 1.0);
    assert_eq!(strip.end_frame(), 50.0);
    assert!(close(strip.effective_speed_factor(), 2.0));
    assert!(close(give_frame_index(&scene, &strip, 25.0), 50.0));
}

// ── Transitions ────────────────────────────────────────────────

#[test]
fn transition_blends_speeds() {
    let scene = Scene::default();
    let mut strip = Strip::new("shot", 1, 0.0, 100.0);
    let corner = add_key(&scene, &mut strip, 50.0).unwrap();
    let last = strip.keys()[2].id;
    // Second half at double speed: 50 content frames over 25.
    cadence_retiming::edit::set_segment_speed(&mut strip, last, 2.0, false).unwrap();

    let (start, end) = add_transition(&scene, &mut strip, corner, 10).unwrap();
    assert_eq!(timeline_frame_get(&scene, &strip, start).unwrap(), 45.0);
    assert_eq!(timeline_frame_get(&scene, &strip, end).unwrap(), 55.0);

    // Outside the transition nothing moved.
    assert!(close(give_frame_index(&scene, &strip, 40.0), 40.0));
    assert!(close(give_frame_index(&scene, &strip, 60.0), 70.0));

    // Inside, speed ramps from 1 to 2.
    let mut previous = give_frame_index(&scene, &strip, 45.0);
    let mut last_step = 0.0;
    for frame in 46..=55 {
        let content = give_frame_index(&scene, &strip, frame as f64);
        let step = content - previous;
        assert!(step >= last_step - 1e-9, "speed must not drop at {frame}");
        previous = content;
        last_step = step;
    }
    // Linear speed ramp: 45 + d + d^2 / 20.
    assert!(close(give_frame_index(&scene, &strip, 50.0), 51.25));
}

#[test]
fn linear_transition_curve() {
    let scene = Scene::default();
    let mut strip = Strip::new("shot", 1, 0.0, 100.0);
    strip.transition_curve = TransitionCurve::Linear;
    let corner = add_key(&scene, &mut strip, 50.0).unwrap();
    let last = strip.keys()[2].id;
    cadence_retiming::edit::set_segment_speed(&mut strip, last, 2.0, false).unwrap();
    add_transition(&scene, &mut strip, corner, 10).unwrap();

    // Keys at (45, 45) and (55, 60): constant 1.5 inside.
    assert!(close(give_frame_index(&scene, &strip, 50.0), 52.5));
    assert!(close(give_frame_index(&scene, &strip, 47.0), 48.0));
}

#[test]
fn add_key_inside_transition_warns() {
    let scene = Scene::default();
    let mut h = Harness::new(scene.with_current_frame(48));
    let id = h.add_active(Strip::new("shot", 1, 0.0, 100.0));
    let strip = h.editing.strip_mut(id).unwrap();
    let corner = add_key(&scene, strip, 50.0).unwrap();
    add_transition(&scene, strip, corner, 10).unwrap();
    let before = h.strip(id).retiming.clone();

    assert_eq!(
        h.run(RetimingCommand::AddKey { timeline_frame: None }),
        CommandStatus::Cancelled
    );
    assert_eq!(h.warnings(), vec!["Cannot create key inside of speed transition"]);
    assert_eq!(h.strip(id).retiming, before);
}

#[test]
fn transition_command_requires_selection() {
    let mut h = Harness::new(Scene::default());
    h.add_active(Strip::new("shot", 1, 0.0, 100.0));
    assert_eq!(
        h.run(RetimingCommand::AddTransition { duration: 10 }),
        CommandStatus::Cancelled
    );
    assert!(h.warnings().is_empty());
}

#[test]
fn transition_command_selects_pair() {
    let scene = Scene::default();
    let mut h = Harness::new(scene);
    let id = h.add_active(Strip::new("shot", 1, 0.0, 100.0));
    let corner = add_key(&scene, h.editing.strip_mut(id).unwrap(), 50.0).unwrap();
    h.editing.selection.append(corner, id);

    assert_eq!(
        h.run(RetimingCommand::AddTransition { duration: 10 }),
        CommandStatus::Finished
    );
    let strip = h.strip(id);
    let roles: Vec<KeyRole> = h
        .editing
        .selection
        .iter()
        .filter_map(|(key, _)| strip.key(key).map(|k| k.role))
        .collect();
    assert_eq!(roles.len(), 2);
    assert!(roles.contains(&KeyRole::TransitionStart));
    assert!(roles.contains(&KeyRole::TransitionEnd));
}

#[test]
fn too_long_transition_is_rejected() {
    let scene = Scene::default();
    let mut strip = Strip::new("shot", 1, 0.0, 100.0);
    let corner = add_key(&scene, &mut strip, 50.0).unwrap();
    assert_eq!(
        add_transition(&scene, &mut strip, corner, 100),
        Err(RetimingError::TransitionTooLong)
    );
    assert_eq!(strip.keys().len(), 3);
}

// ── Removal ────────────────────────────────────────────────────

#[test]
fn remove_selected_groups_per_strip() {
    let scene = Scene::default();
    let mut h = Harness::new(scene);
    let a = h.add_active(Strip::new("a", 1, 0.0, 100.0));
    let b = h.editing.add_strip(Strip::new("b", 2, 0.0, 100.0));
    let ka = add_key(&scene, h.editing.strip_mut(a).unwrap(), 20.0).unwrap();
    let kb = add_key(&scene, h.editing.strip_mut(b).unwrap(), 70.0).unwrap();
    h.editing.selection.append(ka, a);
    h.editing.selection.append(kb, b);

    assert_eq!(h.run(RetimingCommand::RemoveSelected), CommandStatus::Finished);
    assert_eq!(h.strip(a).keys().len(), 2);
    assert_eq!(h.strip(b).keys().len(), 2);
    assert!(h.editing.selection.is_empty());
}

#[test]
fn removing_only_boundary_keys_warns() {
    let mut h = Harness::new(Scene::default());
    let id = h.add_active(Strip::new("shot", 1, 0.0, 100.0));
    let first = h.editing.strip_mut(id).unwrap().ensure_retiming().keys()[0].id;
    h.editing.selection.append(first, id);

    assert_eq!(h.run(RetimingCommand::RemoveSelected), CommandStatus::Cancelled);
    assert_eq!(h.warnings(), vec!["Cannot remove first or last retiming key"]);
    assert_eq!(h.strip(id).keys().len(), 2);
}

#[test]
fn removing_transition_restores_corner_mapping() {
    let scene = Scene::default();
    let mut strip = Strip::new("shot", 1, 0.0, 100.0);
    let corner = add_key(&scene, &mut strip, 50.0).unwrap();
    let last = strip.keys()[2].id;
    cadence_retiming::edit::set_segment_speed(&mut strip, last, 2.0, false).unwrap();
    let before: Vec<f64> = (0..=75).map(|f| give_frame_index(&scene, &strip, f as f64)).collect();

    let (start, _) = add_transition(&scene, &mut strip, corner, 10).unwrap();
    remove_keys(&mut strip, &[start]).unwrap();

    assert_eq!(strip.keys().len(), 3);
    for (frame, expected) in before.iter().enumerate() {
        assert!(close(give_frame_index(&scene, &strip, frame as f64), *expected));
    }
}

// ── Frame rates and legacy data ────────────────────────────────

#[test]
fn media_rate_freeze_uses_timeline_duration() {
    let scene = Scene::new(FrameRate::FPS_25);
    let mut strip = Strip::new("shot", 1, 0.0, 100.0).with_media_frame_rate(FrameRate::FPS_50);
    add_freeze_frame(&scene, &mut strip, 20.0, 10).unwrap();

    // 100 media frames at 50 fps last 50 scene frames, plus the freeze.
    assert_eq!(timeline_range(&scene, &strip), (0.0, 60.0));
    assert!(close(give_frame_index(&scene, &strip, 25.0), 40.0));
    assert!(close(give_frame_index(&scene, &strip, 35.0), 50.0));
}

#[test]
fn legacy_json_is_sanitized() {
    let json = serde_json::json!({
        "id": Uuid::new_v4(),
        "name": "old",
        "channel": 3,
        "start": 12.0,
        "length": 100.0,
        "speed_factor": 0.0,
        "retiming": {
            "keys": [
                { "id": Uuid::new_v4(), "strip_frame_index": 100.0, "retiming_factor": 1.0 },
                { "id": Uuid::new_v4(), "strip_frame_index": -4.0, "retiming_factor": 0.0,
                  "role": "TransitionStart" },
                { "id": Uuid::new_v4(), "strip_frame_index": 50.0, "retiming_factor": 1.5 }
            ]
        }
    });
    let mut strip: Strip = serde_json::from_value(json).unwrap();
    assert!(!strip.show_retiming);

    assert!(strip.sanitize());
    assert_eq!(strip.speed_factor, 1.0);
    let keys = strip.keys();
    assert_eq!(keys.len(), 3);
    assert_eq!(keys[0].strip_frame_index, 0.0);
    assert_eq!(keys[0].role, KeyRole::Ordinary);
    assert_eq!(keys[1].retiming_factor, 1.0);
    assert!(keys.windows(2).all(|w| w[0].strip_frame_index < w[1].strip_frame_index));
    assert!(!strip.sanitize());
}

#[test]
fn strip_round_trips_through_json() {
    let scene = Scene::default();
    let mut strip = Strip::new("shot", 1, 5.0, 100.0);
    let corner = add_key(&scene, &mut strip, 55.0).unwrap();
    add_transition(&scene, &mut strip, corner, 6).unwrap();

    let text = serde_json::to_string(&strip).unwrap();
    let loaded: Strip = serde_json::from_str(&text).unwrap();
    assert_eq!(loaded.transition_curve, strip.transition_curve);
    assert_eq!(loaded.keys().len(), strip.keys().len());
    for (a, b) in loaded.keys().iter().zip(strip.keys()) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.role, b.role);
        assert!(close(a.strip_frame_index, b.strip_frame_index));
        assert!(close(a.retiming_factor, b.retiming_factor));
    }
}
