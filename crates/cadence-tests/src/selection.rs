//! Integration tests for retiming key selection.

use cadence_core::{Rect, ViewPoint};
use cadence_retiming::edit::add_key;
use cadence_retiming::selection::{box_select, click_select, key_view_point, select_all};
use cadence_retiming::{
    Boundary, ClickParams, CommandStatus, KeyHandle, KeyHit, KeyId, RetimingCommand, Scene,
    SelectAction, SelectOp, Strip, StripId,
};

use crate::Harness;

fn keyed_strip(h: &mut Harness, channel: u32, frames: &[f64]) -> StripId {
    let scene = h.scene;
    let mut strip = Strip::new("shot", channel, 0.0, 100.0);
    for frame in frames {
        add_key(&scene, &mut strip, *frame).unwrap();
    }
    h.editing.add_strip(strip)
}

fn key_ids(h: &Harness, strip: StripId) -> Vec<KeyId> {
    h.strip(strip).keys().iter().map(|k| k.id).collect()
}

// ── Select all ─────────────────────────────────────────────────

#[test]
fn select_all_toggle_round_trip() {
    let mut h = Harness::new(Scene::default());
    let a = keyed_strip(&mut h, 1, &[40.0]);
    let b = keyed_strip(&mut h, 2, &[20.0, 70.0]);

    h.with_ctx(|ctx| select_all(ctx, SelectAction::Toggle));
    assert_eq!(h.editing.selection.len(), 3 + 4);
    for key in key_ids(&h, a).into_iter().chain(key_ids(&h, b)) {
        assert!(h.editing.selection.contains(key));
    }

    h.with_ctx(|ctx| select_all(ctx, SelectAction::Toggle));
    assert!(h.editing.selection.is_empty());
}

#[test]
fn select_all_ignores_strips_without_keys() {
    let mut h = Harness::new(Scene::default());
    keyed_strip(&mut h, 1, &[40.0]);
    let plain = h.editing.add_strip(Strip::new("plain", 2, 0.0, 50.0));

    h.with_ctx(|ctx| select_all(ctx, SelectAction::Select));
    assert_eq!(h.editing.selection.len(), 3);
    assert!(!h.strip(plain).has_retiming());
}

#[test]
fn locked_strip_keys_are_not_selectable() {
    let mut h = Harness::new(Scene::default());
    let id = keyed_strip(&mut h, 1, &[40.0]);
    h.editing.strip_mut(id).unwrap().locked = true;

    h.with_ctx(|ctx| select_all(ctx, SelectAction::Select));
    assert!(h.editing.selection.is_empty());

    let key = key_ids(&h, id)[1];
    let hit = KeyHit {
        strip: id,
        handle: KeyHandle::Stored(key),
    };
    let status = h.with_ctx(|ctx| click_select(ctx, Some(hit), ClickParams::default()));
    assert_eq!(status, CommandStatus::Cancelled);
}

// ── Click select ───────────────────────────────────────────────

#[test]
fn click_with_deselect_all_replaces_selection() {
    let mut h = Harness::new(Scene::default());
    let a = keyed_strip(&mut h, 1, &[40.0]);
    let b = keyed_strip(&mut h, 2, &[60.0]);
    let ka = key_ids(&h, a)[1];
    let kb = key_ids(&h, b)[1];
    h.editing.selection.append(ka, a);

    let hit = KeyHit {
        strip: b,
        handle: KeyHandle::Stored(kb),
    };
    let params = ClickParams {
        deselect_all: true,
        ..Default::default()
    };
    h.with_ctx(|ctx| click_select(ctx, Some(hit), params));
    assert_eq!(h.editing.selection.len(), 1);
    assert!(h.editing.selection.contains(kb));
}

#[test]
fn click_with_toggle_adds_across_strips() {
    let mut h = Harness::new(Scene::default());
    let a = keyed_strip(&mut h, 1, &[40.0]);
    let b = keyed_strip(&mut h, 2, &[60.0]);
    let ka = key_ids(&h, a)[1];
    let kb = key_ids(&h, b)[1];
    h.editing.selection.append(ka, a);

    let params = ClickParams {
        toggle: true,
        ..Default::default()
    };
    let hit = KeyHit {
        strip: b,
        handle: KeyHandle::Stored(kb),
    };
    h.with_ctx(|ctx| click_select(ctx, Some(hit), params));
    assert_eq!(h.editing.selection.get().get(&kb), Some(&b));
    assert_eq!(h.editing.selection.get().get(&ka), Some(&a));
}

#[test]
fn click_linked_time_selects_following_keys() {
    let mut h = Harness::new(Scene::default());
    let id = keyed_strip(&mut h, 1, &[20.0, 50.0, 80.0]);
    let keys = key_ids(&h, id);

    let params = ClickParams {
        deselect_all: true,
        linked_time: true,
        ..Default::default()
    };
    let hit = KeyHit {
        strip: id,
        handle: KeyHandle::Stored(keys[2]),
    };
    h.with_ctx(|ctx| click_select(ctx, Some(hit), params));
    assert_eq!(h.editing.selection.len(), 3);
    assert!(!h.editing.selection.contains(keys[1]));
    assert!(h.editing.selection.contains(keys[4]));
}

#[test]
fn click_on_virtual_key_then_add_freeze_from_selection() {
    let mut h = Harness::new(Scene::default());
    let id = h.add_active(Strip::new("plain", 1, 0.0, 100.0));
    let hit = KeyHit {
        strip: id,
        handle: KeyHandle::Virtual(Boundary::Left),
    };
    h.with_ctx(|ctx| click_select(ctx, Some(hit), ClickParams::default()));
    assert_eq!(h.editing.selection.len(), 1);

    assert_eq!(
        h.run(RetimingCommand::AddFreezeFrame { duration: 10 }),
        CommandStatus::Finished
    );
    let strip = h.strip(id);
    assert_eq!(strip.keys().len(), 3);
    assert_eq!(strip.keys()[1].strip_frame_index, 10.0);
    assert_eq!(strip.keys()[1].retiming_factor, 0.0);
}

// ── Box select ─────────────────────────────────────────────────

#[test]
fn box_select_uses_timeline_position_and_channel() {
    let mut h = Harness::new(Scene::default());
    let scene = h.scene;
    let mut shifted = Strip::new("shifted", 3, 200.0, 100.0);
    add_key(&scene, &mut shifted, 240.0).unwrap();
    let id = h.editing.add_strip(shifted);

    let point = key_view_point(&h.scene, h.strip(id), 40.0);
    assert_eq!(point, ViewPoint::new(240.0, 3.5));

    let miss = Rect::from_corners(ViewPoint::new(30.0, 0.0), ViewPoint::new(50.0, 10.0));
    assert_eq!(
        h.with_ctx(|ctx| box_select(ctx, miss, SelectOp::Set)),
        CommandStatus::Cancelled
    );

    let hit = Rect::from_corners(ViewPoint::new(250.0, 4.0), ViewPoint::new(230.0, 3.0));
    assert_eq!(
        h.with_ctx(|ctx| box_select(ctx, hit, SelectOp::Set)),
        CommandStatus::Finished
    );
    assert_eq!(h.editing.selection.len(), 1);
}

#[test]
fn box_select_set_replaces_previous() {
    let mut h = Harness::new(Scene::default());
    let a = keyed_strip(&mut h, 1, &[20.0, 60.0]);
    let keys = key_ids(&h, a);
    h.editing.selection.append(keys[1], a);

    let rect = Rect::new(55.0, 0.0, 10.0, 5.0);
    h.with_ctx(|ctx| box_select(ctx, rect, SelectOp::Set));
    assert_eq!(h.editing.selection.len(), 1);
    assert!(h.editing.selection.contains(keys[2]));
}

#[test]
fn box_select_materializes_both_virtual_keys() {
    let mut h = Harness::new(Scene::default());
    let id = h.editing.add_strip(Strip::new("plain", 1, 0.0, 100.0).with_speed_factor(4.0));

    let rect = Rect::new(-5.0, 0.0, 40.0, 5.0);
    h.with_ctx(|ctx| box_select(ctx, rect, SelectOp::Add));

    let strip = h.strip(id);
    assert!(strip.has_retiming());
    assert_eq!(strip.end_frame(), 25.0);
    assert_eq!(strip.speed_factor, 1.0);
    assert_eq!(h.editing.selection.len(), 2);
}

// ── Container switch ───────────────────────────────────────────

#[test]
fn selection_does_not_survive_container_switch() {
    let mut h = Harness::new(Scene::default());
    keyed_strip(&mut h, 1, &[40.0]);
    h.with_ctx(|ctx| select_all(ctx, SelectAction::Select));
    assert!(!h.editing.selection.is_empty());

    let inner = vec![Strip::new("inner", 1, 0.0, 10.0)];
    let outer = h.editing.switch_container(inner);
    assert_eq!(outer.len(), 1);
    assert!(h.editing.selection.is_empty());
    assert!(!h.editing.retiming_mode_active());
}
