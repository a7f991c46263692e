//! End-to-end tests driving the whole core through a headless scene
//! backend.

use std::fs;
use std::time::Duration;

use calloop::EventLoop;

use crate::bindings::{Action, Condition, KeybindSpec};
use crate::core::types::{Direction, Point, Rect};
use crate::core::view::ViewId;
use crate::input::InputMode;
use crate::manager::{Config, Server};
use crate::scene::core::SceneConn;
use crate::scene::event::{KeyEvent, ModifiersEvent, SceneEvent, ViewMapEvent};
use crate::scene::headless::HeadlessConn;
use crate::scene::input::{keysym, KeyCode, ModMask};

type TestLoop = EventLoop<'static, Server<HeadlessConn>>;

const USABLE: Rect = Rect {
    x: 0,
    y: 0,
    width: 1000,
    height: 600,
};

fn test_config() -> Config {
    Config {
        workspaces: vec!["1".into(), "2".into(), "3".into(), "4".into()],
        gap: 10,
        ..Config::default()
    }
}

fn test_server(config: Config) -> (TestLoop, Server<HeadlessConn>) {
    let event_loop = EventLoop::try_new().unwrap();
    let conn = HeadlessConn::with_output(USABLE);
    let server = Server::new(conn, config, &event_loop);
    (event_loop, server)
}

fn map_view(server: &mut Server<HeadlessConn>, id: ViewId, geometry: Rect) {
    server.conn.note_mapped(id);
    server.conn.push_event(SceneEvent::ViewMapped(ViewMapEvent {
        id,
        app_id: format!("app-{}", id),
        title: format!("window {}", id),
        geometry,
        parent: None,
        modal: false,
        focus_policy: None,
        margins: None,
        wants_fullscreen: false,
    }));
    server.dispatch_events();
}

fn key(code: KeyCode, mods: ModMask, sym: u32, time: u32) -> KeyEvent {
    KeyEvent {
        device: "AT Translated Set 2 keyboard".into(),
        virtual_device: false,
        keycode: code,
        mods,
        translated: vec![sym],
        raw: vec![sym],
        time_msec: time,
    }
}

fn bind(combo: &str, id: Option<&str>, actions: Vec<Action>) -> KeybindSpec {
    let mut spec = KeybindSpec::new(combo, actions);
    spec.id = id.map(Into::into);
    spec.toggleable = id.is_some();
    spec
}

/// Runs the loop until all in-flight condition checks have settled.
fn settle_conditions(event_loop: &mut TestLoop, server: &mut Server<HeadlessConn>) {
    for _ in 0..200 {
        event_loop
            .dispatch(Some(Duration::from_millis(25)), server)
            .unwrap();
        if server.keyboard.conditions.is_empty() {
            return;
        }
    }
    panic!("condition checks did not settle");
}

#[test]
fn two_views_auto_tiling() {
    let (_l, mut server) = test_server(test_config());
    map_view(&mut server, 1, Rect::new(50, 50, 300, 200));
    map_view(&mut server, 2, Rect::new(400, 100, 300, 200));

    server.set_tiling_enabled(true).unwrap();

    assert_eq!(server.conn.committed(1), Some(Rect::new(10, 10, 485, 580)));
    assert_eq!(server.conn.committed(2), Some(Rect::new(505, 10, 485, 580)));
}

#[test]
fn three_views_on_wide_screen() {
    let (_l, mut server) = test_server(test_config());
    for id in 1u64..=3 {
        map_view(&mut server, id, Rect::new(50 * id as i32, 50, 300, 200));
    }

    server.set_tiling_enabled(true).unwrap();

    assert_eq!(server.conn.committed(1), Some(Rect::new(10, 10, 485, 285)));
    assert_eq!(server.conn.committed(2), Some(Rect::new(505, 10, 485, 285)));
    assert_eq!(server.conn.committed(3), Some(Rect::new(10, 305, 980, 285)));
}

#[test]
fn anchor_preservation_keeps_resized_view() {
    let (_l, mut server) = test_server(test_config());
    for id in 1u64..=3 {
        map_view(&mut server, id, Rect::new(50 * id as i32, 50, 300, 200));
    }
    server.set_tiling_enabled(true).unwrap();

    // the user drags view 2 out to the right half
    let resized = Rect::new(505, 10, 485, 580);
    server
        .conn
        .push_event(SceneEvent::ViewResizedByUser(2, resized));
    server.dispatch_events();

    assert_eq!(server.conn.committed(2), Some(resized));
    assert_eq!(server.conn.committed(1), Some(Rect::new(10, 10, 485, 285)));
    assert_eq!(server.conn.committed(3), Some(Rect::new(10, 305, 485, 285)));

    // a recalculate reproduces the same layout
    server.retile_all().unwrap();
    assert_eq!(server.conn.committed(2), Some(resized));
    assert_eq!(server.conn.committed(1), Some(Rect::new(10, 10, 485, 285)));
    assert_eq!(server.conn.committed(3), Some(Rect::new(10, 305, 485, 285)));
}

#[test]
fn tiled_views_stay_disjoint_and_inside() {
    for n in 1u64..=9 {
        let (_l, mut server) = test_server(test_config());
        for id in 1..=n {
            map_view(&mut server, id, Rect::new(20 * id as i32, 30, 400, 300));
        }
        server.set_tiling_enabled(true).unwrap();

        let rects: Vec<Rect> = (1..=n).map(|id| server.conn.committed(id).unwrap()).collect();
        for (i, a) in rects.iter().enumerate() {
            assert!(
                a.x >= USABLE.x
                    && a.y >= USABLE.y
                    && a.right() <= USABLE.right()
                    && a.bottom() <= USABLE.bottom(),
                "n={} rect {} outside usable area",
                n,
                a
            );
            for b in rects.iter().skip(i + 1) {
                assert!(!a.intersects(b), "n={} rects overlap: {} {}", n, a, b);
            }
        }
    }
}

#[test]
fn disable_then_enable_matches_fresh_recalculate() {
    let (_l, mut server) = test_server(test_config());
    for id in 1u64..=4 {
        map_view(&mut server, id, Rect::new(30 * id as i32, 40, 350, 250));
    }
    server.set_tiling_enabled(true).unwrap();
    let tiled: Vec<_> = (1u64..=4).map(|id| server.conn.committed(id)).collect();

    server.set_tiling_enabled(false).unwrap();
    server.set_tiling_enabled(true).unwrap();

    let again: Vec<_> = (1u64..=4).map(|id| server.conn.committed(id)).collect();
    assert_eq!(tiled, again);
}

#[test]
fn keybind_enable_disable_round_trip() {
    let _guard = crate::ctl::ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("XDG_RUNTIME_DIR", dir.path());

    let mut config = test_config();
    config.keybinds = vec![bind("M-m", Some("mute"), vec![Action::ToggleTiling])];
    let (_l, mut server) = test_server(config);
    server.conn.map_keysym(keysym::XK_m, vec![58]);

    // enabled: the press fires and the release is consumed
    server
        .handle_key_press(key(58, ModMask::LOGO, keysym::XK_m, 100))
        .unwrap();
    assert!(server.tiling.enabled);
    server
        .handle_key_release(key(58, ModMask::LOGO, keysym::XK_m, 110))
        .unwrap();
    assert!(server.conn.forwarded_keys().is_empty());

    // disabled over the control channel: the key goes to the client
    fs::write(dir.path().join("labwc-keybind-cmd"), "disable mute\n").unwrap();
    server.handle_control_commands();

    server
        .handle_key_press(key(58, ModMask::LOGO, keysym::XK_m, 200))
        .unwrap();
    assert!(server.tiling.enabled, "disabled bind must not fire");
    server
        .handle_key_release(key(58, ModMask::LOGO, keysym::XK_m, 210))
        .unwrap();
    assert_eq!(
        server.conn.forwarded_keys(),
        vec![(58, true, 200), (58, false, 210)]
    );

    // and back on
    fs::write(dir.path().join("labwc-keybind-cmd"), "enable mute\n").unwrap();
    server.handle_control_commands();

    server
        .handle_key_press(key(58, ModMask::LOGO, keysym::XK_m, 300))
        .unwrap();
    assert!(!server.tiling.enabled);
    server
        .handle_key_release(key(58, ModMask::LOGO, keysym::XK_m, 310))
        .unwrap();
    assert_eq!(server.conn.forwarded_keys().len(), 2);
}

#[test]
fn toggle_keybind_twice_is_a_noop() {
    let _guard = crate::ctl::ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("XDG_RUNTIME_DIR", dir.path());

    let mut config = test_config();
    config.keybinds = vec![bind("M-m", Some("mute"), vec![Action::ToggleTiling])];
    let (_l, mut server) = test_server(config);

    let enabled_before = server.bindings[0].is_enabled();
    for _ in 0..2 {
        fs::write(dir.path().join("labwc-keybind-cmd"), "toggle mute\n").unwrap();
        server.handle_control_commands();
    }
    assert_eq!(server.bindings[0].is_enabled(), enabled_before);
}

#[test]
fn condition_match_runs_actions_once() {
    let mut config = test_config();
    let mut spec = bind("M-m", None, vec![Action::ToggleTiling]);
    spec.condition = Some(Condition {
        command: "echo on".into(),
        values: vec!["on".into()],
    });
    config.keybinds = vec![spec];

    let (mut event_loop, mut server) = test_server(config);
    server.conn.map_keysym(keysym::XK_m, vec![58]);

    server
        .handle_key_press(key(58, ModMask::LOGO, keysym::XK_m, 1000))
        .unwrap();
    // the key is absorbed while the condition runs
    assert!(server.conn.forwarded_keys().is_empty());
    assert_eq!(server.keyboard.conditions.len(), 1);
    assert!(!server.tiling.enabled);

    settle_conditions(&mut event_loop, &mut server);

    assert!(server.tiling.enabled, "actions must run exactly once");
    server
        .handle_key_release(key(58, ModMask::LOGO, keysym::XK_m, 1050))
        .unwrap();
    assert!(server.conn.forwarded_keys().is_empty());
}

#[test]
fn condition_miss_reinjects_press_with_original_timestamp() {
    let mut config = test_config();
    let mut spec = bind("M-m", None, vec![Action::ToggleTiling]);
    spec.condition = Some(Condition {
        command: "echo off".into(),
        values: vec!["on".into()],
    });
    config.keybinds = vec![spec];

    let (mut event_loop, mut server) = test_server(config);
    server.conn.map_keysym(keysym::XK_m, vec![58]);

    server
        .handle_key_press(key(58, ModMask::LOGO, keysym::XK_m, 1000))
        .unwrap();
    settle_conditions(&mut event_loop, &mut server);

    assert!(!server.tiling.enabled);
    assert_eq!(server.conn.forwarded_keys(), vec![(58, true, 1000)]);

    // the release is forwarded normally
    server
        .handle_key_release(key(58, ModMask::LOGO, keysym::XK_m, 1100))
        .unwrap();
    assert_eq!(
        server.conn.forwarded_keys(),
        vec![(58, true, 1000), (58, false, 1100)]
    );
}

#[test]
fn reconfigure_drops_repeat_and_condition_contexts() {
    let mut config = test_config();
    let mut spec = bind("M-m", None, vec![Action::ToggleTiling]);
    spec.condition = Some(Condition {
        command: "sleep 5".into(),
        values: vec![],
    });
    config.keybinds = vec![spec];

    let (_l, mut server) = test_server(config);
    server.conn.map_keysym(keysym::XK_m, vec![58]);

    server
        .handle_key_press(key(58, ModMask::LOGO, keysym::XK_m, 100))
        .unwrap();
    assert_eq!(server.keyboard.conditions.len(), 1);

    server.reconfigure().unwrap();
    assert!(server.keyboard.conditions.is_empty());
    assert!(server.keyboard.repeat_bind.is_none());
    assert!(server.keyboard.bound.is_empty());
}

#[test]
fn unmatched_key_is_forwarded() {
    let (_l, mut server) = test_server(test_config());
    server
        .handle_key_press(key(30, ModMask::empty(), keysym::XK_a, 5))
        .unwrap();
    server
        .handle_key_release(key(30, ModMask::empty(), keysym::XK_a, 10))
        .unwrap();
    assert_eq!(
        server.conn.forwarded_keys(),
        vec![(30, true, 5), (30, false, 10)]
    );
}

#[test]
fn session_lock_gates_keybinds() {
    let mut config = test_config();
    let mut locked_ok = bind("M-l", None, vec![Action::ToggleTiling]);
    locked_ok.allow_when_locked = true;
    config.keybinds = vec![bind("M-m", None, vec![Action::Exit]), locked_ok];

    let (_l, mut server) = test_server(config);
    server.conn.map_keysym(keysym::XK_m, vec![58]);
    server.conn.map_keysym(keysym::XK_l, vec![46]);
    server.conn.set_locked(true);

    server
        .handle_key_press(key(58, ModMask::LOGO, keysym::XK_m, 1))
        .unwrap();
    assert_eq!(server.conn.forwarded_keys(), vec![(58, true, 1)]);

    server
        .handle_key_press(key(46, ModMask::LOGO, keysym::XK_l, 2))
        .unwrap();
    assert!(server.tiling.enabled);
}

#[test]
fn on_release_bind_fires_on_release() {
    let mut config = test_config();
    let mut spec = bind("M-m", None, vec![Action::ToggleTiling]);
    spec.on_release = true;
    config.keybinds = vec![spec];

    let (_l, mut server) = test_server(config);
    server.conn.map_keysym(keysym::XK_m, vec![58]);

    server
        .handle_key_press(key(58, ModMask::LOGO, keysym::XK_m, 1))
        .unwrap();
    assert!(!server.tiling.enabled);

    server
        .handle_key_release(key(58, ModMask::LOGO, keysym::XK_m, 2))
        .unwrap();
    assert!(server.tiling.enabled);
    assert!(server.conn.forwarded_keys().is_empty());
}

#[test]
fn vt_switch_takes_the_privileged_path() {
    let (_l, mut server) = test_server(test_config());
    server
        .handle_key_press(key(60, ModMask::CTRL | ModMask::ALT, keysym::XF86XK_Switch_VT_2, 1))
        .unwrap();
    assert_eq!(server.conn.vt_switch_log(), vec![2]);
    assert!(server.conn.forwarded_keys().is_empty());
}

#[test]
fn alt_tab_cycles_and_finishes_on_modifier_release() {
    let mut config = test_config();
    config.keybinds = vec![bind("A-Tab", None, vec![Action::Focus(Direction::Forward)])];
    let (_l, mut server) = test_server(config);
    server.conn.map_keysym(keysym::XK_Tab, vec![15]);

    map_view(&mut server, 1, Rect::new(0, 0, 400, 300));
    map_view(&mut server, 2, Rect::new(400, 0, 400, 300));
    assert_eq!(server.focused, Some(2));

    server
        .handle_key_press(key(15, ModMask::ALT, keysym::XK_Tab, 1))
        .unwrap();
    assert_eq!(server.input_mode, InputMode::Cycle);
    assert_eq!(server.cycle.as_ref().unwrap().selected, Some(1));

    // Tab comes up first; its press was bound, so this is consumed
    server
        .handle_key_release(key(15, ModMask::ALT, keysym::XK_Tab, 2))
        .unwrap();
    assert_eq!(server.input_mode, InputMode::Cycle);

    // Alt release: all modifiers gone, nothing bound is held
    server.handle_modifiers(ModifiersEvent {
        device: "AT Translated Set 2 keyboard".into(),
        virtual_device: false,
        mods: ModMask::empty(),
    });
    assert_eq!(server.input_mode, InputMode::Passthrough);
    assert_eq!(server.focused, Some(1));
    assert!(server.conn.forwarded_keys().is_empty());
}

#[test]
fn cycle_waits_for_held_keys_before_finishing() {
    let mut config = test_config();
    config.keybinds = vec![bind("A-Tab", None, vec![Action::Focus(Direction::Forward)])];
    let (_l, mut server) = test_server(config);
    server.conn.map_keysym(keysym::XK_Tab, vec![15]);

    map_view(&mut server, 1, Rect::new(0, 0, 400, 300));
    map_view(&mut server, 2, Rect::new(400, 0, 400, 300));

    server
        .handle_key_press(key(15, ModMask::ALT, keysym::XK_Tab, 1))
        .unwrap();

    // modifiers drop while Tab is still held
    server.handle_modifiers(ModifiersEvent {
        device: "AT Translated Set 2 keyboard".into(),
        virtual_device: false,
        mods: ModMask::empty(),
    });
    assert_eq!(server.input_mode, InputMode::Cycle);

    // the bound Tab release is consumed without finishing
    server
        .handle_key_release(key(15, ModMask::empty(), keysym::XK_Tab, 2))
        .unwrap();
    assert_eq!(server.input_mode, InputMode::Cycle);

    // the Alt key-up itself is the next unbound release
    server
        .handle_key_release(key(56, ModMask::empty(), keysym::XK_Alt_L, 3))
        .unwrap();
    assert_eq!(server.input_mode, InputMode::Passthrough);
    assert_eq!(server.focused, Some(1));
}

#[test]
fn modal_dialog_takes_focus_for_its_parent() {
    let (_l, mut server) = test_server(test_config());
    map_view(&mut server, 1, Rect::new(0, 0, 600, 400));

    server.conn.note_mapped(2);
    server.conn.push_event(SceneEvent::ViewMapped(ViewMapEvent {
        id: 2,
        app_id: "app-1".into(),
        title: "confirm".into(),
        geometry: Rect::new(200, 150, 200, 100),
        parent: Some(1),
        modal: true,
        focus_policy: None,
        margins: None,
        wants_fullscreen: false,
    }));
    server.dispatch_events();

    server.focus_view(1, true).unwrap();
    assert_eq!(server.conn.keyboard_focus(), Some(2));
    // raising the parent surfaces the dialog with it
    assert_eq!(server.desktop.stacking(), vec![1, 2]);
}

#[test]
fn fullscreen_topmost_view_disables_top_layer() {
    let (_l, mut server) = test_server(test_config());
    map_view(&mut server, 1, Rect::new(0, 0, 600, 400));
    assert!(server.conn.top_layer_enabled(0));

    server
        .conn
        .push_event(SceneEvent::ViewRequestFullscreen(1, true));
    server.dispatch_events();
    assert!(!server.conn.top_layer_enabled(0));

    // a view stacked above the fullscreen one re-enables the layer
    map_view(&mut server, 2, Rect::new(100, 100, 300, 200));
    assert!(server.conn.top_layer_enabled(0));
}

#[test]
fn minimized_views_are_skipped_by_tiling_and_focus() {
    let (_l, mut server) = test_server(test_config());
    map_view(&mut server, 1, Rect::new(0, 0, 400, 300));
    map_view(&mut server, 2, Rect::new(400, 0, 400, 300));
    server.set_tiling_enabled(true).unwrap();

    server
        .conn
        .push_event(SceneEvent::ViewRequestMinimize(2, true));
    server.dispatch_events();

    // focus fell back, and the remaining view takes the whole area
    assert_eq!(server.focused, Some(1));
    assert_eq!(server.conn.committed(1), Some(Rect::new(10, 10, 980, 580)));
    assert!(server.conn.is_hidden(2));
}

#[test]
fn workspace_switch_restores_stacking_on_return() {
    let _guard = crate::ctl::ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("XDG_RUNTIME_DIR", dir.path());

    let (_l, mut server) = test_server(test_config());
    for id in 1u64..=3 {
        map_view(&mut server, id, Rect::new(50 * id as i32, 50, 300, 200));
    }
    server.raise_view(1).unwrap();
    let order = server.desktop.stacking();

    fs::write(dir.path().join("labwc-workspace-cmd"), "switch 2\n").unwrap();
    server.handle_control_commands();
    assert_eq!(server.desktop.current_idx(), 1);
    assert_eq!(crate::ctl::read_workspace_current().unwrap(), "2");
    assert!(server.conn.is_hidden(1));

    fs::write(dir.path().join("labwc-workspace-cmd"), "switch 1\n").unwrap();
    server.handle_control_commands();
    assert_eq!(server.desktop.stacking(), order);
    assert!(!server.conn.is_hidden(1));
}

#[test]
fn tiling_status_file_tracks_mode() {
    let _guard = crate::ctl::ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("XDG_RUNTIME_DIR", dir.path());

    let (_l, mut server) = test_server(test_config());
    server.refresh_status_files();
    assert_eq!(crate::ctl::read_tiling_status().unwrap(), "stacking");

    fs::write(dir.path().join("labwc-tiling-cmd"), "enable\n").unwrap();
    server.handle_control_commands();
    assert_eq!(crate::ctl::read_tiling_status().unwrap(), "smart");

    fs::write(dir.path().join("labwc-tiling-cmd"), "grid-mode on\n").unwrap();
    server.handle_control_commands();
    assert_eq!(crate::ctl::read_tiling_status().unwrap(), "grid");

    let status = crate::ctl::read_tiling_status().unwrap();
    assert!(["stacking", "grid", "smart"].contains(&status.as_str()));
}

#[test]
fn focus_output_warps_cursor() {
    let (_l, mut server) = test_server(test_config());

    // empty output: cursor lands on the usable-area center
    server.focus_output(0).unwrap();
    assert_eq!(server.conn.cursor_pos(), Point::new(500, 300));

    map_view(&mut server, 1, Rect::new(100, 100, 400, 300));
    server.focus_output(0).unwrap();
    assert_eq!(server.conn.cursor_pos(), Point::new(300, 250));
    assert_eq!(server.focused, Some(1));
}

#[test]
fn ssd_margins_shrink_committed_geometry() {
    let (_l, mut server) = test_server(test_config());

    server.conn.note_mapped(1);
    server.conn.push_event(SceneEvent::ViewMapped(ViewMapEvent {
        id: 1,
        app_id: "decorated".into(),
        title: "decorated".into(),
        geometry: Rect::new(100, 100, 400, 300),
        parent: None,
        modal: false,
        focus_policy: None,
        margins: Some(crate::types::Margins::new(20, 4, 4, 4)),
        wants_fullscreen: false,
    }));
    server.dispatch_events();

    server.set_tiling_enabled(true).unwrap();

    // the 10/10/980/580 cell, inset by the decoration thickness
    assert_eq!(server.conn.committed(1), Some(Rect::new(14, 30, 972, 556)));
}

#[test]
fn filters_scope_iteration() {
    let (_l, mut server) = test_server(test_config());
    map_view(&mut server, 1, Rect::new(0, 0, 400, 300));
    map_view(&mut server, 2, Rect::new(400, 0, 400, 300));
    server
        .dispatch_actions(vec![Action::SendToWorkspace(
            crate::bindings::WorkspaceTarget::Named("2".into()),
        )])
        .unwrap();

    let mut all = Vec::new();
    server.for_each_view(crate::core::view::ViewFilter::Any, |v| all.push(v.id()));
    assert_eq!(all, vec![1, 2]);

    let mut current = Vec::new();
    server.for_each_view(crate::core::view::ViewFilter::CurrentWorkspace, |v| {
        current.push(v.id())
    });
    assert_eq!(current, vec![1]);
}

#[test]
fn send_to_workspace_hides_and_refocuses() {
    let (_l, mut server) = test_server(test_config());
    map_view(&mut server, 1, Rect::new(0, 0, 400, 300));
    map_view(&mut server, 2, Rect::new(400, 0, 400, 300));
    assert_eq!(server.focused, Some(2));

    server
        .dispatch_actions(vec![Action::SendToWorkspace(
            crate::bindings::WorkspaceTarget::Named("3".into()),
        )])
        .unwrap();

    assert!(server.conn.is_hidden(2));
    assert_eq!(server.focused, Some(1));
    assert!(server.desktop.get(2).unwrap().contains(2));
}
