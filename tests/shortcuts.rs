mod common;

use common::protocols::shortcut_manager::treeland_shortcut_manager_v2::{
    self, TreelandShortcutManagerV2,
};
use common::{rect, TestClient, TestEnv};
use smithay_client_toolkit::reexports::protocols::ext::session_lock::v1::client::ext_session_lock_manager_v1::ExtSessionLockManagerV1;
use treeland::extensions::shortcut::{
    GestureKey, KeyCombination, KeybindFlags, ShortcutAction, ShortcutOutcome, SwipeDirection,
};
use treeland::extensions::window_management::DesktopState;
use treeland::state::CompositorMode;
use treeland::workspace::WorkspaceId;

fn bind_key(manager: &TreelandShortcutManagerV2, name: &str, key: &str, action: ShortcutAction) {
    manager.bind_key(
        name.into(),
        key.into(),
        KeybindFlags::KEY_PRESS.bits(),
        action as u32,
    );
}

fn press(key: &str) -> (KeyCombination, KeybindFlags) {
    (
        KeyCombination::parse(key).expect("valid chord"),
        KeybindFlags::KEY_PRESS,
    )
}

fn acquired(env: &mut TestEnv, session: u32) -> (TestClient, TreelandShortcutManagerV2) {
    let mut client = env.connect_in_session(session);
    let manager = client.bind::<TreelandShortcutManagerV2>(1);
    manager.acquire();
    env.roundtrip(&mut client);
    (client, manager)
}

fn manager_events(
    client: &mut TestClient,
    manager: &TreelandShortcutManagerV2,
) -> Vec<treeland_shortcut_manager_v2::Event> {
    client.events::<treeland_shortcut_manager_v2::Event>(manager)
}

#[test]
fn test_second_acquire_in_session_is_occupied() {
    let mut env = TestEnv::new();
    let (owner, _manager) = acquired(&mut env, 1);
    assert!(owner.error_code().is_none());

    let (intruder, _) = acquired(&mut env, 1);
    assert_eq!(intruder.error_code(), Some(1));

    // Another login session has its own token
    let (other, _) = acquired(&mut env, 2);
    assert!(other.error_code().is_none());
}

#[test]
fn test_binding_without_token_is_rejected() {
    let mut env = TestEnv::new();
    let mut client = env.connect();
    let manager = client.bind::<TreelandShortcutManagerV2>(1);
    bind_key(&manager, "launcher", "Meta+d", ShortcutAction::Notify);
    env.roundtrip(&mut client);
    assert_eq!(client.error_code(), Some(2));
}

#[test]
fn test_commit_applies_on_idle_and_notifies() {
    let mut env = TestEnv::new();
    let (mut client, manager) = acquired(&mut env, 1);
    bind_key(&manager, "launcher", "Meta+d", ShortcutAction::Notify);
    manager.commit();
    client.conn.flush().unwrap();
    env.display.dispatch_clients(&mut env.server).unwrap();

    let (combo, flags) = press("Meta+d");
    assert!(!env.server.handle_key_shortcut(1, combo, flags));

    env.roundtrip(&mut client);
    assert!(matches!(
        manager_events(&mut client, &manager).as_slice(),
        [treeland_shortcut_manager_v2::Event::CommitSuccess]
    ));

    assert!(env.server.handle_key_shortcut(1, combo, flags));
    env.roundtrip(&mut client);
    assert!(matches!(
        manager_events(&mut client, &manager).as_slice(),
        [treeland_shortcut_manager_v2::Event::Activated { name, flags: 2 }] if name == "launcher"
    ));
    assert_eq!(
        env.server.take_shortcut_outcomes(),
        vec![ShortcutOutcome::Activated {
            name: "launcher".into()
        }]
    );

    // Bindings are per session
    assert!(!env.server.handle_key_shortcut(2, combo, flags));
}

#[test]
fn test_second_commit_before_idle_is_invalid() {
    let mut env = TestEnv::new();
    let (mut client, manager) = acquired(&mut env, 1);
    manager.commit();
    manager.commit();
    env.roundtrip(&mut client);
    let events = manager_events(&mut client, &manager);
    assert!(matches!(
        events.as_slice(),
        [
            treeland_shortcut_manager_v2::Event::InvalidCommit,
            treeland_shortcut_manager_v2::Event::CommitSuccess
        ]
    ));
}

#[test]
fn test_failed_batch_rolls_back() {
    let mut env = TestEnv::new();
    let (mut client, manager) = acquired(&mut env, 1);
    bind_key(&manager, "good", "Meta+e", ShortcutAction::Notify);
    bind_key(&manager, "good", "Meta+f", ShortcutAction::Notify);
    manager.commit();
    env.roundtrip(&mut client);

    assert!(matches!(
        manager_events(&mut client, &manager).as_slice(),
        [treeland_shortcut_manager_v2::Event::CommitFailure { name, error: 1 }] if name == "good"
    ));
    let (combo, flags) = press("Meta+e");
    assert!(!env.server.handle_key_shortcut(1, combo, flags));
}

#[test]
fn test_unbind_removes_binding() {
    let mut env = TestEnv::new();
    let (mut client, manager) = acquired(&mut env, 1);
    bind_key(&manager, "launcher", "Meta+d", ShortcutAction::Notify);
    manager.commit();
    env.roundtrip(&mut client);

    manager.unbind("launcher".into());
    manager.commit();
    env.roundtrip(&mut client);
    let (combo, flags) = press("Meta+d");
    assert!(!env.server.handle_key_shortcut(1, combo, flags));
}

#[test]
fn test_owner_disconnect_drops_bindings() {
    let mut env = TestEnv::new();
    let (mut client, manager) = acquired(&mut env, 1);
    bind_key(&manager, "launcher", "Meta+d", ShortcutAction::Notify);
    manager.commit();
    env.roundtrip(&mut client);

    drop(manager);
    drop(client);
    env.idle();
    env.idle();
    let (combo, flags) = press("Meta+d");
    assert!(!env.server.handle_key_shortcut(1, combo, flags));

    // The token is free again
    let (next, _) = acquired(&mut env, 1);
    assert!(next.error_code().is_none());
}

#[test]
fn test_workspace_and_show_desktop_actions() {
    let mut env = TestEnv::new();
    env.add_output("eDP-1", rect(0, 0, 1920, 1080));
    let mut app = env.connect();
    let (_, window) = env.map_toplevel(&mut app, "org.example.editor", "editor");

    let (mut client, manager) = acquired(&mut env, 1);
    bind_key(&manager, "ws2", "Meta+2", ShortcutAction::Workspace2);
    bind_key(&manager, "desk", "Meta+d", ShortcutAction::ShowDesktop);
    manager.commit();
    env.roundtrip(&mut client);

    let (combo, flags) = press("Meta+2");
    assert!(env.server.handle_key_shortcut(1, combo, flags));
    assert_eq!(env.server.workspaces.current(), WorkspaceId::new(1));
    assert!(!env.server.surfaces.get(window).unwrap().is_visible());

    env.server.switch_workspace(WorkspaceId::new(0));
    assert!(env.server.surfaces.get(window).unwrap().is_visible());

    let (combo, flags) = press("Meta+d");
    env.server.handle_key_shortcut(1, combo, flags);
    assert_eq!(
        env.server.protocols.window_management_state.desktop_state(),
        DesktopState::Show
    );
    assert!(!env.server.surfaces.get(window).unwrap().is_visible());

    env.server.handle_key_shortcut(1, combo, flags);
    assert_eq!(
        env.server.protocols.window_management_state.desktop_state(),
        DesktopState::Normal
    );
    assert!(env.server.surfaces.get(window).unwrap().is_visible());
}

#[test]
fn test_gesture_opens_multitask_view() {
    let mut env = TestEnv::new();
    let (mut client, manager) = acquired(&mut env, 1);
    manager.bind_swipe_gesture(
        "overview".into(),
        3,
        SwipeDirection::Up as u32,
        ShortcutAction::ToggleMultitaskView as u32,
    );
    manager.commit();
    env.roundtrip(&mut client);

    let gesture = GestureKey {
        finger: 3,
        direction: Some(SwipeDirection::Up),
    };
    assert!(env.server.handle_gesture_shortcut(1, gesture));
    assert_eq!(env.server.compositor_mode(), CompositorMode::Multitaskview);
    assert_eq!(
        env.server.take_shortcut_outcomes(),
        vec![ShortcutOutcome::Action(ShortcutAction::OpenMultitaskView)]
    );
}

#[test]
fn test_shortcuts_ignored_while_locked() {
    let mut env = TestEnv::new();
    let (mut client, manager) = acquired(&mut env, 1);
    bind_key(&manager, "quit", "Ctrl+Alt+q", ShortcutAction::Quit);
    manager.commit();
    env.roundtrip(&mut client);

    let (combo, flags) = press("Meta+l");
    assert!(!env.server.handle_key_shortcut(1, combo, flags));

    let mut locker = env.connect();
    let lock_manager = locker.bind::<ExtSessionLockManagerV1>(1);
    let _lock = lock_manager.lock(&locker.qh, ());
    env.roundtrip(&mut locker);
    assert_eq!(env.server.compositor_mode(), CompositorMode::LockScreen);

    let (combo, flags) = press("Ctrl+Alt+q");
    assert!(!env.server.handle_key_shortcut(1, combo, flags));
    assert!(env.server.is_running());
}
