mod common;

use common::{rect, TestClient, TestEnv};
use smithay_client_toolkit::reexports::protocols::ext::session_lock::v1::client::{
    ext_session_lock_manager_v1::ExtSessionLockManagerV1,
    ext_session_lock_v1::{self, ExtSessionLockV1},
};
use treeland::extensions::session_lock::LockState;
use treeland::state::CompositorMode;
use treeland::surface::SurfaceType;

fn request_lock(env: &mut TestEnv) -> (TestClient, ExtSessionLockV1) {
    let mut client = env.connect();
    let manager = client.bind::<ExtSessionLockManagerV1>(1);
    let lock = manager.lock(&client.qh, ());
    client.conn.flush().unwrap();
    env.display.dispatch_clients(&mut env.server).unwrap();
    (client, lock)
}

fn lock_events(client: &mut TestClient, lock: &ExtSessionLockV1) -> Vec<ext_session_lock_v1::Event> {
    client.events::<ext_session_lock_v1::Event>(lock)
}

#[test]
fn test_lock_engages_on_idle_and_hides_windows() {
    let mut env = TestEnv::new();
    env.add_output("eDP-1", rect(0, 0, 1920, 1080));
    let mut app = env.connect();
    let (_, window) = env.map_toplevel(&mut app, "org.example.terminal", "terminal");

    let (mut client, lock) = request_lock(&mut env);
    assert_eq!(
        env.server.protocols.session_lock_state.active_state(),
        Some(LockState::Created)
    );
    assert_eq!(env.server.compositor_mode(), CompositorMode::Normal);

    env.roundtrip(&mut client);
    assert!(env.server.protocols.session_lock_state.is_locked());
    assert_eq!(env.server.compositor_mode(), CompositorMode::LockScreen);
    assert!(matches!(
        lock_events(&mut client, &lock).as_slice(),
        [ext_session_lock_v1::Event::Locked]
    ));

    let wrapper = env.server.surfaces.get(window).unwrap();
    assert!(wrapper.hidden_by_lockscreen());
    assert!(!wrapper.is_visible());
    assert_eq!(env.server.surfaces.active(), None);
    assert!(!env.server.activate_surface(window));
}

#[test]
fn test_lock_surface_maps_after_ack_and_commit() {
    let mut env = TestEnv::new();
    env.add_output("eDP-1", rect(0, 0, 1920, 1080));
    let (mut client, lock) = request_lock(&mut env);
    env.roundtrip(&mut client);
    let output = env.bind_output(&mut client, "eDP-1");

    let surface = client.create_surface();
    let lock_surface = lock.get_lock_surface(&surface, &output, &client.qh, ());
    env.roundtrip(&mut client);
    assert_eq!(env.server.protocols.session_lock_state.lock_surface_count(), 1);
    assert_eq!(client.ack_lock_configure(&lock_surface), Some((1920, 1080)));

    client.draw(&surface, 1920, 1080);
    env.roundtrip(&mut client);
    assert!(client.error_code().is_none());

    let wrapper = env
        .server
        .surfaces
        .iter()
        .find(|wrapper| wrapper.surface_type() == SurfaceType::LockScreen)
        .expect("mapped lock surface");
    assert!(wrapper.is_visible());
    assert_eq!(wrapper.geometry(), rect(0, 0, 1920, 1080));
    let id = wrapper.id();
    assert_eq!(env.server.surfaces.active(), Some(id));

    // The lock surface follows the output size
    let output_id = env.server.outputs.primary().unwrap();
    env.server.set_output_geometry(output_id, rect(0, 0, 2560, 1440));
    env.roundtrip(&mut client);
    assert_eq!(client.ack_lock_configure(&lock_surface), Some((2560, 1440)));
}

#[test]
fn test_unlock_restores_windows() {
    let mut env = TestEnv::new();
    env.add_output("eDP-1", rect(0, 0, 1920, 1080));
    let mut app = env.connect();
    let (_, window) = env.map_toplevel(&mut app, "org.example.terminal", "terminal");
    let (mut client, lock) = request_lock(&mut env);
    env.roundtrip(&mut client);
    assert_eq!(env.server.compositor_mode(), CompositorMode::LockScreen);

    lock.unlock_and_destroy();
    env.roundtrip(&mut client);
    let locks = &env.server.protocols.session_lock_state;
    assert!(!locks.is_locked());
    assert_eq!(locks.last_outcome(), Some(LockState::Unlocked));
    assert_eq!(env.server.compositor_mode(), CompositorMode::Normal);

    let wrapper = env.server.surfaces.get(window).unwrap();
    assert!(wrapper.is_visible());
    assert_eq!(env.server.surfaces.active(), Some(window));
}

#[test]
fn test_unlock_drops_lock_surfaces() {
    let mut env = TestEnv::new();
    env.add_output("eDP-1", rect(0, 0, 1920, 1080));
    let (mut client, lock) = request_lock(&mut env);
    env.roundtrip(&mut client);
    let output = env.bind_output(&mut client, "eDP-1");
    let surface = client.create_surface();
    let lock_surface = lock.get_lock_surface(&surface, &output, &client.qh, ());
    env.roundtrip(&mut client);
    client.ack_lock_configure(&lock_surface);
    client.draw(&surface, 1920, 1080);
    env.roundtrip(&mut client);
    assert_eq!(env.server.surfaces.len(), 1);

    lock.unlock_and_destroy();
    env.roundtrip(&mut client);
    assert!(env.server.surfaces.is_empty());
    assert_eq!(env.server.protocols.session_lock_state.lock_surface_count(), 0);
}

#[test]
fn test_vanished_client_keeps_session_locked() {
    let mut env = TestEnv::new();
    env.add_output("eDP-1", rect(0, 0, 1920, 1080));
    let (mut client, lock) = request_lock(&mut env);
    env.roundtrip(&mut client);

    drop(lock);
    drop(client);
    env.idle();
    env.idle();
    assert_eq!(
        env.server.protocols.session_lock_state.last_outcome(),
        Some(LockState::Abandoned)
    );
    assert_eq!(env.server.compositor_mode(), CompositorMode::LockScreen);

    // A new lock client may take over and unlock
    let (mut client, lock) = request_lock(&mut env);
    env.roundtrip(&mut client);
    assert!(env.server.protocols.session_lock_state.is_locked());
    lock.unlock_and_destroy();
    env.roundtrip(&mut client);
    assert_eq!(env.server.compositor_mode(), CompositorMode::Normal);
}

#[test]
fn test_destroy_before_idle_cancels() {
    let mut env = TestEnv::new();
    let (mut client, lock) = request_lock(&mut env);
    lock.destroy();
    env.roundtrip(&mut client);
    assert!(client.error_code().is_none());
    assert_eq!(
        env.server.protocols.session_lock_state.last_outcome(),
        Some(LockState::Canceled)
    );
    assert!(!env.server.protocols.session_lock_state.is_locked());
    assert_eq!(env.server.compositor_mode(), CompositorMode::Normal);
}

#[test]
fn test_second_lock_is_finished() {
    let mut env = TestEnv::new();
    let (mut first_client, first) = request_lock(&mut env);
    env.roundtrip(&mut first_client);
    lock_events(&mut first_client, &first);

    let (mut client, second) = request_lock(&mut env);
    env.roundtrip(&mut client);
    assert!(matches!(
        lock_events(&mut client, &second).as_slice(),
        [ext_session_lock_v1::Event::Finished]
    ));
    assert!(env.server.protocols.session_lock_state.is_locked());
    assert!(lock_events(&mut first_client, &first).is_empty());
}

#[test]
fn test_compositor_finish_unlocks() {
    let mut env = TestEnv::new();
    let (mut client, lock) = request_lock(&mut env);
    env.roundtrip(&mut client);
    lock_events(&mut client, &lock);

    env.server.finish_session_lock();
    env.roundtrip(&mut client);
    assert!(matches!(
        lock_events(&mut client, &lock).as_slice(),
        [ext_session_lock_v1::Event::Finished]
    ));
    assert_eq!(
        env.server.protocols.session_lock_state.last_outcome(),
        Some(LockState::Finished)
    );
    assert_eq!(env.server.compositor_mode(), CompositorMode::Normal);
}
