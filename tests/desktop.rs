mod common;

use common::protocols::capture::{
    treeland_capture_context_v1, treeland_capture_frame_v1,
    treeland_capture_manager_v1::TreelandCaptureManagerV1, treeland_capture_session_v1,
};
use common::protocols::dde_shell::{
    treeland_dde_active_v1, treeland_dde_shell_manager_v1::TreelandDdeShellManagerV1,
    treeland_window_overlap_checker, treeland_window_picker_v1,
};
use common::{rect, TestEnv};
use smithay::utils::Point;
use treeland::extensions::capture::{CaptureSource, CaptureTarget, SourceType};
use treeland::extensions::dde_shell::ActiveReason;
use treeland::extensions::shortcut::{ShortcutAction, ShortcutOutcome};
use treeland::state::CompositorMode;

const BOTTOM: u32 = 4;

#[test]
fn test_overlap_checker_follows_windows() {
    let mut env = TestEnv::new();
    env.add_output("eDP-1", rect(0, 0, 1920, 1080));
    let mut client = env.connect();
    let (window, _) = env.map_toplevel(&mut client, "org.example.editor", "editor");
    let output = env.bind_output(&mut client, "eDP-1");

    let shell = client.bind::<TreelandDdeShellManagerV1>(1);
    let checker = shell.get_window_overlap_checker(&client.qh, ());
    checker.update(1920, 60, BOTTOM, &output);
    env.roundtrip(&mut client);
    // The first evaluation is always reported
    assert!(matches!(
        client
            .events::<treeland_window_overlap_checker::Event>(&checker)
            .as_slice(),
        [treeland_window_overlap_checker::Event::Leave]
    ));

    let shell_surface = shell.get_shell_surface(&window.surface, &client.qh, ());
    shell_surface.set_surface_position(100, 1000);
    env.roundtrip(&mut client);
    assert!(matches!(
        client
            .events::<treeland_window_overlap_checker::Event>(&checker)
            .as_slice(),
        [treeland_window_overlap_checker::Event::Enter]
    ));

    // No news while nothing changes
    env.roundtrip(&mut client);
    assert!(client
        .events::<treeland_window_overlap_checker::Event>(&checker)
        .is_empty());

    shell_surface.set_surface_position(100, 100);
    env.roundtrip(&mut client);
    assert!(matches!(
        client
            .events::<treeland_window_overlap_checker::Event>(&checker)
            .as_slice(),
        [treeland_window_overlap_checker::Event::Leave]
    ));
}

#[test]
fn test_shell_surface_hints() {
    let mut env = TestEnv::new();
    env.add_output("eDP-1", rect(0, 0, 1920, 1080));
    let mut client = env.connect();
    let (window, id) = env.map_toplevel(&mut client, "org.example.dock", "dock");

    let shell = client.bind::<TreelandDdeShellManagerV1>(1);
    let shell_surface = shell.get_shell_surface(&window.surface, &client.qh, ());
    shell_surface.set_surface_position(0, 1020);
    shell_surface.set_role(1);
    shell_surface.set_skip_switcher(1);
    env.roundtrip(&mut client);

    let wrapper = env.server.surfaces.get(id).unwrap();
    assert_eq!(wrapper.geometry().loc, Point::from((0, 1020)));
    let props = env.server.protocols.dde_shell_state.props(id).unwrap();
    assert!(props.overlay);
    assert_eq!(props.skip_switcher, Some(true));

    shell_surface.destroy();
    env.roundtrip(&mut client);
    assert!(env.server.protocols.dde_shell_state.props(id).is_none());

    // A second shell surface for the same wl_surface is an error
    let _first = shell.get_shell_surface(&window.surface, &client.qh, ());
    let _second = shell.get_shell_surface(&window.surface, &client.qh, ());
    env.roundtrip(&mut client);
    assert_eq!(client.error_code(), Some(0));
}

#[test]
fn test_multitaskview_and_lockscreen_requests() {
    let mut env = TestEnv::new();
    let mut client = env.connect();
    let shell = client.bind::<TreelandDdeShellManagerV1>(1);
    let view = shell.get_treeland_multitaskview(&client.qh, ());
    let lockscreen = shell.get_treeland_lockscreen(&client.qh, ());

    view.toggle();
    env.roundtrip(&mut client);
    assert_eq!(env.server.compositor_mode(), CompositorMode::Multitaskview);
    view.toggle();
    env.roundtrip(&mut client);
    assert_eq!(env.server.compositor_mode(), CompositorMode::Normal);
    assert_eq!(
        env.server.take_shortcut_outcomes(),
        vec![
            ShortcutOutcome::Action(ShortcutAction::OpenMultitaskView),
            ShortcutOutcome::Action(ShortcutAction::CloseMultitaskView),
        ]
    );

    lockscreen.shutdown();
    env.roundtrip(&mut client);
    assert_eq!(
        env.server.take_shortcut_outcomes(),
        vec![ShortcutOutcome::Action(ShortcutAction::ShutdownMenu)]
    );

    lockscreen.lock();
    env.roundtrip(&mut client);
    assert_eq!(env.server.compositor_mode(), CompositorMode::LockScreen);
}

#[test]
fn test_window_picker_answers_waiting_pickers() {
    let mut env = TestEnv::new();
    let mut client = env.connect();
    let shell = client.bind::<TreelandDdeShellManagerV1>(1);
    let waiting = shell.get_treeland_window_picker(&client.qh, ());
    let idle = shell.get_treeland_window_picker(&client.qh, ());

    waiting.pick("Pick a window to share".into());
    env.roundtrip(&mut client);
    assert_eq!(env.server.window_picked(4242), 1);
    env.roundtrip(&mut client);
    assert!(matches!(
        client
            .events::<treeland_window_picker_v1::Event>(&waiting)
            .as_slice(),
        [treeland_window_picker_v1::Event::Window { pid: 4242 }]
    ));
    assert!(client
        .events::<treeland_window_picker_v1::Event>(&idle)
        .is_empty());

    // A picker is answered once per pick
    assert_eq!(env.server.window_picked(4243), 0);
}

#[test]
fn test_active_events_reach_every_active_object() {
    let mut env = TestEnv::new();
    let mut client = env.connect();
    let shell = client.bind::<TreelandDdeShellManagerV1>(1);
    let seat = client.seat();
    let active = shell.get_treeland_dde_active(&seat, &client.qh, ());
    let second = shell.get_treeland_dde_active(&seat, &client.qh, ());
    env.roundtrip(&mut client);

    env.server.shell_active_changed(true, ActiveReason::Wheel);
    env.server.shell_active_changed(false, ActiveReason::Mouse);
    env.roundtrip(&mut client);
    for object in [&active, &second] {
        assert!(matches!(
            client
                .events::<treeland_dde_active_v1::Event>(object)
                .as_slice(),
            [
                treeland_dde_active_v1::Event::ActiveIn { reason: 1 },
                treeland_dde_active_v1::Event::ActiveOut { reason: 0 }
            ]
        ));
    }

    env.server.shell_drag_changed(false);
    env.server.shell_drag_changed(true);
    env.roundtrip(&mut client);
    assert!(matches!(
        client
            .events::<treeland_dde_active_v1::Event>(&second)
            .as_slice(),
        [
            treeland_dde_active_v1::Event::StartDrag,
            treeland_dde_active_v1::Event::Drop
        ]
    ));

    // Destroyed objects drop out of the fan-out
    second.destroy();
    env.roundtrip(&mut client);
    env.server.shell_active_changed(true, ActiveReason::Mouse);
    env.roundtrip(&mut client);
    assert!(client
        .events::<treeland_dde_active_v1::Event>(&second)
        .is_empty());
}

#[test]
fn test_capture_selection_produces_a_source() {
    let mut env = TestEnv::new();
    env.add_output("eDP-1", rect(0, 0, 1920, 1080));
    let mut client = env.connect();
    let (window, id) = env.map_toplevel(&mut client, "org.example.recorder", "recorder");

    let manager = client.bind::<TreelandCaptureManagerV1>(1);
    let context = manager.get_context(&client.qh, ());
    context.select_source(
        (SourceType::OUTPUT | SourceType::WINDOW).bits(),
        1,
        0,
        Some(&window.surface),
    );
    env.roundtrip(&mut client);

    let capture = &env.server.protocols.capture_state;
    assert!(capture.is_selecting());
    let selection = capture.selection().unwrap();
    assert_eq!(selection.hint, SourceType::OUTPUT | SourceType::WINDOW);
    assert!(selection.freeze);
    assert_eq!(selection.mask, Some(id));
    // The mask window is drawn bare while the selector is up
    assert!(env.server.surfaces.get(id).unwrap().no_title_bar());

    let picked = env.server.surfaces.get(id).unwrap().geometry();
    assert!(env.server.finish_capture_selection(CaptureSource {
        target: CaptureTarget::Window(id),
        region: picked,
    }));
    env.roundtrip(&mut client);
    assert!(!env.server.protocols.capture_state.is_selecting());
    assert!(!env.server.surfaces.get(id).unwrap().no_title_bar());
    assert!(matches!(
        client
            .events::<treeland_capture_context_v1::Event>(&context)
            .as_slice(),
        [treeland_capture_context_v1::Event::SourceReady {
            region_x: 860,
            region_y: 490,
            region_width: 200,
            region_height: 100,
            source_type: 2,
        }]
    ));

    let frame = context.capture(&client.qh, ());
    env.roundtrip(&mut client);
    assert!(matches!(
        client
            .events::<treeland_capture_frame_v1::Event>(&frame)
            .as_slice(),
        [
            treeland_capture_frame_v1::Event::Buffer {
                format: 0,
                width: 200,
                height: 100,
                stride: 800,
            },
            treeland_capture_frame_v1::Event::BufferDone
        ]
    ));
    frame.copy(&client.buffer(200, 100));
    env.roundtrip(&mut client);
    assert!(matches!(
        client
            .events::<treeland_capture_frame_v1::Event>(&frame)
            .as_slice(),
        [treeland_capture_frame_v1::Event::Ready]
    ));
}

#[test]
fn test_closed_window_ends_its_capture() {
    let mut env = TestEnv::new();
    env.add_output("eDP-1", rect(0, 0, 1920, 1080));
    let mut app = env.connect();
    let (window, id) = env.map_toplevel(&mut app, "org.example.player", "player");

    let mut client = env.connect();
    let manager = client.bind::<TreelandCaptureManagerV1>(1);
    let context = manager.get_context(&client.qh, ());
    context.select_source(0, 0, 0, None);
    env.roundtrip(&mut client);
    env.server.finish_capture_selection(CaptureSource {
        target: CaptureTarget::Window(id),
        region: rect(860, 490, 200, 100),
    });
    let session = context.create_session(&client.qh, ());
    session.start();
    env.roundtrip(&mut client);
    client.events::<treeland_capture_context_v1::Event>(&context);
    assert_eq!(env.server.protocols.capture_state.active_session_count(), 1);

    window.toplevel.destroy();
    window.xdg_surface.destroy();
    window.surface.destroy();
    env.roundtrip(&mut app);
    env.roundtrip(&mut client);

    assert!(matches!(
        client
            .events::<treeland_capture_context_v1::Event>(&context)
            .as_slice(),
        [treeland_capture_context_v1::Event::SourceFailed { reason: 3 }]
    ));
    assert!(matches!(
        client
            .events::<treeland_capture_session_v1::Event>(&session)
            .as_slice(),
        [treeland_capture_session_v1::Event::Cancel { reason: 1 }]
    ));
    assert_eq!(env.server.protocols.capture_state.active_session_count(), 0);
}

#[test]
fn test_one_selector_at_a_time() {
    let mut env = TestEnv::new();
    env.add_output("eDP-1", rect(0, 0, 1920, 1080));
    let mut client = env.connect();
    let manager = client.bind::<TreelandCaptureManagerV1>(1);
    let first = manager.get_context(&client.qh, ());
    let second = manager.get_context(&client.qh, ());

    first.select_source(SourceType::REGION.bits(), 0, 1, None);
    second.select_source(SourceType::REGION.bits(), 0, 1, None);
    env.roundtrip(&mut client);
    assert_eq!(env.server.protocols.capture_state.context_count(), 2);
    assert!(matches!(
        client
            .events::<treeland_capture_context_v1::Event>(&second)
            .as_slice(),
        [treeland_capture_context_v1::Event::SourceFailed { reason: 1 }]
    ));

    assert!(env.server.cancel_capture_selection());
    env.roundtrip(&mut client);
    assert!(matches!(
        client
            .events::<treeland_capture_context_v1::Event>(&first)
            .as_slice(),
        [treeland_capture_context_v1::Event::SourceFailed { reason: 2 }]
    ));
    assert!(!env.server.cancel_capture_selection());

    // Once the selector is gone the other context may use it
    second.select_source(SourceType::REGION.bits(), 0, 1, None);
    env.roundtrip(&mut client);
    assert!(env.server.protocols.capture_state.is_selecting());
    let output = env.server.outputs.primary().unwrap();
    assert!(env.server.finish_capture_selection(CaptureSource {
        target: CaptureTarget::Region(output),
        region: rect(10, 10, 300, 200),
    }));
    env.roundtrip(&mut client);
    assert!(matches!(
        client
            .events::<treeland_capture_context_v1::Event>(&second)
            .as_slice(),
        [treeland_capture_context_v1::Event::SourceReady { source_type: 4, .. }]
    ));
}

#[test]
fn test_source_outside_hint_fails() {
    let mut env = TestEnv::new();
    env.add_output("eDP-1", rect(0, 0, 1920, 1080));
    let mut client = env.connect();
    let manager = client.bind::<TreelandCaptureManagerV1>(1);
    let context = manager.get_context(&client.qh, ());
    context.select_source(SourceType::WINDOW.bits(), 0, 0, None);
    env.roundtrip(&mut client);

    let output = env.server.outputs.primary().unwrap();
    env.server.finish_capture_selection(CaptureSource {
        target: CaptureTarget::Output(output),
        region: rect(0, 0, 1920, 1080),
    });
    env.roundtrip(&mut client);
    assert!(matches!(
        client
            .events::<treeland_capture_context_v1::Event>(&context)
            .as_slice(),
        [treeland_capture_context_v1::Event::SourceFailed { reason: 4 }]
    ));
}
