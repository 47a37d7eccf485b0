mod common;

use common::protocols::{
    dde_shell::treeland_dde_shell_manager_v1::TreelandDdeShellManagerV1,
    foreign_toplevel::{
        treeland_dock_preview_context_v1::{self, TreelandDockPreviewContextV1},
        treeland_foreign_toplevel_handle_v1::{self, TreelandForeignToplevelHandleV1},
        treeland_foreign_toplevel_manager_v1::{self, TreelandForeignToplevelManagerV1},
    },
};
use common::{rect, TestClient, TestEnv};
use smithay_client_toolkit::reexports::protocols::ext::foreign_toplevel_list::v1::client::{
    ext_foreign_toplevel_handle_v1::{self, ExtForeignToplevelHandleV1},
    ext_foreign_toplevel_list_v1::{self, ExtForeignToplevelListV1},
};
use smithay::utils::Point;
use treeland::extensions::foreign_toplevel::DockPreviewKind;

/// Handles announced to a treeland foreign toplevel manager since the last call
fn announced(client: &mut TestClient, manager: &TreelandForeignToplevelManagerV1) -> Vec<TreelandForeignToplevelHandleV1> {
    client
        .events::<treeland_foreign_toplevel_manager_v1::Event>(manager)
        .into_iter()
        .filter_map(|event| match event {
            treeland_foreign_toplevel_manager_v1::Event::Toplevel { toplevel } => Some(toplevel),
            _ => None,
        })
        .collect()
}

fn identifier(client: &mut TestClient, handle: &TreelandForeignToplevelHandleV1) -> u32 {
    client
        .events::<treeland_foreign_toplevel_handle_v1::Event>(handle)
        .into_iter()
        .find_map(|event| match event {
            treeland_foreign_toplevel_handle_v1::Event::Identifier { identifier } => Some(identifier),
            _ => None,
        })
        .expect("identifier sent")
}

fn identifier_array(identifiers: &[u32]) -> Vec<u8> {
    identifiers.iter().flat_map(|id| id.to_ne_bytes()).collect()
}

#[test]
fn test_foreign_toplevel_follows_window() {
    let mut env = TestEnv::new();
    env.add_output("eDP-1", rect(0, 0, 1920, 1080));
    let mut dock = env.connect();
    let wl_output = env.bind_output(&mut dock, "eDP-1");
    let manager = dock.bind::<TreelandForeignToplevelManagerV1>(1);
    env.roundtrip(&mut dock);

    let mut app = env.connect();
    let (window, id) = env.map_toplevel(&mut app, "org.example.editor", "editor");
    env.roundtrip(&mut dock);

    let handles = announced(&mut dock, &manager);
    assert_eq!(handles.len(), 1);
    let handle = &handles[0];
    let events = dock.events::<treeland_foreign_toplevel_handle_v1::Event>(handle);
    assert!(events.iter().any(|event| matches!(
        event,
        treeland_foreign_toplevel_handle_v1::Event::AppId { app_id } if app_id == "org.example.editor"
    )));
    assert!(events.iter().any(|event| matches!(
        event,
        treeland_foreign_toplevel_handle_v1::Event::Title { title } if title == "editor"
    )));
    assert!(events.iter().any(|event| matches!(
        event,
        treeland_foreign_toplevel_handle_v1::Event::OutputEnter { output } if *output == wl_output
    )));
    assert!(matches!(
        events.last(),
        Some(treeland_foreign_toplevel_handle_v1::Event::Done)
    ));

    // The taskbar maximizes through the handle
    handle.set_maximized();
    env.roundtrip(&mut dock);
    assert!(env.server.surfaces.get(id).unwrap().is_maximized());
    let events = dock.events::<treeland_foreign_toplevel_handle_v1::Event>(handle);
    let states: Vec<u32> = events
        .iter()
        .filter_map(|event| match event {
            treeland_foreign_toplevel_handle_v1::Event::State { state } => Some(
                state
                    .chunks_exact(4)
                    .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                    .collect::<Vec<_>>(),
            ),
            _ => None,
        })
        .last()
        .expect("state resent");
    assert!(states.contains(&0));
    assert!(matches!(
        events.last(),
        Some(treeland_foreign_toplevel_handle_v1::Event::Done)
    ));

    window.toplevel.set_title("notes.txt".into());
    env.roundtrip_all(&mut [&mut app, &mut dock]);
    let events = dock.events::<treeland_foreign_toplevel_handle_v1::Event>(handle);
    assert!(events.iter().any(|event| matches!(
        event,
        treeland_foreign_toplevel_handle_v1::Event::Title { title } if title == "notes.txt"
    )));

    window.toplevel.destroy();
    window.xdg_surface.destroy();
    env.roundtrip_all(&mut [&mut app, &mut dock]);
    let events = dock.events::<treeland_foreign_toplevel_handle_v1::Event>(handle);
    assert!(events
        .iter()
        .any(|event| matches!(event, treeland_foreign_toplevel_handle_v1::Event::Closed)));
    assert_eq!(env.server.protocols.foreign_toplevel_state.toplevel_count(), 0);
}

#[test]
fn test_late_manager_sees_existing_windows() {
    let mut env = TestEnv::new();
    env.add_output("eDP-1", rect(0, 0, 1920, 1080));
    let mut app = env.connect();
    env.map_toplevel(&mut app, "org.example.editor", "editor");
    env.map_toplevel(&mut app, "org.example.viewer", "viewer");

    let mut dock = env.connect();
    let manager = dock.bind::<TreelandForeignToplevelManagerV1>(1);
    env.roundtrip(&mut dock);
    assert_eq!(announced(&mut dock, &manager).len(), 2);
    assert_eq!(env.server.protocols.foreign_toplevel_state.manager_count(), 1);

    manager.stop();
    env.roundtrip(&mut dock);
    assert!(dock
        .events::<treeland_foreign_toplevel_manager_v1::Event>(&manager)
        .iter()
        .any(|event| matches!(event, treeland_foreign_toplevel_manager_v1::Event::Finished)));
}

#[test]
fn test_dock_preview_lifecycle() {
    let mut env = TestEnv::new();
    env.add_output("eDP-1", rect(0, 0, 1920, 1080));
    let mut app = env.connect();
    let (editor, editor_id) = env.map_toplevel(&mut app, "org.example.editor", "editor");
    let (_, viewer_id) = env.map_toplevel(&mut app, "org.example.viewer", "viewer");

    let mut dock = env.connect();
    let manager = dock.bind::<TreelandForeignToplevelManagerV1>(1);
    env.roundtrip(&mut dock);
    let handles = announced(&mut dock, &manager);
    assert_eq!(handles.len(), 2);
    let identifiers: Vec<u32> = handles
        .iter()
        .map(|handle| identifier(&mut dock, handle))
        .collect();

    let panel = dock.create_surface();
    let context: TreelandDockPreviewContextV1 =
        manager.get_dock_preview_context(&panel, &dock.qh, ());
    context.show(identifier_array(&identifiers), 100, 1040, 1);
    env.roundtrip(&mut dock);
    let preview = env
        .server
        .protocols
        .foreign_toplevel_state
        .dock_preview()
        .cloned()
        .expect("preview shown");
    assert_eq!(preview.position, Point::from((100, 1040)));
    assert_eq!(preview.direction, 1);
    match &preview.kind {
        DockPreviewKind::Surfaces(surfaces) => {
            assert_eq!(surfaces.len(), 2);
            assert!(surfaces.contains(&editor_id));
            assert!(surfaces.contains(&viewer_id));
        }
        other => panic!("unexpected preview {other:?}"),
    }

    // Pointer crossing the preview is reported to the dock
    env.server
        .protocols
        .foreign_toplevel_state
        .dock_preview_entered(preview.relative_surface);
    env.server
        .protocols
        .foreign_toplevel_state
        .dock_preview_left(preview.relative_surface);
    env.roundtrip(&mut dock);
    let crossings = dock.events::<treeland_dock_preview_context_v1::Event>(&context);
    assert!(matches!(
        crossings.as_slice(),
        [
            treeland_dock_preview_context_v1::Event::Enter,
            treeland_dock_preview_context_v1::Event::Leave
        ]
    ));

    // A closed window drops out of the preview
    editor.toplevel.destroy();
    editor.xdg_surface.destroy();
    env.roundtrip_all(&mut [&mut app, &mut dock]);
    let preview = env.server.protocols.foreign_toplevel_state.dock_preview().unwrap();
    assert_eq!(preview.kind, DockPreviewKind::Surfaces(vec![viewer_id]));

    context.show_tooltip("Files".into(), 40, 1040, 1);
    env.roundtrip(&mut dock);
    let preview = env.server.protocols.foreign_toplevel_state.dock_preview().unwrap();
    assert_eq!(preview.kind, DockPreviewKind::Tooltip("Files".into()));

    context.close();
    env.roundtrip(&mut dock);
    assert!(env.server.protocols.foreign_toplevel_state.dock_preview().is_none());

    // Unknown identifiers are skipped
    context.show(identifier_array(&[9999]), 0, 0, 0);
    env.roundtrip(&mut dock);
    let preview = env.server.protocols.foreign_toplevel_state.dock_preview().unwrap();
    assert_eq!(preview.kind, DockPreviewKind::Surfaces(Vec::new()));

    context.destroy();
    env.roundtrip(&mut dock);
    assert!(env.server.protocols.foreign_toplevel_state.dock_preview().is_none());
}

#[test]
fn test_ext_list_follows_window() {
    let mut env = TestEnv::new();
    env.add_output("eDP-1", rect(0, 0, 1920, 1080));
    let mut observer = env.connect();
    let list = observer.bind::<ExtForeignToplevelListV1>(1);
    env.roundtrip(&mut observer);

    let mut app = env.connect();
    let (window, id) = env.map_toplevel(&mut app, "org.example.editor", "editor");
    env.roundtrip(&mut observer);

    let handles: Vec<ExtForeignToplevelHandleV1> = observer
        .events::<ext_foreign_toplevel_list_v1::Event>(&list)
        .into_iter()
        .filter_map(|event| match event {
            ext_foreign_toplevel_list_v1::Event::Toplevel { toplevel } => Some(toplevel),
            _ => None,
        })
        .collect();
    assert_eq!(handles.len(), 1);
    let handle = &handles[0];
    let expected = env
        .server
        .protocols
        .ext_toplevel_list_state
        .identifier(id)
        .expect("listed")
        .to_string();
    let events = observer.events::<ext_foreign_toplevel_handle_v1::Event>(handle);
    assert!(events.iter().any(|event| matches!(
        event,
        ext_foreign_toplevel_handle_v1::Event::Identifier { identifier } if *identifier == expected
    )));
    assert!(events.iter().any(|event| matches!(
        event,
        ext_foreign_toplevel_handle_v1::Event::AppId { app_id } if app_id == "org.example.editor"
    )));
    assert!(matches!(
        events.last(),
        Some(ext_foreign_toplevel_handle_v1::Event::Done)
    ));

    window.toplevel.set_title("notes.txt".into());
    env.roundtrip_all(&mut [&mut app, &mut observer]);
    let events = observer.events::<ext_foreign_toplevel_handle_v1::Event>(handle);
    assert!(matches!(
        events.as_slice(),
        [
            ext_foreign_toplevel_handle_v1::Event::Title { .. },
            ext_foreign_toplevel_handle_v1::Event::Done
        ]
    ));

    window.toplevel.destroy();
    window.xdg_surface.destroy();
    env.roundtrip_all(&mut [&mut app, &mut observer]);
    let events = observer.events::<ext_foreign_toplevel_handle_v1::Event>(handle);
    assert!(events
        .iter()
        .any(|event| matches!(event, ext_foreign_toplevel_handle_v1::Event::Closed)));
    assert!(env
        .server
        .protocols
        .ext_toplevel_list_state
        .identifier(id)
        .is_none());
}

#[test]
fn test_stopped_ext_list_gets_nothing_new() {
    let mut env = TestEnv::new();
    env.add_output("eDP-1", rect(0, 0, 1920, 1080));
    let mut observer = env.connect();
    let list = observer.bind::<ExtForeignToplevelListV1>(1);
    list.stop();
    env.roundtrip(&mut observer);
    assert!(observer
        .events::<ext_foreign_toplevel_list_v1::Event>(&list)
        .iter()
        .any(|event| matches!(event, ext_foreign_toplevel_list_v1::Event::Finished)));

    let mut app = env.connect();
    env.map_toplevel(&mut app, "org.example.editor", "editor");
    env.roundtrip(&mut observer);
    assert!(observer
        .events::<ext_foreign_toplevel_list_v1::Event>(&list)
        .is_empty());
}

#[test]
fn test_skip_dock_preview_withdraws_the_window() {
    let mut env = TestEnv::new();
    env.add_output("eDP-1", rect(0, 0, 1920, 1080));
    let mut dock = env.connect();
    let manager = dock.bind::<TreelandForeignToplevelManagerV1>(1);
    let list = dock.bind::<ExtForeignToplevelListV1>(1);
    env.roundtrip(&mut dock);

    let mut app = env.connect();
    let (window, id) = env.map_toplevel(&mut app, "org.example.launcher", "launcher");
    env.roundtrip(&mut dock);
    let handles = announced(&mut dock, &manager);
    assert_eq!(handles.len(), 1);
    dock.events::<ext_foreign_toplevel_list_v1::Event>(&list);

    let shell = app.bind::<TreelandDdeShellManagerV1>(1);
    let shell_surface = shell.get_shell_surface(&window.surface, &app.qh, ());
    shell_surface.set_skip_dock_preview(1);
    env.roundtrip_all(&mut [&mut app, &mut dock]);

    assert!(env.server.surfaces.contains(id));
    assert_eq!(env.server.protocols.foreign_toplevel_state.toplevel_count(), 0);
    assert!(env
        .server
        .protocols
        .ext_toplevel_list_state
        .identifier(id)
        .is_none());
    assert!(dock
        .events::<treeland_foreign_toplevel_handle_v1::Event>(&handles[0])
        .iter()
        .any(|event| matches!(event, treeland_foreign_toplevel_handle_v1::Event::Closed)));

    shell_surface.set_skip_dock_preview(0);
    env.roundtrip_all(&mut [&mut app, &mut dock]);
    assert_eq!(announced(&mut dock, &manager).len(), 1);
}
