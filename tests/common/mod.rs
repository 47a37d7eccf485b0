//! Common testing utilities for treeland integration tests
//!
//! Each test runs a [`Server`] on an in-process display and talks to it over
//! real wayland connections. [`TestEnv::roundtrip`] pumps both ends until
//! requests, idle work and the resulting events have all gone through.

#![allow(dead_code)]

pub mod protocols;

use std::any::Any;
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;
use std::sync::Arc;

use smithay::reexports::wayland_server::Display;
use smithay::utils::{Logical, Rectangle};
use smithay_client_toolkit::reexports::client::{
    backend::ObjectId,
    event_created_child,
    protocol::{
        wl_buffer::WlBuffer, wl_compositor::WlCompositor, wl_output, wl_output::WlOutput,
        wl_registry, wl_registry::WlRegistry, wl_seat::WlSeat, wl_shm, wl_shm::WlShm,
        wl_shm_pool::WlShmPool, wl_surface::WlSurface,
    },
    Connection, Dispatch, EventQueue, Proxy, QueueHandle,
};
use smithay_client_toolkit::reexports::protocols::ext::foreign_toplevel_list::v1::client::{
    ext_foreign_toplevel_handle_v1::ExtForeignToplevelHandleV1,
    ext_foreign_toplevel_list_v1::{self, ExtForeignToplevelListV1},
};
use smithay_client_toolkit::reexports::protocols::ext::session_lock::v1::client::{
    ext_session_lock_manager_v1::ExtSessionLockManagerV1, ext_session_lock_surface_v1,
    ext_session_lock_surface_v1::ExtSessionLockSurfaceV1, ext_session_lock_v1::ExtSessionLockV1,
};
use smithay_client_toolkit::reexports::protocols::xdg::shell::client::{
    xdg_popup::XdgPopup, xdg_positioner::XdgPositioner, xdg_surface, xdg_surface::XdgSurface,
    xdg_toplevel::XdgToplevel, xdg_wm_base::XdgWmBase,
};
use treeland::config::{Config, OutputConfigState};
use treeland::output::{Output, OutputId};
use treeland::state::ClientState;
use treeland::surface::SurfaceId;
use treeland::Server;

use protocols::{
    app_id_resolver::{
        treeland_app_id_resolver_manager_v1::TreelandAppIdResolverManagerV1,
        treeland_app_id_resolver_v1::TreelandAppIdResolverV1,
    },
    capture::{
        treeland_capture_context_v1::TreelandCaptureContextV1,
        treeland_capture_frame_v1::TreelandCaptureFrameV1,
        treeland_capture_manager_v1::TreelandCaptureManagerV1,
        treeland_capture_session_v1::TreelandCaptureSessionV1,
    },
    dde_shell::{
        treeland_dde_active_v1::TreelandDdeActiveV1,
        treeland_dde_shell_manager_v1::TreelandDdeShellManagerV1,
        treeland_dde_shell_surface_v1::TreelandDdeShellSurfaceV1,
        treeland_lockscreen_v1::TreelandLockscreenV1,
        treeland_multitaskview_v1::TreelandMultitaskviewV1,
        treeland_window_overlap_checker::TreelandWindowOverlapChecker,
        treeland_window_picker_v1::TreelandWindowPickerV1,
    },
    foreign_toplevel::{
        treeland_dock_preview_context_v1::TreelandDockPreviewContextV1,
        treeland_foreign_toplevel_handle_v1::TreelandForeignToplevelHandleV1,
        treeland_foreign_toplevel_manager_v1::{self, TreelandForeignToplevelManagerV1},
    },
    keystate::org_kde_kwin_keystate::OrgKdeKwinKeystate,
    output_manager::{
        treeland_output_color_control_v1::TreelandOutputColorControlV1,
        treeland_output_manager_v1::TreelandOutputManagerV1,
    },
    personalization::{
        treeland_personalization_appearance_context_v1::TreelandPersonalizationAppearanceContextV1,
        treeland_personalization_cursor_context_v1::TreelandPersonalizationCursorContextV1,
        treeland_personalization_manager_v1::TreelandPersonalizationManagerV1,
        treeland_personalization_window_context_v1::TreelandPersonalizationWindowContextV1,
    },
    prelaunch_splash::treeland_prelaunch_splash_manager_v1::TreelandPrelaunchSplashManagerV1,
    screensaver::treeland_screensaver::TreelandScreensaver,
    shortcut_manager::treeland_shortcut_manager_v2::TreelandShortcutManagerV2,
    virtual_output::{
        treeland_virtual_output_manager_v1::TreelandVirtualOutputManagerV1,
        treeland_virtual_output_v1::TreelandVirtualOutputV1,
    },
    wallpaper_color::treeland_wallpaper_color_manager_v1::TreelandWallpaperColorManagerV1,
    window_management::treeland_window_management_v1::TreelandWindowManagementV1,
};

pub fn rect(x: i32, y: i32, w: i32, h: i32) -> Rectangle<i32, Logical> {
    Rectangle::new((x, y).into(), (w, h).into())
}

/// A global as the registry announced it
#[derive(Debug, Clone)]
pub struct Global {
    pub name: u32,
    pub interface: String,
    pub version: u32,
}

/// Client side state: the registry and every event received, in order
#[derive(Default)]
pub struct TestState {
    pub globals: Vec<Global>,
    events: Vec<(ObjectId, Box<dyn Any>)>,
}

impl Dispatch<WlRegistry, ()> for TestState {
    fn event(
        state: &mut Self,
        _registry: &WlRegistry,
        event: wl_registry::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } => state.globals.push(Global {
                name,
                interface,
                version,
            }),
            wl_registry::Event::GlobalRemove { name } => {
                state.globals.retain(|global| global.name != name)
            }
            _ => {}
        }
    }
}

macro_rules! record_events {
    ($($iface:ty),* $(,)?) => {$(
        impl Dispatch<$iface, ()> for TestState {
            fn event(
                state: &mut Self,
                proxy: &$iface,
                event: <$iface as Proxy>::Event,
                _: &(),
                _: &Connection,
                _: &QueueHandle<Self>,
            ) {
                state.events.push((proxy.id(), Box::new(event)));
            }
        }
    )*};
}

record_events!(
    WlCompositor,
    WlSurface,
    WlShm,
    WlShmPool,
    WlBuffer,
    WlOutput,
    WlSeat,
    XdgWmBase,
    XdgSurface,
    XdgToplevel,
    XdgPopup,
    XdgPositioner,
    ExtSessionLockManagerV1,
    ExtSessionLockV1,
    ExtSessionLockSurfaceV1,
    ExtForeignToplevelHandleV1,
    TreelandAppIdResolverManagerV1,
    TreelandAppIdResolverV1,
    TreelandCaptureManagerV1,
    TreelandCaptureContextV1,
    TreelandCaptureFrameV1,
    TreelandCaptureSessionV1,
    TreelandDdeShellManagerV1,
    TreelandDdeShellSurfaceV1,
    TreelandDdeActiveV1,
    TreelandLockscreenV1,
    TreelandMultitaskviewV1,
    TreelandWindowOverlapChecker,
    TreelandWindowPickerV1,
    TreelandDockPreviewContextV1,
    TreelandForeignToplevelHandleV1,
    OrgKdeKwinKeystate,
    TreelandOutputManagerV1,
    TreelandOutputColorControlV1,
    TreelandPersonalizationManagerV1,
    TreelandPersonalizationWindowContextV1,
    TreelandPersonalizationCursorContextV1,
    TreelandPersonalizationAppearanceContextV1,
    TreelandPrelaunchSplashManagerV1,
    TreelandScreensaver,
    TreelandShortcutManagerV2,
    TreelandVirtualOutputManagerV1,
    TreelandVirtualOutputV1,
    TreelandWallpaperColorManagerV1,
    TreelandWindowManagementV1,
);

impl Dispatch<TreelandForeignToplevelManagerV1, ()> for TestState {
    fn event(
        state: &mut Self,
        proxy: &TreelandForeignToplevelManagerV1,
        event: treeland_foreign_toplevel_manager_v1::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        state.events.push((proxy.id(), Box::new(event)));
    }

    event_created_child!(TestState, TreelandForeignToplevelManagerV1, [
        treeland_foreign_toplevel_manager_v1::EVT_TOPLEVEL_OPCODE => (TreelandForeignToplevelHandleV1, ()),
    ]);
}

impl Dispatch<ExtForeignToplevelListV1, ()> for TestState {
    fn event(
        state: &mut Self,
        proxy: &ExtForeignToplevelListV1,
        event: ext_foreign_toplevel_list_v1::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        state.events.push((proxy.id(), Box::new(event)));
    }

    event_created_child!(TestState, ExtForeignToplevelListV1, [
        ext_foreign_toplevel_list_v1::EVT_TOPLEVEL_OPCODE => (ExtForeignToplevelHandleV1, ()),
    ]);
}

/// An xdg toplevel and the objects behind it
pub struct Window {
    pub surface: WlSurface,
    pub xdg_surface: XdgSurface,
    pub toplevel: XdgToplevel,
}

/// One wayland connection to the server under test
pub struct TestClient {
    pub conn: Connection,
    pub queue: EventQueue<TestState>,
    pub qh: QueueHandle<TestState>,
    pub state: TestState,
    pub registry: WlRegistry,
}

impl TestClient {
    fn flush(&mut self) {
        let _ = self.queue.flush();
    }

    fn read_events(&mut self) {
        if let Some(guard) = self.queue.prepare_read() {
            let _ = guard.read();
        }
        let _ = self.queue.dispatch_pending(&mut self.state);
    }

    pub fn has_global(&self, interface: &str) -> bool {
        self.state.globals.iter().any(|g| g.interface == interface)
    }

    pub fn global_version(&self, interface: &str) -> Option<u32> {
        self.state
            .globals
            .iter()
            .find(|g| g.interface == interface)
            .map(|g| g.version)
    }

    /// Bind the first global of `I`, at `version` or the advertised one if lower
    pub fn bind<I>(&self, version: u32) -> I
    where
        I: Proxy + 'static,
        TestState: Dispatch<I, ()>,
    {
        let interface = I::interface().name;
        let global = self
            .state
            .globals
            .iter()
            .find(|g| g.interface == interface)
            .unwrap_or_else(|| panic!("{interface} is not advertised"));
        self.registry
            .bind::<I, (), TestState>(global.name, version.min(global.version), &self.qh, ())
    }

    /// Bind every global of `I`
    pub fn bind_all<I>(&self, version: u32) -> Vec<I>
    where
        I: Proxy + 'static,
        TestState: Dispatch<I, ()>,
    {
        let interface = I::interface().name;
        self.state
            .globals
            .iter()
            .filter(|g| g.interface == interface)
            .map(|g| {
                self.registry
                    .bind::<I, (), TestState>(g.name, version.min(g.version), &self.qh, ())
            })
            .collect()
    }

    /// Drain the events of type `E` received on `object`
    pub fn events<E: Any>(&mut self, object: &impl Proxy) -> Vec<E> {
        let id = object.id();
        self.take_matching(|object| *object == id)
            .into_iter()
            .map(|(_, event)| event)
            .collect()
    }

    /// Drain the events of type `E` received on any object
    pub fn all_events<E: Any>(&mut self) -> Vec<(ObjectId, E)> {
        self.take_matching(|_| true)
    }

    fn take_matching<E: Any>(&mut self, keep: impl Fn(&ObjectId) -> bool) -> Vec<(ObjectId, E)> {
        let (matching, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.state.events)
            .into_iter()
            .partition(|(object, event)| keep(object) && event.is::<E>());
        self.state.events = rest;
        matching
            .into_iter()
            .filter_map(|(object, event)| event.downcast::<E>().ok().map(|event| (object, *event)))
            .collect()
    }

    /// The code of the fatal error posted on this connection
    pub fn error_code(&self) -> Option<u32> {
        self.conn.protocol_error().map(|error| error.code)
    }

    pub fn create_surface(&self) -> WlSurface {
        self.bind::<WlCompositor>(6).create_surface(&self.qh, ())
    }

    /// A zeroed argb buffer in a fresh shm pool
    pub fn buffer(&self, width: i32, height: i32) -> WlBuffer {
        let shm = self.bind::<WlShm>(1);
        let size = width * height * 4;
        let file = tempfile::tempfile().expect("shm file");
        file.set_len(size as u64).expect("shm file size");
        let pool = shm.create_pool(file.as_fd(), size, &self.qh, ());
        let buffer = pool.create_buffer(
            0,
            width,
            height,
            width * 4,
            wl_shm::Format::Argb8888,
            &self.qh,
            (),
        );
        pool.destroy();
        buffer
    }

    /// Attach a buffer and commit
    pub fn draw(&self, surface: &WlSurface, width: i32, height: i32) {
        surface.attach(Some(&self.buffer(width, height)), 0, 0);
        surface.damage_buffer(0, 0, width, height);
        surface.commit();
    }

    /// An xdg toplevel with title and app id set, not committed yet
    pub fn create_toplevel(&self, app_id: &str, title: &str) -> Window {
        let surface = self.create_surface();
        let wm_base = self.bind::<XdgWmBase>(6);
        let xdg_surface = wm_base.get_xdg_surface(&surface, &self.qh, ());
        let toplevel = xdg_surface.get_toplevel(&self.qh, ());
        toplevel.set_app_id(app_id.to_string());
        toplevel.set_title(title.to_string());
        Window {
            surface,
            xdg_surface,
            toplevel,
        }
    }

    /// Acknowledge the newest configure of an xdg surface
    pub fn ack_configure(&mut self, xdg_surface: &XdgSurface) -> bool {
        let serial = self
            .events::<xdg_surface::Event>(xdg_surface)
            .into_iter()
            .filter_map(|event| match event {
                xdg_surface::Event::Configure { serial } => Some(serial),
                _ => None,
            })
            .last();
        match serial {
            Some(serial) => {
                xdg_surface.ack_configure(serial);
                true
            }
            None => false,
        }
    }

    /// Acknowledge the newest configure of a lock surface
    pub fn ack_lock_configure(&mut self, surface: &ExtSessionLockSurfaceV1) -> Option<(u32, u32)> {
        let configure = self
            .events::<ext_session_lock_surface_v1::Event>(surface)
            .into_iter()
            .filter_map(|event| match event {
                ext_session_lock_surface_v1::Event::Configure {
                    serial,
                    width,
                    height,
                } => Some((serial, width, height)),
                _ => None,
            })
            .last()?;
        surface.ack_configure(configure.0);
        Some((configure.1, configure.2))
    }

    pub fn seat(&self) -> WlSeat {
        self.bind::<WlSeat>(7)
    }
}

/// A server on an in-process display, with animations off so state
/// changes settle at once
pub struct TestEnv {
    pub display: Display<Server>,
    pub server: Server,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(Config {
            animations: false,
            ..Config::default()
        })
    }

    pub fn with_config(config: Config) -> Self {
        let display = Display::<Server>::new().expect("display");
        let server = Server::new(&display.handle(), config, OutputConfigState::new());
        Self { display, server }
    }

    /// Connect a client in login session 1
    pub fn connect(&mut self) -> TestClient {
        self.connect_in_session(1)
    }

    pub fn connect_in_session(&mut self, session: u32) -> TestClient {
        let (server_end, client_end) = UnixStream::pair().expect("socket pair");
        let data = ClientState {
            session: Some(session),
            ..ClientState::default()
        };
        self.display
            .handle()
            .insert_client(server_end, Arc::new(data))
            .expect("insert client");
        client_end.set_nonblocking(true).expect("non-blocking socket");

        let conn = Connection::from_socket(client_end).expect("client connection");
        let queue = conn.new_event_queue();
        let qh = queue.handle();
        let registry = conn.display().get_registry(&qh, ());
        let mut client = TestClient {
            conn,
            queue,
            qh,
            state: TestState::default(),
            registry,
        };
        self.roundtrip(&mut client);
        client
    }

    /// Run server work once, without any client
    pub fn idle(&mut self) {
        let _ = self.display.dispatch_clients(&mut self.server);
        self.server.dispatch_idle();
        let _ = self.display.flush_clients();
    }

    /// Deliver the client's requests and read back what they caused
    pub fn roundtrip(&mut self, client: &mut TestClient) {
        for _ in 0..3 {
            client.flush();
            self.idle();
            client.read_events();
        }
    }

    /// Roundtrip several clients, so events caused by one reach the others
    pub fn roundtrip_all(&mut self, clients: &mut [&mut TestClient]) {
        for _ in 0..2 {
            for client in clients.iter_mut() {
                self.roundtrip(client);
            }
        }
    }

    pub fn add_output(&mut self, name: &str, geometry: Rectangle<i32, Logical>) -> OutputId {
        self.server.add_output(Output::new(name, geometry))
    }

    /// The `wl_output` of `client` for the output called `name`
    pub fn bind_output(&mut self, client: &mut TestClient, name: &str) -> WlOutput {
        let outputs = client.bind_all::<WlOutput>(4);
        self.roundtrip(client);
        outputs
            .into_iter()
            .find(|output| {
                client
                    .events::<wl_output::Event>(output)
                    .into_iter()
                    .any(|event| matches!(event, wl_output::Event::Name { name: n } if n == name))
            })
            .unwrap_or_else(|| panic!("no wl_output named {name}"))
    }

    /// Map an xdg toplevel through the configure handshake
    pub fn map_toplevel(&mut self, client: &mut TestClient, app_id: &str, title: &str) -> (Window, SurfaceId) {
        let window = client.create_toplevel(app_id, title);
        window.surface.commit();
        self.roundtrip(client);
        assert!(client.ack_configure(&window.xdg_surface), "no initial configure");
        client.draw(&window.surface, 200, 100);
        self.roundtrip(client);
        let id = self
            .surface_titled(title)
            .unwrap_or_else(|| panic!("{title} did not map"));
        (window, id)
    }

    /// The live window with this title
    pub fn surface_titled(&self, title: &str) -> Option<SurfaceId> {
        self.server
            .surfaces
            .iter()
            .find(|wrapper| wrapper.shell().title() == Some(title))
            .map(|wrapper| wrapper.id())
    }
}
