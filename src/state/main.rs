use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use smithay::reexports::calloop::{generic::Generic, Interest, LoopHandle, Mode, PostAction};
use smithay::reexports::wayland_server::{
    backend::{ClientData, ClientId, DisconnectReason},
    Client, Display, DisplayHandle,
};
use smithay::wayland::compositor::CompositorClientState;
use smithay::wayland::shell::xdg::{PopupSurface, ToplevelSurface};
use smithay::wayland::socket::ListeningSocketSource;
use tracing::{debug, error, info, trace, warn};

use crate::config::{Config, OutputConfigState};
use crate::error::{TreelandError, TreelandResult};
use crate::extensions::{
    dde_shell::DdeShellState, session_lock::LockState, shortcut::ShortcutOutcome,
};
use crate::output::{CopyGroup, OutputGlobals, OutputId, OutputLifecycleManager};
use crate::surface::{SurfaceId, SurfaceRegistry};
use crate::workspace::WorkspaceManager;

use super::ProtocolState;

/// Socket name override, mostly for nested sessions and tests
const SOCKET_ENV: &str = "TREELAND_WAYLAND_SOCKET";

/// Per-client data attached to every connection
#[derive(Default)]
pub struct ClientState {
    pub compositor_state: CompositorClientState,
    /// Login session the client belongs to; its uid when unset
    pub session: Option<u32>,
}

impl ClientData for ClientState {
    /// Notification that a client was initialized
    fn initialized(&self, client_id: ClientId) {
        debug!(?client_id, "Client connected");
    }
    /// Notification that a client is disconnected
    fn disconnected(&self, client_id: ClientId, reason: DisconnectReason) {
        debug!(?client_id, ?reason, "Client disconnected");
    }
}

/// Login session of a client, used to group shortcut bindings
pub fn client_session(client: &Client, dh: &DisplayHandle) -> u32 {
    if let Some(session) = client.get_data::<ClientState>().and_then(|data| data.session) {
        return session;
    }
    client.get_credentials(dh).map(|creds| creds.uid).unwrap_or(0)
}

/// Compositor-wide mode the shell UI renders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompositorMode {
    #[default]
    Normal,
    Multitaskview,
    LockScreen,
}

/// An xdg toplevel and the close requests already forwarded to it
#[derive(Debug)]
pub(crate) struct ClientToplevel {
    pub surface: ToplevelSurface,
    pub closes_sent: u32,
}

/// The process context every subsystem hangs off
///
/// One instance exists per compositor process. Surfaces, outputs and every
/// global's state are reached through it, and every protocol handler runs
/// with exclusive access to it.
#[derive(Debug)]
pub struct Server {
    pub display_handle: DisplayHandle,
    pub socket_name: Option<String>,
    pub config: Config,
    pub protocols: ProtocolState,
    pub surfaces: SurfaceRegistry,
    pub outputs: OutputLifecycleManager,
    pub output_globals: OutputGlobals,
    pub workspaces: WorkspaceManager,

    pub(crate) toplevels: HashMap<SurfaceId, ClientToplevel>,
    pub(crate) popups: HashMap<SurfaceId, PopupSurface>,
    shutting_down: bool,
    running: bool,

    pub(crate) mode: CompositorMode,
    pub(crate) idle_inhibited: bool,
    /// Group to re-enter when mirroring was interrupted by a disabled output
    pub(crate) last_copy_group: Option<CopyGroup>,
    pub(crate) shortcut_outcomes: Vec<ShortcutOutcome>,
    /// Colour commits the display still has to apply
    pub(crate) color_commits: Vec<OutputId>,
}

impl Server {
    /// Create the server and publish every global
    pub fn new(dh: &DisplayHandle, config: Config, output_state: OutputConfigState) -> Self {
        let workspaces = WorkspaceManager::new(config.workspace_count);
        Self {
            display_handle: dh.clone(),
            socket_name: None,
            config,
            protocols: ProtocolState::new(dh),
            surfaces: SurfaceRegistry::new(),
            outputs: OutputLifecycleManager::new(output_state),
            output_globals: OutputGlobals::default(),
            workspaces,
            toplevels: HashMap::new(),
            popups: HashMap::new(),
            shutting_down: false,
            running: true,
            mode: CompositorMode::Normal,
            idle_inhibited: false,
            last_copy_group: None,
            shortcut_outcomes: Vec::new(),
            color_commits: Vec::new(),
        }
    }

    /// Create the server on an event loop, listening on a wayland socket
    pub fn init(
        display: Display<Server>,
        handle: &LoopHandle<'static, Server>,
        config: Config,
        output_state: OutputConfigState,
    ) -> TreelandResult<Self> {
        let dh = display.handle();
        let mut server = Self::new(&dh, config, output_state);

        let source = match std::env::var(SOCKET_ENV) {
            Ok(name) => {
                info!("Using specified Wayland socket: {name}");
                ListeningSocketSource::with_name(&name)
            }
            Err(_) => ListeningSocketSource::new_auto(),
        }
        .map_err(|err| TreelandError::Socket(err.to_string()))?;
        let socket_name = source.socket_name().to_string_lossy().into_owned();
        handle
            .insert_source(source, |client_stream, _, server| {
                if let Err(err) = server
                    .display_handle
                    .insert_client(client_stream, Arc::new(ClientState::default()))
                {
                    warn!("Error adding wayland client: {err}");
                }
            })
            .map_err(|err| TreelandError::Socket(err.error.to_string()))?;
        info!(name = socket_name, "Listening on wayland socket");
        server.socket_name = Some(socket_name);

        handle
            .insert_source(
                Generic::new(display, Interest::READ, Mode::Level),
                |_, display, server| {
                    profiling::scope!("dispatch_clients");
                    // Safety: we don't drop the display
                    unsafe {
                        if let Err(err) = display.get_mut().dispatch_clients(server) {
                            error!("Failed to dispatch clients: {err:?}");
                        }
                    }
                    Ok(PostAction::Continue)
                },
            )
            .map_err(|err| TreelandError::Socket(err.error.to_string()))?;
        Ok(server)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    pub fn compositor_mode(&self) -> CompositorMode {
        self.mode
    }

    pub fn is_idle_inhibited(&self) -> bool {
        self.idle_inhibited
    }

    /// Stop the event loop after the current iteration
    pub fn request_quit(&mut self) {
        info!("Quit requested");
        self.running = false;
    }

    /// Work deferred to the end of a loop iteration
    pub fn dispatch_idle(&mut self) {
        profiling::scope!("dispatch_idle");
        if self.protocols.shortcut_state.has_pending_commit() {
            self.protocols.shortcut_state.apply_committed();
        }
        self.update_session_lock();
        self.complete_color_commits();
        self.tick_animations(Instant::now());
        self.configure_toplevels();
        self.sync_toplevels();
        self.check_overlaps();
        self.protocols.foreign_toplevel_state.flush_done();

        #[cfg(debug_assertions)]
        if let Err(errors) = super::validation::validate_full_state(self) {
            super::validation::log_validation_errors(&errors);
        }
    }

    /// Advance every window animation to `now`, dropping closed windows
    /// whose unmap animation is over
    pub fn tick_animations(&mut self, now: Instant) {
        let duration = Duration::from_millis(self.config.animation_duration_ms);
        for id in self.surfaces.advance_animations(now, duration) {
            trace!("{id} finished closing");
        }
    }

    fn update_session_lock(&mut self) {
        match self.protocols.session_lock_state.confirm_pending() {
            Some(LockState::Locked) => self.enter_lock_screen(),
            Some(outcome) => debug!(?outcome, "Pending lock did not engage"),
            None => {}
        }
        if let Some(ended) = self.protocols.session_lock_state.check_abandoned() {
            for surface in ended.mapped {
                self.surfaces.remove(surface);
            }
            if !ended.was_locked {
                self.leave_lock_screen();
            }
        }
    }

    fn complete_color_commits(&mut self) {
        for output in std::mem::take(&mut self.color_commits) {
            if self.protocols.output_manager_state.has_pending_commit(output) {
                self.complete_color_commit(output, true);
            }
        }
    }

    fn check_overlaps(&mut self) {
        if self.protocols.dde_shell_state.checker_count() == 0 {
            return;
        }
        let windows: Vec<_> = self
            .surfaces
            .iter()
            .filter(|wrapper| wrapper.surface_type().is_toplevel() && wrapper.is_visible())
            .map(|wrapper| wrapper.geometry())
            .collect();
        DdeShellState::check_overlaps(self, &windows);
    }

    /// Withdraw every global and stop the loop
    pub fn shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        info!("Shutting down with {} windows", self.surfaces.len());
        self.shutting_down = true;
        self.running = false;
        if let Some(ended) = self.protocols.session_lock_state.finish() {
            debug!(was_locked = ended.was_locked, "Finished session lock on shutdown");
        }
        self.protocols.remove_globals(&self.display_handle);
        for output in self.outputs.outputs().iter().map(|o| o.id).collect::<Vec<_>>() {
            self.output_globals.remove::<Server>(&self.display_handle, output);
        }
    }

    /// Drain the effects of fired shortcuts meant for the shell UI
    pub fn take_shortcut_outcomes(&mut self) -> Vec<ShortcutOutcome> {
        std::mem::take(&mut self.shortcut_outcomes)
    }
}

smithay::delegate_compositor!(Server);
smithay::delegate_shm!(Server);
smithay::delegate_xdg_shell!(Server);
smithay::delegate_output!(Server);
smithay::delegate_seat!(Server);
smithay::delegate_session_lock!(Server);

crate::delegate_output_manager!(Server);
crate::delegate_shortcut_manager!(Server);
crate::delegate_app_id_resolver!(Server);
crate::delegate_window_management!(Server);
crate::delegate_foreign_toplevel!(Server);
crate::delegate_ext_toplevel_list!(Server);
crate::delegate_wallpaper_color!(Server);
crate::delegate_screensaver!(Server);
crate::delegate_virtual_output!(Server);
crate::delegate_personalization!(Server);
crate::delegate_prelaunch_splash!(Server);
crate::delegate_keystate!(Server);
crate::delegate_capture!(Server);
crate::delegate_dde_shell!(Server);
