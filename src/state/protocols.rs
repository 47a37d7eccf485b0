//! Protocol state management
//!
//! This module contains the state of every published global in a single
//! struct, separating protocol concerns from the main server state.

use smithay::input::SeatState;
use smithay::reexports::wayland_server::DisplayHandle;
use smithay::wayland::{
    compositor::CompositorState,
    output::OutputManagerState as XdgOutputManagerState,
    session_lock::SessionLockManagerState,
    shell::xdg::XdgShellState,
    shm::ShmState,
};
use tracing::debug;

use crate::extensions::{
    app_id_resolver::AppIdResolverState, capture::CaptureState, dde_shell::DdeShellState,
    ext_toplevel_list::ExtToplevelListState, foreign_toplevel::ForeignToplevelState,
    keystate::KeystateState, output_manager::OutputManagerState,
    personalization::PersonalizationState, prelaunch_splash::PrelaunchSplashState,
    screensaver::ScreensaverState, session_lock::SessionLockState, shortcut::ShortcutState,
    virtual_output::VirtualOutputState, wallpaper_color::WallpaperColorState,
    window_management::WindowManagementState,
};

use super::Server;

/// Container for all protocol global states
#[derive(Debug)]
pub struct ProtocolState {
    // Core protocols
    pub compositor_state: CompositorState,
    pub shm_state: ShmState,
    pub seat_state: SeatState<Server>,
    pub xdg_shell_state: XdgShellState,
    pub xdg_output_state: XdgOutputManagerState,

    // Output protocols
    pub output_manager_state: OutputManagerState,
    pub virtual_output_state: VirtualOutputState,
    pub wallpaper_color_state: WallpaperColorState,

    // Input protocols
    pub shortcut_state: ShortcutState,
    pub keystate_state: KeystateState,

    // Session protocols
    pub session_lock_state: SessionLockState,
    pub screensaver_state: ScreensaverState,
    pub app_id_resolver_state: AppIdResolverState,

    // Window management protocols
    pub window_management_state: WindowManagementState,
    pub foreign_toplevel_state: ForeignToplevelState,
    pub ext_toplevel_list_state: ExtToplevelListState,
    pub prelaunch_splash_state: PrelaunchSplashState,

    // Desktop shell
    pub dde_shell_state: DdeShellState,
    pub capture_state: CaptureState,
    pub personalization_state: PersonalizationState,
}

impl ProtocolState {
    /// Create every global
    pub fn new(display_handle: &DisplayHandle) -> Self {
        let mut seat_state = SeatState::new();
        seat_state.new_wl_seat(display_handle, "seat0");

        Self {
            compositor_state: CompositorState::new_v6::<Server>(display_handle),
            shm_state: ShmState::new::<Server>(display_handle, vec![]),
            seat_state,
            xdg_shell_state: XdgShellState::new::<Server>(display_handle),
            xdg_output_state: XdgOutputManagerState::new_with_xdg_output::<Server>(display_handle),

            output_manager_state: OutputManagerState::new::<Server>(display_handle),
            virtual_output_state: VirtualOutputState::new::<Server>(display_handle),
            wallpaper_color_state: WallpaperColorState::new::<Server>(display_handle),

            shortcut_state: ShortcutState::new::<Server>(display_handle),
            keystate_state: KeystateState::new::<Server>(display_handle),

            session_lock_state: SessionLockState::new(SessionLockManagerState::new::<Server, _>(
                display_handle,
                |_client| true,
            )),
            screensaver_state: ScreensaverState::new::<Server>(display_handle),
            app_id_resolver_state: AppIdResolverState::new::<Server>(display_handle),

            window_management_state: WindowManagementState::new::<Server>(display_handle),
            foreign_toplevel_state: ForeignToplevelState::new::<Server>(display_handle),
            ext_toplevel_list_state: ExtToplevelListState::new::<Server>(display_handle),
            prelaunch_splash_state: PrelaunchSplashState::new::<Server>(display_handle),

            dde_shell_state: DdeShellState::new::<Server>(display_handle),
            capture_state: CaptureState::new::<Server>(display_handle),
            personalization_state: PersonalizationState::new::<Server>(display_handle),
        }
    }

    /// Withdraw the treeland globals so no new client can bind them
    pub fn remove_globals(&self, display_handle: &DisplayHandle) {
        let globals = [
            self.output_manager_state.global(),
            self.virtual_output_state.global(),
            self.wallpaper_color_state.global(),
            self.shortcut_state.global(),
            self.keystate_state.global(),
            self.screensaver_state.global(),
            self.app_id_resolver_state.global(),
            self.window_management_state.global(),
            self.foreign_toplevel_state.global(),
            self.ext_toplevel_list_state.global(),
            self.prelaunch_splash_state.global(),
            self.dde_shell_state.global(),
            self.capture_state.global(),
            self.personalization_state.global(),
        ];
        debug!("Removing {} globals", globals.len());
        for global in globals {
            display_handle.remove_global::<Server>(global);
        }
    }
}
