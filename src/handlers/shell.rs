//! Window protocol handlers and the surface lifecycle glue
//!
//! The surface registry is the single source of window state. Everything
//! here either feeds client or shell events into it, or mirrors its state out
//! through the foreign toplevel globals on idle.

use std::collections::BTreeSet;

use smithay::utils::{Logical, Rectangle};
use tracing::{debug, info, warn};

use crate::extensions::{
    ext_toplevel_list::{ExtToplevelListHandler, ExtToplevelListState},
    foreign_toplevel::{
        ForeignToplevelHandler, ForeignToplevelState, ToplevelAction, ToplevelInfo,
        ToplevelStates,
    },
    personalization::{PersonalizationHandler, PersonalizationState, WindowPersonalization},
    prelaunch_splash::{PrelaunchSplashHandler, PrelaunchSplashState},
    window_management::{DesktopState, WindowManagementHandler, WindowManagementState},
};
use crate::config::Config;
use crate::state::{CompositorMode, Server};
use crate::surface::{
    ContainerKind, ShellSurface, SurfaceEvent, SurfaceId, SurfaceType, SurfaceWrapper,
    ToplevelProps,
};
use crate::workspace::WorkspaceId;

/// Size of a splash when no output is around to center it on
const SPLASH_SIZE: (i32, i32) = (800, 600);

fn container_for(surface_type: SurfaceType) -> ContainerKind {
    match surface_type {
        SurfaceType::Layer => ContainerKind::Layer,
        SurfaceType::XdgPopup | SurfaceType::InputPopup => ContainerKind::Popup,
        SurfaceType::LockScreen => ContainerKind::LockScreen,
        SurfaceType::XdgToplevel | SurfaceType::XWayland | SurfaceType::Undetermined => {
            ContainerKind::Workspace
        }
    }
}

fn toplevel_info(wrapper: &SurfaceWrapper) -> ToplevelInfo {
    let shell = wrapper.shell();
    let title = match shell {
        ShellSurface::Undetermined { app_id, .. } => format!("SplashScreen{app_id}"),
        other => other.title().unwrap_or_default().to_string(),
    };
    let mut states = ToplevelStates::empty();
    states.set(ToplevelStates::MAXIMIZED, wrapper.is_maximized());
    states.set(ToplevelStates::MINIMIZED, wrapper.is_minimized());
    states.set(ToplevelStates::ACTIVATED, wrapper.is_activated());
    states.set(ToplevelStates::FULLSCREEN, wrapper.is_fullscreen());
    ToplevelInfo {
        title,
        app_id: shell.app_id().unwrap_or_default().to_string(),
        pid: shell.pid(),
        outputs: wrapper.output().into_iter().collect::<BTreeSet<_>>(),
        states,
        parent: wrapper.parent(),
    }
}

impl Server {
    /// A surface the compositor tracks without a client surface mapped
    pub fn map_surface(&mut self, shell: ShellSurface, geometry: Rectangle<i32, Logical>) -> SurfaceId {
        self.map_window(None, shell, geometry)
    }

    /// Map a window, under `id` when it belongs to a client surface
    ///
    /// A toplevel whose app id matches a waiting splash takes the splash's
    /// place and id instead, which is returned.
    pub(crate) fn map_window(
        &mut self,
        id: Option<SurfaceId>,
        shell: ShellSurface,
        geometry: Rectangle<i32, Logical>,
    ) -> SurfaceId {
        let placeholder = shell
            .toplevel()
            .map(|props| props.app_id.as_str())
            .filter(|app_id| !app_id.is_empty())
            .and_then(|app_id| self.surfaces.find_placeholder(app_id));
        if let Some(splash) = placeholder {
            if self.surfaces.convert(splash, shell.clone()) {
                info!("{splash} replaced its splash");
                if let Some(wrapper) = self.surfaces.get_mut(splash) {
                    wrapper.set_geometry(geometry);
                }
                self.activate_surface(splash);
                return splash;
            }
        }
        let wrapper = match id {
            Some(id) => SurfaceWrapper::with_id(id, shell, geometry),
            None => SurfaceWrapper::new(shell, geometry),
        };
        self.place_surface(wrapper)
    }

    /// Put a splash up for an application that is still starting
    pub fn create_splash(&mut self, app_id: &str, sandbox_engine_name: &str) -> Option<SurfaceId> {
        if app_id.is_empty() {
            warn!("Ignoring splash without app id");
            return None;
        }
        if let Some(existing) = self.surfaces.find_placeholder(app_id) {
            debug!(%app_id, "Splash already shown");
            return Some(existing);
        }
        let geometry = self.initial_geometry(SPLASH_SIZE.into());
        let shell = ShellSurface::Undetermined {
            app_id: app_id.to_string(),
            sandbox_engine: sandbox_engine_name.to_string(),
        };
        Some(self.place_surface(SurfaceWrapper::new(shell, geometry)))
    }

    pub(crate) fn place_surface(&mut self, mut wrapper: SurfaceWrapper) -> SurfaceId {
        let container = container_for(wrapper.surface_type());
        wrapper.set_animations_enabled(self.config.animations);
        if let Some(output) = self.outputs.primary_output() {
            wrapper.set_owns_output(Some(output.id));
            wrapper.set_maximized_geometry(output.geometry);
            wrapper.set_fullscreen_geometry(output.geometry);
        }
        wrapper.set_container(Some(container));

        let workspace = self.workspaces.current();
        let on_workspace = container == ContainerKind::Workspace && !wrapper.show_on_all_workspaces();
        if on_workspace {
            wrapper.set_workspace_id(workspace.as_surface_workspace());
        }
        if self.mode == CompositorMode::LockScreen && container != ContainerKind::LockScreen {
            wrapper.set_hide_by_lockscreen(true);
        }
        wrapper.set_mapped(true);

        let is_toplevel = wrapper.surface_type().is_toplevel();
        let id = self.surfaces.insert(wrapper);
        if on_workspace {
            self.workspaces.add_surface(id, workspace);
        }
        debug!("Placed {id} in {container:?}");
        // Hints may arrive before the first buffer
        if let Some(hints) = self.protocols.personalization_state.window(id) {
            self.window_personalization_changed(id, Some(hints));
        }

        if is_toplevel {
            if self.protocols.window_management_state.desktop_state() != DesktopState::Normal {
                self.set_desktop_state(DesktopState::Normal);
            }
            self.activate_surface(id);
        }
        id
    }

    /// The client surface went away
    pub fn unmap_surface(&mut self, id: SurfaceId) -> bool {
        let workspace = self.workspaces.remove_surface(id);
        let was_active = self.surfaces.active() == Some(id);
        if !self.surfaces.remove(id) {
            return false;
        }
        if was_active {
            let next = workspace
                .and_then(|ws| self.workspaces.get(ws))
                .and_then(|ws| ws.focused_surface);
            if let Some(next) = next {
                self.activate_surface(next);
            }
        }
        true
    }

    /// Update title, app id and the other client-side properties of a toplevel
    pub fn update_toplevel(&mut self, id: SurfaceId, update: impl FnOnce(&mut ToplevelProps)) -> bool {
        match self
            .surfaces
            .get_mut(id)
            .and_then(|wrapper| wrapper.shell_mut().toplevel_mut())
        {
            Some(props) => {
                update(props);
                true
            }
            None => false,
        }
    }

    /// Give a surface keyboard focus if it may take it
    pub fn activate_surface(&mut self, id: SurfaceId) -> bool {
        if self.mode == CompositorMode::LockScreen {
            let is_lock_surface = self
                .surfaces
                .get(id)
                .is_some_and(|w| w.surface_type() == SurfaceType::LockScreen);
            if !is_lock_surface {
                debug!("Not activating {id} while locked");
                return false;
            }
        }
        if !self.surfaces.activate(id) {
            return false;
        }
        if let Some(workspace) = self.workspaces.find_surface_workspace(id) {
            self.workspaces.set_focus(workspace, Some(id));
        }
        true
    }

    /// Change the show desktop state, hiding or revealing workspace windows
    pub fn set_desktop_state(&mut self, state: DesktopState) {
        if !self.protocols.window_management_state.set_desktop_state(state) {
            return;
        }
        let hide = state.hides_surfaces();
        for id in self.surfaces.ids() {
            let Some(wrapper) = self.surfaces.get_mut(id) else {
                continue;
            };
            if wrapper.container() != Some(ContainerKind::Workspace) {
                continue;
            }
            if hide && wrapper.is_minimized() {
                continue;
            }
            wrapper.set_hide_by_show_desk(hide);
        }
        if hide {
            self.surfaces.deactivate();
        }
    }

    /// Show another workspace
    pub fn switch_workspace(&mut self, workspace: WorkspaceId) -> bool {
        if self.protocols.window_management_state.desktop_state() != DesktopState::Normal {
            self.set_desktop_state(DesktopState::Normal);
        }
        if self.workspaces.switch_to(workspace).is_none() {
            return false;
        }
        self.update_workspace_visibility();
        let focus = self
            .workspaces
            .get(workspace)
            .and_then(|ws| ws.focused_surface);
        match focus {
            Some(surface) => {
                self.activate_surface(surface);
            }
            None => self.surfaces.deactivate(),
        }
        true
    }

    /// Move a window to another workspace
    pub fn move_surface_to_workspace(&mut self, surface: SurfaceId, workspace: WorkspaceId) -> bool {
        if !self.surfaces.contains(surface) || !self.workspaces.move_surface(surface, workspace) {
            return false;
        }
        if let Some(wrapper) = self.surfaces.get_mut(surface) {
            wrapper.set_workspace_id(workspace.as_surface_workspace());
        }
        self.update_workspace_visibility();
        true
    }

    fn update_workspace_visibility(&mut self) {
        let current = self.workspaces.current().as_surface_workspace();
        for id in self.surfaces.ids() {
            if let Some(wrapper) = self.surfaces.get_mut(id) {
                let hide = !wrapper.show_on_all_workspaces() && wrapper.workspace_id() != current;
                wrapper.set_hide_by_workspace(hide);
            }
        }
    }

    /// Hide every window behind the lock screen
    pub(crate) fn enter_lock_screen(&mut self) {
        if self.mode == CompositorMode::LockScreen {
            return;
        }
        info!("Entering lock screen");
        self.mode = CompositorMode::LockScreen;
        self.surfaces.deactivate();
        self.set_lockscreen_hidden(true);
    }

    pub(crate) fn leave_lock_screen(&mut self) {
        if self.mode != CompositorMode::LockScreen {
            return;
        }
        info!("Leaving lock screen");
        self.mode = CompositorMode::Normal;
        self.set_lockscreen_hidden(false);
        let focus = self
            .workspaces
            .get(self.workspaces.current())
            .and_then(|ws| ws.focused_surface);
        if let Some(surface) = focus {
            self.activate_surface(surface);
        }
    }

    fn set_lockscreen_hidden(&mut self, hide: bool) {
        for id in self.surfaces.ids() {
            if let Some(wrapper) = self.surfaces.get_mut(id) {
                if wrapper.surface_type() != SurfaceType::LockScreen {
                    wrapper.set_hide_by_lockscreen(hide);
                }
            }
        }
    }

    /// Mirror registry changes into the toplevel globals
    ///
    /// Windows that asked to stay off the dock are withdrawn from both
    /// lists.
    pub(crate) fn sync_toplevels(&mut self) {
        // Signals are consumed here; their effect is read back from the wrappers
        self.surfaces.take_signals();

        for event in self.surfaces.take_events() {
            if let SurfaceEvent::Removed(id) = event {
                self.protocols.foreign_toplevel_state.remove_toplevel(id);
                self.protocols.ext_toplevel_list_state.remove_toplevel(id);
                self.protocols.capture_state.window_removed(id);
                self.protocols.dde_shell_state.surface_removed(id);
            }
        }

        let dh = self.display_handle.clone();
        let infos: Vec<(SurfaceId, ToplevelInfo)> = self
            .surfaces
            .iter()
            .filter(|wrapper| wrapper.surface_type().is_toplevel())
            .map(|wrapper| (wrapper.id(), toplevel_info(wrapper)))
            .collect();
        for (id, info) in infos {
            let listed = !self.protocols.dde_shell_state.skips_dock_preview(id);
            let published = self.protocols.foreign_toplevel_state.identifier(id).is_some();
            let list = &mut self.protocols.ext_toplevel_list_state;
            let foreign = &mut self.protocols.foreign_toplevel_state;
            match (listed, published) {
                (true, true) => {
                    list.update_toplevel(id, &info.title, &info.app_id);
                    foreign.update_toplevel(id, info);
                }
                (true, false) => {
                    list.add_toplevel::<Server>(&dh, id, &info.title, &info.app_id);
                    foreign.add_toplevel::<Server>(&dh, id, info);
                }
                (false, true) => {
                    debug!("{id} left the dock");
                    list.remove_toplevel(id);
                    foreign.remove_toplevel(id);
                }
                (false, false) => {}
            }
        }
    }
}

impl WindowManagementHandler for Server {
    fn window_management_state(&mut self) -> &mut WindowManagementState {
        &mut self.protocols.window_management_state
    }

    fn desktop_state_requested(&mut self, state: DesktopState) {
        self.set_desktop_state(state);
    }
}

impl ForeignToplevelHandler for Server {
    fn foreign_toplevel_state(&mut self) -> &mut ForeignToplevelState {
        &mut self.protocols.foreign_toplevel_state
    }

    fn toplevel_action(&mut self, surface: SurfaceId, action: ToplevelAction) {
        let show_desktop =
            self.protocols.window_management_state.desktop_state() == DesktopState::Show;
        let relative_origin = match action {
            ToplevelAction::SetRectangle { relative_to, .. } => {
                self.surfaces.get(relative_to).map(|w| w.geometry().loc)
            }
            _ => None,
        };
        let Some(wrapper) = self.surfaces.get_mut(surface) else {
            debug!("Toplevel action on gone {surface}");
            return;
        };
        let activate = match action {
            ToplevelAction::SetMaximized(true) => {
                wrapper.request_maximize();
                false
            }
            ToplevelAction::SetMaximized(false) => {
                wrapper.request_cancel_maximize();
                false
            }
            ToplevelAction::SetMinimized(true) if show_desktop => {
                // The window is only hidden by show desktop; bring it back
                wrapper.request_cancel_minimize();
                true
            }
            ToplevelAction::SetMinimized(true) => {
                wrapper.request_minimize();
                false
            }
            ToplevelAction::SetMinimized(false) | ToplevelAction::Activate => {
                wrapper.request_cancel_minimize();
                true
            }
            ToplevelAction::Close => {
                wrapper.request_close();
                false
            }
            ToplevelAction::SetFullscreen(true) => {
                wrapper.request_fullscreen();
                false
            }
            ToplevelAction::SetFullscreen(false) => {
                wrapper.request_cancel_fullscreen();
                false
            }
            ToplevelAction::SetRectangle { rectangle, .. } => {
                let origin = relative_origin.unwrap_or_default();
                wrapper.set_icon_geometry(Rectangle::new(rectangle.loc + origin, rectangle.size));
                false
            }
        };
        if activate {
            self.activate_surface(surface);
        }
    }
}

impl ExtToplevelListHandler for Server {
    fn ext_toplevel_list_state(&mut self) -> &mut ExtToplevelListState {
        &mut self.protocols.ext_toplevel_list_state
    }
}

impl PrelaunchSplashHandler for Server {
    fn prelaunch_splash_state(&mut self) -> &mut PrelaunchSplashState {
        &mut self.protocols.prelaunch_splash_state
    }

    fn splash_requested(&mut self, app_id: &str, sandbox_engine_name: &str) {
        self.create_splash(app_id, sandbox_engine_name);
    }
}

impl PersonalizationHandler for Server {
    fn personalization_state(&mut self) -> &mut PersonalizationState {
        &mut self.protocols.personalization_state
    }

    fn config(&mut self) -> &mut Config {
        &mut self.config
    }

    fn window_personalization_changed(
        &mut self,
        surface: SurfaceId,
        personalization: Option<WindowPersonalization>,
    ) {
        let Some(wrapper) = self.surfaces.get_mut(surface) else {
            return;
        };
        let personalization = personalization.unwrap_or_default();
        wrapper.set_no_title_bar(personalization.no_titlebar);
        wrapper.set_radius(personalization.corner_radius.unwrap_or(0));
    }

    fn appearance_changed(&mut self) {
        debug!(
            radius = self.config.window_radius,
            cursor = %self.config.cursor_theme,
            "Appearance settings changed"
        );
    }
}
