//! Core protocol handlers: wl_compositor, wl_shm, xdg-shell, wl_output and
//! wl_seat
//!
//! A toplevel becomes a [`SurfaceWrapper`](crate::surface::SurfaceWrapper)
//! when its first buffer is committed and stops being one when it commits a
//! null buffer or is destroyed. Buffers are only inspected for their size.

use once_cell::sync::Lazy;
use smithay::input::{Seat, SeatHandler, SeatState};
use smithay::reexports::wayland_protocols::xdg::shell::server::xdg_toplevel;
use smithay::reexports::wayland_server::{
    protocol::{wl_buffer::WlBuffer, wl_output::WlOutput, wl_seat::WlSeat, wl_surface::WlSurface},
    Client, Resource,
};
use smithay::utils::{Logical, Rectangle, Serial, Size};
use smithay::wayland::{
    buffer::BufferHandler,
    compositor::{
        with_states, BufferAssignment, CompositorClientState, CompositorHandler, CompositorState,
        SurfaceAttributes,
    },
    output::OutputHandler,
    shell::xdg::{
        PopupSurface, PositionerState, SurfaceCachedState, ToplevelStateSet, ToplevelSurface,
        XdgShellHandler, XdgShellState, XdgToplevelSurfaceData,
    },
    shm::{with_buffer_contents, ShmHandler, ShmState},
};
use tracing::{debug, trace, warn};

use crate::extensions::personalization::PersonalizationHandler;
use crate::state::{ClientState, ClientToplevel, Server};
use crate::surface::{assign_surface_id, surface_id, ShellSurface, SurfaceId, SurfaceWrapper, ToplevelProps};

// Static poison state for clients whose data is not ours
static POISON_COMPOSITOR_STATE: Lazy<CompositorClientState> =
    Lazy::new(CompositorClientState::default);

/// What a commit did to the attached buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BufferCommit {
    Attached(Size<i32, Logical>),
    Removed,
}

/// Take the newly committed buffer of a surface, releasing it at once
fn take_buffer(surface: &WlSurface) -> Option<BufferCommit> {
    let assignment = with_states(surface, |states| {
        states
            .cached_state
            .get::<SurfaceAttributes>()
            .current()
            .buffer
            .take()
    })?;
    match assignment {
        BufferAssignment::NewBuffer(buffer) => {
            let size = with_buffer_contents(&buffer, |_, _, data| {
                Size::from((data.width, data.height))
            })
            .unwrap_or_else(|err| {
                warn!("Unreadable buffer on {:?}: {err:?}", surface.id());
                Size::from((0, 0))
            });
            buffer.release();
            Some(BufferCommit::Attached(size))
        }
        BufferAssignment::Removed => Some(BufferCommit::Removed),
    }
}

fn initial_configure_sent(surface: &WlSurface) -> bool {
    with_states(surface, |states| {
        states
            .data_map
            .get::<XdgToplevelSurfaceData>()
            .and_then(|data| data.lock().ok())
            .map(|data| data.initial_configure_sent)
            .unwrap_or(false)
    })
}

fn set_state(states: &mut ToplevelStateSet, state: xdg_toplevel::State, on: bool) {
    if on {
        states.set(state);
    } else {
        states.unset(state);
    }
}

impl Server {
    fn toplevel_props(&self, toplevel: &ToplevelSurface) -> ToplevelProps {
        let wl_surface = toplevel.wl_surface();
        let (title, app_id) = with_states(wl_surface, |states| {
            states
                .data_map
                .get::<XdgToplevelSurfaceData>()
                .and_then(|data| data.lock().ok())
                .map(|data| {
                    (
                        data.title.clone().unwrap_or_default(),
                        data.app_id.clone().unwrap_or_default(),
                    )
                })
                .unwrap_or_default()
        });
        let (min_size, max_size) = with_states(wl_surface, |states| {
            let mut cached = states.cached_state.get::<SurfaceCachedState>();
            let current = cached.current();
            (current.min_size, current.max_size)
        });
        let mut props = ToplevelProps::new(app_id, title);
        props.pid = wl_surface
            .client()
            .and_then(|client| client.get_credentials(&self.display_handle).ok())
            .map(|creds| creds.pid);
        props.parent = toplevel.parent().map(|parent| surface_id(&parent));
        props.min_size = min_size;
        props.max_size = max_size;
        props
    }

    /// Where a new window of `size` goes: centred on the primary output
    pub(crate) fn initial_geometry(&self, size: Size<i32, Logical>) -> Rectangle<i32, Logical> {
        match self.outputs.primary_output() {
            Some(output) => {
                let center = output.center();
                Rectangle::new((center.x - size.w / 2, center.y - size.h / 2).into(), size)
            }
            None => Rectangle::new((0, 0).into(), size),
        }
    }

    fn is_mapped(&self, id: SurfaceId) -> bool {
        self.surfaces
            .get(id)
            .is_some_and(|wrapper| !wrapper.is_about_to_remove())
    }

    fn toplevel_committed(&mut self, id: SurfaceId, toplevel: &ToplevelSurface, buffer: Option<BufferCommit>) {
        if !initial_configure_sent(toplevel.wl_surface()) {
            toplevel.send_configure();
            return;
        }
        match buffer {
            Some(BufferCommit::Attached(size)) if !self.is_mapped(id) => {
                let props = self.toplevel_props(toplevel);
                let geometry = self.initial_geometry(size);
                let mapped = self.map_window(Some(id), ShellSurface::XdgToplevel(props), geometry);
                if mapped != id {
                    // The window took over a splash
                    assign_surface_id(toplevel.wl_surface(), mapped);
                    if let Some(client) = self.toplevels.remove(&id) {
                        self.toplevels.insert(mapped, client);
                    }
                    self.protocols.dde_shell_state.surface_renamed(id, mapped);
                    self.protocols.personalization_state.surface_renamed(id, mapped);
                    if let Some(hints) = self.protocols.personalization_state.window(mapped) {
                        self.window_personalization_changed(mapped, Some(hints));
                    }
                }
            }
            Some(BufferCommit::Removed) if self.is_mapped(id) => {
                debug!("{id} committed a null buffer");
                self.unmap_surface(id);
            }
            _ => {}
        }
    }

    fn popup_committed(&mut self, id: SurfaceId, popup: &PopupSurface, buffer: Option<BufferCommit>) {
        if !popup.is_initial_configure_sent() {
            if let Err(err) = popup.send_configure() {
                warn!("Initial popup configure failed: {err:?}");
            }
            return;
        }
        match buffer {
            Some(BufferCommit::Attached(_)) if !self.is_mapped(id) => {
                let Some(parent) = popup.get_parent_surface().map(|parent| surface_id(&parent)) else {
                    debug!("{id} has no parent, not mapping");
                    return;
                };
                let origin = self
                    .surfaces
                    .get(parent)
                    .map(|wrapper| wrapper.geometry().loc)
                    .unwrap_or_default();
                let relative = popup.with_pending_state(|state| state.geometry);
                let geometry = Rectangle::new(origin + relative.loc, relative.size);
                let wrapper = SurfaceWrapper::with_id(id, ShellSurface::XdgPopup { parent }, geometry);
                self.place_surface(wrapper);
            }
            Some(BufferCommit::Removed) if self.is_mapped(id) => {
                self.unmap_surface(id);
            }
            _ => {}
        }
    }

    /// Push wrapper state out to xdg toplevels: states, size and close requests
    pub(crate) fn configure_toplevels(&mut self) {
        for (id, toplevel) in self.toplevels.iter_mut() {
            let Some(wrapper) = self.surfaces.get(*id) else {
                continue;
            };
            if wrapper.is_about_to_remove() {
                continue;
            }
            let maximized = wrapper.is_maximized();
            let fullscreen = wrapper.is_fullscreen();
            let activated = wrapper.is_activated();
            let size = (maximized || fullscreen).then(|| wrapper.geometry().size);
            toplevel.surface.with_pending_state(|state| {
                set_state(&mut state.states, xdg_toplevel::State::Maximized, maximized);
                set_state(&mut state.states, xdg_toplevel::State::Fullscreen, fullscreen);
                set_state(&mut state.states, xdg_toplevel::State::Activated, activated);
                state.size = size;
            });
            if initial_configure_sent(toplevel.surface.wl_surface()) {
                toplevel.surface.send_pending_configure();
            }

            let requested = wrapper
                .shell()
                .toplevel()
                .map(|props| props.close_requests)
                .unwrap_or(0);
            if requested > toplevel.closes_sent {
                trace!("Asking {id} to close");
                toplevel.closes_sent = requested;
                toplevel.surface.send_close();
            }
        }
    }

    fn toplevel_id(&self, toplevel: &ToplevelSurface) -> SurfaceId {
        surface_id(toplevel.wl_surface())
    }
}

impl BufferHandler for Server {
    fn buffer_destroyed(&mut self, _buffer: &WlBuffer) {}
}

impl CompositorHandler for Server {
    fn compositor_state(&mut self) -> &mut CompositorState {
        &mut self.protocols.compositor_state
    }

    fn client_compositor_state<'a>(&self, client: &'a Client) -> &'a CompositorClientState {
        if let Some(state) = client.get_data::<ClientState>() {
            return &state.compositor_state;
        }
        tracing::error!("Unknown client data type for client {:?}", client.id());
        &POISON_COMPOSITOR_STATE
    }

    fn commit(&mut self, surface: &WlSurface) {
        let buffer = take_buffer(surface);
        let id = surface_id(surface);

        if self.protocols.session_lock_state.is_lock_surface(surface) {
            if matches!(buffer, Some(BufferCommit::Attached(_))) {
                if let Some(output) = self.protocols.session_lock_state.surface_committed(surface) {
                    self.lock_surface_mapped(id, output);
                }
            }
            return;
        }
        if let Some(toplevel) = self.toplevels.get(&id).map(|t| t.surface.clone()) {
            self.toplevel_committed(id, &toplevel, buffer);
            return;
        }
        if let Some(popup) = self.popups.get(&id).cloned() {
            self.popup_committed(id, &popup, buffer);
        }
    }

    fn destroyed(&mut self, surface: &WlSurface) {
        if self.protocols.session_lock_state.surface_destroyed(surface) {
            self.lock_surface_unmapped(surface_id(surface));
        }
    }
}

impl ShmHandler for Server {
    fn shm_state(&self) -> &ShmState {
        &self.protocols.shm_state
    }
}

impl OutputHandler for Server {}

impl SeatHandler for Server {
    type KeyboardFocus = WlSurface;
    type PointerFocus = WlSurface;
    type TouchFocus = WlSurface;

    fn seat_state(&mut self) -> &mut SeatState<Server> {
        &mut self.protocols.seat_state
    }

    fn focus_changed(&mut self, _seat: &Seat<Self>, focused: Option<&WlSurface>) {
        trace!(focused = ?focused.map(|surface| surface.id()), "Keyboard focus changed");
    }
}

impl XdgShellHandler for Server {
    fn xdg_shell_state(&mut self) -> &mut XdgShellState {
        &mut self.protocols.xdg_shell_state
    }

    fn new_toplevel(&mut self, surface: ToplevelSurface) {
        // Do not send a configure here, the initial configure
        // of a xdg_surface has to be sent during the commit if
        // the surface is not already configured
        let id = self.toplevel_id(&surface);
        debug!("New toplevel {id}");
        self.toplevels.insert(
            id,
            ClientToplevel {
                surface,
                closes_sent: 0,
            },
        );
    }

    fn new_popup(&mut self, surface: PopupSurface, _positioner: PositionerState) {
        let id = surface_id(surface.wl_surface());
        self.popups.insert(id, surface);
    }

    fn grab(&mut self, _surface: PopupSurface, _seat: WlSeat, _serial: Serial) {}

    fn reposition_request(&mut self, surface: PopupSurface, positioner: PositionerState, token: u32) {
        surface.with_pending_state(|state| {
            state.geometry = positioner.get_geometry();
            state.positioner = positioner;
        });
        surface.send_repositioned(token);
    }

    fn toplevel_destroyed(&mut self, surface: ToplevelSurface) {
        let id = self.toplevel_id(&surface);
        debug!("Toplevel {id} destroyed");
        self.toplevels.remove(&id);
        self.unmap_surface(id);
    }

    fn popup_destroyed(&mut self, surface: PopupSurface) {
        let id = surface_id(surface.wl_surface());
        self.popups.remove(&id);
        self.unmap_surface(id);
    }

    fn maximize_request(&mut self, surface: ToplevelSurface) {
        let id = self.toplevel_id(&surface);
        match self.surfaces.get_mut(id) {
            Some(wrapper) => wrapper.request_maximize(),
            None if initial_configure_sent(surface.wl_surface()) => {
                surface.send_configure();
            }
            None => {}
        }
    }

    fn unmaximize_request(&mut self, surface: ToplevelSurface) {
        let id = self.toplevel_id(&surface);
        if let Some(wrapper) = self.surfaces.get_mut(id) {
            wrapper.request_cancel_maximize();
        }
    }

    fn minimize_request(&mut self, surface: ToplevelSurface) {
        let id = self.toplevel_id(&surface);
        if let Some(wrapper) = self.surfaces.get_mut(id) {
            wrapper.request_minimize();
        }
    }

    fn fullscreen_request(&mut self, surface: ToplevelSurface, _output: Option<WlOutput>) {
        let id = self.toplevel_id(&surface);
        match self.surfaces.get_mut(id) {
            Some(wrapper) => wrapper.request_fullscreen(),
            None if initial_configure_sent(surface.wl_surface()) => {
                surface.send_configure();
            }
            None => {}
        }
    }

    fn unfullscreen_request(&mut self, surface: ToplevelSurface) {
        let id = self.toplevel_id(&surface);
        if let Some(wrapper) = self.surfaces.get_mut(id) {
            wrapper.request_cancel_fullscreen();
        }
    }

    fn title_changed(&mut self, surface: ToplevelSurface) {
        let id = self.toplevel_id(&surface);
        let title = self.toplevel_props(&surface).title;
        self.update_toplevel(id, |props| props.title = title);
    }

    fn app_id_changed(&mut self, surface: ToplevelSurface) {
        let id = self.toplevel_id(&surface);
        let app_id = self.toplevel_props(&surface).app_id;
        self.update_toplevel(id, |props| props.app_id = app_id);
    }

    fn parent_changed(&mut self, surface: ToplevelSurface) {
        let id = self.toplevel_id(&surface);
        let parent = surface.parent().map(|parent| surface_id(&parent));
        self.update_toplevel(id, |props| props.parent = parent);
    }
}
