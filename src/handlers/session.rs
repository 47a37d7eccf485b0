//! Session lock, idle inhibition and app id resolution

use std::os::fd::OwnedFd;

use smithay::reexports::wayland_server::protocol::wl_output::WlOutput;
use smithay::utils::Rectangle;
use smithay::wayland::session_lock::{
    LockSurface, SessionLockHandler, SessionLockManagerState, SessionLocker,
};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::extensions::{
    app_id_resolver::{AppIdResolverHandler, AppIdResolverState, ResolvedAppId},
    screensaver::{ScreensaverHandler, ScreensaverState},
    session_lock::EndedLock,
};
use crate::output::{output_id, OutputId};
use crate::state::Server;
use crate::surface::{ContainerKind, ShellSurface, SurfaceId, SurfaceWrapper};

impl Server {
    /// End the current session lock from the compositor side
    pub fn finish_session_lock(&mut self) {
        if let Some(ended) = self.protocols.session_lock_state.finish() {
            self.lock_ended(ended);
        }
    }

    fn lock_ended(&mut self, ended: EndedLock) {
        for surface in ended.mapped {
            self.surfaces.remove(surface);
        }
        self.leave_lock_screen();
    }

    /// Ask the registered resolver which application owns a process
    ///
    /// `None` means no resolver is registered. The receiver yields an empty
    /// answer if the resolver goes away before replying.
    pub fn resolve_app_id(&mut self, pidfd: OwnedFd) -> Option<oneshot::Receiver<ResolvedAppId>> {
        let receiver = self.protocols.app_id_resolver_state.resolve_pidfd(pidfd);
        if receiver.is_none() {
            debug!("No app id resolver registered");
        }
        receiver
    }

    /// A lock surface committed its first buffer
    pub(crate) fn lock_surface_mapped(&mut self, surface: SurfaceId, output: OutputId) {
        let Some(geometry) = self.outputs.output(output).map(|o| o.geometry) else {
            warn!("Lock surface {surface} on unknown {output}");
            return;
        };
        let mut wrapper = SurfaceWrapper::with_id(
            surface,
            ShellSurface::LockScreen { output },
            Rectangle::new(geometry.loc, geometry.size),
        );
        wrapper.set_animations_enabled(self.config.animations);
        wrapper.set_owns_output(Some(output));
        wrapper.set_container(Some(ContainerKind::LockScreen));
        wrapper.set_mapped(true);
        self.surfaces.insert(wrapper);
        if self.surfaces.active().is_none() {
            self.activate_surface(surface);
        }
    }

    pub(crate) fn lock_surface_unmapped(&mut self, surface: SurfaceId) {
        if !self.surfaces.remove(surface) {
            warn!("Unmapped lock surface {surface} was never mapped");
        }
    }
}

impl SessionLockHandler for Server {
    fn lock_state(&mut self) -> &mut SessionLockManagerState {
        self.protocols.session_lock_state.manager_state()
    }

    fn lock(&mut self, confirmation: SessionLocker) {
        // Confirmed on the next idle pass
        if self.protocols.session_lock_state.request_lock(confirmation) {
            debug!("Session lock requested");
        }
    }

    fn unlock(&mut self) {
        let ended = self.protocols.session_lock_state.unlocked();
        self.lock_ended(ended);
    }

    fn new_surface(&mut self, surface: LockSurface, output: WlOutput) {
        let Some(output) = output_id(&output) else {
            warn!("Lock surface for an unknown wl_output");
            return;
        };
        let size = self
            .outputs
            .output(output)
            .map(|o| o.size())
            .unwrap_or_default();
        self.protocols
            .session_lock_state
            .add_surface(surface, output, size);
    }
}

impl ScreensaverHandler for Server {
    fn screensaver_state(&mut self) -> &mut ScreensaverState {
        &mut self.protocols.screensaver_state
    }

    fn idle_inhibit_changed(&mut self, inhibited: bool) {
        debug!(inhibited, "Idle inhibition changed");
        self.idle_inhibited = inhibited;
    }
}

impl AppIdResolverHandler for Server {
    fn app_id_resolver_state(&mut self) -> &mut AppIdResolverState {
        &mut self.protocols.app_id_resolver_state
    }
}
