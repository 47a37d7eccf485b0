//! `ext_session_lock_manager_v1`: client-driven screen locking
//!
//! The wire protocol, including its error checks, is smithay's
//! [`SessionLockManagerState`]. This module keeps the compositor's view of
//! the lock: it moves through `Created -> Locked` and ends in one of
//! `Finished`, `Unlocked`, `Abandoned` (the client vanished while locked) or
//! `Canceled` (the client vanished before it ever locked). Lock surfaces
//! belong to the lock and their windows go away with it once it leaves
//! `Locked`.

use smithay::reexports::wayland_protocols::ext::session_lock::v1::server::ext_session_lock_v1::ExtSessionLockV1;
use smithay::reexports::wayland_server::{protocol::wl_surface::WlSurface, Resource};
use smithay::utils::{Logical, Size};
use smithay::wayland::session_lock::{LockSurface, SessionLockManagerState, SessionLocker};
use tracing::{debug, info, warn};

use crate::output::OutputId;
use crate::surface::{surface_id, SurfaceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Created,
    Locked,
    Finished,
    Unlocked,
    Abandoned,
    Canceled,
}

#[derive(Debug)]
struct ActiveLock {
    lock: ExtSessionLockV1,
    state: LockState,
}

#[derive(Debug)]
struct LockSurfaceEntry {
    surface: LockSurface,
    id: SurfaceId,
    output: OutputId,
    mapped: bool,
}

/// Windows of a lock that just ended
#[derive(Debug, Default, PartialEq, Eq)]
pub struct EndedLock {
    /// The session was locked when the lock ended
    pub was_locked: bool,
    /// Lock surfaces that had a window
    pub mapped: Vec<SurfaceId>,
}

pub struct SessionLockState {
    manager: SessionLockManagerState,
    /// Lock waiting for the next idle point to be confirmed
    pending: Option<SessionLocker>,
    active: Option<ActiveLock>,
    surfaces: Vec<LockSurfaceEntry>,
    last_outcome: Option<LockState>,
}

impl std::fmt::Debug for SessionLockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLockState")
            .field("pending", &self.pending.is_some())
            .field("active", &self.active)
            .field("surfaces", &self.surfaces)
            .field("last_outcome", &self.last_outcome)
            .finish()
    }
}

impl SessionLockState {
    pub fn new(manager: SessionLockManagerState) -> Self {
        Self {
            manager,
            pending: None,
            active: None,
            surfaces: Vec::new(),
            last_outcome: None,
        }
    }

    pub fn manager_state(&mut self) -> &mut SessionLockManagerState {
        &mut self.manager
    }

    /// State of the active lock
    pub fn active_state(&self) -> Option<LockState> {
        self.active.as_ref().map(|lock| lock.state)
    }

    pub fn is_locked(&self) -> bool {
        self.active_state() == Some(LockState::Locked)
    }

    /// How the most recent lock ended
    pub fn last_outcome(&self) -> Option<LockState> {
        self.last_outcome
    }

    pub fn lock_surface_count(&self) -> usize {
        self.surfaces.len()
    }

    /// Accept a new lock, or refuse it while another one is active
    ///
    /// A refused locker is dropped, which sends it `finished`.
    pub fn request_lock(&mut self, locker: SessionLocker) -> bool {
        if self.active.is_some() {
            debug!("Session already locked, finishing the new lock");
            return false;
        }
        self.active = Some(ActiveLock {
            lock: locker.ext_session_lock().clone(),
            state: LockState::Created,
        });
        self.pending = Some(locker);
        true
    }

    /// Confirm the pending lock
    ///
    /// Returns the new state: `Locked`, or `Canceled` when the client
    /// destroyed the lock before it could be confirmed.
    pub fn confirm_pending(&mut self) -> Option<LockState> {
        let locker = self.pending.take()?;
        let alive = locker.ext_session_lock().is_alive();
        if !alive {
            drop(locker);
            self.end(LockState::Canceled);
            return Some(LockState::Canceled);
        }
        locker.lock();
        if let Some(active) = &mut self.active {
            active.state = LockState::Locked;
        }
        info!("Session locked");
        Some(LockState::Locked)
    }

    /// The client unlocked with `unlock_and_destroy`
    pub fn unlocked(&mut self) -> EndedLock {
        self.end(LockState::Unlocked)
    }

    /// End the active lock from the compositor side, sending `finished`
    pub fn finish(&mut self) -> Option<EndedLock> {
        // Dropping a pending locker sends `finished` on its own
        if self.pending.take().is_none() {
            self.active.as_ref()?.lock.finished();
        }
        Some(self.end(LockState::Finished))
    }

    /// Detect a lock whose client went away
    pub fn check_abandoned(&mut self) -> Option<EndedLock> {
        let active = self.active.as_ref()?;
        if active.lock.is_alive() {
            return None;
        }
        match active.state {
            LockState::Locked => {
                warn!("Session lock client vanished while locked");
                Some(self.end(LockState::Abandoned))
            }
            LockState::Created if self.pending.is_none() => Some(self.end(LockState::Canceled)),
            _ => None,
        }
    }

    fn end(&mut self, outcome: LockState) -> EndedLock {
        let was_locked = self.is_locked();
        self.active = None;
        self.pending = None;
        self.last_outcome = Some(outcome);
        let mapped = std::mem::take(&mut self.surfaces)
            .into_iter()
            .filter(|entry| entry.mapped)
            .map(|entry| entry.id)
            .collect();
        debug!(?outcome, "Session lock ended");
        EndedLock { was_locked, mapped }
    }

    /// Track and configure a new lock surface
    pub fn add_surface(&mut self, surface: LockSurface, output: OutputId, size: Size<i32, Logical>) {
        configure(&surface, size);
        self.surfaces.push(LockSurfaceEntry {
            id: surface_id(surface.wl_surface()),
            surface,
            output,
            mapped: false,
        });
    }

    /// Record that a lock surface got a buffer; returns its output the first time
    pub fn surface_committed(&mut self, surface: &WlSurface) -> Option<OutputId> {
        let entry = self
            .surfaces
            .iter_mut()
            .find(|entry| entry.surface.wl_surface() == surface)?;
        if entry.mapped {
            return None;
        }
        entry.mapped = true;
        Some(entry.output)
    }

    pub fn is_lock_surface(&self, surface: &WlSurface) -> bool {
        self.surfaces
            .iter()
            .any(|entry| entry.surface.wl_surface() == surface)
    }

    /// Forget a destroyed lock surface; true if it had a window
    pub fn surface_destroyed(&mut self, surface: &WlSurface) -> bool {
        let Some(index) = self
            .surfaces
            .iter()
            .position(|entry| entry.surface.wl_surface() == surface)
        else {
            return false;
        };
        self.surfaces.remove(index).mapped
    }

    /// Reconfigure lock surfaces after an output changed size
    pub fn output_resized(&mut self, output: OutputId, size: Size<i32, Logical>) {
        for entry in self.surfaces.iter().filter(|entry| entry.output == output) {
            configure(&entry.surface, size);
        }
    }
}

fn configure(surface: &LockSurface, size: Size<i32, Logical>) {
    surface.with_pending_state(|state| {
        state.size = Some((size.w.max(0) as u32, size.h.max(0) as u32).into());
    });
    surface.send_configure();
}
