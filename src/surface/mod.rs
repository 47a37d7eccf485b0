//! Client windows and their presentation state machine
//!
//! Every mapped client surface is owned by the [`SurfaceRegistry`] as a
//! [`SurfaceWrapper`]. The wrapper is the single authority on presentation
//! state (normal, maximized, minimized, fullscreen, tiling), on the reasons a
//! window is hidden, and on whether it may be activated.

mod registry;
mod shell;
mod wrapper;

pub use registry::{SurfaceEvent, SurfaceRegistry};
pub use shell::{ShellSurface, ToplevelProps};
pub use wrapper::{
    Animation, ContainerKind, MinimizeAnimation, MinimizeDirection, SurfaceWrapper,
    SHOW_ON_ALL_WORKSPACES,
};

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use bitflags::bitflags;
use smithay::reexports::wayland_server::protocol::wl_surface::WlSurface;
use smithay::wayland::compositor::with_states;

/// Unique identifier for surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SurfaceId(NonZeroU64);

static SURFACE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

impl SurfaceId {
    /// Generate a new unique surface ID
    pub fn next() -> Self {
        let id = SURFACE_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        // Safety: We start at 1 and only increment, so this is never zero
        SurfaceId(NonZeroU64::new(id).expect("Surface ID counter overflow"))
    }

    pub fn get(&self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Surface({})", self.0)
    }
}

#[derive(Debug)]
struct AssignedSurfaceId(Mutex<SurfaceId>);

/// Identifier of a client surface, assigned on first use
pub fn surface_id(surface: &WlSurface) -> SurfaceId {
    with_states(surface, |states| {
        states
            .data_map
            .insert_if_missing_threadsafe(|| AssignedSurfaceId(Mutex::new(SurfaceId::next())));
        states
            .data_map
            .get::<AssignedSurfaceId>()
            .and_then(|assigned| assigned.0.lock().ok().map(|id| *id))
            .unwrap_or_else(SurfaceId::next)
    })
}

/// Give a client surface the id of the splash it replaces
pub(crate) fn assign_surface_id(surface: &WlSurface, id: SurfaceId) {
    with_states(surface, |states| {
        states
            .data_map
            .insert_if_missing_threadsafe(|| AssignedSurfaceId(Mutex::new(id)));
        if let Some(mut assigned) = states
            .data_map
            .get::<AssignedSurfaceId>()
            .and_then(|assigned| assigned.0.lock().ok())
        {
            *assigned = id;
        }
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceType {
    XdgToplevel,
    XdgPopup,
    XWayland,
    Layer,
    InputPopup,
    LockScreen,
    Undetermined,
}

impl SurfaceType {
    /// Types mirrored to taskbars and docks
    pub fn is_toplevel(&self) -> bool {
        matches!(
            self,
            SurfaceType::XdgToplevel | SurfaceType::XWayland | SurfaceType::Undetermined
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SurfaceState {
    #[default]
    Normal,
    Maximized,
    Minimized,
    Fullscreen,
    Tiling,
}

bitflags! {
    /// Preconditions for honouring activation requests
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ActiveControlState: u32 {
        const MAPPED = 1;
        const UNMINIMIZED = 2;
        const HAS_INITIALIZE_CONTAINER = 4;
        const FULL = Self::MAPPED.bits()
            | Self::UNMINIMIZED.bits()
            | Self::HAS_INITIALIZE_CONTAINER.bits();
    }
}

/// Notifications a wrapper raises for its observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceSignal {
    RequestActive,
    RequestInactive,
    AboutToBeInvalidated,
    StateChanged {
        previous: SurfaceState,
        current: SurfaceState,
    },
    GeometryChanged,
    VisibleChanged(bool),
}
