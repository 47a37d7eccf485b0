//! The shell-surface collaborator behind each wrapper
//!
//! The wrapper never inspects protocol objects directly. Whatever role the
//! client surface has is captured here as one tagged variant, and the few
//! places that genuinely differ per role (parent lookup, pid attribution,
//! resize limits) match on it.

use smithay::utils::{Logical, Size};

use super::{SurfaceId, SurfaceType};
use crate::output::OutputId;

/// Client-visible state of a toplevel window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToplevelProps {
    pub title: String,
    pub app_id: String,
    pub pid: Option<i32>,
    pub parent: Option<SurfaceId>,
    /// Zero means unconstrained
    pub min_size: Size<i32, Logical>,
    /// Zero means unconstrained
    pub max_size: Size<i32, Logical>,
    pub maximized: bool,
    pub minimized: bool,
    pub fullscreen: bool,
    pub activated: bool,
    /// Number of close requests sent to the client
    pub close_requests: u32,
}

impl ToplevelProps {
    pub fn new(app_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    fn accepts_size(&self, size: Size<i32, Logical>) -> bool {
        let min_ok = (self.min_size.w <= 0 || size.w >= self.min_size.w)
            && (self.min_size.h <= 0 || size.h >= self.min_size.h);
        let max_ok = (self.max_size.w <= 0 || size.w <= self.max_size.w)
            && (self.max_size.h <= 0 || size.h <= self.max_size.h);
        min_ok && max_ok
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShellSurface {
    XdgToplevel(ToplevelProps),
    XWayland(ToplevelProps),
    XdgPopup { parent: SurfaceId },
    Layer { namespace: String },
    InputPopup { parent: SurfaceId },
    LockScreen { output: OutputId },
    /// Placeholder shown before the real client has connected
    Undetermined {
        app_id: String,
        sandbox_engine: String,
    },
}

impl ShellSurface {
    pub fn surface_type(&self) -> SurfaceType {
        match self {
            ShellSurface::XdgToplevel(_) => SurfaceType::XdgToplevel,
            ShellSurface::XWayland(_) => SurfaceType::XWayland,
            ShellSurface::XdgPopup { .. } => SurfaceType::XdgPopup,
            ShellSurface::Layer { .. } => SurfaceType::Layer,
            ShellSurface::InputPopup { .. } => SurfaceType::InputPopup,
            ShellSurface::LockScreen { .. } => SurfaceType::LockScreen,
            ShellSurface::Undetermined { .. } => SurfaceType::Undetermined,
        }
    }

    pub fn toplevel(&self) -> Option<&ToplevelProps> {
        match self {
            ShellSurface::XdgToplevel(props) | ShellSurface::XWayland(props) => Some(props),
            _ => None,
        }
    }

    pub fn toplevel_mut(&mut self) -> Option<&mut ToplevelProps> {
        match self {
            ShellSurface::XdgToplevel(props) | ShellSurface::XWayland(props) => Some(props),
            _ => None,
        }
    }

    /// The surface this one is stacked on
    pub fn parent(&self) -> Option<SurfaceId> {
        match self {
            ShellSurface::XdgToplevel(props) | ShellSurface::XWayland(props) => props.parent,
            ShellSurface::XdgPopup { parent } | ShellSurface::InputPopup { parent } => Some(*parent),
            _ => None,
        }
    }

    pub fn pid(&self) -> Option<i32> {
        self.toplevel().and_then(|props| props.pid)
    }

    pub fn app_id(&self) -> Option<&str> {
        match self {
            ShellSurface::XdgToplevel(props) | ShellSurface::XWayland(props) => {
                Some(props.app_id.as_str())
            }
            ShellSurface::Undetermined { app_id, .. } => Some(app_id.as_str()),
            _ => None,
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.toplevel().map(|props| props.title.as_str())
    }

    pub fn set_maximize(&mut self, on: bool) {
        if let Some(props) = self.toplevel_mut() {
            props.maximized = on;
        }
    }

    pub fn set_minimize(&mut self, on: bool) {
        if let Some(props) = self.toplevel_mut() {
            props.minimized = on;
        }
    }

    pub fn set_fullscreen(&mut self, on: bool) {
        if let Some(props) = self.toplevel_mut() {
            props.fullscreen = on;
        }
    }

    pub fn set_activate(&mut self, on: bool) {
        if let Some(props) = self.toplevel_mut() {
            props.activated = on;
        }
    }

    pub fn is_activated(&self) -> bool {
        self.toplevel().is_some_and(|props| props.activated)
    }

    /// Ask the client to close. Returns false for roles without a close request
    pub fn close(&mut self) -> bool {
        match self.toplevel_mut() {
            Some(props) => {
                props.close_requests += 1;
                true
            }
            None => false,
        }
    }

    /// Whether the client would accept `size`
    pub fn resize(&self, size: Size<i32, Logical>) -> bool {
        if size.w <= 0 || size.h <= 0 {
            return false;
        }
        match self.toplevel() {
            Some(props) => props.accepts_size(size),
            None => true,
        }
    }
}
