//! Virtual desktops
//!
//! A workspace is an ordered list of surfaces. Exactly one workspace is
//! current; surfaces of every other workspace are hidden through their
//! workspace suppression flag, except those shown on all workspaces.

mod manager;

pub use manager::WorkspaceManager;

use crate::surface::SurfaceId;

/// Unique identifier for workspaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkspaceId(u8);

impl WorkspaceId {
    pub fn new(id: u8) -> Self {
        WorkspaceId(id)
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    /// The id as stored on a surface wrapper
    pub fn as_surface_workspace(&self) -> i32 {
        i32::from(self.0)
    }

    /// Get the display name for this workspace: ID 0 is "1"
    pub fn display_name(&self) -> String {
        (u32::from(self.0) + 1).to_string()
    }
}

impl std::fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    /// Surfaces in stacking order
    pub surfaces: Vec<SurfaceId>,
    /// Last surface activated on this workspace
    pub focused_surface: Option<SurfaceId>,
}

impl Workspace {
    pub fn new(id: u8) -> Self {
        let id = WorkspaceId::new(id);
        Self {
            id,
            name: id.display_name(),
            surfaces: Vec::new(),
            focused_surface: None,
        }
    }

    /// Add a surface on top of the stack
    pub fn add_surface(&mut self, surface: SurfaceId) {
        if !self.surfaces.contains(&surface) {
            self.surfaces.push(surface);
        }
    }

    /// Remove a surface, returning whether it was here
    pub fn remove_surface(&mut self, surface: SurfaceId) -> bool {
        let before = self.surfaces.len();
        self.surfaces.retain(|s| *s != surface);
        if self.focused_surface == Some(surface) {
            self.focused_surface = self.surfaces.last().copied();
        }
        before != self.surfaces.len()
    }

    pub fn contains(&self, surface: SurfaceId) -> bool {
        self.surfaces.contains(&surface)
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }
}
