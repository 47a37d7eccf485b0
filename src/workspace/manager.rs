//! Workspace manager that owns all workspaces

use tracing::debug;

use super::{Workspace, WorkspaceId};
use crate::surface::SurfaceId;

/// Manages all workspaces in the compositor
#[derive(Debug)]
pub struct WorkspaceManager {
    workspaces: Vec<Workspace>,
    current: WorkspaceId,
}

impl WorkspaceManager {
    /// Create a manager with `count` workspaces; at least one always exists
    pub fn new(count: usize) -> Self {
        let count = count.clamp(1, usize::from(u8::MAX));
        let workspaces = (0..count as u8).map(Workspace::new).collect();
        Self {
            workspaces,
            current: WorkspaceId::new(0),
        }
    }

    /// Get a workspace by ID
    pub fn get(&self, id: WorkspaceId) -> Option<&Workspace> {
        self.workspaces.iter().find(|ws| ws.id == id)
    }

    /// Get a mutable workspace by ID
    pub fn get_mut(&mut self, id: WorkspaceId) -> Option<&mut Workspace> {
        self.workspaces.iter_mut().find(|ws| ws.id == id)
    }

    /// Get all workspaces
    pub fn workspaces(&self) -> &[Workspace] {
        &self.workspaces
    }

    pub fn count(&self) -> usize {
        self.workspaces.len()
    }

    /// The workspace being shown
    pub fn current(&self) -> WorkspaceId {
        self.current
    }

    /// Switch to a workspace; returns the one switched away from
    pub fn switch_to(&mut self, id: WorkspaceId) -> Option<WorkspaceId> {
        if self.get(id).is_none() {
            debug!("No workspace {id}");
            return None;
        }
        if self.current == id {
            return None;
        }
        let previous = std::mem::replace(&mut self.current, id);
        debug!("Switched workspace {previous} -> {id}");
        Some(previous)
    }

    /// Switch to the next workspace, wrapping around
    pub fn switch_next(&mut self) -> Option<WorkspaceId> {
        let next = (usize::from(self.current.get()) + 1) % self.count();
        self.switch_to(WorkspaceId::new(next as u8))
    }

    /// Switch to the previous workspace, wrapping around
    pub fn switch_prev(&mut self) -> Option<WorkspaceId> {
        let count = self.count();
        let prev = (usize::from(self.current.get()) + count - 1) % count;
        self.switch_to(WorkspaceId::new(prev as u8))
    }

    /// Add a surface to a workspace
    pub fn add_surface(&mut self, surface: SurfaceId, workspace: WorkspaceId) -> bool {
        match self.get_mut(workspace) {
            Some(ws) => {
                ws.add_surface(surface);
                true
            }
            None => false,
        }
    }

    /// Remove a surface from whichever workspace holds it
    pub fn remove_surface(&mut self, surface: SurfaceId) -> Option<WorkspaceId> {
        self.workspaces
            .iter_mut()
            .find(|ws| ws.contains(surface))
            .map(|ws| {
                ws.remove_surface(surface);
                ws.id
            })
    }

    /// Move a surface between workspaces
    pub fn move_surface(&mut self, surface: SurfaceId, to: WorkspaceId) -> bool {
        if self.get(to).is_none() {
            return false;
        }
        self.remove_surface(surface);
        self.add_surface(surface, to)
    }

    /// Find which workspace a surface is on
    pub fn find_surface_workspace(&self, surface: SurfaceId) -> Option<WorkspaceId> {
        self.workspaces
            .iter()
            .find(|ws| ws.contains(surface))
            .map(|ws| ws.id)
    }

    /// Set focus on a workspace
    pub fn set_focus(&mut self, workspace: WorkspaceId, surface: Option<SurfaceId>) {
        if let Some(ws) = self.get_mut(workspace) {
            ws.focused_surface = surface;
        }
    }

    /// Surfaces of every workspace, in workspace then stacking order
    pub fn all_surfaces(&self) -> Vec<SurfaceId> {
        self.workspaces
            .iter()
            .flat_map(|ws| ws.surfaces.iter().copied())
            .collect()
    }
}

impl Default for WorkspaceManager {
    fn default() -> Self {
        Self::new(6)
    }
}
