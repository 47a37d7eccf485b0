//! Registry owning every surface wrapper in the compositor

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use super::{ShellSurface, SurfaceId, SurfaceSignal, SurfaceType, SurfaceWrapper};
use crate::output::OutputId;

/// Lifecycle notifications mirrored out to the protocol layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    Added(SurfaceId),
    /// A placeholder became the real window
    Converted(SurfaceId),
    Removed(SurfaceId),
}

/// Central registry for all surfaces, kept in stacking order
#[derive(Debug, Default)]
pub struct SurfaceRegistry {
    surfaces: HashMap<SurfaceId, SurfaceWrapper>,
    order: Vec<SurfaceId>,
    active: Option<SurfaceId>,
    events: Vec<SurfaceEvent>,
}

impl SurfaceRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wrapper and link it under its parent
    ///
    /// A wrapper of the same id still playing its close animation is
    /// dropped first.
    pub fn insert(&mut self, mut wrapper: SurfaceWrapper) -> SurfaceId {
        let id = wrapper.id();
        if self.surfaces.contains_key(&id) {
            trace!("{id} remapped before its close animation ended");
            self.drop_wrapper(id);
        }
        if let Some(parent) = wrapper.parent() {
            match self.surfaces.get_mut(&parent) {
                Some(parent) => parent.add_sub_surface(id),
                None => {
                    warn!("{id} names unknown parent {parent}");
                    wrapper.set_parent(None);
                }
            }
        }
        self.surfaces.insert(id, wrapper);
        self.order.push(id);
        self.events.push(SurfaceEvent::Added(id));
        id
    }

    /// Tear a wrapper down
    ///
    /// The wrapper leaves its parent and children at once. It stays
    /// reachable through [`Self::get`] until its close animation ends.
    pub fn remove(&mut self, id: SurfaceId) -> bool {
        let Some(wrapper) = self.surfaces.get_mut(&id) else {
            return false;
        };
        if wrapper.is_about_to_remove() {
            return false;
        }
        let parent = wrapper.parent();
        let children = wrapper.sub_surfaces().to_vec();
        // Starts the close animation when animations are on
        wrapper.set_mapped(false);
        let drop_now = wrapper.mark_wrapper_to_removed();

        if let Some(parent) = parent.and_then(|p| self.surfaces.get_mut(&p)) {
            parent.remove_sub_surface(id);
        }
        for child in children {
            if let Some(child) = self.surfaces.get_mut(&child) {
                child.set_parent(None);
            }
        }
        if self.active == Some(id) {
            self.active = None;
        }
        self.events.push(SurfaceEvent::Removed(id));
        if drop_now {
            self.drop_wrapper(id);
        }
        debug!("Removed {id}");
        true
    }

    /// Advance every wrapper's animations to `now`
    ///
    /// Wrappers whose close animation ended are dropped. Returns their ids.
    pub fn advance_animations(&mut self, now: Instant, duration: Duration) -> Vec<SurfaceId> {
        let finished: Vec<SurfaceId> = self
            .surfaces
            .iter_mut()
            .filter_map(|(id, wrapper)| wrapper.advance_animations(now, duration).then_some(*id))
            .collect();
        for id in &finished {
            trace!("Dropping {id} after its close animation");
            self.drop_wrapper(*id);
        }
        finished
    }

    fn drop_wrapper(&mut self, id: SurfaceId) {
        self.surfaces.remove(&id);
        self.order.retain(|s| *s != id);
    }

    /// Replace a placeholder's shell surface, keeping its id
    pub fn convert(&mut self, id: SurfaceId, shell: ShellSurface) -> bool {
        let Some(wrapper) = self.surfaces.get_mut(&id) else {
            return false;
        };
        if wrapper.surface_type() != SurfaceType::Undetermined {
            warn!("{id} is not a placeholder");
            return false;
        }
        wrapper.convert(shell);
        if let Some(parent) = wrapper.parent() {
            if let Some(parent) = self.surfaces.get_mut(&parent) {
                parent.add_sub_surface(id);
            }
        }
        self.events.push(SurfaceEvent::Converted(id));
        true
    }

    /// Get a wrapper by ID
    pub fn get(&self, id: SurfaceId) -> Option<&SurfaceWrapper> {
        self.surfaces.get(&id)
    }

    /// Get a mutable wrapper by ID
    pub fn get_mut(&mut self, id: SurfaceId) -> Option<&mut SurfaceWrapper> {
        self.surfaces.get_mut(&id)
    }

    pub fn contains(&self, id: SurfaceId) -> bool {
        self.surfaces.contains_key(&id)
    }

    /// Live wrappers in stacking order
    pub fn iter(&self) -> impl Iterator<Item = &SurfaceWrapper> {
        self.order
            .iter()
            .filter_map(|id| self.surfaces.get(id))
            .filter(|wrapper| !wrapper.is_about_to_remove())
    }

    /// Ids of live wrappers in stacking order
    pub fn ids(&self) -> Vec<SurfaceId> {
        self.iter().map(|wrapper| wrapper.id()).collect()
    }

    /// Live wrappers owned by an output
    pub fn on_output(&self, output: OutputId) -> Vec<SurfaceId> {
        self.iter()
            .filter(|wrapper| wrapper.output() == Some(output))
            .map(|wrapper| wrapper.id())
            .collect()
    }

    /// Placeholder waiting for a window of `app_id`
    pub fn find_placeholder(&self, app_id: &str) -> Option<SurfaceId> {
        self.iter()
            .find(|wrapper| {
                wrapper.surface_type() == SurfaceType::Undetermined
                    && wrapper.shell().app_id() == Some(app_id)
            })
            .map(|wrapper| wrapper.id())
    }

    /// Currently activated surface
    pub fn active(&self) -> Option<SurfaceId> {
        self.active
    }

    /// Activate a surface and the parents that can take it
    pub fn activate(&mut self, id: SurfaceId) -> bool {
        let can_activate = self
            .surfaces
            .get(&id)
            .is_some_and(|wrapper| wrapper.has_active_capability() && !wrapper.is_about_to_remove());
        if !can_activate {
            debug!("Ignoring activation of {id}");
            return false;
        }
        if let Some(previous) = self.active.filter(|previous| *previous != id) {
            self.set_activate_chain(previous, false);
        }
        self.set_activate_chain(id, true);
        self.active = Some(id);
        true
    }

    /// Drop activation from the active surface
    pub fn deactivate(&mut self) {
        if let Some(previous) = self.active.take() {
            self.set_activate_chain(previous, false);
        }
    }

    fn set_activate_chain(&mut self, id: SurfaceId, activate: bool) {
        let mut next = self.surfaces.get_mut(&id).and_then(|wrapper| {
            wrapper.set_activate(activate);
            wrapper.parent()
        });
        while let Some(parent_id) = next {
            let Some(parent) = self.surfaces.get_mut(&parent_id) else {
                break;
            };
            if !parent.has_active_capability() {
                break;
            }
            parent.set_activate(activate);
            next = parent.parent();
        }
    }

    /// Drain lifecycle events
    pub fn take_events(&mut self) -> Vec<SurfaceEvent> {
        std::mem::take(&mut self.events)
    }

    /// Drain every wrapper's signals, in stacking order
    pub fn take_signals(&mut self) -> Vec<(SurfaceId, SurfaceSignal)> {
        let mut signals = Vec::new();
        for id in &self.order {
            if let Some(wrapper) = self.surfaces.get_mut(id) {
                signals.extend(wrapper.take_signals().into_iter().map(|s| (*id, s)));
            }
        }
        signals
    }

    /// Get the count of wrappers, including those still animating out
    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }
}
