//! Bookkeeping of the resources a global or child object kind has handed out

use std::collections::HashMap;

use smithay::reexports::wayland_server::{backend::ObjectId, Resource};

/// Map from live resources to per-resource data
#[derive(Debug)]
pub struct ResourceTable<I: Resource, T = ()> {
    entries: HashMap<ObjectId, (I, T)>,
}

impl<I: Resource, T> Default for ResourceTable<I, T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<I: Resource, T> ResourceTable<I, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a resource, replacing any stale entry for the same object
    pub fn insert(&mut self, resource: I, data: T) {
        self.entries.insert(resource.id(), (resource, data));
    }

    /// Remove a resource and hand back its data
    pub fn remove(&mut self, resource: &I) -> Option<(I, T)> {
        self.entries.remove(&resource.id())
    }

    pub fn get(&self, resource: &I) -> Option<&T> {
        self.get_id(&resource.id())
    }

    pub fn get_id(&self, id: &ObjectId) -> Option<&T> {
        self.entries.get(id).map(|(_, data)| data)
    }

    pub fn get_mut(&mut self, resource: &I) -> Option<&mut T> {
        self.get_id_mut(&resource.id())
    }

    pub fn get_id_mut(&mut self, id: &ObjectId) -> Option<&mut T> {
        self.entries.get_mut(id).map(|(_, data)| data)
    }

    /// Resource and data stored under `id`
    pub fn entry(&self, id: &ObjectId) -> Option<(&I, &T)> {
        self.entries.get(id).map(|(resource, data)| (resource, data))
    }

    pub fn entry_mut(&mut self, id: &ObjectId) -> Option<(&I, &mut T)> {
        self.entries
            .get_mut(id)
            .map(|(resource, data)| (&*resource, data))
    }

    /// The resource stored under `id`
    pub fn resource(&self, id: &ObjectId) -> Option<&I> {
        self.entries.get(id).map(|(resource, _)| resource)
    }

    pub fn contains(&self, resource: &I) -> bool {
        self.entries.contains_key(&resource.id())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&I, &T)> {
        self.entries.values().map(|(resource, data)| (resource, data))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&I, &mut T)> {
        self.entries
            .values_mut()
            .map(|(resource, data)| (&*resource, data))
    }

    /// Clones of every resource
    pub fn resources(&self) -> Vec<I> {
        self.entries.values().map(|(resource, _)| resource.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
