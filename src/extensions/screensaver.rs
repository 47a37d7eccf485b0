//! `treeland_screensaver`: applications keep the screen awake

use std::collections::HashMap;

use smithay::reexports::wayland_server::{
    backend::{ClientId, GlobalId, ObjectId},
    Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource,
};
use tracing::{debug, info};

use crate::protocols::screensaver::treeland_screensaver::{self, TreelandScreensaver};
use crate::protocols::ResourceTable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inhibitor {
    pub application: String,
    pub reason: String,
}

/// Active idle inhibitors, keyed by the resource that holds them
#[derive(Debug, Default)]
pub struct InhibitRegistry {
    inhibitors: HashMap<ObjectId, Inhibitor>,
}

impl InhibitRegistry {
    pub fn is_inhibited(&self) -> bool {
        !self.inhibitors.is_empty()
    }

    pub fn inhibitors(&self) -> impl Iterator<Item = &Inhibitor> {
        self.inhibitors.values()
    }

    pub fn len(&self) -> usize {
        self.inhibitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inhibitors.is_empty()
    }
}

#[derive(Debug)]
pub struct ScreensaverState {
    global: GlobalId,
    resources: ResourceTable<TreelandScreensaver>,
    registry: InhibitRegistry,
}

pub trait ScreensaverHandler {
    fn screensaver_state(&mut self) -> &mut ScreensaverState;

    /// The screen went from idle-able to inhibited or back
    fn idle_inhibit_changed(&mut self, inhibited: bool);
}

impl ScreensaverState {
    pub fn new<D>(dh: &DisplayHandle) -> Self
    where
        D: GlobalDispatch<TreelandScreensaver, ()>
            + Dispatch<TreelandScreensaver, ()>
            + ScreensaverHandler
            + 'static,
    {
        Self {
            global: dh.create_global::<D, TreelandScreensaver, ()>(1, ()),
            resources: ResourceTable::new(),
            registry: InhibitRegistry::default(),
        }
    }

    pub fn global(&self) -> GlobalId {
        self.global.clone()
    }

    pub fn inhibit_registry(&self) -> &InhibitRegistry {
        &self.registry
    }

    pub fn is_inhibited(&self) -> bool {
        self.registry.is_inhibited()
    }
}

impl<D> GlobalDispatch<TreelandScreensaver, (), D> for ScreensaverState
where
    D: GlobalDispatch<TreelandScreensaver, ()>
        + Dispatch<TreelandScreensaver, ()>
        + ScreensaverHandler
        + 'static,
{
    fn bind(
        state: &mut D,
        _dh: &DisplayHandle,
        _client: &Client,
        resource: New<TreelandScreensaver>,
        _global_data: &(),
        data_init: &mut DataInit<'_, D>,
    ) {
        let resource = data_init.init(resource, ());
        state.screensaver_state().resources.insert(resource, ());
    }
}

impl<D> Dispatch<TreelandScreensaver, (), D> for ScreensaverState
where
    D: Dispatch<TreelandScreensaver, ()> + ScreensaverHandler + 'static,
{
    fn request(
        state: &mut D,
        _client: &Client,
        resource: &TreelandScreensaver,
        request: treeland_screensaver::Request,
        _data: &(),
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        let id = resource.id();
        let screensaver = state.screensaver_state();
        let was_inhibited = screensaver.is_inhibited();
        match request {
            treeland_screensaver::Request::Inhibit {
                application_name,
                reason_for_inhibit,
            } => {
                if screensaver.registry.inhibitors.contains_key(&id) {
                    resource.post_error(
                        treeland_screensaver::Error::AlreadyInhibited,
                        "Trying to inhibit with an existing inhibit active",
                    );
                    return;
                }
                info!(
                    application = %application_name,
                    reason = %reason_for_inhibit,
                    "Screensaver inhibited"
                );
                screensaver.registry.inhibitors.insert(
                    id,
                    Inhibitor {
                        application: application_name,
                        reason: reason_for_inhibit,
                    },
                );
            }
            treeland_screensaver::Request::Uninhibit => {
                if screensaver.registry.inhibitors.remove(&id).is_none() {
                    resource.post_error(
                        treeland_screensaver::Error::NotYetInhibited,
                        "Trying to uninhibit but no active inhibit existed",
                    );
                    return;
                }
            }
            treeland_screensaver::Request::Destroy => return,
            _ => unreachable!(),
        }
        let inhibited = state.screensaver_state().is_inhibited();
        if inhibited != was_inhibited {
            state.idle_inhibit_changed(inhibited);
        }
    }

    fn destroyed(state: &mut D, _client: ClientId, resource: &TreelandScreensaver, _data: &()) {
        let screensaver = state.screensaver_state();
        screensaver.resources.remove(resource);
        if screensaver.registry.inhibitors.remove(&resource.id()).is_some() {
            debug!("Inhibitor of {} went away", resource.id());
            if !screensaver.is_inhibited() {
                state.idle_inhibit_changed(false);
            }
        }
    }
}

#[macro_export]
macro_rules! delegate_screensaver {
    ($ty: ty) => {
        smithay::reexports::wayland_server::delegate_global_dispatch!($ty: [
            $crate::protocols::screensaver::treeland_screensaver::TreelandScreensaver: ()
        ] => $crate::extensions::screensaver::ScreensaverState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::screensaver::treeland_screensaver::TreelandScreensaver: ()
        ] => $crate::extensions::screensaver::ScreensaverState);
    };
}
