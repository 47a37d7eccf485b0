//! `treeland_app_id_resolver_manager_v1`: ask a trusted client which
//! application a process belongs to
//!
//! The compositor hands a pidfd to the single registered resolver and gets a
//! [`oneshot::Receiver`] back. Every request is answered exactly once; when
//! the resolver disappears the outstanding ones resolve to an empty app id.

use std::collections::HashMap;
use std::os::fd::{AsFd, OwnedFd};

use smithay::reexports::wayland_server::{
    backend::{ClientId, GlobalId},
    Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource,
};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::protocols::app_id_resolver::{
    treeland_app_id_resolver_manager_v1::{self, TreelandAppIdResolverManagerV1},
    treeland_app_id_resolver_v1::{self, TreelandAppIdResolverV1},
};
use crate::protocols::ResourceTable;

/// Answer to one identify request; empty when resolution failed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAppId {
    pub app_id: String,
    pub sandbox_engine_name: String,
}

#[derive(Debug)]
pub struct AppIdResolverState {
    global: GlobalId,
    managers: ResourceTable<TreelandAppIdResolverManagerV1>,
    resolver: Option<TreelandAppIdResolverV1>,
    next_request_id: u32,
    pending: HashMap<u32, oneshot::Sender<ResolvedAppId>>,
}

pub trait AppIdResolverHandler {
    fn app_id_resolver_state(&mut self) -> &mut AppIdResolverState;
}

impl AppIdResolverState {
    pub fn new<D>(dh: &DisplayHandle) -> Self
    where
        D: GlobalDispatch<TreelandAppIdResolverManagerV1, ()>
            + Dispatch<TreelandAppIdResolverManagerV1, ()>
            + Dispatch<TreelandAppIdResolverV1, ()>
            + AppIdResolverHandler
            + 'static,
    {
        Self {
            global: dh.create_global::<D, TreelandAppIdResolverManagerV1, ()>(1, ()),
            managers: ResourceTable::new(),
            resolver: None,
            next_request_id: 1,
            pending: HashMap::new(),
        }
    }

    pub fn global(&self) -> GlobalId {
        self.global.clone()
    }

    pub fn has_resolver(&self) -> bool {
        self.resolver.is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Ask the resolver to identify the process behind `pidfd`
    ///
    /// Returns `None` when no resolver is registered; the fd is closed.
    pub fn resolve_pidfd(&mut self, pidfd: OwnedFd) -> Option<oneshot::Receiver<ResolvedAppId>> {
        let resolver = self.resolver.as_ref()?;
        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1).max(1);

        let (sender, receiver) = oneshot::channel();
        resolver.identify_request(request_id, pidfd.as_fd());
        self.pending.insert(request_id, sender);
        debug!(request_id, "Sent identify request");
        Some(receiver)
    }

    fn fail_pending(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        if !pending.is_empty() {
            info!("Failing {} pending app id requests", pending.len());
        }
        for (_, sender) in pending {
            // The waiting side may have given up already
            let _ = sender.send(ResolvedAppId::default());
        }
    }
}

impl<D> GlobalDispatch<TreelandAppIdResolverManagerV1, (), D> for AppIdResolverState
where
    D: GlobalDispatch<TreelandAppIdResolverManagerV1, ()>
        + Dispatch<TreelandAppIdResolverManagerV1, ()>
        + Dispatch<TreelandAppIdResolverV1, ()>
        + AppIdResolverHandler
        + 'static,
{
    fn bind(
        state: &mut D,
        _dh: &DisplayHandle,
        _client: &Client,
        resource: New<TreelandAppIdResolverManagerV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, D>,
    ) {
        let manager = data_init.init(resource, ());
        state.app_id_resolver_state().managers.insert(manager, ());
    }
}

impl<D> Dispatch<TreelandAppIdResolverManagerV1, (), D> for AppIdResolverState
where
    D: Dispatch<TreelandAppIdResolverManagerV1, ()>
        + Dispatch<TreelandAppIdResolverV1, ()>
        + AppIdResolverHandler
        + 'static,
{
    fn request(
        state: &mut D,
        client: &Client,
        resource: &TreelandAppIdResolverManagerV1,
        request: treeland_app_id_resolver_manager_v1::Request,
        _data: &(),
        _dh: &DisplayHandle,
        data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            treeland_app_id_resolver_manager_v1::Request::GetResolver { id } => {
                let resolver = data_init.init(id, ());
                let resolvers = state.app_id_resolver_state();
                if resolvers.resolver.is_some() {
                    resource.post_error(
                        treeland_app_id_resolver_manager_v1::Error::ResolverExists,
                        "resolver already exists",
                    );
                    return;
                }
                info!("App id resolver registered by {:?}", client.id());
                resolvers.resolver = Some(resolver);
            }
            treeland_app_id_resolver_manager_v1::Request::Destroy => {}
            _ => unreachable!(),
        }
    }

    fn destroyed(
        state: &mut D,
        _client: ClientId,
        resource: &TreelandAppIdResolverManagerV1,
        _data: &(),
    ) {
        state.app_id_resolver_state().managers.remove(resource);
    }
}

impl<D> Dispatch<TreelandAppIdResolverV1, (), D> for AppIdResolverState
where
    D: Dispatch<TreelandAppIdResolverV1, ()> + AppIdResolverHandler + 'static,
{
    fn request(
        state: &mut D,
        _client: &Client,
        _resource: &TreelandAppIdResolverV1,
        request: treeland_app_id_resolver_v1::Request,
        _data: &(),
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            treeland_app_id_resolver_v1::Request::Respond {
                request_id,
                app_id,
                sandbox_engine_name,
            } => match state.app_id_resolver_state().pending.remove(&request_id) {
                Some(sender) => {
                    let _ = sender.send(ResolvedAppId {
                        app_id,
                        sandbox_engine_name,
                    });
                }
                None => warn!(request_id, "Response to unknown app id request"),
            },
            treeland_app_id_resolver_v1::Request::Destroy => {}
            _ => unreachable!(),
        }
    }

    fn destroyed(state: &mut D, _client: ClientId, resource: &TreelandAppIdResolverV1, _data: &()) {
        let resolvers = state.app_id_resolver_state();
        if resolvers.resolver.as_ref() == Some(resource) {
            resolvers.resolver = None;
            resolvers.fail_pending();
        }
    }
}

#[macro_export]
macro_rules! delegate_app_id_resolver {
    ($ty: ty) => {
        smithay::reexports::wayland_server::delegate_global_dispatch!($ty: [
            $crate::protocols::app_id_resolver::treeland_app_id_resolver_manager_v1::TreelandAppIdResolverManagerV1: ()
        ] => $crate::extensions::app_id_resolver::AppIdResolverState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::app_id_resolver::treeland_app_id_resolver_manager_v1::TreelandAppIdResolverManagerV1: ()
        ] => $crate::extensions::app_id_resolver::AppIdResolverState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::app_id_resolver::treeland_app_id_resolver_v1::TreelandAppIdResolverV1: ()
        ] => $crate::extensions::app_id_resolver::AppIdResolverState);
    };
}
