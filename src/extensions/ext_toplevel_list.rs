//! `ext_foreign_toplevel_list_v1`: the read-only standard toplevel list

use smithay::reexports::wayland_protocols::ext::foreign_toplevel_list::v1::server::{
    ext_foreign_toplevel_handle_v1::{self, ExtForeignToplevelHandleV1},
    ext_foreign_toplevel_list_v1::{self, ExtForeignToplevelListV1},
};
use smithay::reexports::wayland_server::{
    backend::{ClientId, GlobalId},
    Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource,
};
use tracing::debug;

use crate::protocols::ResourceTable;
use crate::surface::SurfaceId;

#[derive(Debug)]
struct ListedToplevel {
    surface: SurfaceId,
    identifier: String,
    title: String,
    app_id: String,
}

#[derive(Debug)]
struct ListData {
    stopped: bool,
}

#[derive(Debug)]
pub struct ExtToplevelListState {
    global: GlobalId,
    lists: ResourceTable<ExtForeignToplevelListV1, ListData>,
    handles: ResourceTable<ExtForeignToplevelHandleV1, SurfaceId>,
    toplevels: Vec<ListedToplevel>,
    next_identifier: u64,
}

pub trait ExtToplevelListHandler {
    fn ext_toplevel_list_state(&mut self) -> &mut ExtToplevelListState;
}

impl ExtToplevelListState {
    pub fn new<D>(dh: &DisplayHandle) -> Self
    where
        D: GlobalDispatch<ExtForeignToplevelListV1, ()>
            + Dispatch<ExtForeignToplevelListV1, ()>
            + Dispatch<ExtForeignToplevelHandleV1, ()>
            + ExtToplevelListHandler
            + 'static,
    {
        Self {
            global: dh.create_global::<D, ExtForeignToplevelListV1, ()>(1, ()),
            lists: ResourceTable::new(),
            handles: ResourceTable::new(),
            toplevels: Vec::new(),
            next_identifier: 0,
        }
    }

    pub fn global(&self) -> GlobalId {
        self.global.clone()
    }

    pub fn identifier(&self, surface: SurfaceId) -> Option<&str> {
        self.toplevels
            .iter()
            .find(|t| t.surface == surface)
            .map(|t| t.identifier.as_str())
    }

    pub fn add_toplevel<D>(&mut self, dh: &DisplayHandle, surface: SurfaceId, title: &str, app_id: &str)
    where
        D: Dispatch<ExtForeignToplevelHandleV1, ()> + 'static,
    {
        if self.toplevels.iter().any(|t| t.surface == surface) {
            return;
        }
        self.next_identifier += 1;
        self.toplevels.push(ListedToplevel {
            surface,
            identifier: format!("treeland-{}", self.next_identifier),
            title: title.to_string(),
            app_id: app_id.to_string(),
        });
        let lists: Vec<ExtForeignToplevelListV1> = self
            .lists
            .iter()
            .filter(|(_, data)| !data.stopped)
            .map(|(list, _)| list.clone())
            .collect();
        for list in lists {
            self.announce::<D>(dh, &list, surface);
        }
    }

    fn announce<D>(&mut self, dh: &DisplayHandle, list: &ExtForeignToplevelListV1, surface: SurfaceId)
    where
        D: Dispatch<ExtForeignToplevelHandleV1, ()> + 'static,
    {
        let Some(toplevel) = self.toplevels.iter().find(|t| t.surface == surface) else {
            return;
        };
        let Some(client) = list.client() else {
            return;
        };
        let Ok(handle) =
            client.create_resource::<ExtForeignToplevelHandleV1, (), D>(dh, list.version(), ())
        else {
            return;
        };
        list.toplevel(&handle);
        handle.identifier(toplevel.identifier.clone());
        if !toplevel.title.is_empty() {
            handle.title(toplevel.title.clone());
        }
        if !toplevel.app_id.is_empty() {
            handle.app_id(toplevel.app_id.clone());
        }
        handle.done();
        self.handles.insert(handle, surface);
    }

    /// Send changed title or app id to every handle of `surface`
    pub fn update_toplevel(&mut self, surface: SurfaceId, title: &str, app_id: &str) {
        let Some(toplevel) = self.toplevels.iter_mut().find(|t| t.surface == surface) else {
            return;
        };
        let title_changed = toplevel.title != title;
        let app_id_changed = toplevel.app_id != app_id;
        if !title_changed && !app_id_changed {
            return;
        }
        toplevel.title = title.to_string();
        toplevel.app_id = app_id.to_string();
        for (handle, _) in self.handles.iter().filter(|(_, s)| **s == surface) {
            if title_changed {
                handle.title(title.to_string());
            }
            if app_id_changed {
                handle.app_id(app_id.to_string());
            }
            handle.done();
        }
    }

    pub fn remove_toplevel(&mut self, surface: SurfaceId) {
        let before = self.toplevels.len();
        self.toplevels.retain(|t| t.surface != surface);
        if before == self.toplevels.len() {
            return;
        }
        for (handle, _) in self.handles.iter().filter(|(_, s)| **s == surface) {
            handle.closed();
        }
    }
}

impl<D> GlobalDispatch<ExtForeignToplevelListV1, (), D> for ExtToplevelListState
where
    D: GlobalDispatch<ExtForeignToplevelListV1, ()>
        + Dispatch<ExtForeignToplevelListV1, ()>
        + Dispatch<ExtForeignToplevelHandleV1, ()>
        + ExtToplevelListHandler
        + 'static,
{
    fn bind(
        state: &mut D,
        dh: &DisplayHandle,
        _client: &Client,
        resource: New<ExtForeignToplevelListV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, D>,
    ) {
        let list = data_init.init(resource, ());
        let list_state = state.ext_toplevel_list_state();
        list_state
            .lists
            .insert(list.clone(), ListData { stopped: false });
        let surfaces: Vec<SurfaceId> = list_state.toplevels.iter().map(|t| t.surface).collect();
        for surface in surfaces {
            list_state.announce::<D>(dh, &list, surface);
        }
    }
}

impl<D> Dispatch<ExtForeignToplevelListV1, (), D> for ExtToplevelListState
where
    D: Dispatch<ExtForeignToplevelListV1, ()> + ExtToplevelListHandler + 'static,
{
    fn request(
        state: &mut D,
        _client: &Client,
        resource: &ExtForeignToplevelListV1,
        request: ext_foreign_toplevel_list_v1::Request,
        _data: &(),
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            ext_foreign_toplevel_list_v1::Request::Stop => {
                let list = state.ext_toplevel_list_state();
                if let Some(data) = list.lists.get_mut(resource) {
                    if !data.stopped {
                        debug!("{} stopped", resource.id());
                        data.stopped = true;
                        resource.finished();
                    }
                }
            }
            ext_foreign_toplevel_list_v1::Request::Destroy => {}
            _ => unreachable!(),
        }
    }

    fn destroyed(state: &mut D, _client: ClientId, resource: &ExtForeignToplevelListV1, _data: &()) {
        state.ext_toplevel_list_state().lists.remove(resource);
    }
}

impl<D> Dispatch<ExtForeignToplevelHandleV1, (), D> for ExtToplevelListState
where
    D: Dispatch<ExtForeignToplevelHandleV1, ()> + ExtToplevelListHandler + 'static,
{
    fn request(
        _state: &mut D,
        _client: &Client,
        _resource: &ExtForeignToplevelHandleV1,
        request: ext_foreign_toplevel_handle_v1::Request,
        _data: &(),
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            ext_foreign_toplevel_handle_v1::Request::Destroy => {}
            _ => unreachable!(),
        }
    }

    fn destroyed(state: &mut D, _client: ClientId, resource: &ExtForeignToplevelHandleV1, _data: &()) {
        state.ext_toplevel_list_state().handles.remove(resource);
    }
}

#[macro_export]
macro_rules! delegate_ext_toplevel_list {
    ($ty: ty) => {
        smithay::reexports::wayland_server::delegate_global_dispatch!($ty: [
            smithay::reexports::wayland_protocols::ext::foreign_toplevel_list::v1::server::ext_foreign_toplevel_list_v1::ExtForeignToplevelListV1: ()
        ] => $crate::extensions::ext_toplevel_list::ExtToplevelListState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            smithay::reexports::wayland_protocols::ext::foreign_toplevel_list::v1::server::ext_foreign_toplevel_list_v1::ExtForeignToplevelListV1: ()
        ] => $crate::extensions::ext_toplevel_list::ExtToplevelListState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            smithay::reexports::wayland_protocols::ext::foreign_toplevel_list::v1::server::ext_foreign_toplevel_handle_v1::ExtForeignToplevelHandleV1: ()
        ] => $crate::extensions::ext_toplevel_list::ExtToplevelListState);
    };
}
