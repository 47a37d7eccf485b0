//! `treeland_foreign_toplevel_manager_v1`: taskbar view of every toplevel,
//! plus the dock preview context
//!
//! The compositor feeds snapshots of each toplevel through
//! [`ForeignToplevelState::add_toplevel`], [`ForeignToplevelState::update_toplevel`]
//! and [`ForeignToplevelState::remove_toplevel`]. Only changed fields are
//! sent; `done` is coalesced per handle until [`ForeignToplevelState::flush_done`].

use std::collections::{BTreeSet, HashMap};

use bitflags::bitflags;
use smithay::output::Output as WlOutputHandle;
use smithay::reexports::wayland_server::{
    backend::{ClientId, GlobalId, ObjectId},
    Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource,
};
use smithay::utils::{Logical, Point, Rectangle};
use tracing::{debug, warn};

use crate::output::OutputId;
use crate::protocols::foreign_toplevel::{
    treeland_dock_preview_context_v1::{self, TreelandDockPreviewContextV1},
    treeland_foreign_toplevel_handle_v1::{self, TreelandForeignToplevelHandleV1},
    treeland_foreign_toplevel_manager_v1::{self, TreelandForeignToplevelManagerV1},
};
use crate::protocols::ResourceTable;
use crate::surface::{surface_id, SurfaceId};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ToplevelStates: u32 {
        const MAXIMIZED = 1;
        const MINIMIZED = 2;
        const ACTIVATED = 4;
        const FULLSCREEN = 8;
    }
}

impl ToplevelStates {
    /// Wire array: maximized = 0, minimized = 1, activated = 2, fullscreen = 3
    pub fn to_wire(self) -> Vec<u32> {
        [
            (ToplevelStates::MAXIMIZED, 0),
            (ToplevelStates::MINIMIZED, 1),
            (ToplevelStates::ACTIVATED, 2),
            (ToplevelStates::FULLSCREEN, 3),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, value)| value)
        .collect()
    }

    fn to_array(self) -> Vec<u8> {
        self.to_wire()
            .into_iter()
            .flat_map(|value| value.to_ne_bytes())
            .collect()
    }
}

/// Toplevel identifiers packed into a wire array
pub fn decode_identifiers(array: &[u8]) -> Vec<u32> {
    array
        .chunks_exact(4)
        .map(|chunk| u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Published view of one toplevel
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToplevelInfo {
    pub title: String,
    pub app_id: String,
    pub pid: Option<i32>,
    pub outputs: BTreeSet<OutputId>,
    pub states: ToplevelStates,
    pub parent: Option<SurfaceId>,
}

/// Something a handle asked the compositor to do with its surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToplevelAction {
    SetMaximized(bool),
    SetMinimized(bool),
    Activate,
    Close,
    SetFullscreen(bool),
    /// Where the taskbar shows the surface, relative to `relative_to`
    SetRectangle {
        relative_to: SurfaceId,
        rectangle: Rectangle<i32, Logical>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockPreviewKind {
    Surfaces(Vec<SurfaceId>),
    Tooltip(String),
}

/// The preview the dock currently asks the shell to show
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockPreview {
    pub context: ObjectId,
    pub relative_surface: SurfaceId,
    pub kind: DockPreviewKind,
    pub position: Point<i32, Logical>,
    pub direction: u32,
}

#[derive(Debug)]
struct Toplevel {
    surface: SurfaceId,
    identifier: u32,
    info: ToplevelInfo,
}

#[derive(Debug)]
struct HandleData {
    surface: SurfaceId,
    manager: ObjectId,
    closed: bool,
}

#[derive(Debug)]
pub struct ForeignToplevelState {
    global: GlobalId,
    managers: ResourceTable<TreelandForeignToplevelManagerV1>,
    handles: ResourceTable<TreelandForeignToplevelHandleV1, HandleData>,
    previews: ResourceTable<TreelandDockPreviewContextV1, SurfaceId>,
    outputs: HashMap<OutputId, WlOutputHandle>,
    toplevels: Vec<Toplevel>,
    pending_done: Vec<ObjectId>,
    preview: Option<DockPreview>,
    next_identifier: u32,
}

pub trait ForeignToplevelHandler {
    fn foreign_toplevel_state(&mut self) -> &mut ForeignToplevelState;

    fn toplevel_action(&mut self, surface: SurfaceId, action: ToplevelAction);
}

impl ForeignToplevelState {
    pub fn new<D>(dh: &DisplayHandle) -> Self
    where
        D: GlobalDispatch<TreelandForeignToplevelManagerV1, ()>
            + Dispatch<TreelandForeignToplevelManagerV1, ()>
            + Dispatch<TreelandForeignToplevelHandleV1, ()>
            + Dispatch<TreelandDockPreviewContextV1, ()>
            + ForeignToplevelHandler
            + 'static,
    {
        Self {
            global: dh.create_global::<D, TreelandForeignToplevelManagerV1, ()>(1, ()),
            managers: ResourceTable::new(),
            handles: ResourceTable::new(),
            previews: ResourceTable::new(),
            outputs: HashMap::new(),
            toplevels: Vec::new(),
            pending_done: Vec::new(),
            preview: None,
            next_identifier: 1,
        }
    }

    pub fn global(&self) -> GlobalId {
        self.global.clone()
    }

    pub fn identifier(&self, surface: SurfaceId) -> Option<u32> {
        self.toplevel(surface).map(|t| t.identifier)
    }

    pub fn info(&self, surface: SurfaceId) -> Option<&ToplevelInfo> {
        self.toplevel(surface).map(|t| &t.info)
    }

    pub fn toplevel_count(&self) -> usize {
        self.toplevels.len()
    }

    pub fn manager_count(&self) -> usize {
        self.managers.len()
    }

    fn toplevel(&self, surface: SurfaceId) -> Option<&Toplevel> {
        self.toplevels.iter().find(|t| t.surface == surface)
    }

    /// The dock preview currently requested
    pub fn dock_preview(&self) -> Option<&DockPreview> {
        self.preview.as_ref()
    }

    /// Make an output known so handles can report entering it
    pub fn output_added(&mut self, id: OutputId, output: WlOutputHandle) {
        self.outputs.insert(id, output);
    }

    pub fn output_removed(&mut self, id: OutputId) {
        self.outputs.remove(&id);
    }

    fn send_output(&self, handle: &TreelandForeignToplevelHandleV1, output: OutputId, enter: bool) {
        let (Some(output), Some(client)) = (self.outputs.get(&output), handle.client()) else {
            return;
        };
        for wl_output in output.client_outputs(&client) {
            if enter {
                handle.output_enter(&wl_output);
            } else {
                handle.output_leave(&wl_output);
            }
        }
    }

    /// Publish a new toplevel to every manager
    pub fn add_toplevel<D>(&mut self, dh: &DisplayHandle, surface: SurfaceId, info: ToplevelInfo)
    where
        D: Dispatch<TreelandForeignToplevelHandleV1, ()> + 'static,
    {
        if self.toplevel(surface).is_some() {
            warn!("{surface} published to foreign toplevel twice");
            return;
        }
        let identifier = self.next_identifier;
        self.next_identifier = self.next_identifier.wrapping_add(1).max(1);
        self.toplevels.push(Toplevel {
            surface,
            identifier,
            info,
        });
        for manager in self.managers.resources() {
            if let Some(handle) = self.create_handle::<D>(dh, &manager, surface) {
                self.send_details(&handle);
            }
        }
    }

    fn create_handle<D>(
        &mut self,
        dh: &DisplayHandle,
        manager: &TreelandForeignToplevelManagerV1,
        surface: SurfaceId,
    ) -> Option<TreelandForeignToplevelHandleV1>
    where
        D: Dispatch<TreelandForeignToplevelHandleV1, ()> + 'static,
    {
        let client = manager.client()?;
        let handle = client
            .create_resource::<TreelandForeignToplevelHandleV1, (), D>(dh, manager.version(), ())
            .ok()?;
        manager.toplevel(&handle);
        self.handles.insert(
            handle.clone(),
            HandleData {
                surface,
                manager: manager.id(),
                closed: false,
            },
        );
        Some(handle)
    }

    fn send_details(&self, handle: &TreelandForeignToplevelHandleV1) {
        let Some(data) = self.handles.get(handle) else {
            return;
        };
        let Some(toplevel) = self.toplevel(data.surface) else {
            return;
        };
        let info = &toplevel.info;
        if !info.title.is_empty() {
            handle.title(info.title.clone());
        }
        if !info.app_id.is_empty() {
            handle.app_id(info.app_id.clone());
        }
        if let Some(pid) = info.pid {
            handle.pid(pid.max(0) as u32);
        }
        handle.identifier(toplevel.identifier);
        for output in &info.outputs {
            self.send_output(handle, *output, true);
        }
        handle.state(info.states.to_array());
        let parent = info
            .parent
            .and_then(|parent| self.handle_for(&data.manager, parent));
        handle.parent(parent);
        handle.done();
    }

    /// Handle object of `surface` created for `manager`
    fn handle_for(
        &self,
        manager: &ObjectId,
        surface: SurfaceId,
    ) -> Option<&TreelandForeignToplevelHandleV1> {
        self.handles
            .iter()
            .find(|(_, data)| data.manager == *manager && data.surface == surface && !data.closed)
            .map(|(handle, _)| handle)
    }

    fn mark_done(&mut self, handle: ObjectId) {
        if !self.pending_done.contains(&handle) {
            self.pending_done.push(handle);
        }
    }

    /// Send what changed since the last snapshot of `surface`
    pub fn update_toplevel(&mut self, surface: SurfaceId, info: ToplevelInfo) {
        let Some(index) = self.toplevels.iter().position(|t| t.surface == surface) else {
            return;
        };
        let old = std::mem::replace(&mut self.toplevels[index].info, info.clone());
        if old == info {
            return;
        }

        let handles: Vec<(TreelandForeignToplevelHandleV1, ObjectId)> = self
            .handles
            .iter()
            .filter(|(_, data)| data.surface == surface && !data.closed)
            .map(|(handle, data)| (handle.clone(), data.manager.clone()))
            .collect();
        for (handle, manager) in handles {
            if old.title != info.title {
                handle.title(info.title.clone());
            }
            if old.app_id != info.app_id {
                handle.app_id(info.app_id.clone());
            }
            if old.pid != info.pid {
                if let Some(pid) = info.pid {
                    handle.pid(pid.max(0) as u32);
                }
            }
            for output in info.outputs.difference(&old.outputs) {
                self.send_output(&handle, *output, true);
            }
            for output in old.outputs.difference(&info.outputs) {
                self.send_output(&handle, *output, false);
            }
            if old.states != info.states {
                handle.state(info.states.to_array());
            }
            if old.parent != info.parent {
                let parent = info
                    .parent
                    .and_then(|parent| self.handle_for(&manager, parent));
                handle.parent(parent);
            }
            self.mark_done(handle.id());
        }
    }

    /// Withdraw a toplevel: its handles are closed and children lose it as parent
    pub fn remove_toplevel(&mut self, surface: SurfaceId) {
        let Some(index) = self.toplevels.iter().position(|t| t.surface == surface) else {
            return;
        };
        self.toplevels.remove(index);

        for (handle, data) in self.handles.iter_mut() {
            if data.surface == surface && !data.closed {
                data.closed = true;
                handle.closed();
            }
        }
        let mut orphaned = Vec::new();
        for toplevel in self.toplevels.iter_mut() {
            if toplevel.info.parent == Some(surface) {
                toplevel.info.parent = None;
                orphaned.push(toplevel.surface);
            }
        }
        let mut touched = Vec::new();
        for child in orphaned {
            for (handle, data) in self.handles.iter() {
                if data.surface == child && !data.closed {
                    handle.parent(None);
                    touched.push(handle.id());
                }
            }
        }
        for handle in touched {
            self.mark_done(handle);
        }
        if let Some(preview) = &mut self.preview {
            if let DockPreviewKind::Surfaces(surfaces) = &mut preview.kind {
                surfaces.retain(|s| *s != surface);
            }
        }
    }

    /// Send the coalesced `done` events
    pub fn flush_done(&mut self) {
        for id in std::mem::take(&mut self.pending_done) {
            if let Some(handle) = self.handles.resource(&id) {
                handle.done();
            }
        }
    }

    /// The pointer entered the preview shown for `relative_surface`
    pub fn dock_preview_entered(&self, relative_surface: SurfaceId) {
        if let Some(context) = self.preview_context(relative_surface) {
            context.enter();
        }
    }

    pub fn dock_preview_left(&self, relative_surface: SurfaceId) {
        if let Some(context) = self.preview_context(relative_surface) {
            context.leave();
        }
    }

    fn preview_context(&self, relative_surface: SurfaceId) -> Option<&TreelandDockPreviewContextV1> {
        self.previews
            .iter()
            .find(|(_, surface)| **surface == relative_surface)
            .map(|(context, _)| context)
    }

    fn surfaces_for_identifiers(&self, identifiers: &[u32]) -> Vec<SurfaceId> {
        identifiers
            .iter()
            .filter_map(|id| {
                self.toplevels
                    .iter()
                    .find(|t| t.identifier == *id)
                    .map(|t| t.surface)
            })
            .collect()
    }

    fn close_preview(&mut self, context: &ObjectId) {
        if self
            .preview
            .as_ref()
            .is_some_and(|preview| preview.context == *context)
        {
            self.preview = None;
        }
    }
}

impl<D> GlobalDispatch<TreelandForeignToplevelManagerV1, (), D> for ForeignToplevelState
where
    D: GlobalDispatch<TreelandForeignToplevelManagerV1, ()>
        + Dispatch<TreelandForeignToplevelManagerV1, ()>
        + Dispatch<TreelandForeignToplevelHandleV1, ()>
        + Dispatch<TreelandDockPreviewContextV1, ()>
        + ForeignToplevelHandler
        + 'static,
{
    fn bind(
        state: &mut D,
        dh: &DisplayHandle,
        _client: &Client,
        resource: New<TreelandForeignToplevelManagerV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, D>,
    ) {
        let manager = data_init.init(resource, ());
        let toplevels = state.foreign_toplevel_state();
        toplevels.managers.insert(manager.clone(), ());

        // Parents may refer to any handle, so every handle exists before details go out
        let surfaces: Vec<SurfaceId> = toplevels.toplevels.iter().map(|t| t.surface).collect();
        let handles: Vec<TreelandForeignToplevelHandleV1> = surfaces
            .into_iter()
            .filter_map(|surface| toplevels.create_handle::<D>(dh, &manager, surface))
            .collect();
        for handle in handles {
            toplevels.send_details(&handle);
        }
    }
}

impl<D> Dispatch<TreelandForeignToplevelManagerV1, (), D> for ForeignToplevelState
where
    D: Dispatch<TreelandForeignToplevelManagerV1, ()>
        + Dispatch<TreelandForeignToplevelHandleV1, ()>
        + Dispatch<TreelandDockPreviewContextV1, ()>
        + ForeignToplevelHandler
        + 'static,
{
    fn request(
        state: &mut D,
        _client: &Client,
        resource: &TreelandForeignToplevelManagerV1,
        request: treeland_foreign_toplevel_manager_v1::Request,
        _data: &(),
        _dh: &DisplayHandle,
        data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            treeland_foreign_toplevel_manager_v1::Request::Stop => {
                state.foreign_toplevel_state().managers.remove(resource);
                resource.finished();
            }
            treeland_foreign_toplevel_manager_v1::Request::GetDockPreviewContext {
                relative_surface,
                id,
            } => {
                let context = data_init.init(id, ());
                state
                    .foreign_toplevel_state()
                    .previews
                    .insert(context, surface_id(&relative_surface));
            }
            _ => unreachable!(),
        }
    }

    fn destroyed(
        state: &mut D,
        _client: ClientId,
        resource: &TreelandForeignToplevelManagerV1,
        _data: &(),
    ) {
        state.foreign_toplevel_state().managers.remove(resource);
    }
}

impl<D> Dispatch<TreelandForeignToplevelHandleV1, (), D> for ForeignToplevelState
where
    D: Dispatch<TreelandForeignToplevelHandleV1, ()> + ForeignToplevelHandler + 'static,
{
    fn request(
        state: &mut D,
        _client: &Client,
        resource: &TreelandForeignToplevelHandleV1,
        request: treeland_foreign_toplevel_handle_v1::Request,
        _data: &(),
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        use treeland_foreign_toplevel_handle_v1::Request;

        let surface = match state.foreign_toplevel_state().handles.get(resource) {
            Some(data) if !data.closed => data.surface,
            _ => return,
        };
        let action = match request {
            Request::SetMaximized => ToplevelAction::SetMaximized(true),
            Request::UnsetMaximized => ToplevelAction::SetMaximized(false),
            Request::SetMinimized => ToplevelAction::SetMinimized(true),
            Request::UnsetMinimized => ToplevelAction::SetMinimized(false),
            Request::Activate { .. } => ToplevelAction::Activate,
            Request::Close => ToplevelAction::Close,
            Request::SetFullscreen { .. } => ToplevelAction::SetFullscreen(true),
            Request::UnsetFullscreen => ToplevelAction::SetFullscreen(false),
            Request::SetRectangle {
                surface: relative_to,
                x,
                y,
                width,
                height,
            } => {
                if width < 0 || height < 0 {
                    resource.post_error(
                        treeland_foreign_toplevel_handle_v1::Error::InvalidRectangle,
                        "invalid rectangle passed",
                    );
                    return;
                }
                ToplevelAction::SetRectangle {
                    relative_to: surface_id(&relative_to),
                    rectangle: Rectangle::new((x, y).into(), (width, height).into()),
                }
            }
            Request::Destroy => return,
            _ => unreachable!(),
        };
        debug!("{} asks {action:?} for {surface}", resource.id());
        state.toplevel_action(surface, action);
    }

    fn destroyed(
        state: &mut D,
        _client: ClientId,
        resource: &TreelandForeignToplevelHandleV1,
        _data: &(),
    ) {
        let toplevels = state.foreign_toplevel_state();
        toplevels.handles.remove(resource);
        let id = resource.id();
        toplevels.pending_done.retain(|pending| *pending != id);
    }
}

impl<D> Dispatch<TreelandDockPreviewContextV1, (), D> for ForeignToplevelState
where
    D: Dispatch<TreelandDockPreviewContextV1, ()> + ForeignToplevelHandler + 'static,
{
    fn request(
        state: &mut D,
        _client: &Client,
        resource: &TreelandDockPreviewContextV1,
        request: treeland_dock_preview_context_v1::Request,
        _data: &(),
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        let toplevels = state.foreign_toplevel_state();
        let Some(&relative_surface) = toplevels.previews.get(resource) else {
            return;
        };
        match request {
            treeland_dock_preview_context_v1::Request::Show {
                surfaces,
                x,
                y,
                direction,
            } => {
                let surfaces = toplevels.surfaces_for_identifiers(&decode_identifiers(&surfaces));
                toplevels.preview = Some(DockPreview {
                    context: resource.id(),
                    relative_surface,
                    kind: DockPreviewKind::Surfaces(surfaces),
                    position: (x, y).into(),
                    direction,
                });
            }
            treeland_dock_preview_context_v1::Request::ShowTooltip {
                tooltip,
                x,
                y,
                direction,
            } => {
                toplevels.preview = Some(DockPreview {
                    context: resource.id(),
                    relative_surface,
                    kind: DockPreviewKind::Tooltip(tooltip),
                    position: (x, y).into(),
                    direction,
                });
            }
            treeland_dock_preview_context_v1::Request::Close => {
                toplevels.close_preview(&resource.id())
            }
            treeland_dock_preview_context_v1::Request::Destroy => {}
            _ => unreachable!(),
        }
    }

    fn destroyed(
        state: &mut D,
        _client: ClientId,
        resource: &TreelandDockPreviewContextV1,
        _data: &(),
    ) {
        let toplevels = state.foreign_toplevel_state();
        toplevels.previews.remove(resource);
        toplevels.close_preview(&resource.id());
    }
}

#[macro_export]
macro_rules! delegate_foreign_toplevel {
    ($ty: ty) => {
        smithay::reexports::wayland_server::delegate_global_dispatch!($ty: [
            $crate::protocols::foreign_toplevel::treeland_foreign_toplevel_manager_v1::TreelandForeignToplevelManagerV1: ()
        ] => $crate::extensions::foreign_toplevel::ForeignToplevelState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::foreign_toplevel::treeland_foreign_toplevel_manager_v1::TreelandForeignToplevelManagerV1: ()
        ] => $crate::extensions::foreign_toplevel::ForeignToplevelState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::foreign_toplevel::treeland_foreign_toplevel_handle_v1::TreelandForeignToplevelHandleV1: ()
        ] => $crate::extensions::foreign_toplevel::ForeignToplevelState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::foreign_toplevel::treeland_dock_preview_context_v1::TreelandDockPreviewContextV1: ()
        ] => $crate::extensions::foreign_toplevel::ForeignToplevelState);
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_array_uses_wire_order() {
        let states = ToplevelStates::FULLSCREEN | ToplevelStates::MAXIMIZED;
        assert_eq!(states.to_wire(), vec![0, 3]);
        assert!(ToplevelStates::empty().to_wire().is_empty());
        assert_eq!(decode_identifiers(&states.to_array()), vec![0, 3]);
    }

    #[test]
    fn trailing_identifier_bytes_are_ignored() {
        let mut array = 7u32.to_ne_bytes().to_vec();
        array.extend_from_slice(&[1, 2]);
        assert_eq!(decode_identifiers(&array), vec![7]);
    }
}
