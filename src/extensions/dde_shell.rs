//! `treeland_dde_shell_manager_v1`: private interfaces of the desktop shell
//!
//! The manager hands out six kinds of objects:
//!
//! - shell surfaces carrying placement and visibility hints for a
//!   `wl_surface` (at most one per surface)
//! - overlap checkers telling a dock or panel whether a window covers the
//!   strip it is anchored to
//! - active objects announcing pointer activity on the shell's hot edges
//! - multitask view toggles, window pickers and lock screen actions
//!
//! Overlap is evaluated at idle points; checkers only hear about it when it
//! changes, or the first time it is computed.

use std::collections::HashMap;

use smithay::reexports::wayland_server::{
    backend::{ClientId, GlobalId, ObjectId},
    Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource,
};
use smithay::utils::{Logical, Point, Rectangle};
use tracing::{debug, info, trace};

use crate::output::{output_id, OutputId};
use crate::protocols::dde_shell::{
    treeland_dde_active_v1::{self, TreelandDdeActiveV1},
    treeland_dde_shell_manager_v1::{self, TreelandDdeShellManagerV1},
    treeland_dde_shell_surface_v1::{self, TreelandDdeShellSurfaceV1},
    treeland_lockscreen_v1::{self, TreelandLockscreenV1},
    treeland_multitaskview_v1::{self, TreelandMultitaskviewV1},
    treeland_window_overlap_checker::{self, TreelandWindowOverlapChecker},
    treeland_window_picker_v1::{self, TreelandWindowPickerV1},
};
use crate::protocols::ResourceTable;
use crate::surface::{surface_id, SurfaceId};

pub const ROLE_OVERLAY: u32 = 1;

/// Edge an overlap checker's strip hugs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Top,
    Right,
    Bottom,
    Left,
}

impl TryFrom<u32> for Anchor {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Anchor::Top),
            2 => Ok(Anchor::Right),
            4 => Ok(Anchor::Bottom),
            8 => Ok(Anchor::Left),
            other => Err(other),
        }
    }
}

impl Anchor {
    /// The strip of `output` a `width`x`height` panel at this edge occupies
    pub fn region(&self, width: i32, height: i32, output: Rectangle<i32, Logical>) -> Rectangle<i32, Logical> {
        let (x, y) = (output.loc.x, output.loc.y);
        let (out_w, out_h) = (output.size.w, output.size.h);
        let (loc, size) = match self {
            Anchor::Top => ((x, y), (out_w, height)),
            Anchor::Right => ((x + out_w - width, y), (width, out_h)),
            Anchor::Bottom => ((x, y + out_h - height), (out_w, height)),
            Anchor::Left => ((x, y), (width, out_h)),
        };
        Rectangle::new(loc.into(), size.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ActiveReason {
    Mouse = 0,
    Wheel = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockscreenAction {
    Lock,
    Shutdown,
    SwitchUser,
}

/// Hints a shell surface set; `None` means never set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DdeSurfaceProps {
    pub position: Option<Point<i32, Logical>>,
    pub overlay: bool,
    pub auto_placement: Option<u32>,
    pub skip_switcher: Option<bool>,
    pub skip_dock_preview: Option<bool>,
    pub skip_multitask_view: Option<bool>,
}

impl DdeSurfaceProps {
    pub fn skips_dock_preview(&self) -> bool {
        self.skip_dock_preview.unwrap_or(false)
    }
}

#[derive(Debug, Default)]
struct OverlapChecker {
    region: Option<(OutputId, Anchor, i32, i32)>,
    overlapped: Option<bool>,
}

#[derive(Debug)]
pub struct DdeShellState {
    global: GlobalId,
    managers: ResourceTable<TreelandDdeShellManagerV1>,
    shell_surfaces: ResourceTable<TreelandDdeShellSurfaceV1, SurfaceId>,
    props: HashMap<SurfaceId, DdeSurfaceProps>,
    checkers: ResourceTable<TreelandWindowOverlapChecker, OverlapChecker>,
    actives: ResourceTable<TreelandDdeActiveV1>,
    multitaskviews: ResourceTable<TreelandMultitaskviewV1>,
    pickers: ResourceTable<TreelandWindowPickerV1, bool>,
    lockscreens: ResourceTable<TreelandLockscreenV1>,
}

pub trait DdeShellHandler {
    fn dde_shell_state(&mut self) -> &mut DdeShellState;

    /// Geometry of an output in the global space
    fn output_geometry(&self, output: OutputId) -> Option<Rectangle<i32, Logical>>;

    fn surface_props_changed(&mut self, surface: SurfaceId, props: &DdeSurfaceProps);

    fn multitaskview_toggled(&mut self);

    /// A picker wants the user to choose a window
    fn window_pick_requested(&mut self, hint: &str);

    fn lockscreen_action(&mut self, action: LockscreenAction);
}

impl DdeShellState {
    pub fn new<D>(dh: &DisplayHandle) -> Self
    where
        D: GlobalDispatch<TreelandDdeShellManagerV1, ()>
            + Dispatch<TreelandDdeShellManagerV1, ()>
            + Dispatch<TreelandDdeShellSurfaceV1, ()>
            + Dispatch<TreelandWindowOverlapChecker, ()>
            + Dispatch<TreelandDdeActiveV1, ()>
            + Dispatch<TreelandMultitaskviewV1, ()>
            + Dispatch<TreelandWindowPickerV1, ()>
            + Dispatch<TreelandLockscreenV1, ()>
            + DdeShellHandler
            + 'static,
    {
        Self {
            global: dh.create_global::<D, TreelandDdeShellManagerV1, ()>(1, ()),
            managers: ResourceTable::new(),
            shell_surfaces: ResourceTable::new(),
            props: HashMap::new(),
            checkers: ResourceTable::new(),
            actives: ResourceTable::new(),
            multitaskviews: ResourceTable::new(),
            pickers: ResourceTable::new(),
            lockscreens: ResourceTable::new(),
        }
    }

    pub fn global(&self) -> GlobalId {
        self.global.clone()
    }

    pub fn props(&self, surface: SurfaceId) -> Option<&DdeSurfaceProps> {
        self.props.get(&surface)
    }

    pub fn skips_dock_preview(&self, surface: SurfaceId) -> bool {
        self.props(surface).is_some_and(DdeSurfaceProps::skips_dock_preview)
    }

    pub fn checker_count(&self) -> usize {
        self.checkers.len()
    }

    /// Re-evaluate every overlap checker against the visible windows
    pub fn check_overlaps<D: DdeShellHandler>(state: &mut D, windows: &[Rectangle<i32, Logical>]) {
        let anchored: Vec<(ObjectId, (OutputId, Anchor, i32, i32))> = state
            .dde_shell_state()
            .checkers
            .iter()
            .filter_map(|(checker, data)| data.region.map(|region| (checker.id(), region)))
            .collect();
        let regions: Vec<(ObjectId, Rectangle<i32, Logical>)> = anchored
            .into_iter()
            .filter_map(|(id, (output, anchor, w, h))| {
                let geometry = state.output_geometry(output)?;
                Some((id, anchor.region(w, h, geometry)))
            })
            .collect();

        let shell = state.dde_shell_state();
        for (id, rect) in regions {
            let Some((checker, data)) = shell.checkers.entry_mut(&id) else {
                continue;
            };
            let overlapped = windows.iter().any(|window| window.overlaps(rect));
            if data.overlapped == Some(overlapped) {
                continue;
            }
            data.overlapped = Some(overlapped);
            trace!(?rect, overlapped, "Overlap changed");
            if overlapped {
                checker.enter();
            } else {
                checker.leave();
            }
        }
    }

    pub fn send_active_in(&self, reason: ActiveReason) {
        for (active, _) in self.actives.iter() {
            active.active_in(reason as u32);
        }
    }

    pub fn send_active_out(&self, reason: ActiveReason) {
        for (active, _) in self.actives.iter() {
            active.active_out(reason as u32);
        }
    }

    pub fn send_start_drag(&self) {
        for (active, _) in self.actives.iter() {
            active.start_drag();
        }
    }

    pub fn send_drop(&self) {
        for (active, _) in self.actives.iter() {
            active.drop();
        }
    }

    /// Answer every picker waiting for a window
    pub fn window_picked(&mut self, pid: i32) -> usize {
        let mut answered = 0;
        for (picker, waiting) in self.pickers.iter_mut() {
            if std::mem::take(waiting) {
                picker.window(pid);
                answered += 1;
            }
        }
        answered
    }

    /// Forget the hints of a surface that went away
    pub fn surface_removed(&mut self, surface: SurfaceId) {
        self.props.remove(&surface);
    }

    /// Move the hints of a surface that took over another id
    pub fn surface_renamed(&mut self, from: SurfaceId, to: SurfaceId) {
        if let Some(props) = self.props.remove(&from) {
            self.props.insert(to, props);
        }
        for (_, surface) in self.shell_surfaces.iter_mut() {
            if *surface == from {
                *surface = to;
            }
        }
    }
}

impl<D> GlobalDispatch<TreelandDdeShellManagerV1, (), D> for DdeShellState
where
    D: GlobalDispatch<TreelandDdeShellManagerV1, ()>
        + Dispatch<TreelandDdeShellManagerV1, ()>
        + DdeShellHandler
        + 'static,
{
    fn bind(
        state: &mut D,
        _dh: &DisplayHandle,
        _client: &Client,
        resource: New<TreelandDdeShellManagerV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, D>,
    ) {
        let manager = data_init.init(resource, ());
        state.dde_shell_state().managers.insert(manager, ());
    }
}

impl<D> Dispatch<TreelandDdeShellManagerV1, (), D> for DdeShellState
where
    D: Dispatch<TreelandDdeShellManagerV1, ()>
        + Dispatch<TreelandDdeShellSurfaceV1, ()>
        + Dispatch<TreelandWindowOverlapChecker, ()>
        + Dispatch<TreelandDdeActiveV1, ()>
        + Dispatch<TreelandMultitaskviewV1, ()>
        + Dispatch<TreelandWindowPickerV1, ()>
        + Dispatch<TreelandLockscreenV1, ()>
        + DdeShellHandler
        + 'static,
{
    fn request(
        state: &mut D,
        _client: &Client,
        resource: &TreelandDdeShellManagerV1,
        request: treeland_dde_shell_manager_v1::Request,
        _data: &(),
        _dh: &DisplayHandle,
        data_init: &mut DataInit<'_, D>,
    ) {
        let shell = state.dde_shell_state();
        match request {
            treeland_dde_shell_manager_v1::Request::GetWindowOverlapChecker { id } => {
                let checker = data_init.init(id, ());
                shell.checkers.insert(checker, OverlapChecker::default());
            }
            treeland_dde_shell_manager_v1::Request::GetShellSurface { id, surface } => {
                let shell_surface = data_init.init(id, ());
                let surface = surface_id(&surface);
                if shell.shell_surfaces.iter().any(|(_, s)| *s == surface) {
                    resource.post_error(0u32, "treeland_dde_shell_surface_v1 already exists");
                    return;
                }
                debug!("{surface} got a dde shell surface");
                shell.shell_surfaces.insert(shell_surface, surface);
                shell.props.entry(surface).or_default();
            }
            treeland_dde_shell_manager_v1::Request::GetTreelandDdeActive { id, seat: _ } => {
                let active = data_init.init(id, ());
                shell.actives.insert(active, ());
            }
            treeland_dde_shell_manager_v1::Request::GetTreelandMultitaskview { id } => {
                let view = data_init.init(id, ());
                shell.multitaskviews.insert(view, ());
            }
            treeland_dde_shell_manager_v1::Request::GetTreelandWindowPicker { id } => {
                let picker = data_init.init(id, ());
                shell.pickers.insert(picker, false);
            }
            treeland_dde_shell_manager_v1::Request::GetTreelandLockscreen { id } => {
                let lockscreen = data_init.init(id, ());
                shell.lockscreens.insert(lockscreen, ());
            }
            _ => unreachable!(),
        }
    }

    fn destroyed(state: &mut D, _client: ClientId, resource: &TreelandDdeShellManagerV1, _data: &()) {
        state.dde_shell_state().managers.remove(resource);
    }
}

fn update_props<D: DdeShellHandler>(
    state: &mut D,
    resource: &TreelandDdeShellSurfaceV1,
    update: impl FnOnce(&mut DdeSurfaceProps) -> bool,
) {
    let shell = state.dde_shell_state();
    let Some(surface) = shell.shell_surfaces.get(resource).copied() else {
        return;
    };
    let props = shell.props.entry(surface).or_default();
    if !update(props) {
        return;
    }
    let props = props.clone();
    state.surface_props_changed(surface, &props);
}

fn set_if_changed<T: PartialEq>(slot: &mut Option<T>, value: T) -> bool {
    if slot.as_ref() == Some(&value) {
        return false;
    }
    *slot = Some(value);
    true
}

impl<D> Dispatch<TreelandDdeShellSurfaceV1, (), D> for DdeShellState
where
    D: Dispatch<TreelandDdeShellSurfaceV1, ()> + DdeShellHandler + 'static,
{
    fn request(
        state: &mut D,
        _client: &Client,
        resource: &TreelandDdeShellSurfaceV1,
        request: treeland_dde_shell_surface_v1::Request,
        _data: &(),
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            treeland_dde_shell_surface_v1::Request::SetSurfacePosition { x, y } => {
                update_props(state, resource, |props| {
                    set_if_changed(&mut props.position, Point::from((x, y)))
                })
            }
            treeland_dde_shell_surface_v1::Request::SetRole { role } => {
                if role != ROLE_OVERLAY {
                    resource.post_error(0u32, "Invalid role");
                    return;
                }
                update_props(state, resource, |props| !std::mem::replace(&mut props.overlay, true))
            }
            treeland_dde_shell_surface_v1::Request::SetAutoPlacement { y_offset } => {
                update_props(state, resource, |props| {
                    set_if_changed(&mut props.auto_placement, y_offset)
                })
            }
            treeland_dde_shell_surface_v1::Request::SetSkipSwitcher { skip } => {
                update_props(state, resource, |props| {
                    set_if_changed(&mut props.skip_switcher, skip != 0)
                })
            }
            treeland_dde_shell_surface_v1::Request::SetSkipDockPreview { skip } => {
                update_props(state, resource, |props| {
                    set_if_changed(&mut props.skip_dock_preview, skip != 0)
                })
            }
            treeland_dde_shell_surface_v1::Request::SetSkipMutiTaskView { skip } => {
                update_props(state, resource, |props| {
                    set_if_changed(&mut props.skip_multitask_view, skip != 0)
                })
            }
            treeland_dde_shell_surface_v1::Request::Destroy => {}
            _ => unreachable!(),
        }
    }

    fn destroyed(state: &mut D, _client: ClientId, resource: &TreelandDdeShellSurfaceV1, _data: &()) {
        let shell = state.dde_shell_state();
        if let Some((_, surface)) = shell.shell_surfaces.remove(resource) {
            shell.props.remove(&surface);
            state.surface_props_changed(surface, &DdeSurfaceProps::default());
        }
    }
}

impl<D> Dispatch<TreelandWindowOverlapChecker, (), D> for DdeShellState
where
    D: Dispatch<TreelandWindowOverlapChecker, ()> + DdeShellHandler + 'static,
{
    fn request(
        state: &mut D,
        _client: &Client,
        resource: &TreelandWindowOverlapChecker,
        request: treeland_window_overlap_checker::Request,
        _data: &(),
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            treeland_window_overlap_checker::Request::Update {
                width,
                height,
                anchor,
                output,
            } => {
                let Ok(anchor) = Anchor::try_from(anchor) else {
                    resource.post_error(0u32, format!("Invalid anchor {anchor}"));
                    return;
                };
                let Some(output) = output_id(&output) else {
                    debug!("Overlap checker names an unknown output");
                    return;
                };
                if let Some(checker) = state.dde_shell_state().checkers.get_mut(resource) {
                    checker.region = Some((output, anchor, width, height));
                }
            }
            treeland_window_overlap_checker::Request::Destroy => {}
            _ => unreachable!(),
        }
    }

    fn destroyed(state: &mut D, _client: ClientId, resource: &TreelandWindowOverlapChecker, _data: &()) {
        state.dde_shell_state().checkers.remove(resource);
    }
}

impl<D> Dispatch<TreelandDdeActiveV1, (), D> for DdeShellState
where
    D: Dispatch<TreelandDdeActiveV1, ()> + DdeShellHandler + 'static,
{
    fn request(
        _state: &mut D,
        _client: &Client,
        _resource: &TreelandDdeActiveV1,
        request: treeland_dde_active_v1::Request,
        _data: &(),
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            treeland_dde_active_v1::Request::Destroy => {}
            _ => unreachable!(),
        }
    }

    fn destroyed(state: &mut D, _client: ClientId, resource: &TreelandDdeActiveV1, _data: &()) {
        state.dde_shell_state().actives.remove(resource);
    }
}

impl<D> Dispatch<TreelandMultitaskviewV1, (), D> for DdeShellState
where
    D: Dispatch<TreelandMultitaskviewV1, ()> + DdeShellHandler + 'static,
{
    fn request(
        state: &mut D,
        _client: &Client,
        _resource: &TreelandMultitaskviewV1,
        request: treeland_multitaskview_v1::Request,
        _data: &(),
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            treeland_multitaskview_v1::Request::Toggle => state.multitaskview_toggled(),
            treeland_multitaskview_v1::Request::Destroy => {}
            _ => unreachable!(),
        }
    }

    fn destroyed(state: &mut D, _client: ClientId, resource: &TreelandMultitaskviewV1, _data: &()) {
        state.dde_shell_state().multitaskviews.remove(resource);
    }
}

impl<D> Dispatch<TreelandWindowPickerV1, (), D> for DdeShellState
where
    D: Dispatch<TreelandWindowPickerV1, ()> + DdeShellHandler + 'static,
{
    fn request(
        state: &mut D,
        _client: &Client,
        resource: &TreelandWindowPickerV1,
        request: treeland_window_picker_v1::Request,
        _data: &(),
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            treeland_window_picker_v1::Request::Pick { hint } => {
                if let Some(waiting) = state.dde_shell_state().pickers.get_mut(resource) {
                    *waiting = true;
                }
                state.window_pick_requested(&hint);
            }
            treeland_window_picker_v1::Request::Destroy => {}
            _ => unreachable!(),
        }
    }

    fn destroyed(state: &mut D, _client: ClientId, resource: &TreelandWindowPickerV1, _data: &()) {
        state.dde_shell_state().pickers.remove(resource);
    }
}

impl<D> Dispatch<TreelandLockscreenV1, (), D> for DdeShellState
where
    D: Dispatch<TreelandLockscreenV1, ()> + DdeShellHandler + 'static,
{
    fn request(
        state: &mut D,
        _client: &Client,
        _resource: &TreelandLockscreenV1,
        request: treeland_lockscreen_v1::Request,
        _data: &(),
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        let action = match request {
            treeland_lockscreen_v1::Request::Lock => LockscreenAction::Lock,
            treeland_lockscreen_v1::Request::Shutdown => LockscreenAction::Shutdown,
            treeland_lockscreen_v1::Request::SwitchUser => LockscreenAction::SwitchUser,
            treeland_lockscreen_v1::Request::Destroy => return,
            _ => unreachable!(),
        };
        info!(?action, "Lock screen action");
        state.lockscreen_action(action);
    }

    fn destroyed(state: &mut D, _client: ClientId, resource: &TreelandLockscreenV1, _data: &()) {
        state.dde_shell_state().lockscreens.remove(resource);
    }
}

#[macro_export]
macro_rules! delegate_dde_shell {
    ($ty: ty) => {
        smithay::reexports::wayland_server::delegate_global_dispatch!($ty: [
            $crate::protocols::dde_shell::treeland_dde_shell_manager_v1::TreelandDdeShellManagerV1: ()
        ] => $crate::extensions::dde_shell::DdeShellState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::dde_shell::treeland_dde_shell_manager_v1::TreelandDdeShellManagerV1: ()
        ] => $crate::extensions::dde_shell::DdeShellState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::dde_shell::treeland_dde_shell_surface_v1::TreelandDdeShellSurfaceV1: ()
        ] => $crate::extensions::dde_shell::DdeShellState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::dde_shell::treeland_window_overlap_checker::TreelandWindowOverlapChecker: ()
        ] => $crate::extensions::dde_shell::DdeShellState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::dde_shell::treeland_dde_active_v1::TreelandDdeActiveV1: ()
        ] => $crate::extensions::dde_shell::DdeShellState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::dde_shell::treeland_multitaskview_v1::TreelandMultitaskviewV1: ()
        ] => $crate::extensions::dde_shell::DdeShellState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::dde_shell::treeland_window_picker_v1::TreelandWindowPickerV1: ()
        ] => $crate::extensions::dde_shell::DdeShellState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::dde_shell::treeland_lockscreen_v1::TreelandLockscreenV1: ()
        ] => $crate::extensions::dde_shell::DdeShellState);
    };
}
