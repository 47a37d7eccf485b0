//! `treeland_window_management_v1`: the show desktop state

use smithay::reexports::wayland_server::{
    backend::{ClientId, GlobalId},
    Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New,
};
use tracing::{debug, warn};

use crate::protocols::window_management::treeland_window_management_v1::{
    self, TreelandWindowManagementV1,
};
use crate::protocols::ResourceTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DesktopState {
    #[default]
    Normal = 0,
    Show = 1,
    Preview = 2,
}

impl DesktopState {
    /// Whether workspace surfaces are hidden in this state
    pub fn hides_surfaces(&self) -> bool {
        !matches!(self, DesktopState::Normal)
    }
}

impl TryFrom<u32> for DesktopState {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DesktopState::Normal),
            1 => Ok(DesktopState::Show),
            2 => Ok(DesktopState::Preview),
            other => Err(other),
        }
    }
}

#[derive(Debug)]
pub struct WindowManagementState {
    global: GlobalId,
    resources: ResourceTable<TreelandWindowManagementV1>,
    desktop_state: DesktopState,
}

pub trait WindowManagementHandler {
    fn window_management_state(&mut self) -> &mut WindowManagementState;

    /// A client asked for a desktop state
    fn desktop_state_requested(&mut self, state: DesktopState);
}

impl WindowManagementState {
    pub fn new<D>(dh: &DisplayHandle) -> Self
    where
        D: GlobalDispatch<TreelandWindowManagementV1, ()>
            + Dispatch<TreelandWindowManagementV1, ()>
            + WindowManagementHandler
            + 'static,
    {
        Self {
            global: dh.create_global::<D, TreelandWindowManagementV1, ()>(1, ()),
            resources: ResourceTable::new(),
            desktop_state: DesktopState::Normal,
        }
    }

    pub fn global(&self) -> GlobalId {
        self.global.clone()
    }

    pub fn desktop_state(&self) -> DesktopState {
        self.desktop_state
    }

    /// Change the state and tell every client. Returns false if unchanged
    pub fn set_desktop_state(&mut self, state: DesktopState) -> bool {
        if self.desktop_state == state {
            return false;
        }
        debug!("Desktop state {:?} -> {state:?}", self.desktop_state);
        self.desktop_state = state;
        for resource in self.resources.resources() {
            resource.show_desktop(state as u32);
        }
        true
    }
}

impl<D> GlobalDispatch<TreelandWindowManagementV1, (), D> for WindowManagementState
where
    D: GlobalDispatch<TreelandWindowManagementV1, ()>
        + Dispatch<TreelandWindowManagementV1, ()>
        + WindowManagementHandler
        + 'static,
{
    fn bind(
        state: &mut D,
        _dh: &DisplayHandle,
        _client: &Client,
        resource: New<TreelandWindowManagementV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, D>,
    ) {
        let resource = data_init.init(resource, ());
        let wm = state.window_management_state();
        resource.show_desktop(wm.desktop_state as u32);
        wm.resources.insert(resource, ());
    }
}

impl<D> Dispatch<TreelandWindowManagementV1, (), D> for WindowManagementState
where
    D: Dispatch<TreelandWindowManagementV1, ()> + WindowManagementHandler + 'static,
{
    fn request(
        state: &mut D,
        _client: &Client,
        _resource: &TreelandWindowManagementV1,
        request: treeland_window_management_v1::Request,
        _data: &(),
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            treeland_window_management_v1::Request::SetDesktop { state: value } => {
                match DesktopState::try_from(value) {
                    Ok(desktop) => state.desktop_state_requested(desktop),
                    Err(value) => warn!("Ignoring unknown desktop state {value}"),
                }
            }
            treeland_window_management_v1::Request::Destroy => {}
            _ => unreachable!(),
        }
    }

    fn destroyed(state: &mut D, _client: ClientId, resource: &TreelandWindowManagementV1, _data: &()) {
        state.window_management_state().resources.remove(resource);
    }
}

#[macro_export]
macro_rules! delegate_window_management {
    ($ty: ty) => {
        smithay::reexports::wayland_server::delegate_global_dispatch!($ty: [
            $crate::protocols::window_management::treeland_window_management_v1::TreelandWindowManagementV1: ()
        ] => $crate::extensions::window_management::WindowManagementState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::window_management::treeland_window_management_v1::TreelandWindowManagementV1: ()
        ] => $crate::extensions::window_management::WindowManagementState);
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desktop_state_wire_values() {
        assert_eq!(DesktopState::try_from(0), Ok(DesktopState::Normal));
        assert_eq!(DesktopState::try_from(2), Ok(DesktopState::Preview));
        assert_eq!(DesktopState::try_from(3), Err(3));
        assert!(DesktopState::Preview.hides_surfaces());
        assert!(!DesktopState::Normal.hides_surfaces());
    }
}
