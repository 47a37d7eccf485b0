//! `treeland_virtual_output_manager_v1`: group outputs into a mirror (copy mode)
//!
//! Output and group name lists travel as arrays of NUL terminated strings.

use smithay::reexports::wayland_server::{
    backend::{ClientId, GlobalId, ObjectId},
    Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource,
};
use tracing::{debug, warn};

use crate::protocols::virtual_output::{
    treeland_virtual_output_manager_v1::{self, TreelandVirtualOutputManagerV1},
    treeland_virtual_output_v1::{self, Error as VirtualOutputError, TreelandVirtualOutputV1},
};
use crate::protocols::ResourceTable;

/// Pack names into a wire array
pub fn encode_names(names: &[String]) -> Vec<u8> {
    let mut array = Vec::new();
    for name in names {
        array.extend_from_slice(name.as_bytes());
        array.push(0);
    }
    array
}

/// Unpack a wire array; empty entries are dropped
pub fn decode_names(array: &[u8]) -> Vec<String> {
    array
        .split(|byte| *byte == 0)
        .filter(|name| !name.is_empty())
        .map(|name| String::from_utf8_lossy(name).into_owned())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct VirtualOutputData {
    name: String,
    outputs: Vec<String>,
    /// Handles from `get_virtual_output` only observe the group
    owner: bool,
}

#[derive(Debug)]
pub struct VirtualOutputState {
    global: GlobalId,
    managers: ResourceTable<TreelandVirtualOutputManagerV1>,
    handles: ResourceTable<TreelandVirtualOutputV1, VirtualOutputData>,
    /// Owning handle of the group that is in effect
    active: Option<ObjectId>,
}

pub trait VirtualOutputHandler {
    fn virtual_output_state(&mut self) -> &mut VirtualOutputState;

    /// Switch to copy mode with the first output as mirror source
    fn create_virtual_output(&mut self, name: &str, outputs: &[String]) -> Result<(), String>;

    /// The group in effect went away; go back to extension mode
    fn destroy_virtual_output(&mut self, name: &str);
}

impl VirtualOutputState {
    pub fn new<D>(dh: &DisplayHandle) -> Self
    where
        D: GlobalDispatch<TreelandVirtualOutputManagerV1, ()>
            + Dispatch<TreelandVirtualOutputManagerV1, ()>
            + Dispatch<TreelandVirtualOutputV1, ()>
            + VirtualOutputHandler
            + 'static,
    {
        Self {
            global: dh.create_global::<D, TreelandVirtualOutputManagerV1, ()>(1, ()),
            managers: ResourceTable::new(),
            handles: ResourceTable::new(),
            active: None,
        }
    }

    pub fn global(&self) -> GlobalId {
        self.global.clone()
    }

    /// Name of the group in effect
    pub fn active_group(&self) -> Option<&str> {
        self.active
            .as_ref()
            .and_then(|id| self.handles.get_id(id))
            .map(|data| data.name.as_str())
    }

    fn group_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handles
            .iter()
            .filter(|(_, data)| data.owner)
            .map(|(_, data)| data.name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn group(&self, name: &str) -> Option<&VirtualOutputData> {
        self.handles
            .iter()
            .map(|(_, data)| data)
            .find(|data| data.owner && data.name == name)
    }

    /// The compositor left copy mode on its own (an output went away)
    pub fn copy_mode_ended(&mut self) {
        self.active = None;
    }

    /// The compositor re-entered the group `name` on its own
    pub fn copy_mode_restored(&mut self, name: &str) {
        self.active = self
            .handles
            .iter()
            .find(|(_, data)| data.owner && data.name == name)
            .map(|(handle, _)| handle.id());
    }
}

fn validate(name: &str, outputs: &[String]) -> Result<(), (VirtualOutputError, &'static str)> {
    if name.is_empty() {
        return Err((VirtualOutputError::InvalidGroupName, "Group name is empty!"));
    }
    if outputs.len() < 2 {
        return Err((
            VirtualOutputError::InvalidScreenNumber,
            "The number of screens applying for copy mode is less than 2!",
        ));
    }
    Ok(())
}

impl<D> GlobalDispatch<TreelandVirtualOutputManagerV1, (), D> for VirtualOutputState
where
    D: GlobalDispatch<TreelandVirtualOutputManagerV1, ()>
        + Dispatch<TreelandVirtualOutputManagerV1, ()>
        + Dispatch<TreelandVirtualOutputV1, ()>
        + VirtualOutputHandler
        + 'static,
{
    fn bind(
        state: &mut D,
        _dh: &DisplayHandle,
        _client: &Client,
        resource: New<TreelandVirtualOutputManagerV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, D>,
    ) {
        let manager = data_init.init(resource, ());
        state.virtual_output_state().managers.insert(manager, ());
    }
}

impl<D> Dispatch<TreelandVirtualOutputManagerV1, (), D> for VirtualOutputState
where
    D: Dispatch<TreelandVirtualOutputManagerV1, ()>
        + Dispatch<TreelandVirtualOutputV1, ()>
        + VirtualOutputHandler
        + 'static,
{
    fn request(
        state: &mut D,
        _client: &Client,
        resource: &TreelandVirtualOutputManagerV1,
        request: treeland_virtual_output_manager_v1::Request,
        _data: &(),
        _dh: &DisplayHandle,
        data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            treeland_virtual_output_manager_v1::Request::CreateVirtualOutput { id, name, outputs } => {
                let handle = data_init.init(id, ());
                let outputs = decode_names(&outputs);
                handle.outputs(name.clone(), encode_names(&outputs));
                let handle_id = handle.id();
                state.virtual_output_state().handles.insert(
                    handle.clone(),
                    VirtualOutputData {
                        name: name.clone(),
                        outputs: outputs.clone(),
                        owner: true,
                    },
                );

                if let Err((code, message)) = validate(&name, &outputs) {
                    warn!(%name, ?code, message, "Rejected virtual output");
                    handle.error(code.into(), message.to_string());
                    return;
                }
                match state.create_virtual_output(&name, &outputs) {
                    Ok(()) => {
                        debug!(%name, "Virtual output in effect");
                        state.virtual_output_state().active = Some(handle_id);
                    }
                    Err(message) => {
                        warn!(%name, %message, "Copy mode refused");
                        handle.error(VirtualOutputError::InvalidOutput.into(), message);
                    }
                }
            }
            treeland_virtual_output_manager_v1::Request::GetVirtualOutputList => {
                let names = state.virtual_output_state().group_names();
                resource.virtual_output_list(encode_names(&names));
            }
            treeland_virtual_output_manager_v1::Request::GetVirtualOutput { name, id } => {
                let handle = data_init.init(id, ());
                let virtual_outputs = state.virtual_output_state();
                let outputs = match virtual_outputs.group(&name) {
                    Some(group) => {
                        let outputs = group.outputs.clone();
                        handle.outputs(name.clone(), encode_names(&outputs));
                        outputs
                    }
                    None => Vec::new(),
                };
                virtual_outputs.handles.insert(
                    handle,
                    VirtualOutputData {
                        name,
                        outputs,
                        owner: false,
                    },
                );
            }
            treeland_virtual_output_manager_v1::Request::Destroy => {}
            _ => unreachable!(),
        }
    }

    fn destroyed(
        state: &mut D,
        _client: ClientId,
        resource: &TreelandVirtualOutputManagerV1,
        _data: &(),
    ) {
        state.virtual_output_state().managers.remove(resource);
    }
}

impl<D> Dispatch<TreelandVirtualOutputV1, (), D> for VirtualOutputState
where
    D: Dispatch<TreelandVirtualOutputV1, ()> + VirtualOutputHandler + 'static,
{
    fn request(
        _state: &mut D,
        _client: &Client,
        _resource: &TreelandVirtualOutputV1,
        request: treeland_virtual_output_v1::Request,
        _data: &(),
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            treeland_virtual_output_v1::Request::Destroy => {}
            _ => unreachable!(),
        }
    }

    fn destroyed(state: &mut D, _client: ClientId, resource: &TreelandVirtualOutputV1, _data: &()) {
        let virtual_outputs = state.virtual_output_state();
        let removed = virtual_outputs.handles.remove(resource);
        if virtual_outputs.active.as_ref() == Some(&resource.id()) {
            virtual_outputs.active = None;
            if let Some((_, data)) = removed {
                state.destroy_virtual_output(&data.name);
            }
        }
    }
}

#[macro_export]
macro_rules! delegate_virtual_output {
    ($ty: ty) => {
        smithay::reexports::wayland_server::delegate_global_dispatch!($ty: [
            $crate::protocols::virtual_output::treeland_virtual_output_manager_v1::TreelandVirtualOutputManagerV1: ()
        ] => $crate::extensions::virtual_output::VirtualOutputState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::virtual_output::treeland_virtual_output_manager_v1::TreelandVirtualOutputManagerV1: ()
        ] => $crate::extensions::virtual_output::VirtualOutputState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::virtual_output::treeland_virtual_output_v1::TreelandVirtualOutputV1: ()
        ] => $crate::extensions::virtual_output::VirtualOutputState);
    };
}
