//! `treeland_output_manager_v1`: primary output selection and per-output
//! colour control
//!
//! Colour changes are a two phase transaction. Values are staged on a colour
//! control and handed to the compositor on `commit`; the compositor answers
//! later through [`OutputManagerState::finish_commit`] once the display has
//! been reconfigured.

use std::collections::HashMap;

use smithay::reexports::wayland_server::{
    backend::{ClientId, GlobalId, ObjectId},
    protocol::wl_display,
    Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource,
};
use tracing::{debug, warn};

use crate::output::{output_id, OutputColor, OutputId};
use crate::protocols::output_manager::{
    treeland_output_color_control_v1::{self, TreelandOutputColorControlV1},
    treeland_output_manager_v1::{self, TreelandOutputManagerV1},
};
use crate::protocols::ResourceTable;

const VERSION: u32 = 2;

pub const COLOR_TEMPERATURE_RANGE: std::ops::RangeInclusive<u32> = 1000..=20000;

/// Values staged on a colour control; `None` leaves the current value alone
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PendingColor {
    /// Normalised to 0.0..=1.0
    pub brightness: Option<f64>,
    pub color_temperature: Option<u32>,
}

impl PendingColor {
    pub fn is_empty(&self) -> bool {
        self.brightness.is_none() && self.color_temperature.is_none()
    }

    /// Merge onto the current colour of an output
    pub fn apply_to(&self, color: &mut OutputColor) {
        if let Some(brightness) = self.brightness {
            color.brightness = brightness;
        }
        if let Some(temperature) = self.color_temperature {
            color.color_temperature = temperature;
        }
    }
}

/// Wire value of a normalised brightness
///
/// Half a fixed-point step is added so the percentage survives truncation.
pub fn brightness_to_wire(brightness: f64) -> f64 {
    brightness * 100.0 + 1.0 / 512.0
}

#[derive(Debug)]
struct ColorControlData {
    output: Option<OutputId>,
    pending: PendingColor,
}

#[derive(Debug)]
struct InFlightCommit {
    control: ObjectId,
    color: PendingColor,
}

#[derive(Debug)]
pub struct OutputManagerState {
    global: GlobalId,
    managers: ResourceTable<TreelandOutputManagerV1>,
    controls: ResourceTable<TreelandOutputColorControlV1, ColorControlData>,
    primary_output: Option<String>,
    in_flight: HashMap<OutputId, InFlightCommit>,
}

pub trait OutputManagerHandler {
    fn output_manager_state(&mut self) -> &mut OutputManagerState;

    /// A client asked for a new primary output
    fn primary_output_requested(&mut self, name: &str);

    /// Current colour of an output, `None` if it does not exist
    fn output_color(&mut self, output: OutputId) -> Option<OutputColor>;

    /// Start reconfiguring an output; answer with
    /// [`OutputManagerState::finish_commit`]
    fn commit_output_color(&mut self, output: OutputId, color: PendingColor);
}

impl OutputManagerState {
    pub fn new<D>(dh: &DisplayHandle) -> Self
    where
        D: GlobalDispatch<TreelandOutputManagerV1, ()>
            + Dispatch<TreelandOutputManagerV1, ()>
            + Dispatch<TreelandOutputColorControlV1, ()>
            + OutputManagerHandler
            + 'static,
    {
        Self {
            global: dh.create_global::<D, TreelandOutputManagerV1, ()>(VERSION, ()),
            managers: ResourceTable::new(),
            controls: ResourceTable::new(),
            primary_output: None,
            in_flight: HashMap::new(),
        }
    }

    pub fn global(&self) -> GlobalId {
        self.global.clone()
    }

    pub fn primary_output(&self) -> Option<&str> {
        self.primary_output.as_deref()
    }

    /// Record the primary output and tell every manager about it
    pub fn set_primary_output(&mut self, name: Option<String>) {
        if self.primary_output == name {
            return;
        }
        self.primary_output = name;
        if let Some(name) = &self.primary_output {
            for manager in self.managers.resources() {
                manager.primary_output(name.clone());
            }
        }
    }

    /// Colour values staged by an in-flight commit
    pub fn pending_commit(&self, output: OutputId) -> Option<PendingColor> {
        self.in_flight.get(&output).map(|commit| commit.color)
    }

    pub fn has_pending_commit(&self, output: OutputId) -> bool {
        self.in_flight.contains_key(&output)
    }

    /// Conclude an in-flight commit
    ///
    /// With `applied` set, the new colour is sent to every control of the
    /// output. The committing control gets `result` if it is still around.
    pub fn finish_commit(&mut self, output: OutputId, success: bool, applied: Option<OutputColor>) {
        let Some(commit) = self.in_flight.remove(&output) else {
            warn!("No colour commit in flight for {output}");
            return;
        };
        if let Some(color) = applied {
            self.send_color(output, color);
        }
        match self.controls.resource(&commit.control) {
            Some(control) => control.result(success as u32),
            None => debug!("Colour control of {output} is gone, dropping result"),
        }
    }

    /// Send a colour to every control of an output
    pub fn send_color(&self, output: OutputId, color: OutputColor) {
        for (control, data) in self.controls.iter() {
            if data.output == Some(output) {
                send_color(control, color);
            }
        }
    }

    /// Controls gone with their output are left alone; they report no more
    /// changes and commits on them fail
    pub fn output_removed(&mut self, output: OutputId) {
        if self.in_flight.remove(&output).is_some() {
            debug!("Dropping colour commit of removed {output}");
        }
    }

    pub fn manager_count(&self) -> usize {
        self.managers.len()
    }

    pub fn control_count(&self) -> usize {
        self.controls.len()
    }
}

fn send_color(control: &TreelandOutputColorControlV1, color: OutputColor) {
    control.color_temperature(color.color_temperature);
    control.brightness(brightness_to_wire(color.brightness));
}

impl<D> GlobalDispatch<TreelandOutputManagerV1, (), D> for OutputManagerState
where
    D: GlobalDispatch<TreelandOutputManagerV1, ()>
        + Dispatch<TreelandOutputManagerV1, ()>
        + Dispatch<TreelandOutputColorControlV1, ()>
        + OutputManagerHandler
        + 'static,
{
    fn bind(
        state: &mut D,
        _dh: &DisplayHandle,
        _client: &Client,
        resource: New<TreelandOutputManagerV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, D>,
    ) {
        let manager = data_init.init(resource, ());
        let manager_state = state.output_manager_state();
        if let Some(name) = &manager_state.primary_output {
            manager.primary_output(name.clone());
        }
        manager_state.managers.insert(manager, ());
    }
}

impl<D> Dispatch<TreelandOutputManagerV1, (), D> for OutputManagerState
where
    D: Dispatch<TreelandOutputManagerV1, ()>
        + Dispatch<TreelandOutputColorControlV1, ()>
        + OutputManagerHandler
        + 'static,
{
    fn request(
        state: &mut D,
        _client: &Client,
        resource: &TreelandOutputManagerV1,
        request: treeland_output_manager_v1::Request,
        _data: &(),
        _dh: &DisplayHandle,
        data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            treeland_output_manager_v1::Request::SetPrimaryOutput { output } => {
                state.primary_output_requested(&output)
            }
            treeland_output_manager_v1::Request::GetColorControl { id, output } => {
                let control = data_init.init(id, ());
                let output = output_id(&output);
                let color = output.and_then(|output| state.output_color(output));
                let Some(color) = color else {
                    resource.post_error(wl_display::Error::InvalidObject, "Invalid output resource");
                    return;
                };
                send_color(&control, color);
                state.output_manager_state().controls.insert(
                    control,
                    ColorControlData {
                        output,
                        pending: PendingColor::default(),
                    },
                );
            }
            treeland_output_manager_v1::Request::Destroy => {}
            _ => unreachable!(),
        }
    }

    fn destroyed(state: &mut D, _client: ClientId, resource: &TreelandOutputManagerV1, _data: &()) {
        state.output_manager_state().managers.remove(resource);
    }
}

impl<D> Dispatch<TreelandOutputColorControlV1, (), D> for OutputManagerState
where
    D: Dispatch<TreelandOutputColorControlV1, ()> + OutputManagerHandler + 'static,
{
    fn request(
        state: &mut D,
        _client: &Client,
        resource: &TreelandOutputColorControlV1,
        request: treeland_output_color_control_v1::Request,
        _data: &(),
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            treeland_output_color_control_v1::Request::SetColorTemperature { temperature } => {
                if !COLOR_TEMPERATURE_RANGE.contains(&temperature) {
                    resource.post_error(
                        treeland_output_color_control_v1::Error::InvalidColorTemperature,
                        "Color temperature must be between 1000K and 20000K",
                    );
                    return;
                }
                if let Some(data) = state.output_manager_state().controls.get_mut(resource) {
                    data.pending.color_temperature = Some(temperature);
                }
            }
            treeland_output_color_control_v1::Request::SetBrightness { brightness } => {
                if !(0.0..=100.0).contains(&brightness) {
                    resource.post_error(
                        treeland_output_color_control_v1::Error::InvalidBrightness,
                        "Brightness must be between 0.0 and 100.0",
                    );
                    return;
                }
                if let Some(data) = state.output_manager_state().controls.get_mut(resource) {
                    data.pending.brightness = Some(brightness / 100.0);
                }
            }
            treeland_output_color_control_v1::Request::Commit => {
                let manager = state.output_manager_state();
                let Some(data) = manager.controls.get_mut(resource) else {
                    return;
                };
                let color = std::mem::take(&mut data.pending);
                let Some(output) = data.output else {
                    resource.result(0);
                    return;
                };
                if manager.in_flight.contains_key(&output) {
                    debug!("Colour commit of {output} already in flight");
                    resource.result(0);
                    return;
                }
                if state.output_color(output).is_none() {
                    resource.result(0);
                    return;
                }
                state.output_manager_state().in_flight.insert(
                    output,
                    InFlightCommit {
                        control: resource.id(),
                        color,
                    },
                );
                state.commit_output_color(output, color);
            }
            treeland_output_color_control_v1::Request::Destroy => {}
            _ => unreachable!(),
        }
    }

    fn destroyed(
        state: &mut D,
        _client: ClientId,
        resource: &TreelandOutputColorControlV1,
        _data: &(),
    ) {
        // An in-flight commit still completes; only its result is dropped
        state.output_manager_state().controls.remove(resource);
    }
}

#[macro_export]
macro_rules! delegate_output_manager {
    ($ty: ty) => {
        smithay::reexports::wayland_server::delegate_global_dispatch!($ty: [
            $crate::protocols::output_manager::treeland_output_manager_v1::TreelandOutputManagerV1: ()
        ] => $crate::extensions::output_manager::OutputManagerState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::output_manager::treeland_output_manager_v1::TreelandOutputManagerV1: ()
        ] => $crate::extensions::output_manager::OutputManagerState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::output_manager::treeland_output_color_control_v1::TreelandOutputColorControlV1: ()
        ] => $crate::extensions::output_manager::OutputManagerState);
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_color_only_overrides_staged_values() {
        let mut color = OutputColor::default();
        let pending = PendingColor {
            brightness: Some(0.5),
            color_temperature: None,
        };
        pending.apply_to(&mut color);
        assert_eq!(color.brightness, 0.5);
        assert_eq!(color.color_temperature, OutputColor::default().color_temperature);
        assert!(PendingColor::default().is_empty());
    }

    #[test]
    fn brightness_wire_value_survives_fixed_truncation() {
        let wire = brightness_to_wire(0.25);
        assert_eq!((wire * 256.0) as i32, 6400);
        assert!(wire >= 25.0);
    }
}
