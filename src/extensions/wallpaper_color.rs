//! `treeland_wallpaper_color_manager_v1`: whether each output's wallpaper is dark

use std::collections::{BTreeSet, HashMap};

use smithay::reexports::wayland_server::{
    backend::{ClientId, GlobalId},
    Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New,
};
use tracing::{debug, warn};

use crate::protocols::wallpaper_color::treeland_wallpaper_color_manager_v1::{
    self, TreelandWallpaperColorManagerV1,
};
use crate::protocols::ResourceTable;

#[derive(Debug)]
pub struct WallpaperColorState {
    global: GlobalId,
    /// Watched output names per resource
    watchers: ResourceTable<TreelandWallpaperColorManagerV1, BTreeSet<String>>,
    colors: HashMap<String, bool>,
}

pub trait WallpaperColorHandler {
    fn wallpaper_color_state(&mut self) -> &mut WallpaperColorState;
}

impl WallpaperColorState {
    pub fn new<D>(dh: &DisplayHandle) -> Self
    where
        D: GlobalDispatch<TreelandWallpaperColorManagerV1, ()>
            + Dispatch<TreelandWallpaperColorManagerV1, ()>
            + WallpaperColorHandler
            + 'static,
    {
        Self {
            global: dh.create_global::<D, TreelandWallpaperColorManagerV1, ()>(1, ()),
            watchers: ResourceTable::new(),
            colors: HashMap::new(),
        }
    }

    pub fn global(&self) -> GlobalId {
        self.global.clone()
    }

    pub fn is_dark(&self, output: &str) -> Option<bool> {
        self.colors.get(output).copied()
    }

    /// Record the wallpaper tone of `output` and notify its watchers
    pub fn update_wallpaper_color(&mut self, output: &str, is_dark: bool) {
        if self.colors.get(output) == Some(&is_dark) {
            return;
        }
        debug!(output, is_dark, "Wallpaper color changed");
        self.colors.insert(output.to_string(), is_dark);
        for (resource, watched) in self.watchers.iter() {
            if watched.contains(output) {
                resource.output_color(output.to_string(), is_dark as u32);
            }
        }
    }
}

impl<D> GlobalDispatch<TreelandWallpaperColorManagerV1, (), D> for WallpaperColorState
where
    D: GlobalDispatch<TreelandWallpaperColorManagerV1, ()>
        + Dispatch<TreelandWallpaperColorManagerV1, ()>
        + WallpaperColorHandler
        + 'static,
{
    fn bind(
        state: &mut D,
        _dh: &DisplayHandle,
        _client: &Client,
        resource: New<TreelandWallpaperColorManagerV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, D>,
    ) {
        let resource = data_init.init(resource, ());
        state
            .wallpaper_color_state()
            .watchers
            .insert(resource, BTreeSet::new());
    }
}

impl<D> Dispatch<TreelandWallpaperColorManagerV1, (), D> for WallpaperColorState
where
    D: Dispatch<TreelandWallpaperColorManagerV1, ()> + WallpaperColorHandler + 'static,
{
    fn request(
        state: &mut D,
        _client: &Client,
        resource: &TreelandWallpaperColorManagerV1,
        request: treeland_wallpaper_color_manager_v1::Request,
        _data: &(),
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        let colors = state.wallpaper_color_state();
        match request {
            treeland_wallpaper_color_manager_v1::Request::Watch { output } => {
                let Some(&is_dark) = colors.colors.get(&output) else {
                    warn!(%output, "Wallpaper color never set, ignoring watch");
                    return;
                };
                resource.output_color(output.clone(), is_dark as u32);
                if let Some(watched) = colors.watchers.get_mut(resource) {
                    watched.insert(output);
                }
            }
            treeland_wallpaper_color_manager_v1::Request::Unwatch { output } => {
                if let Some(watched) = colors.watchers.get_mut(resource) {
                    watched.remove(&output);
                }
            }
            treeland_wallpaper_color_manager_v1::Request::Destroy => {}
            _ => unreachable!(),
        }
    }

    fn destroyed(
        state: &mut D,
        _client: ClientId,
        resource: &TreelandWallpaperColorManagerV1,
        _data: &(),
    ) {
        state.wallpaper_color_state().watchers.remove(resource);
    }
}

#[macro_export]
macro_rules! delegate_wallpaper_color {
    ($ty: ty) => {
        smithay::reexports::wayland_server::delegate_global_dispatch!($ty: [
            $crate::protocols::wallpaper_color::treeland_wallpaper_color_manager_v1::TreelandWallpaperColorManagerV1: ()
        ] => $crate::extensions::wallpaper_color::WallpaperColorState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::wallpaper_color::treeland_wallpaper_color_manager_v1::TreelandWallpaperColorManagerV1: ()
        ] => $crate::extensions::wallpaper_color::WallpaperColorState);
    };
}
