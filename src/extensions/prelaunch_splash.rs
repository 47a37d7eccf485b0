//! `treeland_prelaunch_splash_manager_v1`: show a placeholder window while an
//! application starts

use smithay::reexports::wayland_server::{
    backend::{ClientId, GlobalId},
    Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New,
};
use tracing::info;

use crate::protocols::prelaunch_splash::treeland_prelaunch_splash_manager_v1::{
    self, TreelandPrelaunchSplashManagerV1,
};
use crate::protocols::ResourceTable;

#[derive(Debug)]
pub struct PrelaunchSplashState {
    global: GlobalId,
    managers: ResourceTable<TreelandPrelaunchSplashManagerV1>,
}

pub trait PrelaunchSplashHandler {
    fn prelaunch_splash_state(&mut self) -> &mut PrelaunchSplashState;

    /// Put up a splash for `app_id` until its real window maps
    fn splash_requested(&mut self, app_id: &str, sandbox_engine_name: &str);
}

impl PrelaunchSplashState {
    pub fn new<D>(dh: &DisplayHandle) -> Self
    where
        D: GlobalDispatch<TreelandPrelaunchSplashManagerV1, ()>
            + Dispatch<TreelandPrelaunchSplashManagerV1, ()>
            + PrelaunchSplashHandler
            + 'static,
    {
        Self {
            global: dh.create_global::<D, TreelandPrelaunchSplashManagerV1, ()>(1, ()),
            managers: ResourceTable::new(),
        }
    }

    pub fn global(&self) -> GlobalId {
        self.global.clone()
    }

    pub fn manager_count(&self) -> usize {
        self.managers.len()
    }
}

impl<D> GlobalDispatch<TreelandPrelaunchSplashManagerV1, (), D> for PrelaunchSplashState
where
    D: GlobalDispatch<TreelandPrelaunchSplashManagerV1, ()>
        + Dispatch<TreelandPrelaunchSplashManagerV1, ()>
        + PrelaunchSplashHandler
        + 'static,
{
    fn bind(
        state: &mut D,
        _dh: &DisplayHandle,
        _client: &Client,
        resource: New<TreelandPrelaunchSplashManagerV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, D>,
    ) {
        let manager = data_init.init(resource, ());
        state.prelaunch_splash_state().managers.insert(manager, ());
    }
}

impl<D> Dispatch<TreelandPrelaunchSplashManagerV1, (), D> for PrelaunchSplashState
where
    D: Dispatch<TreelandPrelaunchSplashManagerV1, ()> + PrelaunchSplashHandler + 'static,
{
    fn request(
        state: &mut D,
        _client: &Client,
        _resource: &TreelandPrelaunchSplashManagerV1,
        request: treeland_prelaunch_splash_manager_v1::Request,
        _data: &(),
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            treeland_prelaunch_splash_manager_v1::Request::CreateSplash {
                app_id,
                sandbox_engine_name,
            } => {
                info!(%app_id, sandbox = %sandbox_engine_name, "Splash requested");
                state.splash_requested(&app_id, &sandbox_engine_name);
            }
            treeland_prelaunch_splash_manager_v1::Request::Destroy => {}
            _ => unreachable!(),
        }
    }

    fn destroyed(
        state: &mut D,
        _client: ClientId,
        resource: &TreelandPrelaunchSplashManagerV1,
        _data: &(),
    ) {
        state.prelaunch_splash_state().managers.remove(resource);
    }
}

#[macro_export]
macro_rules! delegate_prelaunch_splash {
    ($ty: ty) => {
        smithay::reexports::wayland_server::delegate_global_dispatch!($ty: [
            $crate::protocols::prelaunch_splash::treeland_prelaunch_splash_manager_v1::TreelandPrelaunchSplashManagerV1: ()
        ] => $crate::extensions::prelaunch_splash::PrelaunchSplashState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::prelaunch_splash::treeland_prelaunch_splash_manager_v1::TreelandPrelaunchSplashManagerV1: ()
        ] => $crate::extensions::prelaunch_splash::PrelaunchSplashState);
    };
}
