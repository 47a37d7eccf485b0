//! `treeland_personalization_manager_v1`: per-window decoration hints plus the
//! user's cursor and appearance settings
//!
//! Cursor and appearance values live in [`Config`] and are written back to
//! its file whenever a client changes them.

use smithay::reexports::wayland_server::{
    backend::{ClientId, GlobalId},
    Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New,
};
use smithay::utils::{Logical, Point};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::log_error;
use crate::protocols::personalization::{
    treeland_personalization_appearance_context_v1::{
        self as appearance_context, TreelandPersonalizationAppearanceContextV1,
    },
    treeland_personalization_cursor_context_v1::{
        self as cursor_context, TreelandPersonalizationCursorContextV1,
    },
    treeland_personalization_manager_v1::{self, TreelandPersonalizationManagerV1},
    treeland_personalization_window_context_v1::{
        self as window_context, TreelandPersonalizationWindowContextV1,
    },
};
use crate::protocols::ResourceTable;
use crate::surface::{surface_id, SurfaceId};

/// A changed appearance value, sent to every appearance context
#[derive(Debug, Clone, PartialEq, Eq)]
enum AppearanceValue {
    RoundCornerRadius(i32),
    IconTheme(String),
    ActiveColor(String),
    WindowOpacity(u32),
    WindowThemeType(u32),
    WindowTitlebarHeight(u32),
}

impl AppearanceValue {
    fn send(&self, context: &TreelandPersonalizationAppearanceContextV1) {
        match self {
            AppearanceValue::RoundCornerRadius(radius) => context.round_corner_radius(*radius),
            AppearanceValue::IconTheme(theme) => context.icon_theme(theme.clone()),
            AppearanceValue::ActiveColor(color) => context.active_color(color.clone()),
            AppearanceValue::WindowOpacity(opacity) => context.window_opacity(*opacity),
            AppearanceValue::WindowThemeType(theme_type) => context.window_theme_type(*theme_type),
            AppearanceValue::WindowTitlebarHeight(height) => {
                context.window_titlebar_height(*height)
            }
        }
    }
}

/// `set_titlebar` modes
pub mod titlebar_mode {
    pub const ENABLE: u32 = 0;
    pub const DISABLE: u32 = 1;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgba {
    pub r: i32,
    pub g: i32,
    pub b: i32,
    pub a: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shadow {
    pub radius: i32,
    pub offset: Point<i32, Logical>,
    pub color: Rgba,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Border {
    pub width: i32,
    pub color: Rgba,
}

/// Decoration hints a client set for one of its windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowPersonalization {
    pub blend_mode: i32,
    pub corner_radius: Option<i32>,
    pub shadow: Option<Shadow>,
    pub border: Option<Border>,
    pub no_titlebar: bool,
}

#[derive(Debug, Default)]
struct CursorData {
    theme: String,
    size: u32,
}

#[derive(Debug)]
pub struct PersonalizationState {
    global: GlobalId,
    managers: ResourceTable<TreelandPersonalizationManagerV1>,
    windows: ResourceTable<TreelandPersonalizationWindowContextV1, (SurfaceId, WindowPersonalization)>,
    cursors: ResourceTable<TreelandPersonalizationCursorContextV1, CursorData>,
    appearances: ResourceTable<TreelandPersonalizationAppearanceContextV1>,
}

pub trait PersonalizationHandler {
    fn personalization_state(&mut self) -> &mut PersonalizationState;

    fn config(&mut self) -> &mut Config;

    /// Window hints changed; `None` once the context is gone
    fn window_personalization_changed(
        &mut self,
        surface: SurfaceId,
        personalization: Option<WindowPersonalization>,
    );

    /// A cursor or appearance value in the config changed
    fn appearance_changed(&mut self) {}
}

impl PersonalizationState {
    pub fn new<D>(dh: &DisplayHandle) -> Self
    where
        D: GlobalDispatch<TreelandPersonalizationManagerV1, ()>
            + Dispatch<TreelandPersonalizationManagerV1, ()>
            + Dispatch<TreelandPersonalizationWindowContextV1, ()>
            + Dispatch<TreelandPersonalizationCursorContextV1, ()>
            + Dispatch<TreelandPersonalizationAppearanceContextV1, ()>
            + PersonalizationHandler
            + 'static,
    {
        Self {
            global: dh.create_global::<D, TreelandPersonalizationManagerV1, ()>(1, ()),
            managers: ResourceTable::new(),
            windows: ResourceTable::new(),
            cursors: ResourceTable::new(),
            appearances: ResourceTable::new(),
        }
    }

    pub fn global(&self) -> GlobalId {
        self.global.clone()
    }

    /// Hints of the latest window context for `surface`
    pub fn window(&self, surface: SurfaceId) -> Option<WindowPersonalization> {
        self.windows
            .iter()
            .find(|(_, (s, _))| *s == surface)
            .map(|(_, (_, p))| *p)
    }

    /// Move window hints to the id a surface took over
    pub fn surface_renamed(&mut self, from: SurfaceId, to: SurfaceId) {
        for (_, (surface, _)) in self.windows.iter_mut() {
            if *surface == from {
                *surface = to;
            }
        }
    }

    fn broadcast_appearance(&self, value: &AppearanceValue) {
        for context in self.appearances.resources() {
            value.send(&context);
        }
    }
}

fn persist(config: &Config) {
    if config.is_writable() {
        log_error(config.save_to_file());
    }
}

impl<D> GlobalDispatch<TreelandPersonalizationManagerV1, (), D> for PersonalizationState
where
    D: GlobalDispatch<TreelandPersonalizationManagerV1, ()>
        + Dispatch<TreelandPersonalizationManagerV1, ()>
        + Dispatch<TreelandPersonalizationWindowContextV1, ()>
        + Dispatch<TreelandPersonalizationCursorContextV1, ()>
        + Dispatch<TreelandPersonalizationAppearanceContextV1, ()>
        + PersonalizationHandler
        + 'static,
{
    fn bind(
        state: &mut D,
        _dh: &DisplayHandle,
        _client: &Client,
        resource: New<TreelandPersonalizationManagerV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, D>,
    ) {
        let manager = data_init.init(resource, ());
        state.personalization_state().managers.insert(manager, ());
    }
}

impl<D> Dispatch<TreelandPersonalizationManagerV1, (), D> for PersonalizationState
where
    D: Dispatch<TreelandPersonalizationManagerV1, ()>
        + Dispatch<TreelandPersonalizationWindowContextV1, ()>
        + Dispatch<TreelandPersonalizationCursorContextV1, ()>
        + Dispatch<TreelandPersonalizationAppearanceContextV1, ()>
        + PersonalizationHandler
        + 'static,
{
    fn request(
        state: &mut D,
        _client: &Client,
        _resource: &TreelandPersonalizationManagerV1,
        request: treeland_personalization_manager_v1::Request,
        _data: &(),
        _dh: &DisplayHandle,
        data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            treeland_personalization_manager_v1::Request::GetWindowContext { id, surface } => {
                let context = data_init.init(id, ());
                let surface = surface_id(&surface);
                debug!("Window context for {surface}");
                state
                    .personalization_state()
                    .windows
                    .insert(context, (surface, WindowPersonalization::default()));
            }
            treeland_personalization_manager_v1::Request::GetCursorContext { id } => {
                let context = data_init.init(id, ());
                state
                    .personalization_state()
                    .cursors
                    .insert(context, CursorData::default());
            }
            treeland_personalization_manager_v1::Request::GetAppearanceContext { id } => {
                let context = data_init.init(id, ());
                state.personalization_state().appearances.insert(context, ());
            }
            treeland_personalization_manager_v1::Request::Destroy => {}
            _ => unreachable!(),
        }
    }

    fn destroyed(
        state: &mut D,
        _client: ClientId,
        resource: &TreelandPersonalizationManagerV1,
        _data: &(),
    ) {
        state.personalization_state().managers.remove(resource);
    }
}

impl<D> Dispatch<TreelandPersonalizationWindowContextV1, (), D> for PersonalizationState
where
    D: Dispatch<TreelandPersonalizationWindowContextV1, ()> + PersonalizationHandler + 'static,
{
    fn request(
        state: &mut D,
        _client: &Client,
        resource: &TreelandPersonalizationWindowContextV1,
        request: window_context::Request,
        _data: &(),
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        let Some((surface, window)) = state.personalization_state().windows.get_mut(resource)
        else {
            return;
        };
        match request {
            window_context::Request::SetBlendMode { mode } => window.blend_mode = mode,
            window_context::Request::SetRoundCornerRadius { radius } => {
                window.corner_radius = Some(radius)
            }
            window_context::Request::SetShadow {
                radius,
                offset_x,
                offset_y,
                r,
                g,
                b,
                a,
            } => {
                window.shadow = Some(Shadow {
                    radius,
                    offset: (offset_x, offset_y).into(),
                    color: Rgba { r, g, b, a },
                })
            }
            window_context::Request::SetBorder { width, r, g, b, a } => {
                window.border = Some(Border {
                    width,
                    color: Rgba { r, g, b, a },
                })
            }
            window_context::Request::SetTitlebar { mode } => {
                window.no_titlebar = mode == titlebar_mode::DISABLE
            }
            window_context::Request::Destroy => return,
            _ => unreachable!(),
        }
        let (surface, window) = (*surface, *window);
        state.window_personalization_changed(surface, Some(window));
    }

    fn destroyed(
        state: &mut D,
        _client: ClientId,
        resource: &TreelandPersonalizationWindowContextV1,
        _data: &(),
    ) {
        let personalization = state.personalization_state();
        if let Some((_, (surface, _))) = personalization.windows.remove(resource) {
            let remaining = personalization.window(surface);
            state.window_personalization_changed(surface, remaining);
        }
    }
}

impl<D> Dispatch<TreelandPersonalizationCursorContextV1, (), D> for PersonalizationState
where
    D: Dispatch<TreelandPersonalizationCursorContextV1, ()> + PersonalizationHandler + 'static,
{
    fn request(
        state: &mut D,
        _client: &Client,
        resource: &TreelandPersonalizationCursorContextV1,
        request: cursor_context::Request,
        _data: &(),
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            cursor_context::Request::SetTheme { name } => {
                if let Some(cursor) = state.personalization_state().cursors.get_mut(resource) {
                    cursor.theme = name;
                }
            }
            cursor_context::Request::SetSize { size } => {
                if let Some(cursor) = state.personalization_state().cursors.get_mut(resource) {
                    cursor.size = size;
                }
            }
            cursor_context::Request::GetTheme => {
                resource.theme(state.config().cursor_theme.clone());
            }
            cursor_context::Request::GetSize => {
                resource.size(state.config().cursor_size);
            }
            cursor_context::Request::Commit => {
                let Some(cursor) = state.personalization_state().cursors.get_mut(resource) else {
                    return;
                };
                let CursorData { theme, size } = std::mem::take(cursor);
                let config = state.config();
                if !config.is_writable() {
                    warn!("Cursor settings cannot be persisted");
                    resource.verfity(0);
                    return;
                }
                if size > 0 {
                    config.cursor_size = size;
                }
                if !theme.is_empty() {
                    config.cursor_theme = theme;
                }
                info!(
                    theme = %config.cursor_theme,
                    size = config.cursor_size,
                    "Cursor settings committed"
                );
                persist(config);
                resource.verfity(1);
                state.appearance_changed();
            }
            cursor_context::Request::Destroy => {}
            _ => unreachable!(),
        }
    }

    fn destroyed(
        state: &mut D,
        _client: ClientId,
        resource: &TreelandPersonalizationCursorContextV1,
        _data: &(),
    ) {
        state.personalization_state().cursors.remove(resource);
    }
}

impl<D> Dispatch<TreelandPersonalizationAppearanceContextV1, (), D> for PersonalizationState
where
    D: Dispatch<TreelandPersonalizationAppearanceContextV1, ()> + PersonalizationHandler + 'static,
{
    fn request(
        state: &mut D,
        _client: &Client,
        resource: &TreelandPersonalizationAppearanceContextV1,
        request: appearance_context::Request,
        _data: &(),
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        use appearance_context::Request;

        let config = state.config();
        let value = match request {
            Request::GetRoundCornerRadius => {
                resource.round_corner_radius(config.window_radius);
                return;
            }
            Request::GetIconTheme => {
                resource.icon_theme(config.icon_theme.clone());
                return;
            }
            Request::GetActiveColor => {
                resource.active_color(config.active_color.clone());
                return;
            }
            Request::GetWindowOpacity => {
                resource.window_opacity(config.window_opacity);
                return;
            }
            Request::GetWindowThemeType => {
                resource.window_theme_type(config.window_theme_type);
                return;
            }
            Request::GetWindowTitlebarHeight => {
                resource.window_titlebar_height(config.titlebar_height);
                return;
            }
            Request::SetRoundCornerRadius { radius } => {
                if config.window_radius == radius {
                    return;
                }
                config.window_radius = radius;
                AppearanceValue::RoundCornerRadius(radius)
            }
            Request::SetIconTheme { theme_name } => {
                if config.icon_theme == theme_name {
                    return;
                }
                config.icon_theme = theme_name.clone();
                AppearanceValue::IconTheme(theme_name)
            }
            Request::SetActiveColor { active_color } => {
                if config.active_color == active_color {
                    return;
                }
                config.active_color = active_color.clone();
                AppearanceValue::ActiveColor(active_color)
            }
            Request::SetWindowOpacity { opacity } => {
                let opacity = opacity.min(100);
                if config.window_opacity == opacity {
                    return;
                }
                config.window_opacity = opacity;
                AppearanceValue::WindowOpacity(opacity)
            }
            Request::SetWindowThemeType { theme_type } => {
                if config.window_theme_type == theme_type {
                    return;
                }
                config.window_theme_type = theme_type;
                AppearanceValue::WindowThemeType(theme_type)
            }
            Request::SetWindowTitlebarHeight { height } => {
                if config.titlebar_height == height {
                    return;
                }
                config.titlebar_height = height;
                AppearanceValue::WindowTitlebarHeight(height)
            }
            Request::Destroy => return,
            _ => unreachable!(),
        };
        debug!("Appearance changed: {value:?}");
        persist(config);
        state.personalization_state().broadcast_appearance(&value);
        state.appearance_changed();
    }

    fn destroyed(
        state: &mut D,
        _client: ClientId,
        resource: &TreelandPersonalizationAppearanceContextV1,
        _data: &(),
    ) {
        state.personalization_state().appearances.remove(resource);
    }
}

#[macro_export]
macro_rules! delegate_personalization {
    ($ty: ty) => {
        smithay::reexports::wayland_server::delegate_global_dispatch!($ty: [
            $crate::protocols::personalization::treeland_personalization_manager_v1::TreelandPersonalizationManagerV1: ()
        ] => $crate::extensions::personalization::PersonalizationState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::personalization::treeland_personalization_manager_v1::TreelandPersonalizationManagerV1: ()
        ] => $crate::extensions::personalization::PersonalizationState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::personalization::treeland_personalization_window_context_v1::TreelandPersonalizationWindowContextV1: ()
        ] => $crate::extensions::personalization::PersonalizationState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::personalization::treeland_personalization_cursor_context_v1::TreelandPersonalizationCursorContextV1: ()
        ] => $crate::extensions::personalization::PersonalizationState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::personalization::treeland_personalization_appearance_context_v1::TreelandPersonalizationAppearanceContextV1: ()
        ] => $crate::extensions::personalization::PersonalizationState);
    };
}
