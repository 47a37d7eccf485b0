//! Concrete protocol globals
//!
//! Each module follows the same shape: an `XxxState` holding the global and
//! the resources it handed out, an `XxxHandler` trait the server implements
//! to reach that state and the subsystems behind it, the
//! `GlobalDispatch`/`Dispatch` impls and a `delegate_xxx!` macro wiring them
//! onto the server type.

pub mod app_id_resolver;
pub mod capture;
pub mod dde_shell;
pub mod ext_toplevel_list;
pub mod foreign_toplevel;
pub mod keystate;
pub mod output_manager;
pub mod personalization;
pub mod prelaunch_splash;
pub mod screensaver;
pub mod session_lock;
pub mod shortcut;
pub mod virtual_output;
pub mod wallpaper_color;
pub mod window_management;
