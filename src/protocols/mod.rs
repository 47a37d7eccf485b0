//! Server bindings of the treeland protocol extensions
//!
//! Each module is generated by `wayland-scanner` from the XML file of the
//! same name under `protocols/`. Standard protocols (`ext-session-lock`,
//! `ext-foreign-toplevel-list`, xdg-shell) come from `wayland-protocols`
//! through smithay's reexports instead.
//!
//! [`ResourceTable`] is the per-global index the extensions keep of the
//! objects they handed out.

mod table;

pub use table::ResourceTable;

macro_rules! server_protocol {
    ($(#[$attr:meta])* $name:ident, $path:tt) => {
        $(#[$attr])*
        #[allow(missing_docs, clippy::all, unused_imports, non_upper_case_globals)]
        pub mod $name {
            use smithay::reexports::wayland_server;
            use smithay::reexports::wayland_server::protocol::*;

            pub mod __interfaces {
                use smithay::reexports::wayland_server::protocol::__interfaces::*;
                wayland_scanner::generate_interfaces!($path);
            }
            use self::__interfaces::*;

            wayland_scanner::generate_server_code!($path);
        }
    };
}

server_protocol!(
    /// Primary output and per-output colour control
    output_manager,
    "protocols/treeland-output-manager-v1.xml"
);
server_protocol!(shortcut_manager, "protocols/treeland-shortcut-manager-v2.xml");
server_protocol!(app_id_resolver, "protocols/treeland-app-id-resolver-v1.xml");
server_protocol!(window_management, "protocols/treeland-window-management-v1.xml");
server_protocol!(
    /// Taskbar toplevel handles and the dock preview context
    foreign_toplevel,
    "protocols/treeland-foreign-toplevel-manager-v1.xml"
);
server_protocol!(wallpaper_color, "protocols/treeland-wallpaper-color-v1.xml");
server_protocol!(screensaver, "protocols/treeland-screensaver-v1.xml");
server_protocol!(virtual_output, "protocols/treeland-virtual-output-manager-v1.xml");
server_protocol!(personalization, "protocols/treeland-personalization-manager-v1.xml");
server_protocol!(prelaunch_splash, "protocols/treeland-prelaunch-splash-v1.xml");
server_protocol!(keystate, "protocols/kde-keystate.xml");
server_protocol!(
    /// Interactive screen capture: contexts, frames and sessions
    capture,
    "protocols/treeland-capture-unstable-v1.xml"
);
server_protocol!(
    /// Private interfaces of the desktop shell
    dde_shell,
    "protocols/treeland-dde-shell-v1.xml"
);
