//! Client bindings of the treeland protocol extensions

macro_rules! client_protocol {
    ($name:ident, $path:tt) => {
        #[allow(missing_docs, clippy::all, unused_imports, non_upper_case_globals)]
        pub mod $name {
            use smithay_client_toolkit::reexports::client as wayland_client;
            use smithay_client_toolkit::reexports::client::protocol::*;

            pub mod __interfaces {
                use smithay_client_toolkit::reexports::client::protocol::__interfaces::*;
                wayland_scanner::generate_interfaces!($path);
            }
            use self::__interfaces::*;

            wayland_scanner::generate_client_code!($path);
        }
    };
}

client_protocol!(output_manager, "protocols/treeland-output-manager-v1.xml");
client_protocol!(shortcut_manager, "protocols/treeland-shortcut-manager-v2.xml");
client_protocol!(app_id_resolver, "protocols/treeland-app-id-resolver-v1.xml");
client_protocol!(window_management, "protocols/treeland-window-management-v1.xml");
client_protocol!(foreign_toplevel, "protocols/treeland-foreign-toplevel-manager-v1.xml");
client_protocol!(wallpaper_color, "protocols/treeland-wallpaper-color-v1.xml");
client_protocol!(screensaver, "protocols/treeland-screensaver-v1.xml");
client_protocol!(virtual_output, "protocols/treeland-virtual-output-manager-v1.xml");
client_protocol!(personalization, "protocols/treeland-personalization-manager-v1.xml");
client_protocol!(prelaunch_splash, "protocols/treeland-prelaunch-splash-v1.xml");
client_protocol!(keystate, "protocols/kde-keystate.xml");
client_protocol!(capture, "protocols/treeland-capture-unstable-v1.xml");
client_protocol!(dde_shell, "protocols/treeland-dde-shell-v1.xml");
