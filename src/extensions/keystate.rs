//! `org_kde_kwin_keystate`: lock key and modifier state for on-screen indicators

use smithay::reexports::wayland_server::{
    backend::{ClientId, GlobalId},
    Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource,
};
use tracing::trace;
use xkbcommon::xkb;

use crate::protocols::keystate::org_kde_kwin_keystate::{self, OrgKdeKwinKeystate};
use crate::protocols::ResourceTable;

const VERSION: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Key {
    CapsLock = 0,
    NumLock = 1,
    ScrollLock = 2,
    Alt = 3,
    Shift = 4,
    Control = 5,
    Meta = 6,
    AltGr = 7,
}

impl Key {
    /// Modifier keys are only known to version 5 clients
    const MODIFIER_SINCE: u32 = 5;

    pub fn is_modifier(&self) -> bool {
        !matches!(self, Key::CapsLock | Key::NumLock | Key::ScrollLock)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum KeyState {
    #[default]
    Unlocked = 0,
    Latched = 1,
    Locked = 2,
    Pressed = 3,
}

/// Snapshot of the seat keyboard as the input layer last saw it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyboardState {
    pub caps_lock: bool,
    pub num_lock: bool,
    pub scroll_lock: bool,
    pub alt: KeyState,
    pub shift: KeyState,
    pub control: KeyState,
    pub meta: KeyState,
    pub alt_gr: KeyState,
}

impl KeyboardState {
    /// Read leds and modifiers from an xkb state
    pub fn from_xkb(state: &xkb::State) -> Self {
        let lock = |name: &str| state.led_name_is_active(name);
        let modifier = |name: &str| {
            if state.mod_name_is_active(name, xkb::STATE_MODS_LOCKED) {
                KeyState::Locked
            } else if state.mod_name_is_active(name, xkb::STATE_MODS_LATCHED) {
                KeyState::Latched
            } else if state.mod_name_is_active(name, xkb::STATE_MODS_DEPRESSED) {
                KeyState::Pressed
            } else {
                KeyState::Unlocked
            }
        };
        Self {
            caps_lock: lock(xkb::LED_NAME_CAPS),
            num_lock: lock(xkb::LED_NAME_NUM),
            scroll_lock: lock(xkb::LED_NAME_SCROLL),
            alt: modifier(xkb::MOD_NAME_ALT),
            shift: modifier(xkb::MOD_NAME_SHIFT),
            control: modifier(xkb::MOD_NAME_CTRL),
            meta: modifier(xkb::MOD_NAME_LOGO),
            alt_gr: modifier("Mod5"),
        }
    }

    /// Every key in send order
    pub fn states(&self) -> [(Key, KeyState); 8] {
        let led = |on: bool| if on { KeyState::Locked } else { KeyState::Unlocked };
        [
            (Key::ScrollLock, led(self.scroll_lock)),
            (Key::Alt, self.alt),
            (Key::Shift, self.shift),
            (Key::Control, self.control),
            (Key::Meta, self.meta),
            (Key::AltGr, self.alt_gr),
            (Key::CapsLock, led(self.caps_lock)),
            (Key::NumLock, led(self.num_lock)),
        ]
    }
}

#[derive(Debug)]
pub struct KeystateState {
    global: GlobalId,
    resources: ResourceTable<OrgKdeKwinKeystate>,
    keyboard: Option<KeyboardState>,
}

pub trait KeystateHandler {
    fn keystate_state(&mut self) -> &mut KeystateState;
}

impl KeystateState {
    pub fn new<D>(dh: &DisplayHandle) -> Self
    where
        D: GlobalDispatch<OrgKdeKwinKeystate, ()>
            + Dispatch<OrgKdeKwinKeystate, ()>
            + KeystateHandler
            + 'static,
    {
        Self {
            global: dh.create_global::<D, OrgKdeKwinKeystate, ()>(VERSION, ()),
            resources: ResourceTable::new(),
            keyboard: None,
        }
    }

    pub fn global(&self) -> GlobalId {
        self.global.clone()
    }

    pub fn keyboard(&self) -> Option<KeyboardState> {
        self.keyboard
    }

    /// Record a new keyboard state and push it to every resource
    pub fn update_keyboard(&mut self, keyboard: Option<KeyboardState>) {
        if self.keyboard == keyboard {
            return;
        }
        self.keyboard = keyboard;
        for resource in self.resources.resources() {
            self.send_states(&resource);
        }
    }

    fn send_states(&self, resource: &OrgKdeKwinKeystate) {
        // Nothing to report without a keyboard
        let Some(keyboard) = self.keyboard else {
            return;
        };
        trace!("Sending key states to {}", resource.id());
        let modifiers = resource.version() >= Key::MODIFIER_SINCE;
        for (key, state) in keyboard.states() {
            if key.is_modifier() && !modifiers {
                continue;
            }
            resource.state_changed(key as u32, state as u32);
        }
    }
}

impl<D> GlobalDispatch<OrgKdeKwinKeystate, (), D> for KeystateState
where
    D: GlobalDispatch<OrgKdeKwinKeystate, ()>
        + Dispatch<OrgKdeKwinKeystate, ()>
        + KeystateHandler
        + 'static,
{
    fn bind(
        state: &mut D,
        _dh: &DisplayHandle,
        _client: &Client,
        resource: New<OrgKdeKwinKeystate>,
        _global_data: &(),
        data_init: &mut DataInit<'_, D>,
    ) {
        let resource = data_init.init(resource, ());
        state.keystate_state().resources.insert(resource, ());
    }
}

impl<D> Dispatch<OrgKdeKwinKeystate, (), D> for KeystateState
where
    D: Dispatch<OrgKdeKwinKeystate, ()> + KeystateHandler + 'static,
{
    fn request(
        state: &mut D,
        _client: &Client,
        resource: &OrgKdeKwinKeystate,
        request: org_kde_kwin_keystate::Request,
        _data: &(),
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        match request {
            org_kde_kwin_keystate::Request::FetchStates => {
                state.keystate_state().send_states(resource)
            }
            org_kde_kwin_keystate::Request::Destroy => {}
            _ => unreachable!(),
        }
    }

    fn destroyed(state: &mut D, _client: ClientId, resource: &OrgKdeKwinKeystate, _data: &()) {
        state.keystate_state().resources.remove(resource);
    }
}

#[macro_export]
macro_rules! delegate_keystate {
    ($ty: ty) => {
        smithay::reexports::wayland_server::delegate_global_dispatch!($ty: [
            $crate::protocols::keystate::org_kde_kwin_keystate::OrgKdeKwinKeystate: ()
        ] => $crate::extensions::keystate::KeystateState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::keystate::org_kde_kwin_keystate::OrgKdeKwinKeystate: ()
        ] => $crate::extensions::keystate::KeystateState);
    };
}
