//! Keyboard shortcut dispatch and key state reporting

use tracing::{debug, info, trace};

use crate::extensions::{
    keystate::{KeyboardState, KeystateHandler, KeystateState},
    shortcut::{
        GestureKey, KeyCombination, KeybindFlags, ShortcutAction, ShortcutHandler,
        ShortcutOutcome, ShortcutState,
    },
    window_management::DesktopState,
};
use crate::state::{CompositorMode, Server};
use crate::workspace::WorkspaceId;

impl Server {
    /// Run the bindings of `session` matching a key chord
    ///
    /// Returns whether anything fired, in which case the key is consumed.
    pub fn handle_key_shortcut(
        &mut self,
        session: u32,
        combination: KeyCombination,
        flags: KeybindFlags,
    ) -> bool {
        if self.mode == CompositorMode::LockScreen {
            return false;
        }
        let fired = self
            .protocols
            .shortcut_state
            .controller(session)
            .map(|controller| controller.dispatch_key(combination, flags))
            .unwrap_or_default();
        trace!(session, ?combination, count = fired.len(), "Key shortcut lookup");
        self.run_fired(session, fired, flags)
    }

    /// Run the bindings of `session` matching a recognised gesture
    pub fn handle_gesture_shortcut(&mut self, session: u32, gesture: GestureKey) -> bool {
        if self.mode == CompositorMode::LockScreen {
            return false;
        }
        let fired = self
            .protocols
            .shortcut_state
            .controller(session)
            .map(|controller| controller.dispatch_gesture(gesture))
            .unwrap_or_default();
        self.run_fired(session, fired, KeybindFlags::empty())
    }

    fn run_fired(
        &mut self,
        session: u32,
        fired: Vec<(ShortcutAction, String)>,
        flags: KeybindFlags,
    ) -> bool {
        let any = !fired.is_empty();
        for (action, name) in fired {
            if action == ShortcutAction::Notify {
                self.protocols
                    .shortcut_state
                    .send_activated(session, &name, flags);
                self.shortcut_outcomes.push(ShortcutOutcome::Activated { name });
            } else {
                debug!(%name, ?action, "Shortcut fired");
                self.run_shortcut_action(action);
            }
        }
        any
    }

    fn run_shortcut_action(&mut self, action: ShortcutAction) {
        match action {
            ShortcutAction::Workspace1 => self.switch_to_index(0),
            ShortcutAction::Workspace2 => self.switch_to_index(1),
            ShortcutAction::Workspace3 => self.switch_to_index(2),
            ShortcutAction::Workspace4 => self.switch_to_index(3),
            ShortcutAction::Workspace5 => self.switch_to_index(4),
            ShortcutAction::Workspace6 => self.switch_to_index(5),
            ShortcutAction::PrevWorkspace => {
                let count = self.workspaces.count();
                let current = usize::from(self.workspaces.current().get());
                self.switch_to_index((current + count - 1) % count);
            }
            ShortcutAction::NextWorkspace => {
                let count = self.workspaces.count();
                let current = usize::from(self.workspaces.current().get());
                self.switch_to_index((current + 1) % count);
            }
            ShortcutAction::ShowDesktop => {
                if self.mode == CompositorMode::Multitaskview {
                    debug!("Show desktop ignored in multitask view");
                    return;
                }
                let next = match self.protocols.window_management_state.desktop_state() {
                    DesktopState::Normal => DesktopState::Show,
                    _ => DesktopState::Normal,
                };
                self.set_desktop_state(next);
            }
            ShortcutAction::Maximize => {
                if let Some(wrapper) = self.active_wrapper_mut() {
                    wrapper.request_maximize();
                }
            }
            ShortcutAction::CancelMaximize => {
                if let Some(wrapper) = self.active_wrapper_mut() {
                    wrapper.request_cancel_maximize();
                }
            }
            ShortcutAction::CloseWindow => {
                if let Some(wrapper) = self.active_wrapper_mut() {
                    wrapper.request_close();
                }
            }
            ShortcutAction::Lockscreen => self.enter_lock_screen(),
            ShortcutAction::Quit => {
                info!("Quit requested by shortcut");
                self.request_quit();
            }
            ShortcutAction::OpenMultitaskView => self.set_multitask_view(true),
            ShortcutAction::CloseMultitaskView => self.set_multitask_view(false),
            ShortcutAction::ToggleMultitaskView => {
                let open = self.mode != CompositorMode::Multitaskview;
                self.set_multitask_view(open);
            }
            other => self.shortcut_outcomes.push(ShortcutOutcome::Action(other)),
        }
    }

    fn switch_to_index(&mut self, index: usize) {
        let Ok(index) = u8::try_from(index) else {
            return;
        };
        self.switch_workspace(WorkspaceId::new(index));
    }

    fn active_wrapper_mut(&mut self) -> Option<&mut crate::surface::SurfaceWrapper> {
        let active = self.surfaces.active()?;
        self.surfaces.get_mut(active)
    }

    pub(crate) fn set_multitask_view(&mut self, open: bool) {
        let target = if open {
            CompositorMode::Multitaskview
        } else {
            CompositorMode::Normal
        };
        if self.mode == target {
            return;
        }
        debug!("Compositor mode {:?} -> {target:?}", self.mode);
        self.mode = target;
        let action = if open {
            ShortcutAction::OpenMultitaskView
        } else {
            ShortcutAction::CloseMultitaskView
        };
        self.shortcut_outcomes.push(ShortcutOutcome::Action(action));
    }

    /// The input layer saw the keyboard lock or modifier state change
    pub fn update_keyboard_state(&mut self, keyboard: Option<KeyboardState>) {
        self.protocols.keystate_state.update_keyboard(keyboard);
    }
}

impl ShortcutHandler for Server {
    fn shortcut_state(&mut self) -> &mut ShortcutState {
        &mut self.protocols.shortcut_state
    }
}

impl KeystateHandler for Server {
    fn keystate_state(&mut self) -> &mut KeystateState {
        &mut self.protocols.keystate_state
    }
}
