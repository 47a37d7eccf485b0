//! `treeland_shortcut_manager_v2`: session-wide key and gesture bindings
//!
//! One manager resource per login session may hold the binding token
//! (`acquire`). Bindings are staged on the manager and applied as a batch at
//! the next idle point after `commit`; a failing binding rolls the whole
//! batch back.

use std::collections::{BTreeMap, HashMap};

use bitflags::bitflags;
use smithay::reexports::wayland_server::{
    backend::{ClientId, GlobalId, ObjectId},
    Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource,
};
use tracing::{debug, info, warn};
use xkbcommon::xkb;

use crate::protocols::shortcut_manager::treeland_shortcut_manager_v2::{
    self, Error as ShortcutError, TreelandShortcutManagerV2,
};
use crate::protocols::ResourceTable;
use crate::state::client_session;

/// Why a binding was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    #[error("name already bound")]
    NameConflict,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("duplicate binding")]
    DuplicateBinding,
    #[error("internal error")]
    InternalError,
}

impl BindError {
    pub fn code(&self) -> u32 {
        match self {
            BindError::NameConflict => 1,
            BindError::InvalidArgument => 2,
            BindError::DuplicateBinding => 3,
            BindError::InternalError => 4,
        }
    }
}

bitflags! {
    /// Key transitions a binding reacts to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct KeybindFlags: u32 {
        const REPEAT = 1;
        const KEY_PRESS = 2;
        const KEY_RELEASE = 4;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
    pub struct Modifiers: u8 {
        const CTRL = 1;
        const ALT = 2;
        const SHIFT = 4;
        const META = 8;
    }
}

macro_rules! shortcut_actions {
    ($($variant:ident = $value:literal),* $(,)?) => {
        /// What a binding does when it fires
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum ShortcutAction {
            $($variant = $value),*
        }

        impl TryFrom<u32> for ShortcutAction {
            type Error = BindError;

            fn try_from(value: u32) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok(ShortcutAction::$variant),)*
                    _ => Err(BindError::InvalidArgument),
                }
            }
        }
    };
}

shortcut_actions! {
    Notify = 1,
    Workspace1 = 2,
    Workspace2 = 3,
    Workspace3 = 4,
    Workspace4 = 5,
    Workspace5 = 6,
    Workspace6 = 7,
    PrevWorkspace = 8,
    NextWorkspace = 9,
    ShowDesktop = 10,
    Maximize = 11,
    CancelMaximize = 12,
    MoveWindow = 13,
    CloseWindow = 14,
    ShowWindowMenu = 15,
    OpenMultitaskView = 16,
    CloseMultitaskView = 17,
    ToggleMultitaskView = 18,
    ToggleFpsDisplay = 19,
    Lockscreen = 20,
    ShutdownMenu = 21,
    Quit = 22,
    TaskswitchEnter = 23,
    TaskswitchNext = 24,
    TaskswitchPrev = 25,
    TaskswitchSameAppNext = 26,
    TaskswitchSameAppPrev = 27,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SwipeDirection {
    Up = 1,
    Down = 2,
    Left = 3,
    Right = 4,
}

impl TryFrom<u32> for SwipeDirection {
    type Error = BindError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SwipeDirection::Up),
            2 => Ok(SwipeDirection::Down),
            3 => Ok(SwipeDirection::Left),
            4 => Ok(SwipeDirection::Right),
            _ => Err(BindError::InvalidArgument),
        }
    }
}

/// Fingers a touchpad gesture may use
pub const GESTURE_FINGERS: std::ops::RangeInclusive<u32> = 2..=4;

/// A normalised key chord; modifier-only chords carry no keysym
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyCombination {
    pub modifiers: Modifiers,
    pub keysym: Option<u32>,
}

fn modifier_from_name(name: &str) -> Option<Modifiers> {
    match name.to_ascii_lowercase().as_str() {
        "ctrl" | "control" | "control_l" | "control_r" => Some(Modifiers::CTRL),
        "alt" | "alt_l" | "alt_r" => Some(Modifiers::ALT),
        "shift" | "shift_l" | "shift_r" => Some(Modifiers::SHIFT),
        "meta" | "super" | "super_l" | "super_r" | "meta_l" | "meta_r" => Some(Modifiers::META),
        _ => None,
    }
}

impl KeyCombination {
    pub fn new(modifiers: Modifiers, keysym: Option<u32>) -> Self {
        Self { modifiers, keysym }
    }

    /// Parse a chord such as `Meta+Shift+d` or `Ctrl+Alt`
    ///
    /// Modifier keys in any position fold into the modifier set. At most one
    /// ordinary key is allowed.
    pub fn parse(text: &str) -> Option<Self> {
        let mut modifiers = Modifiers::empty();
        let mut keysym = None;
        for part in text.split('+') {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            if let Some(modifier) = modifier_from_name(part) {
                modifiers |= modifier;
                continue;
            }
            if keysym.is_some() {
                return None;
            }
            let sym = xkb::keysym_from_name(part, xkb::KEYSYM_CASE_INSENSITIVE);
            if sym.raw() == xkb::keysyms::KEY_NoSymbol {
                return None;
            }
            keysym = Some(sym.raw());
        }
        if modifiers.is_empty() && keysym.is_none() {
            return None;
        }
        Some(Self { modifiers, keysym })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GestureKey {
    pub finger: u32,
    /// `None` for hold gestures
    pub direction: Option<SwipeDirection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BindingRef {
    Key(KeyCombination, ShortcutAction),
    Gesture(GestureKey, ShortcutAction),
}

/// The live bindings of one session
#[derive(Debug, Clone, Default)]
pub struct ShortcutController {
    keys: HashMap<KeyCombination, BTreeMap<ShortcutAction, (String, KeybindFlags)>>,
    gestures: HashMap<GestureKey, BTreeMap<ShortcutAction, String>>,
    names: HashMap<String, BindingRef>,
}

impl ShortcutController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_key(
        &mut self,
        name: &str,
        key: &str,
        flags: u32,
        action: ShortcutAction,
    ) -> Result<(), BindError> {
        if self.names.contains_key(name) {
            return Err(BindError::NameConflict);
        }
        let combination = KeyCombination::parse(key).ok_or(BindError::InvalidArgument)?;
        let flags = KeybindFlags::from_bits(flags).ok_or(BindError::InvalidArgument)?;

        let entry = self.keys.entry(combination).or_default();
        if let Some((previous, _)) = entry.get(&action) {
            info!("Binding {name} overrides {previous} for {action:?} on {key}");
            self.names.remove(previous);
        }
        entry.insert(action, (name.to_string(), flags));
        self.names
            .insert(name.to_string(), BindingRef::Key(combination, action));
        Ok(())
    }

    pub fn register_swipe_gesture(
        &mut self,
        name: &str,
        finger: u32,
        direction: u32,
        action: ShortcutAction,
    ) -> Result<(), BindError> {
        if self.names.contains_key(name) {
            return Err(BindError::NameConflict);
        }
        let direction = SwipeDirection::try_from(direction)?;
        self.register_gesture(
            name,
            GestureKey {
                finger,
                direction: Some(direction),
            },
            action,
        )
    }

    pub fn register_hold_gesture(
        &mut self,
        name: &str,
        finger: u32,
        action: ShortcutAction,
    ) -> Result<(), BindError> {
        if self.names.contains_key(name) {
            return Err(BindError::NameConflict);
        }
        self.register_gesture(
            name,
            GestureKey {
                finger,
                direction: None,
            },
            action,
        )
    }

    fn register_gesture(
        &mut self,
        name: &str,
        key: GestureKey,
        action: ShortcutAction,
    ) -> Result<(), BindError> {
        // The touchpad recogniser only tracks these finger counts
        if !GESTURE_FINGERS.contains(&key.finger) {
            return Err(BindError::InternalError);
        }
        let entry = self.gestures.entry(key).or_default();
        if entry.contains_key(&action) {
            return Err(BindError::DuplicateBinding);
        }
        entry.insert(action, name.to_string());
        self.names
            .insert(name.to_string(), BindingRef::Gesture(key, action));
        Ok(())
    }

    /// Drop a binding by name; unknown names are ignored
    pub fn unregister(&mut self, name: &str) {
        match self.names.remove(name) {
            Some(BindingRef::Key(combination, action)) => {
                if let Some(entry) = self.keys.get_mut(&combination) {
                    entry.remove(&action);
                    if entry.is_empty() {
                        self.keys.remove(&combination);
                    }
                }
            }
            Some(BindingRef::Gesture(key, action)) => {
                if let Some(entry) = self.gestures.get_mut(&key) {
                    entry.remove(&action);
                    if entry.is_empty() {
                        self.gestures.remove(&key);
                    }
                }
            }
            None => debug!("Unbinding unknown shortcut {name}"),
        }
    }

    /// Bindings fired by a key event
    ///
    /// A binding fires when its flags cover every flag of the event.
    pub fn dispatch_key(
        &self,
        combination: KeyCombination,
        flags: KeybindFlags,
    ) -> Vec<(ShortcutAction, String)> {
        self.keys
            .get(&combination)
            .map(|entry| {
                entry
                    .iter()
                    .filter(|(_, (_, bind_flags))| bind_flags.contains(flags))
                    .map(|(action, (name, _))| (*action, name.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Bindings fired by a recognised gesture
    pub fn dispatch_gesture(&self, key: GestureKey) -> Vec<(ShortcutAction, String)> {
        self.gestures
            .get(&key)
            .map(|entry| {
                entry
                    .iter()
                    .map(|(action, name)| (*action, name.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.gestures.clear();
        self.names.clear();
    }
}

/// A binding request waiting for `commit`
#[derive(Debug, Clone)]
enum StagedBinding {
    Key {
        name: String,
        key: String,
        mode: u32,
        action: u32,
    },
    Swipe {
        name: String,
        finger: u32,
        direction: u32,
        action: u32,
    },
    Hold {
        name: String,
        finger: u32,
        action: u32,
    },
    Unbind {
        name: String,
    },
}

impl StagedBinding {
    fn name(&self) -> &str {
        match self {
            StagedBinding::Key { name, .. }
            | StagedBinding::Swipe { name, .. }
            | StagedBinding::Hold { name, .. }
            | StagedBinding::Unbind { name } => name,
        }
    }

    fn apply(&self, controller: &mut ShortcutController) -> Result<(), BindError> {
        match self {
            StagedBinding::Key {
                name,
                key,
                mode,
                action,
            } => controller.register_key(name, key, *mode, ShortcutAction::try_from(*action)?),
            StagedBinding::Swipe {
                name,
                finger,
                direction,
                action,
            } => controller.register_swipe_gesture(
                name,
                *finger,
                *direction,
                ShortcutAction::try_from(*action)?,
            ),
            StagedBinding::Hold {
                name,
                finger,
                action,
            } => controller.register_hold_gesture(name, *finger, ShortcutAction::try_from(*action)?),
            StagedBinding::Unbind { name } => {
                controller.unregister(name);
                Ok(())
            }
        }
    }
}

#[derive(Debug, Default)]
struct SessionShortcuts {
    owner: Option<ObjectId>,
    controller: ShortcutController,
    batch: Vec<StagedBinding>,
    committed: Option<Vec<StagedBinding>>,
}

/// Compositor-side effect of a fired shortcut, for the shell UI to pick up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortcutOutcome {
    Activated { name: String },
    Action(ShortcutAction),
}

#[derive(Debug)]
pub struct ShortcutState {
    global: GlobalId,
    /// Manager resources and the session each belongs to
    managers: ResourceTable<TreelandShortcutManagerV2, u32>,
    sessions: HashMap<u32, SessionShortcuts>,
}

pub trait ShortcutHandler {
    fn shortcut_state(&mut self) -> &mut ShortcutState;
}

impl ShortcutState {
    pub fn new<D>(dh: &DisplayHandle) -> Self
    where
        D: GlobalDispatch<TreelandShortcutManagerV2, ()>
            + Dispatch<TreelandShortcutManagerV2, ()>
            + ShortcutHandler
            + 'static,
    {
        Self {
            global: dh.create_global::<D, TreelandShortcutManagerV2, ()>(1, ()),
            managers: ResourceTable::new(),
            sessions: HashMap::new(),
        }
    }

    pub fn global(&self) -> GlobalId {
        self.global.clone()
    }

    /// Bindings currently active for a session
    pub fn controller(&self, session: u32) -> Option<&ShortcutController> {
        self.sessions.get(&session).map(|s| &s.controller)
    }

    /// The manager holding the token of a session
    pub fn owner(&self, session: u32) -> Option<&TreelandShortcutManagerV2> {
        self.sessions
            .get(&session)
            .and_then(|s| s.owner.as_ref())
            .and_then(|id| self.managers.resource(id))
    }

    pub fn has_pending_commit(&self) -> bool {
        self.sessions.values().any(|s| s.committed.is_some())
    }

    /// Apply every committed batch, reporting the result to its owner
    pub fn apply_committed(&mut self) {
        for (session, shortcuts) in self.sessions.iter_mut() {
            let Some(batch) = shortcuts.committed.take() else {
                continue;
            };
            let owner = shortcuts
                .owner
                .as_ref()
                .and_then(|id| self.managers.resource(id));

            let mut controller = shortcuts.controller.clone();
            let failure = batch.iter().find_map(|binding| {
                binding
                    .apply(&mut controller)
                    .err()
                    .map(|err| (binding.name().to_string(), err))
            });
            match failure {
                Some((name, err)) => {
                    warn!(session, "Shortcut batch rolled back at {name}: {err}");
                    if let Some(owner) = owner {
                        owner.commit_failure(name, err.code());
                    }
                }
                None => {
                    debug!(session, "Applied {} shortcut changes", batch.len());
                    shortcuts.controller = controller;
                    if let Some(owner) = owner {
                        owner.commit_success();
                    }
                }
            }
        }
    }

    /// Tell the owner of a session that a notify binding fired
    pub fn send_activated(&self, session: u32, name: &str, flags: KeybindFlags) {
        if let Some(owner) = self.owner(session) {
            owner.activated(name.to_string(), flags.bits());
        }
    }
}

impl<D> GlobalDispatch<TreelandShortcutManagerV2, (), D> for ShortcutState
where
    D: GlobalDispatch<TreelandShortcutManagerV2, ()>
        + Dispatch<TreelandShortcutManagerV2, ()>
        + ShortcutHandler
        + 'static,
{
    fn bind(
        state: &mut D,
        dh: &DisplayHandle,
        client: &Client,
        resource: New<TreelandShortcutManagerV2>,
        _global_data: &(),
        data_init: &mut DataInit<'_, D>,
    ) {
        let manager = data_init.init(resource, ());
        let session = client_session(client, dh);
        state.shortcut_state().managers.insert(manager, session);
    }
}

impl<D> Dispatch<TreelandShortcutManagerV2, (), D> for ShortcutState
where
    D: Dispatch<TreelandShortcutManagerV2, ()> + ShortcutHandler + 'static,
{
    fn request(
        state: &mut D,
        _client: &Client,
        resource: &TreelandShortcutManagerV2,
        request: treeland_shortcut_manager_v2::Request,
        _data: &(),
        _dh: &DisplayHandle,
        _data_init: &mut DataInit<'_, D>,
    ) {
        use treeland_shortcut_manager_v2::Request;

        let shortcuts = state.shortcut_state();
        let Some(&session) = shortcuts.managers.get(resource) else {
            return;
        };
        let id = resource.id();
        let entry = shortcuts.sessions.entry(session).or_default();

        if let Request::Acquire = request {
            match &entry.owner {
                Some(owner) if *owner != id => {
                    resource.post_error(
                        ShortcutError::Occupied,
                        "shortcut manager already acquired in this session",
                    );
                }
                Some(_) => {}
                None => {
                    debug!(session, "Shortcut manager acquired by {id}");
                    entry.owner = Some(id);
                }
            }
            return;
        }
        if let Request::Destroy = request {
            return;
        }
        if entry.owner.as_ref() != Some(&id) {
            resource.post_error(ShortcutError::NotAcquired, "shortcut manager not acquired");
            return;
        }

        let staged = match request {
            Request::BindKey {
                name,
                key,
                mode,
                action,
            } => StagedBinding::Key {
                name,
                key,
                mode,
                action,
            },
            Request::BindSwipeGesture {
                name,
                finger,
                direction,
                action,
            } => StagedBinding::Swipe {
                name,
                finger,
                direction,
                action,
            },
            Request::BindHoldGesture {
                name,
                finger,
                action,
            } => StagedBinding::Hold {
                name,
                finger,
                action,
            },
            Request::Unbind { name } => StagedBinding::Unbind { name },
            Request::Commit => {
                if entry.committed.is_some() {
                    resource.invalid_commit();
                } else {
                    entry.committed = Some(std::mem::take(&mut entry.batch));
                }
                return;
            }
            _ => return,
        };
        entry.batch.push(staged);
    }

    fn destroyed(state: &mut D, _client: ClientId, resource: &TreelandShortcutManagerV2, _data: &()) {
        let shortcuts = state.shortcut_state();
        let Some((_, session)) = shortcuts.managers.remove(resource) else {
            return;
        };
        let id = resource.id();
        if let Some(entry) = shortcuts.sessions.get_mut(&session) {
            if entry.owner.as_ref() == Some(&id) {
                info!(session, "Shortcut owner gone, dropping {} bindings", entry.controller.len());
                *entry = SessionShortcuts::default();
            }
        }
    }
}

#[macro_export]
macro_rules! delegate_shortcut_manager {
    ($ty: ty) => {
        smithay::reexports::wayland_server::delegate_global_dispatch!($ty: [
            $crate::protocols::shortcut_manager::treeland_shortcut_manager_v2::TreelandShortcutManagerV2: ()
        ] => $crate::extensions::shortcut::ShortcutState);
        smithay::reexports::wayland_server::delegate_dispatch!($ty: [
            $crate::protocols::shortcut_manager::treeland_shortcut_manager_v2::TreelandShortcutManagerV2: ()
        ] => $crate::extensions::shortcut::ShortcutState);
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chord(text: &str) -> KeyCombination {
        KeyCombination::parse(text).unwrap()
    }

    #[test]
    fn parse_folds_modifiers() {
        let combo = chord("Meta+Shift+d");
        assert_eq!(combo.modifiers, Modifiers::META | Modifiers::SHIFT);
        assert_eq!(combo.keysym, Some(xkb::keysyms::KEY_d));
        assert_eq!(chord("Ctrl+Alt").keysym, None);
        assert_eq!(chord("Alt+Ctrl"), chord("Ctrl+Alt"));
        assert!(KeyCombination::parse("Ctrl+NotAKey").is_none());
        assert!(KeyCombination::parse("a+b").is_none());
        assert!(KeyCombination::parse("").is_none());
    }

    #[test]
    fn name_conflicts_are_rejected() {
        let mut controller = ShortcutController::new();
        controller
            .register_key("launcher", "Meta+d", 2, ShortcutAction::Notify)
            .unwrap();
        assert_eq!(
            controller.register_key("launcher", "Meta+e", 2, ShortcutAction::Notify),
            Err(BindError::NameConflict)
        );
    }

    #[test]
    fn rebinding_same_chord_and_action_overrides() {
        let mut controller = ShortcutController::new();
        controller
            .register_key("old", "Meta+d", 2, ShortcutAction::ShowDesktop)
            .unwrap();
        controller
            .register_key("new", "Meta+d", 2, ShortcutAction::ShowDesktop)
            .unwrap();
        assert!(!controller.contains("old"));
        let fired = controller.dispatch_key(chord("Meta+d"), KeybindFlags::KEY_PRESS);
        assert_eq!(fired, vec![(ShortcutAction::ShowDesktop, "new".to_string())]);
    }

    #[test]
    fn flags_outside_mask_are_invalid() {
        let mut controller = ShortcutController::new();
        assert_eq!(
            controller.register_key("x", "Meta+x", 8, ShortcutAction::Notify),
            Err(BindError::InvalidArgument)
        );
    }

    #[test]
    fn dispatch_requires_bind_flags_to_cover_event() {
        let mut controller = ShortcutController::new();
        controller
            .register_key("press", "Ctrl+q", 2, ShortcutAction::Quit)
            .unwrap();
        assert_eq!(
            controller
                .dispatch_key(chord("Ctrl+q"), KeybindFlags::KEY_PRESS)
                .len(),
            1
        );
        assert!(controller
            .dispatch_key(chord("Ctrl+q"), KeybindFlags::KEY_PRESS | KeybindFlags::REPEAT)
            .is_empty());
    }

    #[test]
    fn gestures_reject_duplicates_and_bad_fingers() {
        let mut controller = ShortcutController::new();
        controller
            .register_swipe_gesture("up", 3, 1, ShortcutAction::OpenMultitaskView)
            .unwrap();
        assert_eq!(
            controller.register_swipe_gesture("up2", 3, 1, ShortcutAction::OpenMultitaskView),
            Err(BindError::DuplicateBinding)
        );
        assert_eq!(
            controller.register_swipe_gesture("bad", 3, 9, ShortcutAction::Notify),
            Err(BindError::InvalidArgument)
        );
        assert_eq!(
            controller.register_hold_gesture("five", 5, ShortcutAction::Notify),
            Err(BindError::InternalError)
        );
        controller.unregister("up");
        assert!(controller.is_empty());
        assert!(controller
            .dispatch_gesture(GestureKey {
                finger: 3,
                direction: Some(SwipeDirection::Up)
            })
            .is_empty());
    }

    #[test]
    fn action_values_match_wire() {
        assert_eq!(ShortcutAction::try_from(1), Ok(ShortcutAction::Notify));
        assert_eq!(
            ShortcutAction::try_from(27),
            Ok(ShortcutAction::TaskswitchSameAppPrev)
        );
        assert_eq!(ShortcutAction::try_from(0), Err(BindError::InvalidArgument));
        assert_eq!(ShortcutAction::try_from(28), Err(BindError::InvalidArgument));
    }
}
