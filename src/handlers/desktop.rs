//! Screen capture selection and the dde-shell desktop hooks

use smithay::utils::{Logical, Rectangle};
use tracing::{debug, info};

use crate::extensions::{
    capture::{CaptureHandler, CaptureSource, CaptureState, SelectionRequest},
    dde_shell::{ActiveReason, DdeShellHandler, DdeShellState, DdeSurfaceProps, LockscreenAction},
    shortcut::{ShortcutAction, ShortcutOutcome},
};
use crate::output::OutputId;
use crate::state::{CompositorMode, Server};
use crate::surface::SurfaceId;

impl Server {
    /// The user picked what to capture
    pub fn finish_capture_selection(&mut self, source: CaptureSource) -> bool {
        match self.protocols.capture_state.finish_selection(source) {
            Some(request) => {
                self.selection_stopped(&request);
                true
            }
            None => false,
        }
    }

    /// The user dismissed the capture selector
    pub fn cancel_capture_selection(&mut self) -> bool {
        match self.protocols.capture_state.cancel_selection() {
            Some(request) => {
                self.selection_stopped(&request);
                true
            }
            None => false,
        }
    }

    /// The window picker landed on a window of `pid`
    pub fn window_picked(&mut self, pid: i32) -> usize {
        self.protocols.dde_shell_state.window_picked(pid)
    }

    /// Pointer activity entered or left the shell panel area
    pub fn shell_active_changed(&mut self, active: bool, reason: ActiveReason) {
        if active {
            self.protocols.dde_shell_state.send_active_in(reason);
        } else {
            self.protocols.dde_shell_state.send_active_out(reason);
        }
    }

    /// A drag started from or was dropped onto the shell panel area
    pub fn shell_drag_changed(&mut self, dropped: bool) {
        if dropped {
            self.protocols.dde_shell_state.send_drop();
        } else {
            self.protocols.dde_shell_state.send_start_drag();
        }
    }

    fn set_capture_mask(&mut self, mask: Option<SurfaceId>, masked: bool) {
        let Some(wrapper) = mask.and_then(|mask| self.surfaces.get_mut(mask)) else {
            return;
        };
        wrapper.set_no_title_bar(masked);
        wrapper.set_animations_enabled(!masked && self.config.animations);
    }
}

impl CaptureHandler for Server {
    fn capture_state(&mut self) -> &mut CaptureState {
        &mut self.protocols.capture_state
    }

    fn selection_started(&mut self, request: &SelectionRequest) {
        info!(hint = ?request.hint, freeze = request.freeze, "Capture selection started");
        self.set_capture_mask(request.mask, true);
    }

    fn selection_stopped(&mut self, request: &SelectionRequest) {
        debug!("Capture selection stopped");
        self.set_capture_mask(request.mask, false);
    }
}

impl DdeShellHandler for Server {
    fn dde_shell_state(&mut self) -> &mut DdeShellState {
        &mut self.protocols.dde_shell_state
    }

    fn output_geometry(&self, output: OutputId) -> Option<Rectangle<i32, Logical>> {
        self.outputs.output(output).map(|o| o.geometry)
    }

    fn surface_props_changed(&mut self, surface: SurfaceId, props: &DdeSurfaceProps) {
        let Some(position) = props.position else {
            return;
        };
        if let Some(wrapper) = self.surfaces.get_mut(surface) {
            wrapper.set_position(position);
        }
    }

    fn multitaskview_toggled(&mut self) {
        let open = self.mode != CompositorMode::Multitaskview;
        self.set_multitask_view(open);
    }

    fn window_pick_requested(&mut self, hint: &str) {
        info!(%hint, "Window pick requested");
    }

    fn lockscreen_action(&mut self, action: LockscreenAction) {
        match action {
            LockscreenAction::Lock => self.enter_lock_screen(),
            LockscreenAction::Shutdown => self
                .shortcut_outcomes
                .push(ShortcutOutcome::Action(ShortcutAction::ShutdownMenu)),
            LockscreenAction::SwitchUser => info!("User switch requested"),
        }
    }
}
