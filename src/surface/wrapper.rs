//! Per-window presentation state

use std::time::{Duration, Instant};

use smithay::utils::{Logical, Point, Rectangle, Size};
use tracing::{debug, trace};

use super::{ActiveControlState, ShellSurface, SurfaceId, SurfaceSignal, SurfaceState, SurfaceType};
use crate::output::OutputId;

/// Workspace id of surfaces shown on every workspace
pub const SHOW_ON_ALL_WORKSPACES: i32 = -2;

/// What kind of container holds a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Workspace,
    Layer,
    Popup,
    LockScreen,
}

impl ContainerKind {
    /// Only workspace windows change presentation state
    fn rejects_state_change(&self) -> bool {
        !matches!(self, ContainerKind::Workspace)
    }
}

/// A geometry transition toward a new state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Animation {
    pub target_state: SurfaceState,
    pub from: Rectangle<i32, Logical>,
    pub target_geometry: Rectangle<i32, Logical>,
    pub started: Instant,
    /// The target state already took effect
    pub settled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinimizeDirection {
    /// Restoring from the icon
    Open,
    /// Shrinking into the icon
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinimizeAnimation {
    pub icon_geometry: Rectangle<i32, Logical>,
    pub direction: MinimizeDirection,
    pub started: Instant,
}

fn is_valid(rect: &Rectangle<i32, Logical>) -> bool {
    rect.size.w > 0 && rect.size.h > 0
}

#[derive(Debug)]
pub struct SurfaceWrapper {
    id: SurfaceId,
    shell: ShellSurface,
    state: SurfaceState,
    previous_state: SurfaceState,

    geometry: Rectangle<i32, Logical>,
    normal_geometry: Rectangle<i32, Logical>,
    maximized_geometry: Rectangle<i32, Logical>,
    fullscreen_geometry: Rectangle<i32, Logical>,
    tiling_geometry: Rectangle<i32, Logical>,
    icon_geometry: Rectangle<i32, Logical>,

    animation: Option<Animation>,
    minimize_animation: Option<MinimizeAnimation>,
    /// Start of the running map or unmap animation
    window_animation: Option<Instant>,
    animations_enabled: bool,

    active_state: ActiveControlState,
    mapped: bool,
    hidden_by_workspace: bool,
    hidden_by_show_desk: bool,
    hidden_by_lockscreen: bool,
    socket_enabled: bool,
    visible: bool,

    output: Option<OutputId>,
    workspace_id: i32,
    container: Option<ContainerKind>,
    parent: Option<SurfaceId>,
    sub_surfaces: Vec<SurfaceId>,
    about_to_remove: bool,

    visible_decoration: bool,
    no_corner_radius: bool,
    no_title_bar: bool,
    radius: i32,

    signals: Vec<SurfaceSignal>,
}

impl SurfaceWrapper {
    pub fn new(shell: ShellSurface, geometry: Rectangle<i32, Logical>) -> Self {
        Self::with_id(SurfaceId::next(), shell, geometry)
    }

    pub fn with_id(id: SurfaceId, shell: ShellSurface, geometry: Rectangle<i32, Logical>) -> Self {
        let parent = shell.parent();
        Self {
            id,
            shell,
            state: SurfaceState::Normal,
            previous_state: SurfaceState::Normal,
            geometry,
            normal_geometry: geometry,
            maximized_geometry: Rectangle::default(),
            fullscreen_geometry: Rectangle::default(),
            tiling_geometry: Rectangle::default(),
            icon_geometry: Rectangle::default(),
            animation: None,
            minimize_animation: None,
            window_animation: None,
            animations_enabled: true,
            active_state: ActiveControlState::UNMINIMIZED,
            mapped: false,
            hidden_by_workspace: false,
            hidden_by_show_desk: false,
            hidden_by_lockscreen: false,
            socket_enabled: true,
            visible: false,
            output: None,
            workspace_id: 0,
            container: None,
            parent,
            sub_surfaces: Vec::new(),
            about_to_remove: false,
            visible_decoration: true,
            no_corner_radius: false,
            no_title_bar: false,
            radius: 0,
            signals: Vec::new(),
        }
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn surface_type(&self) -> SurfaceType {
        self.shell.surface_type()
    }

    pub fn shell(&self) -> &ShellSurface {
        &self.shell
    }

    pub fn shell_mut(&mut self) -> &mut ShellSurface {
        &mut self.shell
    }

    /// Swap the shell surface of a placeholder for the real one
    pub fn convert(&mut self, shell: ShellSurface) {
        debug!(
            "Converting {} from {:?} to {:?}",
            self.id,
            self.surface_type(),
            shell.surface_type()
        );
        self.parent = shell.parent();
        self.shell = shell;
    }

    /// Drain pending notifications
    pub fn take_signals(&mut self) -> Vec<SurfaceSignal> {
        std::mem::take(&mut self.signals)
    }

    pub fn set_animations_enabled(&mut self, enabled: bool) {
        self.animations_enabled = enabled;
    }

    // Geometry

    pub fn geometry(&self) -> Rectangle<i32, Logical> {
        self.geometry
    }

    pub fn normal_geometry(&self) -> Rectangle<i32, Logical> {
        self.normal_geometry
    }

    pub fn maximized_geometry(&self) -> Rectangle<i32, Logical> {
        self.maximized_geometry
    }

    pub fn fullscreen_geometry(&self) -> Rectangle<i32, Logical> {
        self.fullscreen_geometry
    }

    pub fn tiling_geometry(&self) -> Rectangle<i32, Logical> {
        self.tiling_geometry
    }

    pub fn icon_geometry(&self) -> Rectangle<i32, Logical> {
        self.icon_geometry
    }

    /// Move and resize the window as the client committed it
    pub fn set_geometry(&mut self, geometry: Rectangle<i32, Logical>) {
        if self.geometry == geometry {
            return;
        }
        self.geometry = geometry;
        if self.state == SurfaceState::Normal && self.animation.is_none() {
            self.normal_geometry = geometry;
        }
        self.signals.push(SurfaceSignal::GeometryChanged);
    }

    pub fn set_position(&mut self, position: Point<i32, Logical>) {
        self.set_geometry(Rectangle::new(position, self.geometry.size));
    }

    /// Ask the shell surface for a new size; false if the client would refuse
    pub fn resize(&mut self, size: Size<i32, Logical>) -> bool {
        if !self.shell.resize(size) {
            debug!("{} rejected size {:?}", self.id, size);
            return false;
        }
        self.set_geometry(Rectangle::new(self.geometry.loc, size));
        true
    }

    pub fn set_normal_geometry(&mut self, geometry: Rectangle<i32, Logical>) {
        self.normal_geometry = geometry;
    }

    /// Move the remembered normal geometry, following it if currently normal
    pub fn move_normal_geometry_in_output(&mut self, position: Point<i32, Logical>) {
        self.normal_geometry = Rectangle::new(position, self.normal_geometry.size);
        if self.state == SurfaceState::Normal {
            self.set_position(position);
        } else if let Some(animation) = self
            .animation
            .as_mut()
            .filter(|a| a.target_state == SurfaceState::Normal)
        {
            animation.target_geometry = self.normal_geometry;
        }
    }

    pub fn set_maximized_geometry(&mut self, geometry: Rectangle<i32, Logical>) {
        self.set_state_geometry(SurfaceState::Maximized, geometry);
    }

    pub fn set_fullscreen_geometry(&mut self, geometry: Rectangle<i32, Logical>) {
        self.set_state_geometry(SurfaceState::Fullscreen, geometry);
    }

    pub fn set_tiling_geometry(&mut self, geometry: Rectangle<i32, Logical>) {
        self.set_state_geometry(SurfaceState::Tiling, geometry);
    }

    pub fn set_icon_geometry(&mut self, geometry: Rectangle<i32, Logical>) {
        self.icon_geometry = geometry;
    }

    fn set_state_geometry(&mut self, state: SurfaceState, geometry: Rectangle<i32, Logical>) {
        if self.about_to_remove {
            return;
        }
        let slot = match state {
            SurfaceState::Maximized => &mut self.maximized_geometry,
            SurfaceState::Fullscreen => &mut self.fullscreen_geometry,
            SurfaceState::Tiling => &mut self.tiling_geometry,
            SurfaceState::Normal | SurfaceState::Minimized => return,
        };
        if *slot == geometry {
            return;
        }
        *slot = geometry;

        if self.state == state {
            self.set_position(geometry.loc);
            self.resize(geometry.size);
        } else if let Some(animation) = self
            .animation
            .as_mut()
            .filter(|a| a.target_state == state)
        {
            animation.target_geometry = geometry;
        }
    }

    fn remembered_geometry(&self, state: SurfaceState) -> Option<Rectangle<i32, Logical>> {
        let geometry = match state {
            SurfaceState::Maximized => self.maximized_geometry,
            SurfaceState::Fullscreen => self.fullscreen_geometry,
            SurfaceState::Normal => self.normal_geometry,
            SurfaceState::Tiling => self.tiling_geometry,
            SurfaceState::Minimized => return None,
        };
        is_valid(&geometry).then_some(geometry)
    }

    // Presentation state

    pub fn surface_state(&self) -> SurfaceState {
        self.state
    }

    pub fn previous_surface_state(&self) -> SurfaceState {
        self.previous_state
    }

    pub fn is_normal(&self) -> bool {
        self.state == SurfaceState::Normal
    }

    pub fn is_maximized(&self) -> bool {
        self.state == SurfaceState::Maximized
    }

    pub fn is_minimized(&self) -> bool {
        self.state == SurfaceState::Minimized
    }

    pub fn is_fullscreen(&self) -> bool {
        self.state == SurfaceState::Fullscreen
    }

    pub fn is_tiling(&self) -> bool {
        self.state == SurfaceState::Tiling
    }

    /// The geometry transition in flight, if any
    pub fn animation(&self) -> Option<&Animation> {
        self.animation.as_ref()
    }

    pub fn is_animation_running(&self) -> bool {
        self.animation.is_some()
    }

    /// Request a presentation state
    ///
    /// With a remembered geometry for the target the change goes through an
    /// animation and only settles once [`Self::on_animation_ready`] runs. A
    /// new request replaces an animation that is still in flight.
    pub fn set_surface_state(&mut self, state: SurfaceState) {
        if self.about_to_remove {
            return;
        }
        if self.animation.is_none() && self.state == state {
            return;
        }
        if self
            .container
            .is_some_and(|container| container.rejects_state_change())
        {
            trace!("{} container rejected {:?}", self.id, state);
            return;
        }

        if let Some(superseded) = self.animation.take() {
            debug!(
                "{} dropping animation toward {:?}",
                self.id, superseded.target_state
            );
            if self.state == state {
                return;
            }
        }

        match self.remembered_geometry(state) {
            Some(target) if self.animations_enabled => {
                self.animation = Some(Animation {
                    target_state: state,
                    from: self.geometry,
                    target_geometry: target,
                    started: Instant::now(),
                    settled: false,
                });
            }
            Some(target) => {
                if self.resize(target.size) {
                    self.set_position(target.loc);
                    self.do_set_surface_state(state);
                }
            }
            None => self.do_set_surface_state(state),
        }
    }

    /// The animation reached the point where the new state takes effect
    pub fn on_animation_ready(&mut self) {
        let Some(animation) = self.animation.filter(|a| !a.settled) else {
            return;
        };
        if !self.resize(animation.target_geometry.size) {
            self.animation = None;
            return;
        }
        self.set_position(animation.target_geometry.loc);
        self.do_set_surface_state(animation.target_state);
        if let Some(animation) = &mut self.animation {
            animation.settled = true;
        }
    }

    pub fn on_animation_finished(&mut self) {
        self.animation = None;
    }

    /// Run a pending animation to completion at once
    pub fn finish_animation(&mut self) {
        if self.animation.is_some() {
            self.on_animation_ready();
            self.on_animation_finished();
        }
    }

    fn do_set_surface_state(&mut self, state: SurfaceState) {
        if self.about_to_remove {
            return;
        }
        self.visible_decoration = matches!(state, SurfaceState::Minimized | SurfaceState::Normal);
        self.no_corner_radius = matches!(
            state,
            SurfaceState::Maximized | SurfaceState::Fullscreen | SurfaceState::Tiling
        );

        self.previous_state = self.state;
        self.state = state;

        match self.previous_state {
            SurfaceState::Maximized => self.shell.set_maximize(false),
            SurfaceState::Minimized => {
                self.shell.set_minimize(false);
                self.update_has_active_capability(ActiveControlState::UNMINIMIZED, true);
            }
            SurfaceState::Fullscreen => self.shell.set_fullscreen(false),
            SurfaceState::Normal | SurfaceState::Tiling => {}
        }

        match self.state {
            SurfaceState::Maximized => self.shell.set_maximize(true),
            SurfaceState::Minimized => {
                self.shell.set_minimize(true);
                self.update_has_active_capability(ActiveControlState::UNMINIMIZED, false);
            }
            SurfaceState::Fullscreen => self.shell.set_fullscreen(true),
            SurfaceState::Normal | SurfaceState::Tiling => {}
        }

        self.signals.push(SurfaceSignal::StateChanged {
            previous: self.previous_state,
            current: self.state,
        });
        self.update_visible();
    }

    pub fn request_maximize(&mut self) {
        if matches!(self.state, SurfaceState::Minimized | SurfaceState::Fullscreen) {
            return;
        }
        self.set_surface_state(SurfaceState::Maximized);
    }

    pub fn request_cancel_maximize(&mut self) {
        if self.state != SurfaceState::Maximized {
            return;
        }
        self.set_surface_state(SurfaceState::Normal);
    }

    pub fn request_toggle_maximize(&mut self) {
        if self.state == SurfaceState::Maximized {
            self.request_cancel_maximize();
        } else {
            self.request_maximize();
        }
    }

    pub fn request_fullscreen(&mut self) {
        if self.state == SurfaceState::Minimized {
            return;
        }
        self.set_surface_state(SurfaceState::Fullscreen);
    }

    pub fn request_cancel_fullscreen(&mut self) {
        if self.state != SurfaceState::Fullscreen {
            return;
        }
        self.set_surface_state(self.previous_state);
    }

    pub fn request_minimize(&mut self) {
        self.set_surface_state(SurfaceState::Minimized);
        if self.is_minimized() && self.animations_enabled {
            self.start_minimize_animation(MinimizeDirection::Close);
        }
    }

    pub fn request_cancel_minimize(&mut self) {
        if self.state != SurfaceState::Minimized && !self.hidden_by_show_desk {
            return;
        }
        self.set_hide_by_show_desk(false);
        if self.state == SurfaceState::Minimized {
            let restore = self.previous_state;
            self.do_set_surface_state(restore);
        }
        if self.animations_enabled {
            self.start_minimize_animation(MinimizeDirection::Open);
        }
    }

    pub fn request_tiling(&mut self) {
        if self.state == SurfaceState::Minimized {
            return;
        }
        self.set_surface_state(SurfaceState::Tiling);
    }

    pub fn request_cancel_tiling(&mut self) {
        if self.state != SurfaceState::Tiling {
            return;
        }
        self.set_surface_state(SurfaceState::Normal);
    }

    /// Ask the client to close; the wrapper goes away when it unmaps
    pub fn request_close(&mut self) -> bool {
        self.shell.close()
    }

    pub fn minimize_animation(&self) -> Option<&MinimizeAnimation> {
        self.minimize_animation.as_ref()
    }

    fn start_minimize_animation(&mut self, direction: MinimizeDirection) {
        if self.minimize_animation.is_some() {
            return;
        }
        self.minimize_animation = Some(MinimizeAnimation {
            icon_geometry: self.icon_geometry,
            direction,
            started: Instant::now(),
        });
    }

    pub fn on_minimize_animation_finished(&mut self) {
        self.minimize_animation = None;
    }

    // Activation

    pub fn active_state(&self) -> ActiveControlState {
        self.active_state
    }

    pub fn has_active_capability(&self) -> bool {
        self.active_state == ActiveControlState::FULL
    }

    fn update_has_active_capability(&mut self, flag: ActiveControlState, value: bool) {
        let old = self.has_active_capability();
        self.active_state.set(flag, value);
        let new = self.has_active_capability();
        if old != new {
            self.signals.push(if new {
                SurfaceSignal::RequestActive
            } else {
                SurfaceSignal::RequestInactive
            });
        }
    }

    pub fn is_activated(&self) -> bool {
        self.shell.is_activated()
    }

    /// Activate or deactivate this surface alone. Parents are handled by the registry
    pub fn set_activate(&mut self, activate: bool) -> bool {
        if self.about_to_remove {
            return false;
        }
        if activate && !self.has_active_capability() {
            debug!("{} cannot be activated yet", self.id);
            return false;
        }
        self.shell.set_activate(activate);
        true
    }

    // Visibility

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    pub fn set_mapped(&mut self, mapped: bool) {
        if self.about_to_remove {
            return;
        }
        self.mapped = mapped;
        self.window_animation = self.animations_enabled.then(Instant::now);
        self.update_has_active_capability(
            ActiveControlState::MAPPED,
            mapped && !self.hidden_by_lockscreen,
        );
        self.update_visible();
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn hidden_by_workspace(&self) -> bool {
        self.hidden_by_workspace
    }

    pub fn hidden_by_show_desk(&self) -> bool {
        self.hidden_by_show_desk
    }

    pub fn hidden_by_lockscreen(&self) -> bool {
        self.hidden_by_lockscreen
    }

    pub fn set_hide_by_workspace(&mut self, hide: bool) {
        if self.hidden_by_workspace == hide {
            return;
        }
        self.hidden_by_workspace = hide;
        self.update_visible();
    }

    pub fn set_hide_by_show_desk(&mut self, hide: bool) {
        if self.hidden_by_show_desk == hide {
            return;
        }
        self.hidden_by_show_desk = hide;
        self.update_visible();
    }

    pub fn set_hide_by_lockscreen(&mut self, hide: bool) {
        if self.hidden_by_lockscreen == hide {
            return;
        }
        self.hidden_by_lockscreen = hide;
        if !self.about_to_remove {
            self.update_has_active_capability(ActiveControlState::MAPPED, self.mapped && !hide);
        }
        self.update_visible();
    }

    pub fn set_socket_enabled(&mut self, enabled: bool) {
        if self.socket_enabled == enabled {
            return;
        }
        self.socket_enabled = enabled;
        self.update_visible();
    }

    fn update_visible(&mut self) {
        let visible = !self.hidden_by_workspace
            && !self.is_minimized()
            && self.mapped
            && self.socket_enabled
            && !self.hidden_by_show_desk
            && !self.hidden_by_lockscreen;
        if visible != self.visible {
            self.visible = visible;
            self.signals.push(SurfaceSignal::VisibleChanged(visible));
        }
    }

    // Placement

    pub fn output(&self) -> Option<OutputId> {
        self.output
    }

    pub fn set_owns_output(&mut self, output: Option<OutputId>) {
        if self.about_to_remove {
            return;
        }
        self.output = output;
    }

    pub fn workspace_id(&self) -> i32 {
        self.workspace_id
    }

    pub fn set_workspace_id(&mut self, workspace_id: i32) {
        self.workspace_id = workspace_id;
    }

    pub fn show_on_all_workspaces(&self) -> bool {
        matches!(
            self.surface_type(),
            SurfaceType::Layer
                | SurfaceType::XdgPopup
                | SurfaceType::InputPopup
                | SurfaceType::LockScreen
        ) || self.workspace_id == SHOW_ON_ALL_WORKSPACES
    }

    pub fn container(&self) -> Option<ContainerKind> {
        self.container
    }

    pub fn set_container(&mut self, container: Option<ContainerKind>) {
        if self.about_to_remove {
            return;
        }
        self.container = container;
        self.update_has_active_capability(
            ActiveControlState::HAS_INITIALIZE_CONTAINER,
            container.is_some(),
        );
    }

    pub fn parent(&self) -> Option<SurfaceId> {
        self.parent
    }

    pub(crate) fn set_parent(&mut self, parent: Option<SurfaceId>) {
        self.parent = parent;
    }

    pub fn sub_surfaces(&self) -> &[SurfaceId] {
        &self.sub_surfaces
    }

    pub(crate) fn add_sub_surface(&mut self, child: SurfaceId) {
        if !self.sub_surfaces.contains(&child) {
            self.sub_surfaces.push(child);
        }
    }

    pub(crate) fn remove_sub_surface(&mut self, child: SurfaceId) {
        self.sub_surfaces.retain(|id| *id != child);
    }

    // Removal

    pub fn is_about_to_remove(&self) -> bool {
        self.about_to_remove
    }

    pub fn is_window_animation_running(&self) -> bool {
        self.window_animation.is_some()
    }

    /// Start tearing the wrapper down. Returns true when it can be dropped now
    pub fn mark_wrapper_to_removed(&mut self) -> bool {
        if self.about_to_remove {
            return false;
        }
        self.about_to_remove = true;
        self.signals.push(SurfaceSignal::AboutToBeInvalidated);
        self.container = None;
        self.output = None;
        self.parent = None;
        self.sub_surfaces.clear();
        self.animation = None;
        self.window_animation.is_none()
    }

    /// The open or close animation ended. Returns true when the wrapper should be dropped
    pub fn on_window_animation_finished(&mut self) -> bool {
        self.window_animation = None;
        self.about_to_remove
    }

    /// Run every animation that has been going for `duration` by `now`
    ///
    /// A state animation settles at its midpoint and ends at `duration`.
    /// Returns true when the wrapper should be dropped.
    pub fn advance_animations(&mut self, now: Instant, duration: Duration) -> bool {
        if let Some(animation) = self.animation {
            let elapsed = now.saturating_duration_since(animation.started);
            if elapsed >= duration / 2 {
                self.on_animation_ready();
            }
            if elapsed >= duration {
                self.on_animation_finished();
            }
        }
        if self
            .minimize_animation
            .is_some_and(|a| now.saturating_duration_since(a.started) >= duration)
        {
            self.on_minimize_animation_finished();
        }
        match self.window_animation {
            Some(started) if now.saturating_duration_since(started) >= duration => {
                self.on_window_animation_finished()
            }
            _ => false,
        }
    }

    // Decoration

    pub fn visible_decoration(&self) -> bool {
        self.visible_decoration
    }

    pub fn no_corner_radius(&self) -> bool {
        self.no_corner_radius
    }

    pub fn no_title_bar(&self) -> bool {
        self.no_title_bar
    }

    pub fn set_no_title_bar(&mut self, no_title_bar: bool) {
        if self.about_to_remove {
            return;
        }
        self.no_title_bar = no_title_bar;
    }

    pub fn set_radius(&mut self, radius: i32) {
        self.radius = radius;
    }

    /// Corner radius to draw with, `fallback` being the configured default
    pub fn radius(&self, fallback: i32) -> i32 {
        match self.surface_type() {
            SurfaceType::InputPopup => 0,
            SurfaceType::XdgPopup => 8,
            SurfaceType::Layer => self.radius,
            _ if self.radius < 1 => fallback,
            _ => self.radius,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::ToplevelProps;

    fn rect(x: i32, y: i32, w: i32, h: i32) -> Rectangle<i32, Logical> {
        Rectangle::new((x, y).into(), (w, h).into())
    }

    fn toplevel(geometry: Rectangle<i32, Logical>) -> SurfaceWrapper {
        let mut wrapper = SurfaceWrapper::new(
            ShellSurface::XdgToplevel(ToplevelProps::new("org.example.app", "Example")),
            geometry,
        );
        wrapper.set_container(Some(ContainerKind::Workspace));
        wrapper.set_mapped(true);
        wrapper
    }

    #[test]
    fn starts_unminimized_only() {
        let wrapper = SurfaceWrapper::new(
            ShellSurface::Layer {
                namespace: "bar".into(),
            },
            rect(0, 0, 10, 10),
        );
        assert_eq!(wrapper.active_state(), ActiveControlState::UNMINIMIZED);
        assert!(!wrapper.has_active_capability());
    }

    #[test]
    fn maximize_round_trip_restores_normal_geometry() {
        let normal = rect(37, 91, 640, 480);
        let mut wrapper = toplevel(normal);
        wrapper.set_maximized_geometry(rect(0, 0, 1920, 1080));

        wrapper.request_maximize();
        assert!(wrapper.is_animation_running());
        assert!(wrapper.is_normal());
        wrapper.finish_animation();
        assert!(wrapper.is_maximized());
        assert_eq!(wrapper.geometry(), rect(0, 0, 1920, 1080));
        assert_eq!(wrapper.normal_geometry(), normal);

        wrapper.request_cancel_maximize();
        wrapper.finish_animation();
        assert!(wrapper.is_normal());
        assert_eq!(wrapper.geometry(), normal);
    }

    #[test]
    fn new_request_supersedes_animation() {
        let mut wrapper = toplevel(rect(10, 10, 300, 200));
        wrapper.set_maximized_geometry(rect(0, 0, 1920, 1080));
        wrapper.set_fullscreen_geometry(rect(0, 0, 1920, 1200));

        wrapper.request_maximize();
        wrapper.request_fullscreen();
        assert_eq!(
            wrapper.animation().map(|a| a.target_state),
            Some(SurfaceState::Fullscreen)
        );
        wrapper.finish_animation();
        assert!(wrapper.is_fullscreen());
        assert_eq!(wrapper.previous_surface_state(), SurfaceState::Normal);
    }

    #[test]
    fn rejected_resize_aborts_state_change() {
        let mut props = ToplevelProps::new("app", "title");
        props.max_size = (800, 600).into();
        let mut wrapper =
            SurfaceWrapper::new(ShellSurface::XdgToplevel(props), rect(0, 0, 400, 300));
        wrapper.set_container(Some(ContainerKind::Workspace));
        wrapper.set_maximized_geometry(rect(0, 0, 1920, 1080));

        wrapper.request_maximize();
        wrapper.finish_animation();
        assert!(wrapper.is_normal());
        assert!(!wrapper.is_animation_running());
    }

    #[test]
    fn minimize_clears_active_capability_and_restores_previous() {
        let mut wrapper = toplevel(rect(0, 0, 400, 300));
        assert!(wrapper.has_active_capability());
        wrapper.take_signals();

        wrapper.request_minimize();
        assert!(wrapper.is_minimized());
        assert!(!wrapper.has_active_capability());
        assert!(!wrapper.is_visible());
        assert!(wrapper.take_signals().contains(&SurfaceSignal::RequestInactive));
        assert_eq!(
            wrapper.minimize_animation().map(|a| a.direction),
            Some(MinimizeDirection::Close)
        );
        wrapper.on_minimize_animation_finished();

        wrapper.request_cancel_minimize();
        assert!(wrapper.is_normal());
        assert!(wrapper.has_active_capability());
        assert!(wrapper.is_visible());
    }

    #[test]
    fn maximize_ignored_while_minimized_or_fullscreen() {
        let mut wrapper = toplevel(rect(0, 0, 400, 300));
        wrapper.request_fullscreen();
        assert!(wrapper.is_fullscreen());
        wrapper.request_maximize();
        assert!(wrapper.is_fullscreen());

        wrapper.request_cancel_fullscreen();
        wrapper.finish_animation();
        assert!(wrapper.is_normal());
        wrapper.request_minimize();
        wrapper.request_maximize();
        assert!(wrapper.is_minimized());
    }

    #[test]
    fn visibility_is_and_of_suppression_flags() {
        let mut wrapper = toplevel(rect(0, 0, 400, 300));
        assert!(wrapper.is_visible());

        wrapper.set_hide_by_workspace(true);
        wrapper.set_hide_by_show_desk(true);
        wrapper.set_hide_by_workspace(false);
        assert!(!wrapper.is_visible());
        wrapper.set_hide_by_lockscreen(true);
        wrapper.set_hide_by_show_desk(false);
        assert!(!wrapper.is_visible());
        wrapper.set_hide_by_lockscreen(false);
        assert!(wrapper.is_visible());
    }

    #[test]
    fn capability_needs_container_and_mapping() {
        let mut wrapper = SurfaceWrapper::new(
            ShellSurface::XdgToplevel(ToplevelProps::default()),
            rect(0, 0, 100, 100),
        );
        wrapper.set_mapped(true);
        assert!(!wrapper.set_activate(true));
        wrapper.set_container(Some(ContainerKind::Workspace));
        assert!(wrapper.take_signals().contains(&SurfaceSignal::RequestActive));
        assert!(wrapper.set_activate(true));
        assert!(wrapper.is_activated());
    }

    #[test]
    fn layer_container_rejects_state_changes() {
        let mut wrapper = toplevel(rect(0, 0, 100, 100));
        wrapper.set_container(Some(ContainerKind::Layer));
        wrapper.request_fullscreen();
        assert!(wrapper.is_normal());
    }

    #[test]
    fn state_geometry_follows_when_in_state() {
        let mut wrapper = toplevel(rect(0, 0, 400, 300));
        wrapper.set_maximized_geometry(rect(0, 0, 1920, 1080));
        wrapper.request_maximize();
        wrapper.finish_animation();

        wrapper.set_maximized_geometry(rect(0, 30, 1920, 1050));
        assert_eq!(wrapper.geometry(), rect(0, 30, 1920, 1050));
        assert_eq!(wrapper.normal_geometry(), rect(0, 0, 400, 300));
    }

    #[test]
    fn removal_is_deferred_by_window_animation() {
        let mut wrapper = toplevel(rect(0, 0, 100, 100));
        assert!(wrapper.is_window_animation_running());
        assert!(!wrapper.mark_wrapper_to_removed());
        assert!(!wrapper.mark_wrapper_to_removed());
        wrapper.request_maximize();
        assert!(wrapper.is_normal());
        assert!(wrapper.on_window_animation_finished());
    }

    #[test]
    fn advancing_time_settles_state_at_midpoint() {
        let mut wrapper = toplevel(rect(0, 0, 400, 300));
        wrapper.set_maximized_geometry(rect(0, 0, 1920, 1080));
        let duration = Duration::from_millis(200);
        wrapper.request_maximize();
        let started = wrapper.animation().map(|a| a.started).unwrap();

        assert!(!wrapper.advance_animations(started + Duration::from_millis(50), duration));
        assert!(wrapper.is_normal());
        wrapper.advance_animations(started + Duration::from_millis(100), duration);
        assert!(wrapper.is_maximized());
        assert!(wrapper.is_animation_running());
        wrapper.advance_animations(started + duration, duration);
        assert!(!wrapper.is_animation_running());
        assert_eq!(wrapper.geometry(), rect(0, 0, 1920, 1080));
    }

    #[test]
    fn advancing_past_unmap_animation_allows_drop() {
        let mut wrapper = toplevel(rect(0, 0, 100, 100));
        assert!(!wrapper.mark_wrapper_to_removed());
        let later = Instant::now() + Duration::from_secs(1);
        assert!(wrapper.advance_animations(later, Duration::from_millis(300)));
        assert!(!wrapper.is_window_animation_running());
    }

    #[test]
    fn removal_without_animation_is_immediate() {
        let mut wrapper = toplevel(rect(0, 0, 100, 100));
        wrapper.on_window_animation_finished();
        assert!(wrapper.mark_wrapper_to_removed());
        assert!(wrapper.take_signals().contains(&SurfaceSignal::AboutToBeInvalidated));
    }

    #[test]
    fn decoration_flags_follow_state() {
        let mut wrapper = toplevel(rect(0, 0, 100, 100));
        wrapper.request_fullscreen();
        assert!(wrapper.no_corner_radius());
        assert!(!wrapper.visible_decoration());
        wrapper.request_cancel_fullscreen();
        wrapper.finish_animation();
        assert!(!wrapper.no_corner_radius());
        assert!(wrapper.visible_decoration());
    }

    #[test]
    fn popups_show_on_all_workspaces() {
        let popup = SurfaceWrapper::new(
            ShellSurface::XdgPopup {
                parent: SurfaceId::next(),
            },
            rect(0, 0, 10, 10),
        );
        assert!(popup.show_on_all_workspaces());
        assert_eq!(popup.radius(12), 8);
        let mut window = toplevel(rect(0, 0, 10, 10));
        assert!(!window.show_on_all_workspaces());
        assert_eq!(window.radius(12), 12);
        window.set_workspace_id(SHOW_ON_ALL_WORKSPACES);
        assert!(window.show_on_all_workspaces());
    }
}
