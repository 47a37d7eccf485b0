//! Output protocol handlers and the output lifecycle glue

use std::collections::HashMap;

use smithay::utils::{Logical, Rectangle};
use tracing::{debug, info, warn};

use crate::error::{OptionExt, TreelandError};
use crate::extensions::{
    output_manager::{OutputManagerHandler, OutputManagerState, PendingColor},
    virtual_output::{VirtualOutputHandler, VirtualOutputState},
    wallpaper_color::{WallpaperColorHandler, WallpaperColorState},
};
use crate::output::{migrate_position, LifecycleDecision, Output, OutputColor, OutputId, OutputMode};
use crate::state::Server;
use crate::surface::ContainerKind;

type OutputGeometries = HashMap<OutputId, Rectangle<i32, Logical>>;

impl Server {
    fn output_geometries(&self) -> OutputGeometries {
        self.outputs
            .outputs()
            .iter()
            .map(|o| (o.id, o.geometry))
            .collect()
    }

    /// A display was plugged in
    pub fn add_output(&mut self, mut output: Output) -> OutputId {
        output.color = OutputColor {
            brightness: self.config.default_brightness,
            color_temperature: self.config.default_color_temperature,
        };
        let id = output.id;
        info!(name = %output.name, "Output added");
        self.output_globals.insert::<Server>(&self.display_handle, &output);
        if let Some(handle) = self.output_globals.handle(id) {
            self.protocols
                .foreign_toplevel_state
                .output_added(id, handle.clone());
        }
        let before = self.output_geometries();
        let decision = self.outputs.on_screen_added(output);
        self.apply_lifecycle_decision(decision, &before);
        id
    }

    /// A display was unplugged
    pub fn remove_output(&mut self, id: OutputId) {
        let before = self.output_geometries();
        let was_copy = self.outputs.mode() == OutputMode::Copy;
        let decision = self.outputs.on_screen_removed(id);
        if was_copy && self.outputs.mode() == OutputMode::Extension {
            self.protocols.virtual_output_state.copy_mode_ended();
        }
        self.protocols.output_manager_state.output_removed(id);
        self.protocols.foreign_toplevel_state.output_removed(id);
        self.protocols.capture_state.output_removed(id);
        self.color_commits.retain(|output| *output != id);
        self.output_globals.remove::<Server>(&self.display_handle, id);
        for surface in self.surfaces.ids() {
            if let Some(wrapper) = self.surfaces.get_mut(surface) {
                if wrapper.output() == Some(id) {
                    wrapper.set_owns_output(None);
                }
            }
        }
        self.apply_lifecycle_decision(decision, &before);
    }

    /// A display was switched off
    pub fn disable_output(&mut self, id: OutputId) {
        let before = self.output_geometries();
        let interrupts_copy =
            self.outputs.mode() == OutputMode::Copy && self.outputs.primary() == Some(id);
        let decision = self.outputs.on_screen_disabled(id);
        if interrupts_copy {
            // A mirror cannot outlive its source
            if let Some(group) = self.outputs.exit_copy_mode() {
                info!(group = %group.name, "Mirror source disabled, leaving copy mode");
                self.last_copy_group = Some(group);
            }
            self.protocols.virtual_output_state.copy_mode_ended();
        }
        self.apply_lifecycle_decision(decision, &before);
    }

    /// A display was switched back on
    pub fn enable_output(&mut self, id: OutputId) {
        let before = self.output_geometries();
        let decision = self.outputs.on_screen_enabled(id);
        self.apply_lifecycle_decision(decision, &before);

        if self.outputs.take_copy_mode_restore_intent() {
            match self.last_copy_group.take() {
                Some(group) => {
                    info!(group = %group.name, "Restoring copy mode");
                    match self.enter_copy_mode(&group.name, &group.outputs) {
                        Ok(()) => self
                            .protocols
                            .virtual_output_state
                            .copy_mode_restored(&group.name),
                        Err(err) => warn!("Could not restore copy mode: {err}"),
                    }
                }
                None => debug!("Copy mode restore requested without a remembered group"),
            }
        }
    }

    /// The mode of an output changed its logical geometry
    pub fn set_output_geometry(&mut self, id: OutputId, geometry: Rectangle<i32, Logical>) {
        let Ok(output) = self
            .outputs
            .output_mut(id)
            .ok_or_log(|| TreelandError::UnknownOutput(id))
        else {
            return;
        };
        if output.geometry == geometry {
            return;
        }
        output.geometry = geometry;
        self.output_globals.reconfigured(output);
        for surface in self.surfaces.on_output(id) {
            if let Some(wrapper) = self.surfaces.get_mut(surface) {
                wrapper.set_maximized_geometry(geometry);
                wrapper.set_fullscreen_geometry(geometry);
            }
        }
        self.protocols
            .session_lock_state
            .output_resized(id, geometry.size);
    }

    /// Make the named output primary
    pub fn set_primary_output(&mut self, name: &str) -> bool {
        let before = self.output_geometries();
        match self.outputs.set_primary_by_name(name) {
            Some(decision) => {
                self.apply_lifecycle_decision(decision, &before);
                true
            }
            None => false,
        }
    }

    /// Mirror every output onto the first of `outputs`
    pub fn enter_copy_mode(&mut self, name: &str, outputs: &[String]) -> Result<(), String> {
        let before = self.output_geometries();
        let decision = self
            .outputs
            .enter_copy_mode(name, outputs)
            .map_err(|err| err.to_string())?;
        self.apply_lifecycle_decision(decision, &before);
        Ok(())
    }

    /// Conclude the colour commit in flight on `output`
    pub fn complete_color_commit(&mut self, output: OutputId, success: bool) {
        let pending = self.protocols.output_manager_state.pending_commit(output);
        let applied = match (success, pending, self.outputs.output_mut(output)) {
            (true, Some(pending), Some(target)) => {
                pending.apply_to(&mut target.color);
                Some(target.color)
            }
            _ => None,
        };
        debug!(%output, success, "Colour commit completed");
        self.protocols
            .output_manager_state
            .finish_commit(output, success, applied);
    }

    /// Record whether the wallpaper of an output is dark
    pub fn set_wallpaper_color(&mut self, output: &str, is_dark: bool) {
        self.protocols
            .wallpaper_color_state
            .update_wallpaper_color(output, is_dark);
    }

    fn apply_lifecycle_decision(&mut self, decision: LifecycleDecision, before: &OutputGeometries) {
        for migration in &decision.migrations {
            let Some(target) = self.outputs.output(migration.to).map(|o| o.geometry) else {
                continue;
            };
            let surfaces: Vec<_> = self
                .surfaces
                .iter()
                .filter(|wrapper| wrapper.container() == Some(ContainerKind::Workspace))
                .filter(|wrapper| match migration.from {
                    Some(from) => wrapper.output() == Some(from) || wrapper.output().is_none(),
                    None => true,
                })
                .map(|wrapper| wrapper.id())
                .collect();
            let source = migration.from.and_then(|from| before.get(&from).copied());
            debug!(
                "Migrating {} surfaces from {:?} to {}",
                surfaces.len(),
                migration.from,
                migration.to
            );
            for surface in surfaces {
                let Some(wrapper) = self.surfaces.get_mut(surface) else {
                    continue;
                };
                let source = source.or_else(|| {
                    wrapper.output().and_then(|output| before.get(&output).copied())
                });
                let position = migrate_position(wrapper.normal_geometry(), source, target);
                wrapper.set_owns_output(Some(migration.to));
                wrapper.set_maximized_geometry(target);
                wrapper.set_fullscreen_geometry(target);
                wrapper.move_normal_geometry_in_output(position);
            }
        }

        if decision.primary_changed {
            let primary = self.outputs.primary_output().map(|o| o.name.clone());
            self.protocols.output_manager_state.set_primary_output(primary);
        }
    }
}

impl OutputManagerHandler for Server {
    fn output_manager_state(&mut self) -> &mut OutputManagerState {
        &mut self.protocols.output_manager_state
    }

    fn primary_output_requested(&mut self, name: &str) {
        if !self.set_primary_output(name) {
            warn!(%name, "Ignoring primary output request");
        }
    }

    fn output_color(&mut self, output: OutputId) -> Option<OutputColor> {
        self.outputs.output(output).map(|o| o.color)
    }

    fn commit_output_color(&mut self, output: OutputId, color: PendingColor) {
        // The display applies the change on the next idle pass
        debug!(%output, ?color, "Reconfiguring output colour");
        if !self.color_commits.contains(&output) {
            self.color_commits.push(output);
        }
    }
}

impl VirtualOutputHandler for Server {
    fn virtual_output_state(&mut self) -> &mut VirtualOutputState {
        &mut self.protocols.virtual_output_state
    }

    fn create_virtual_output(&mut self, name: &str, outputs: &[String]) -> Result<(), String> {
        self.enter_copy_mode(name, outputs)?;
        self.last_copy_group = None;
        Ok(())
    }

    fn destroy_virtual_output(&mut self, name: &str) {
        if let Some(group) = self.outputs.exit_copy_mode() {
            info!(%name, outputs = ?group.outputs, "Copy mode ended");
        }
    }
}

impl WallpaperColorHandler for Server {
    fn wallpaper_color_state(&mut self) -> &mut WallpaperColorState {
        &mut self.protocols.wallpaper_color_state
    }
}
