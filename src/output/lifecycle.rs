//! Primary output assignment across hot-plug and enable/disable
//!
//! The manager only decides. It returns a [`LifecycleDecision`] describing the
//! new primary and which outputs' surfaces have to move; the server applies
//! the migrations to the surface registry and broadcasts the new primary.

use tracing::{debug, info, warn};

use super::{Output, OutputId, OutputMode};
use crate::config::OutputConfigState;

/// Move every surface owned by `from` onto `to`
///
/// `from == None` means every workspace surface regardless of owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub from: Option<OutputId>,
    pub to: OutputId,
}

/// Outcome of one lifecycle event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleDecision {
    pub primary_changed: bool,
    pub migrations: Vec<Migration>,
}

impl LifecycleDecision {
    pub fn is_empty(&self) -> bool {
        !self.primary_changed && self.migrations.is_empty()
    }
}

/// The active mirror group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyGroup {
    pub name: String,
    pub outputs: Vec<String>,
    /// Output every other output mirrors
    pub mirror: OutputId,
}

/// Why a mirror group was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CopyModeError {
    #[error("{0} does not exist!")]
    UnknownOutput(String),
    #[error("{0} is already a copy screen, invalid setting!")]
    AlreadyCopy(String),
}

#[derive(Debug, Default)]
pub struct OutputLifecycleManager {
    outputs: Vec<Output>,
    primary: Option<OutputId>,
    mode: OutputMode,
    copy_group: Option<CopyGroup>,
    copy_mode_restore: bool,
    state: OutputConfigState,
}

impl OutputLifecycleManager {
    pub fn new(state: OutputConfigState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn output(&self, id: OutputId) -> Option<&Output> {
        self.outputs.iter().find(|o| o.id == id)
    }

    pub fn output_mut(&mut self, id: OutputId) -> Option<&mut Output> {
        self.outputs.iter_mut().find(|o| o.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Output> {
        self.outputs.iter().find(|o| o.name == name)
    }

    pub fn primary(&self) -> Option<OutputId> {
        self.primary
    }

    pub fn primary_output(&self) -> Option<&Output> {
        self.primary.and_then(|id| self.output(id))
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn copy_group(&self) -> Option<&CopyGroup> {
        self.copy_group.as_ref()
    }

    pub fn config_state(&self) -> &OutputConfigState {
        &self.state
    }

    /// First enabled output other than `exclude`, in insertion order
    pub fn find_first_available_output(&self, exclude: Option<OutputId>) -> Option<OutputId> {
        self.outputs
            .iter()
            .find(|o| Some(o.id) != exclude && o.enabled)
            .map(|o| o.id)
    }

    /// Consume the one-shot request to re-enter mirroring
    pub fn take_copy_mode_restore_intent(&mut self) -> bool {
        std::mem::take(&mut self.copy_mode_restore)
    }

    fn set_primary(&mut self, id: Option<OutputId>) -> bool {
        if self.primary == id {
            return false;
        }
        info!("Primary output changed: {:?} -> {:?}", self.primary, id);
        self.primary = id;
        true
    }

    fn name_of(&self, id: OutputId) -> Option<String> {
        self.output(id).map(|o| o.name.clone())
    }

    /// A new output was plugged in
    pub fn on_screen_added(&mut self, output: Output) -> LifecycleDecision {
        let mut decision = LifecycleDecision::default();
        let id = output.id;
        let name = output.name.clone();
        let enabled = output.enabled;
        debug!("Output {name} added");
        self.outputs.push(output);

        if self.primary.is_none() && enabled {
            decision.primary_changed = self.set_primary(Some(id));
        }

        let was_primary = self.state.was_screen_primary(&name);
        let should_restore_copy = self.state.should_restore_copy_mode();
        if was_primary
            && self.mode == OutputMode::Extension
            && !should_restore_copy
            && self.primary.is_some()
        {
            decision.primary_changed |= self.set_primary(Some(id));
        }

        self.state.clear_output_state(&name);
        decision
    }

    /// An output was unplugged
    pub fn on_screen_removed(&mut self, id: OutputId) -> LifecycleDecision {
        let mut decision = LifecycleDecision::default();
        let Some(name) = self.name_of(id) else {
            warn!("Removal of unknown output {id}");
            return decision;
        };

        let is_current_primary = self.primary == Some(id);
        let was_primary = self.state.was_screen_primary(&name);

        if is_current_primary && !was_primary {
            self.state.mark_screen_as_primary(&name);
        }

        if !is_current_primary && !was_primary {
            if let Some(primary) = self.primary {
                decision.migrations.push(Migration {
                    from: Some(id),
                    to: primary,
                });
            }
        }

        self.outputs.retain(|o| o.id != id);

        if self.mode == OutputMode::Copy {
            self.exit_copy_mode();
        }

        if is_current_primary {
            let next = self.find_first_available_output(None);
            decision.primary_changed = self.set_primary(next);
            if let Some(next) = next {
                decision.migrations.push(Migration {
                    from: Some(id),
                    to: next,
                });
            }
        }

        decision
    }

    /// An output was switched off but stays plugged in
    pub fn on_screen_disabled(&mut self, id: OutputId) -> LifecycleDecision {
        let mut decision = LifecycleDecision::default();
        let Some(name) = self.name_of(id) else {
            warn!("Disable of unknown output {id}");
            return decision;
        };
        if let Some(output) = self.output_mut(id) {
            output.enabled = false;
        }

        let is_current_primary = self.primary == Some(id);

        if self.mode == OutputMode::Copy && is_current_primary {
            self.state.record_copy_mode_exit();
        } else if is_current_primary {
            self.state.mark_screen_as_primary(&name);
        }

        if is_current_primary {
            match self.find_first_available_output(Some(id)) {
                Some(next) => {
                    decision.primary_changed = self.set_primary(Some(next));
                    decision.migrations.push(Migration {
                        from: Some(id),
                        to: next,
                    });
                }
                None => decision.primary_changed = self.set_primary(None),
            }
        } else if let Some(primary) = self.primary {
            decision.migrations.push(Migration {
                from: Some(id),
                to: primary,
            });
        }

        decision
    }

    /// A disabled output was switched back on
    pub fn on_screen_enabled(&mut self, id: OutputId) -> LifecycleDecision {
        let mut decision = LifecycleDecision::default();
        let Some(name) = self.name_of(id) else {
            warn!("Enable of unknown output {id}");
            return decision;
        };
        if let Some(output) = self.output_mut(id) {
            output.enabled = true;
        }

        let was_primary = self.state.was_screen_primary(&name);
        let should_restore_copy = self.state.should_restore_copy_mode();

        if self.mode == OutputMode::Extension && should_restore_copy && self.outputs.len() >= 2 {
            self.state.clear_copy_mode_intent();
            self.copy_mode_restore = true;
        } else if was_primary
            && self.mode == OutputMode::Extension
            && !should_restore_copy
            && self.primary.is_some()
        {
            decision.primary_changed = self.set_primary(Some(id));
        }

        // A lone output coming back is primary whatever the intent said
        if self.primary.is_none() {
            decision.primary_changed |= self.set_primary(Some(id));
        }

        self.state.clear_output_state(&name);
        decision
    }

    /// Make the named output primary
    pub fn set_primary_by_name(&mut self, name: &str) -> Option<LifecycleDecision> {
        let Some(output) = self.find_by_name(name) else {
            warn!("Cannot set primary output: {name} does not exist");
            return None;
        };
        if !output.enabled {
            warn!("Cannot set primary output: {name} is disabled");
            return None;
        }
        let id = output.id;
        Some(LifecycleDecision {
            primary_changed: self.set_primary(Some(id)),
            migrations: Vec::new(),
        })
    }

    /// Mirror every output onto the first one listed in `outputs`
    pub fn enter_copy_mode(
        &mut self,
        name: &str,
        outputs: &[String],
    ) -> Result<LifecycleDecision, CopyModeError> {
        let mut mirror = None;
        for output in &self.outputs {
            if !outputs.contains(&output.name) {
                return Err(CopyModeError::UnknownOutput(output.name.clone()));
            }
            let is_copy = self
                .copy_group
                .as_ref()
                .is_some_and(|group| group.mirror != output.id);
            if is_copy {
                return Err(CopyModeError::AlreadyCopy(output.name.clone()));
            }
            if outputs.first() == Some(&output.name) {
                mirror = Some(output.id);
            }
        }
        let mirror = mirror.ok_or_else(|| {
            CopyModeError::UnknownOutput(outputs.first().cloned().unwrap_or_default())
        })?;

        info!("Entering copy mode {name} mirroring {mirror}");
        let primary_changed = self.set_primary(Some(mirror));
        self.mode = OutputMode::Copy;
        self.copy_group = Some(CopyGroup {
            name: name.to_string(),
            outputs: outputs.to_vec(),
            mirror,
        });
        Ok(LifecycleDecision {
            primary_changed,
            migrations: vec![Migration {
                from: None,
                to: mirror,
            }],
        })
    }

    /// Return every output to an independent desktop
    pub fn exit_copy_mode(&mut self) -> Option<CopyGroup> {
        if self.mode == OutputMode::Extension {
            return None;
        }
        info!("Leaving copy mode");
        self.mode = OutputMode::Extension;
        self.copy_group.take()
    }
}
