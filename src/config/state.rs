//! Persisted output intent
//!
//! Remembers which outputs were primary before they went away and whether
//! mirroring was interrupted, so the output lifecycle can restore the user's
//! layout when the hardware comes back.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TreelandResult;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfigState {
    primary_intents: BTreeSet<String>,
    copy_mode_exited: bool,

    #[serde(skip)]
    path: Option<PathBuf>,
}

impl OutputConfigState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load persisted state; a missing file gives an empty state
    pub fn load(path: impl AsRef<Path>) -> TreelandResult<Self> {
        let path = path.as_ref();
        let mut state = if path.exists() {
            serde_json::from_str(&fs::read_to_string(path)?)?
        } else {
            Self::default()
        };
        state.path = Some(path.to_path_buf());
        Ok(state)
    }

    pub fn was_screen_primary(&self, name: &str) -> bool {
        self.primary_intents.contains(name)
    }

    pub fn mark_screen_as_primary(&mut self, name: &str) {
        debug!("Remembering {name} as primary");
        self.primary_intents.insert(name.to_string());
        self.persist();
    }

    pub fn clear_output_state(&mut self, name: &str) {
        if self.primary_intents.remove(name) {
            self.persist();
        }
    }

    pub fn should_restore_copy_mode(&self) -> bool {
        self.copy_mode_exited
    }

    pub fn record_copy_mode_exit(&mut self) {
        debug!("Remembering interrupted copy mode");
        self.copy_mode_exited = true;
        self.persist();
    }

    pub fn clear_copy_mode_intent(&mut self) {
        if std::mem::take(&mut self.copy_mode_exited) {
            self.persist();
        }
    }

    fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let result = serde_json::to_string(self)
            .map_err(crate::error::TreelandError::from)
            .and_then(|json| fs::write(path, json).map_err(Into::into));
        crate::error::log_error(result);
    }
}
