//! Compositor configuration
//!
//! Settings are read from a JSON file at startup. Every key is optional; a
//! missing key takes its built-in default. Personalization changes made by
//! clients are written back with [`Config::save_to_file`].

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{TreelandError, TreelandResult};

pub mod state;

pub use state::OutputConfigState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cursor_theme: String,
    pub cursor_size: u32,
    /// Window corner radius in logical pixels
    pub window_radius: i32,
    pub icon_theme: String,
    pub active_color: String,
    /// Window opacity in percent
    pub window_opacity: u32,
    /// 0 auto, 1 light, 2 dark
    pub window_theme_type: u32,
    pub titlebar_height: u32,
    pub font: String,
    pub mono_font: String,
    pub font_size: u32,
    pub workspace_count: usize,
    /// Brightness new outputs start with, 0.0..=1.0
    pub default_brightness: f64,
    pub default_color_temperature: u32,
    pub animations: bool,
    /// Length of window state, minimize, map and unmap animations
    pub animation_duration_ms: u64,

    /// Where the config was loaded from; personalization writes back here
    #[serde(skip)]
    pub path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cursor_theme: "default".to_string(),
            cursor_size: 24,
            window_radius: 12,
            icon_theme: "bloom".to_string(),
            active_color: "#1f6ee7".to_string(),
            window_opacity: 100,
            window_theme_type: 0,
            titlebar_height: 30,
            font: "Source Han Sans SC".to_string(),
            mono_font: "Noto Mono".to_string(),
            font_size: 105,
            workspace_count: 6,
            default_brightness: 1.0,
            default_color_temperature: 6500,
            animations: true,
            animation_duration_ms: 300,
            path: None,
        }
    }
}

impl Config {
    /// Load the config, falling back to defaults when the file does not exist
    pub fn load_from_file(path: impl AsRef<Path>) -> TreelandResult<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&contents)?;
            info!("Loaded config from {}", path.display());
            config
        } else {
            debug!("No config at {}, using defaults", path.display());
            Config::default()
        };
        config.path = Some(path.to_path_buf());
        config.validate()?;
        Ok(config)
    }

    /// Write the config back to where it was loaded from
    pub fn save_to_file(&self) -> TreelandResult<()> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| TreelandError::Config("config has no backing file".into()))?;
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        debug!("Saved config to {}", path.display());
        Ok(())
    }

    /// Whether changes can be persisted
    pub fn is_writable(&self) -> bool {
        self.path.is_some()
    }

    fn validate(&self) -> TreelandResult<()> {
        if self.workspace_count == 0 {
            return Err(TreelandError::Config("workspace_count must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.default_brightness) {
            return Err(TreelandError::Config(format!(
                "default_brightness {} is outside 0.0..=1.0",
                self.default_brightness
            )));
        }
        if !(1000..=20000).contains(&self.default_color_temperature) {
            return Err(TreelandError::Config(format!(
                "default_color_temperature {} is outside 1000..=20000",
                self.default_color_temperature
            )));
        }
        Ok(())
    }
}
