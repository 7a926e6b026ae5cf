use std::path::{Path, PathBuf};
use std::time::Duration;
use std::fs;

use eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::debounce::MIN_QUIET_WINDOW;
use crate::models::LayoutOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SQLite file holding the book and reading state. Defaults to
    /// `bunkai.db` next to the configuration file.
    pub database: Option<PathBuf>,
    pub layout: LayoutOptions,
    pub scroll_debounce_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: None,
            layout: LayoutOptions::default(),
            scroll_debounce_ms: MIN_QUIET_WINDOW.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub settings: Settings,
    filepath: PathBuf,
}

impl Config {
    pub fn new() -> Result<Self> {
        let prefix = get_app_data_prefix()?;
        Self::load_from(prefix.join("configuration.json"))
    }

    /// Loads configuration from `filepath`, writing defaults there if it
    /// does not exist yet. An unreadable file falls back to defaults.
    pub fn load_from(filepath: PathBuf) -> Result<Self> {
        if !filepath.exists() {
            let config = Self {
                settings: Settings::default(),
                filepath,
            };
            config.save()?;
            return Ok(config);
        }

        let config_str = fs::read_to_string(&filepath)?;
        let settings = match serde_json::from_str::<Settings>(&config_str) {
            Ok(settings) => settings,
            Err(err) => {
                warn!(?err, path = %filepath.display(), "invalid configuration, using defaults");
                Settings::default()
            }
        };
        Ok(Self { settings, filepath })
    }

    pub fn save(&self) -> Result<()> {
        let config_str = serde_json::to_string_pretty(&self.settings)?;
        if let Some(parent) = self.filepath.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.filepath, config_str)?;
        Ok(())
    }

    pub fn filepath(&self) -> &PathBuf {
        &self.filepath
    }

    pub fn database_path(&self) -> PathBuf {
        match &self.settings.database {
            Some(path) => path.clone(),
            None => self
                .filepath
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("bunkai.db"),
        }
    }

    pub fn scroll_window(&self) -> Duration {
        Duration::from_millis(self.settings.scroll_debounce_ms).max(MIN_QUIET_WINDOW)
    }
}

pub fn get_app_data_prefix() -> Result<PathBuf> {
    if let Some(config_home) = std::env::var_os("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(config_home).join("bunkai"));
    } else if let Some(home) = std::env::var_os("HOME") {
        let path = PathBuf::from(&home).join(".config").join("bunkai");
        if path.exists() {
            return Ok(path);
        }
        return Ok(PathBuf::from(home).join(".bunkai"));
    } else if let Some(user_profile) = std::env::var_os("USERPROFILE") {
        return Ok(PathBuf::from(user_profile).join(".bunkai"));
    }

    Err(eyre::eyre!("Could not determine application data directory"))
}
