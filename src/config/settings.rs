//! Settings file persistence
//!
//! One JSON document holds the capture options and the per-directory
//! allocation counters. Writes go to a sibling `.tmp` file which is then
//! renamed over the target.

use super::model::CaptureConfig;
use crate::output::AllocationState;
use crate::utils::error::CaptureResult;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "dvgrab-gui";
const FILE_NAME: &str = "config.json";

/// Persisted front-end settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(flatten)]
    pub config: CaptureConfig,

    /// Next folder index per absolute base directory
    #[serde(default)]
    pub next_index_by_dir: AllocationState,
}

impl Settings {
    /// `$XDG_CONFIG_HOME/dvgrab-gui/config.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join(FILE_NAME)
    }

    /// Load settings, falling back to defaults when the file is absent or bad
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No settings at {:?}, using defaults", path);
                return Self::default();
            }
            Err(e) => {
                tracing::warn!("Failed to read settings {:?}: {}", path, e);
                return Self::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Ignoring corrupt settings {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Write settings atomically
    pub fn save(&self, path: &Path) -> CaptureResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;

        tracing::debug!("Saved settings to {:?}", path);
        Ok(())
    }
}
