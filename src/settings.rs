//! Settings store for the `overlay_display_devices` string
//!
//! The setting lives in a small JSON file. Writers go through
//! [`SettingsStore::put_overlay_display_devices`], which notifies every
//! registered observer after the file is written.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

use crate::constants::paths;

pub type SettingsObserver = Box<dyn Fn() + Send + Sync>;

/// Where the adapter reads its configuration from
pub trait SettingsSource: Send + Sync {
    /// Current value; `None` when the setting was never written
    fn overlay_display_devices(&self) -> Result<Option<String>>;

    /// Call `observer` every time the setting may have changed
    fn register_observer(&self, observer: SettingsObserver);
}

/// On-disk layout of the settings file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay_display_devices: Option<String>,
}

pub struct SettingsStore {
    path: PathBuf,
    observers: Mutex<Vec<SettingsObserver>>,
}

impl SettingsStore {
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(paths::APP_DIR);
        path.push(paths::SETTINGS_FILENAME);
        path
    }

    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file; a missing file means default settings
    pub fn load(&self) -> Result<GlobalSettings> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "Settings file not found, using defaults");
            return Ok(GlobalSettings::default());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {:?}", self.path))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings JSON from {:?}", self.path))
    }

    fn save(&self, settings: &GlobalSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create settings directory {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(settings).context("Failed to serialize settings to JSON")?;
        fs::write(&self.path, json).with_context(|| format!("Failed to write settings to {:?}", self.path))?;
        Ok(())
    }

    /// Write (or clear, with `None`) the setting and notify observers
    pub fn put_overlay_display_devices(&self, value: Option<&str>) -> Result<()> {
        let mut settings = self.load()?;
        settings.overlay_display_devices = value.map(str::to_string);
        self.save(&settings)?;
        info!(path = %self.path.display(), value = ?value, "Saved overlay display setting");
        self.notify_change();
        Ok(())
    }

    /// Tell observers to re-read (also used for SIGHUP)
    pub fn notify_change(&self) {
        let observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        for observer in observers.iter() {
            observer();
        }
    }
}

impl SettingsSource for SettingsStore {
    fn overlay_display_devices(&self) -> Result<Option<String>> {
        Ok(self.load()?.overlay_display_devices)
    }

    fn register_observer(&self, observer: SettingsObserver) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }
}
