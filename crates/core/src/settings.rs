//! Flat string-keyed settings store
//!
//! Every value is a string; typed getters parse on read and fall back to the
//! built-in default when a key was never set. The store is persisted as a
//! versioned JSON document. Keys the current build does not know are kept
//! as they are so older and newer builds can share one file.

use docpanel_cache::{CacheConfig, ConfigError, KEY_BACKEND, KEY_CACHE_MB, KEY_PROGRESSIVE_BLOCK};
use docpanel_layout::{LayoutParams, LayoutPolicy, Orientation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const SETTINGS_SCHEMA_VERSION: u32 = 1;
const SETTINGS_FILE: &str = "settings.json";
const APP_DIR: &str = "docpanel";

pub const KEY_LAYOUT_POLICY: &str = "layout_policy";
pub const KEY_LAYOUT_LANES: &str = "layout_lanes";
pub const KEY_LAYOUT_SPACING: &str = "layout_spacing";
pub const KEY_LAYOUT_STRETCH: &str = "layout_stretch";
pub const KEY_ORIENTATION: &str = "orientation";

const DEFAULTS: &[(&str, &str)] = &[
    (KEY_CACHE_MB, "64"),
    (KEY_BACKEND, "scaled"),
    (KEY_PROGRESSIVE_BLOCK, "512"),
    (KEY_LAYOUT_POLICY, "linear"),
    (KEY_LAYOUT_LANES, "2"),
    (KEY_LAYOUT_SPACING, "4"),
    (KEY_LAYOUT_STRETCH, "false"),
    (KEY_ORIENTATION, "vertical"),
];

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("unable to resolve config directory")]
    NoConfigDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid value {value:?} for setting {key}")]
    InvalidValue { key: String, value: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SettingsEnvelope {
    version: u32,
    values: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    values: BTreeMap<String, String>,
    path: Option<PathBuf>,
}

impl Settings {
    /// Empty store, not backed by a file
    pub fn new() -> Self {
        Self::default()
    }

    /// Location of the settings file in the platform config directory
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        let dir = dirs::config_dir().ok_or(SettingsError::NoConfigDirectory)?;
        Ok(dir.join(APP_DIR).join(SETTINGS_FILE))
    }

    /// Load from the platform config directory
    pub fn load_default() -> Result<Self, SettingsError> {
        Self::load(Self::default_path()?)
    }

    /// Load the store at `path`; a missing file gives an empty store
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self { values: BTreeMap::new(), path: Some(path) });
        }

        let bytes = fs::read(&path)?;
        let envelope: SettingsEnvelope = serde_json::from_slice(&bytes)?;
        if envelope.version > SETTINGS_SCHEMA_VERSION {
            log::warn!(
                "settings file {} has newer schema version {}",
                path.display(),
                envelope.version
            );
        }
        Ok(Self { values: envelope.values, path: Some(path) })
    }

    /// Write the store back to the file it was loaded from
    ///
    /// Does nothing for a store not backed by a file.
    pub fn save(&self) -> Result<(), SettingsError> {
        match &self.path {
            Some(path) => self.save_to(path),
            None => Ok(()),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let envelope =
            SettingsEnvelope { version: SETTINGS_SCHEMA_VERSION, values: self.values.clone() };
        let bytes = serde_json::to_vec_pretty(&envelope)?;
        fs::write(path, bytes)?;
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Stored value, or the built-in default
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str).or_else(|| default_for(key))
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Forget a stored value so the default applies again
    pub fn reset(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    pub fn is_set(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, SettingsError> {
        self.get(key)
            .map(|value| match value.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" => Ok(false),
                _ => Err(invalid(key, value)),
            })
            .transpose()
    }

    pub fn get_u32(&self, key: &str) -> Result<Option<u32>, SettingsError> {
        self.get_enum(key)
    }

    /// Parse a value with its [`FromStr`] implementation
    pub fn get_enum<T: FromStr>(&self, key: &str) -> Result<Option<T>, SettingsError> {
        self.get(key)
            .map(|value| value.trim().parse::<T>().map_err(|_| invalid(key, value)))
            .transpose()
    }

    /// Layout parameters for the thumbnail panel
    pub fn layout_params(&self) -> Result<LayoutParams, SettingsError> {
        let defaults = LayoutParams::default();
        let stretch = self.get_bool(KEY_LAYOUT_STRETCH)?.unwrap_or(false);
        let policy = match self.get(KEY_LAYOUT_POLICY).map(|v| v.trim().to_ascii_lowercase()) {
            None => defaults.policy,
            Some(value) => match value.as_str() {
                "linear" => LayoutPolicy::Linear,
                "grid" => LayoutPolicy::Grid { stretch },
                "masonry" => LayoutPolicy::Masonry,
                _ => return Err(invalid(KEY_LAYOUT_POLICY, &value)),
            },
        };
        let orientation = match self.get(KEY_ORIENTATION).map(|v| v.trim().to_ascii_lowercase()) {
            None => defaults.orientation,
            Some(value) => match value.as_str() {
                "vertical" => Orientation::Vertical,
                "horizontal" => Orientation::Horizontal,
                _ => return Err(invalid(KEY_ORIENTATION, &value)),
            },
        };

        Ok(LayoutParams {
            policy,
            lanes: self.get_u32(KEY_LAYOUT_LANES)?.unwrap_or(defaults.lanes),
            spacing: self.get_u32(KEY_LAYOUT_SPACING)?.unwrap_or(defaults.spacing),
            orientation,
        })
    }

    /// Thumbnail cache configuration
    pub fn cache_config(&self) -> Result<CacheConfig, SettingsError> {
        Ok(CacheConfig::from_settings(|key| self.get(key).map(str::to_string))?)
    }
}

fn default_for(key: &str) -> Option<&'static str> {
    DEFAULTS.iter().find(|(name, _)| *name == key).map(|(_, value)| *value)
}

fn invalid(key: &str, value: &str) -> SettingsError {
    SettingsError::InvalidValue { key: key.to_string(), value: value.to_string() }
}
