//! TOML-based application configuration.
//!
//! Stores:
//! - the app-group namespace of the shared store
//! - the step goal and the unblock it earns
//! - override and notification behaviour
//! - the fixed time zone, if any, used for window checks
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::ConfigError;

/// What to do when an unblock is requested while one is already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverridePolicy {
    /// Cancel the running unblock and start the new one.
    #[default]
    Replace,
    /// Refuse the new request.
    Reject,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_app_group")]
    pub app_group: String,
    #[serde(default = "default_step_goal")]
    pub step_goal: u32,
    #[serde(default = "default_step_unblock_minutes")]
    pub step_unblock_minutes: u32,
    /// Seconds before the end of an unblock to warn the user.
    #[serde(default = "default_warning_lead_secs")]
    pub warning_lead_secs: u32,
    #[serde(default)]
    pub override_policy: OverridePolicy,
    /// Minutes east of UTC. Unset means the device offset at startup.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
    #[serde(default = "default_diagnostics_capacity")]
    pub diagnostics_capacity: usize,
}

fn default_app_group() -> String {
    "group.com.productivityone.productivityApp".into()
}
fn default_step_goal() -> u32 {
    15
}
fn default_step_unblock_minutes() -> u32 {
    5
}
fn default_warning_lead_secs() -> u32 {
    60
}
fn default_true() -> bool {
    true
}
fn default_diagnostics_capacity() -> usize {
    200
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_group: default_app_group(),
            step_goal: default_step_goal(),
            step_unblock_minutes: default_step_unblock_minutes(),
            warning_lead_secs: default_warning_lead_secs(),
            override_policy: OverridePolicy::default(),
            utc_offset_minutes: None,
            notifications_enabled: true,
            diagnostics_capacity: default_diagnostics_capacity(),
        }
    }
}

impl Config {
    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk, writing the defaults when no file exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path,
                message: e.to_string(),
            }),
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "config unreadable, using defaults");
            Self::default()
        })
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }

    /// Get a config value as string by key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        match json.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Update a value in memory. Returns an error if the key is unknown or
    /// the value does not fit the field.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        let obj = json
            .as_object_mut()
            .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        if !obj.contains_key(key) {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let new_value = match value {
            "" | "none" | "null" => serde_json::Value::Null,
            _ => serde_json::from_str(value)
                .unwrap_or_else(|_| serde_json::Value::String(value.to_string())),
        };
        obj.insert(key.to_string(), new_value);

        *self = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        Ok(())
    }

    /// Set a value by key and save.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }
}
