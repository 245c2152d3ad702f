//! TOML-based application configuration.
//!
//! Stores:
//! - Day boundary zone (local, or a pinned UTC offset)
//! - Reconciliation window
//! - Daily reminder time
//! - Widget export settings
//! - Biometric lock flag (reported to the widget)
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::day::DayZone;
use crate::error::ConfigError;
use crate::reminder::ReminderSchedule;
use crate::store::data_dir;

/// Calendar day configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DayConfig {
    /// Minutes east of UTC. Unset means the system time zone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utc_offset_minutes: Option<i32>,
}

/// Reconciliation configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Only reconcile the last N days. Unset means all history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_days: Option<u32>,
}

/// Daily reminder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_reminder_hour")]
    pub hour: u32,
    #[serde(default)]
    pub minute: u32,
}

/// Widget bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_widget_state_file")]
    pub state_file: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub biometric_lock: bool,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub day: DayConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub reminder: ReminderConfig,
    #[serde(default)]
    pub widget: WidgetConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

fn default_reminder_hour() -> u32 {
    20
}
fn default_true() -> bool {
    true
}
fn default_widget_state_file() -> String {
    "widget-state.json".into()
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            hour: default_reminder_hour(),
            minute: 0,
        }
    }
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            state_file: default_widget_state_file(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    /// Optional keys are omitted from the tree while unset; `known_optional`
    /// lists the ones that may still be assigned.
    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let (parent_path, leaf) = match key.rsplit_once('.') {
            Some((parent, leaf)) => (Some(parent), leaf),
            None => (None, key),
        };
        if leaf.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        if let Some(parent_path) = parent_path {
            for part in parent_path.split('.') {
                current = current.get_mut(part).ok_or_else(unknown)?;
            }
        }
        let obj = current.as_object_mut().ok_or_else(unknown)?;

        if Self::known_optional(key) && (value.is_empty() || value == "none") {
            obj.remove(leaf);
            return Ok(());
        }

        let new_value = match obj.get(leaf) {
            Some(serde_json::Value::Bool(_)) => serde_json::Value::Bool(
                value
                    .parse::<bool>()
                    .map_err(|e| invalid(e.to_string()))?,
            ),
            Some(serde_json::Value::Number(_)) => parse_number(value).map_err(invalid)?,
            Some(serde_json::Value::String(_)) => serde_json::Value::String(value.into()),
            Some(_) => return Err(unknown()),
            None if Self::known_optional(key) => parse_number(value).map_err(invalid)?,
            None => return Err(unknown()),
        };

        obj.insert(leaf.to_string(), new_value);
        Ok(())
    }

    fn known_optional(key: &str) -> bool {
        matches!(key, "day.utc_offset_minutes" | "reconcile.window_days")
    }

    fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("config.toml"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from the data directory, writing the defaults if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content)
                    .map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without saving.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not fit it.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Range checks that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reminder.hour > 23 {
            return Err(ConfigError::InvalidValue {
                key: "reminder.hour".into(),
                message: format!("{} is not in 0..=23", self.reminder.hour),
            });
        }
        if self.reminder.minute > 59 {
            return Err(ConfigError::InvalidValue {
                key: "reminder.minute".into(),
                message: format!("{} is not in 0..=59", self.reminder.minute),
            });
        }
        if let Some(offset) = self.day.utc_offset_minutes {
            if DayZone::from_offset_minutes(offset).is_none() {
                return Err(ConfigError::InvalidValue {
                    key: "day.utc_offset_minutes".into(),
                    message: format!("{offset} is outside +/-24h"),
                });
            }
        }
        Ok(())
    }

    /// Zone used to cut timestamps into days.
    pub fn zone(&self) -> DayZone {
        self.day
            .utc_offset_minutes
            .and_then(DayZone::from_offset_minutes)
            .unwrap_or_default()
    }

    pub fn reminder_schedule(&self) -> ReminderSchedule {
        ReminderSchedule {
            enabled: self.reminder.enabled,
            hour: self.reminder.hour,
            minute: self.reminder.minute,
        }
    }

    /// Widget state file, resolved against the data directory when relative.
    pub fn widget_state_path(&self) -> Result<PathBuf, ConfigError> {
        let file = PathBuf::from(&self.widget.state_file);
        if file.is_absolute() {
            return Ok(file);
        }
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: file.clone(),
            message: e.to_string(),
        })?;
        Ok(dir.join(file))
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default configuration");
            Self::default()
        })
    }
}

fn parse_number(value: &str) -> Result<serde_json::Value, String> {
    if let Ok(n) = value.parse::<i64>() {
        Ok(serde_json::Value::Number(n.into()))
    } else {
        Err(format!("cannot parse '{value}' as integer"))
    }
}
