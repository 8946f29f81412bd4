//! TOML-based application configuration.
//!
//! Stores:
//! - Backend connection settings (endpoint, project, database, collections)
//! - Logging filter used by the CLI
//!
//! Configuration is stored at `~/.config/habitrack/config.toml`. Every backend
//! key can be overridden from the environment (`HABITRACK_ENDPOINT`, ...),
//! which is how builds bake in their deployment settings.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns `~/.config/habitrack[-dev]/` based on HABITRACK_ENV.
///
/// Set HABITRACK_ENV=dev to use development data directory, or
/// HABITRACK_CONFIG_DIR to use an explicit directory.
///
/// # Errors
/// Returns an error if the home directory cannot be determined or if
/// creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("HABITRACK_CONFIG_DIR") {
        Some(explicit) => PathBuf::from(explicit),
        None => {
            let base_dir = dirs::home_dir()
                .ok_or(ConfigError::NoConfigDir)?
                .join(".config");
            let env = std::env::var("HABITRACK_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("habitrack-dev")
            } else {
                base_dir.join("habitrack")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::SaveFailed {
        path: dir.clone(),
        message: e.to_string(),
    })?;
    Ok(dir)
}

/// Database and collection identifiers the client reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionIds {
    pub database_id: String,
    pub habits: String,
    pub completions: String,
}

impl CollectionIds {
    /// Realtime channel carrying every document event of `collection`.
    pub fn channel(&self, collection: &str) -> String {
        format!(
            "databases.{}.collections.{}.documents",
            self.database_id, collection
        )
    }

    pub fn habits_channel(&self) -> String {
        self.channel(&self.habits)
    }

    pub fn completions_channel(&self) -> String {
        self.channel(&self.completions)
    }
}

/// Backend connection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// API root, e.g. `https://cloud.appwrite.io/v1`.
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub project_id: String,
    /// Platform identifier registered with the project.
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub database_id: String,
    #[serde(default)]
    pub habits_collection_id: String,
    #[serde(default)]
    pub completions_collection_id: String,
}

const ENV_OVERRIDES: [(&str, &str); 6] = [
    ("HABITRACK_ENDPOINT", "endpoint"),
    ("HABITRACK_PROJECT_ID", "project_id"),
    ("HABITRACK_PLATFORM", "platform"),
    ("HABITRACK_DATABASE_ID", "database_id"),
    ("HABITRACK_HABITS_COLLECTION_ID", "habits_collection_id"),
    ("HABITRACK_COMPLETIONS_COLLECTION_ID", "completions_collection_id"),
];

impl BackendConfig {
    fn field_mut(&mut self, name: &str) -> Option<&mut String> {
        match name {
            "endpoint" => Some(&mut self.endpoint),
            "project_id" => Some(&mut self.project_id),
            "platform" => Some(&mut self.platform),
            "database_id" => Some(&mut self.database_id),
            "habits_collection_id" => Some(&mut self.habits_collection_id),
            "completions_collection_id" => Some(&mut self.completions_collection_id),
            _ => None,
        }
    }

    /// Apply overrides from `lookup` (normally `std::env::var`).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for (var, field) in ENV_OVERRIDES {
            if let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) {
                if let Some(slot) = self.field_mut(field) {
                    *slot = value.trim().to_string();
                }
            }
        }
    }

    /// Report the first required key that is still empty. Platform is optional.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("backend.endpoint", &self.endpoint),
            ("backend.project_id", &self.project_id),
            ("backend.database_id", &self.database_id),
            ("backend.habits_collection_id", &self.habits_collection_id),
            ("backend.completions_collection_id", &self.completions_collection_id),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingKey(key.to_string()));
            }
        }

        let url = url::Url::parse(&self.endpoint).map_err(|e| ConfigError::InvalidValue {
            key: "backend.endpoint".to_string(),
            message: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                key: "backend.endpoint".to_string(),
                message: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        Ok(())
    }

    pub fn collections(&self) -> CollectionIds {
        CollectionIds {
            database_id: self.database_id.clone(),
            habits: self.habits_collection_id.clone(),
            completions: self.completions_collection_id.clone(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing` filter directive used when HABITRACK_LOG is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/habitrack/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_log_filter() -> String {
    "warn".into()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
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

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                match obj.get(part) {
                    Some(serde_json::Value::String(_)) => {
                        obj.insert(part.to_string(), serde_json::Value::String(value.into()));
                        return Ok(());
                    }
                    _ => return Err(unknown()),
                }
            }
            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default, then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = Self::load_from(&Self::path()?)?;
        cfg.backend
            .apply_overrides(|var| std::env::var(var).ok());
        Ok(cfg)
    }

    /// Load the file at `path`, writing defaults there if it does not exist.
    /// No environment overrides are applied.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
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

    /// Persist to the default location.
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

    /// Set a string config value by key. Returns error if key is unknown.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}
