//! Configuration for the framework and for individual plugins.
//!
//! The framework itself is configured from a TOML file
//! ([`FrameworkConfig`]); each plugin additionally owns a JSON config
//! document with declared defaults ([`PluginConfig`]), created on first
//! load and reloadable at runtime.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::ConfigError;

fn default_config_dir() -> String {
    "config".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_chat_prefixes() -> Vec<String> {
    vec!["/".to_string(), "!".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Framework configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkConfig {
    /// Directory layout settings
    #[serde(default)]
    pub directories: DirectorySettings,
    /// Command routing settings
    #[serde(default)]
    pub commands: CommandSettings,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Where the framework keeps its files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorySettings {
    /// Directory for framework and plugin config files
    #[serde(default = "default_config_dir")]
    pub config_dir: String,
    /// Directory for plugin data files
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

/// Command routing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSettings {
    /// Prefixes that mark a chat line as a command (e.g. "/", "!")
    #[serde(default = "default_chat_prefixes")]
    pub chat_prefixes: Vec<String>,
    /// Command names third-party plugins may never take over
    #[serde(default)]
    pub restricted: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            directories: DirectorySettings::default(),
            commands: CommandSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            chat_prefixes: default_chat_prefixes(),
            restricted: Vec::new(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl FrameworkConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, a default configuration file is written
    /// at the given path and the defaults are returned.
    pub async fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: FrameworkConfig = toml::from_str(&content)?;
            config.validate().map_err(ConfigError::Validation)?;
            Ok(config)
        } else {
            let default_config = FrameworkConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Validates the configuration for consistency and correctness.
    pub fn validate(&self) -> Result<(), String> {
        if self.directories.config_dir.is_empty() {
            return Err("Config directory cannot be empty".to_string());
        }
        if self.directories.data_dir.is_empty() {
            return Err("Data directory cannot be empty".to_string());
        }

        if self.commands.chat_prefixes.is_empty() {
            return Err("At least one chat command prefix is required".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}

/// One plugin's JSON config document.
///
/// The document starts as a copy of the declared defaults. `load` replaces
/// it wholesale from the file when one exists, writes the defaults out when
/// none does, and falls back to the defaults (reporting the failure) when
/// the file is unreadable.
#[derive(Debug)]
pub struct PluginConfig {
    path: Option<PathBuf>,
    defaults: Value,
    values: Value,
}

impl PluginConfig {
    pub fn new(defaults: Value) -> Self {
        Self {
            path: None,
            values: defaults.clone(),
            defaults,
        }
    }

    pub fn set_path(&mut self, path: PathBuf) {
        self.path = Some(path);
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load the document from disk.
    ///
    /// Without a path the defaults are used. A missing file is created
    /// from the defaults. A file that fails to parse leaves the defaults
    /// in effect and returns the parse error.
    pub fn load(&mut self) -> Result<(), ConfigError> {
        let Some(path) = self.path.clone() else {
            self.values = self.defaults.clone();
            return Ok(());
        };

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str(&content) {
                Ok(value) => {
                    self.values = value;
                    Ok(())
                }
                Err(err) => {
                    self.values = self.defaults.clone();
                    Err(ConfigError::Json(err))
                }
            }
        } else {
            self.values = self.defaults.clone();
            self.save()
        }
    }

    /// Write the document to disk. A no-op for path-less configs.
    pub fn save(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.values)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn document(&self) -> &Value {
        &self.values
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        if !self.values.is_object() {
            self.values = Value::Object(serde_json::Map::new());
        }
        if let Some(map) = self.values.as_object_mut() {
            map.insert(key.to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn default_config_is_valid() {
        let config = FrameworkConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.directories.config_dir, "config");
        assert_eq!(config.directories.data_dir, "data");
        assert_eq!(config.commands.chat_prefixes, vec!["/", "!"]);
        assert!(config.commands.restricted.is_empty());
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json_format);
    }

    #[test]
    fn validation_rejects_bad_log_level() {
        let mut config = FrameworkConfig::default();
        config.logging.level = "shouty".to_string();

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("Invalid log level"));
    }

    #[test]
    fn validation_rejects_empty_prefixes_and_dirs() {
        let mut config = FrameworkConfig::default();
        config.commands.chat_prefixes.clear();
        assert!(config.validate().unwrap_err().contains("chat command prefix"));

        let mut config = FrameworkConfig::default();
        config.directories.config_dir.clear();
        assert!(config.validate().unwrap_err().contains("Config directory"));
    }

    #[tokio::test]
    async fn load_creates_default_file_when_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("palisade.toml");

        let config = FrameworkConfig::load_from_file(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(config.logging.level, "info");

        // A second load round-trips through the file just written.
        let reloaded = FrameworkConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded.commands.chat_prefixes, vec!["/", "!"]);
    }

    #[tokio::test]
    async fn load_fills_missing_sections_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("palisade.toml");
        tokio::fs::write(
            &path,
            r#"
[commands]
restricted = ["quit", "kick"]

[logging]
level = "debug"
"#,
        )
        .await
        .unwrap();

        let config = FrameworkConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.commands.restricted, vec!["quit", "kick"]);
        assert_eq!(config.commands.chat_prefixes, vec!["/", "!"]);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.directories.config_dir, "config");
    }

    #[tokio::test]
    async fn load_rejects_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("palisade.toml");
        tokio::fs::write(&path, "[logging]\nlevel = \"shouty\"\n")
            .await
            .unwrap();

        let result = FrameworkConfig::load_from_file(&path).await;
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn plugin_config_starts_from_defaults() {
        let mut config = PluginConfig::new(json!({ "Greeting": "hello" }));
        assert_eq!(config.get("Greeting"), Some(&json!("hello")));

        // Path-less loads keep the defaults.
        config.load().unwrap();
        assert_eq!(config.get("Greeting"), Some(&json!("hello")));
    }

    #[test]
    fn plugin_config_creates_file_on_first_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Greeter.json");

        let mut config = PluginConfig::new(json!({ "Greeting": "hello" }));
        config.set_path(path.clone());
        config.load().unwrap();

        assert!(path.exists());
        let on_disk: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, json!({ "Greeting": "hello" }));
    }

    #[test]
    fn plugin_config_file_replaces_defaults_wholesale() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Greeter.json");
        std::fs::write(&path, r#"{ "Volume": 11 }"#).unwrap();

        let mut config = PluginConfig::new(json!({ "Greeting": "hello" }));
        config.set_path(path);
        config.load().unwrap();

        assert_eq!(config.get("Volume"), Some(&json!(11)));
        assert_eq!(config.get("Greeting"), None);
    }

    #[test]
    fn unreadable_plugin_config_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Greeter.json");
        std::fs::write(&path, "{ not json").unwrap();

        let mut config = PluginConfig::new(json!({ "Greeting": "hello" }));
        config.set_path(path);

        assert!(matches!(config.load(), Err(ConfigError::Json(_))));
        assert_eq!(config.get("Greeting"), Some(&json!("hello")));
    }

    #[test]
    fn plugin_config_set_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Greeter.json");

        let mut config = PluginConfig::new(json!({ "Greeting": "hello" }));
        config.set_path(path.clone());
        config.load().unwrap();
        config.set("Greeting", json!("howdy"));
        config.save().unwrap();

        let mut fresh = PluginConfig::new(json!({ "Greeting": "hello" }));
        fresh.set_path(path);
        fresh.load().unwrap();
        assert_eq!(fresh.get("Greeting"), Some(&json!("howdy")));
    }
}
