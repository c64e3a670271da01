//! Configuration management for Fleetstor
//!
//! Settings are loaded from, in order of priority:
//! 1. Environment variables (highest priority)
//! 2. Configuration file (TOML format)
//! 3. Default values (lowest priority)

use crate::logging::LogRotation;
use crate::storage::{IscsiStoragePool, StorageSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration struct for Fleetstor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetstorConfig {
    /// Database configuration
    pub database: DatabaseConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Storage provisioning configuration
    pub storage: StorageConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite:///var/lib/fleetstor/fleetstor.db")
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Directory for log files
    pub log_dir: PathBuf,
    /// Enable file logging
    pub file_logging_enabled: bool,
    /// Log file rotation policy
    pub rotation: LogRotation,
}

/// Storage provisioning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Port used when a pool is provisioned without one
    pub default_port: u16,
    /// Largest volume accepted, in GB (0 disables the limit)
    pub max_volume_size_gb: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:///var/lib/fleetstor/fleetstor.db".to_string(),
            max_connections: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: PathBuf::from("/var/log/fleetstor"),
            file_logging_enabled: true,
            rotation: LogRotation::Daily,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            default_port: IscsiStoragePool::DEFAULT_PORT,
            max_volume_size_gb: 0,
        }
    }
}

impl StorageConfig {
    pub fn settings(&self) -> StorageSettings {
        StorageSettings {
            default_port: self.default_port,
            max_volume_size_gb: self.max_volume_size_gb,
        }
    }
}

impl FleetstorConfig {
    /// Load configuration from environment variables and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::find_config_file() {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::default(),
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_path_buf(), e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            // Environment variable override
            std::env::var("FLEETSTOR_CONFIG").ok().map(PathBuf::from),
            // Standard locations
            Some(PathBuf::from("/etc/fleetstor/config.toml")),
            Some(PathBuf::from("./fleetstor.toml")),
        ];

        paths.into_iter().flatten().find(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup; unparsable values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Database
        if let Some(url) = lookup("FLEETSTOR_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(max) = lookup("FLEETSTOR_DATABASE_MAX_CONNECTIONS").and_then(|v| v.parse().ok()) {
            self.database.max_connections = max;
        }

        // Logging
        if let Some(level) = lookup("FLEETSTOR_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(path) = lookup("FLEETSTOR_LOG_DIR") {
            self.logging.log_dir = PathBuf::from(path);
        }
        if let Some(enabled) = lookup("FLEETSTOR_FILE_LOGGING").and_then(|v| v.parse().ok()) {
            self.logging.file_logging_enabled = enabled;
        }
        if let Some(rotation) = lookup("FLEETSTOR_LOG_ROTATION").and_then(|v| v.parse().ok()) {
            self.logging.rotation = rotation;
        }

        // Storage
        if let Some(port) = lookup("FLEETSTOR_DEFAULT_PORT").and_then(|v| v.parse().ok()) {
            self.storage.default_port = port;
        }
        if let Some(max) = lookup("FLEETSTOR_MAX_VOLUME_SIZE_GB").and_then(|v| v.parse().ok()) {
            self.storage.max_volume_size_gb = max;
        }
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.is_empty() {
            return Err(ConfigError::Validation("Database URL cannot be empty".to_string()));
        }

        if !self.database.url.starts_with("sqlite:") {
            return Err(ConfigError::Validation(format!(
                "Only sqlite database URLs are supported: {}",
                self.database.url
            )));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "Database max_connections must be at least 1".to_string(),
            ));
        }

        if self.storage.default_port == 0 {
            return Err(ConfigError::Validation("Default port cannot be 0".to_string()));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Validation("Log level cannot be empty".to_string()));
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file {0:?}: {1}")]
    FileRead(PathBuf, String),
    /// Failed to parse configuration
    #[error("Failed to parse config: {0}")]
    Parse(String),
    /// Configuration validation failed
    #[error("Config validation failed: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = FleetstorConfig::default();
        assert_eq!(config.database.url, "sqlite:///var/lib/fleetstor/fleetstor.db");
        assert_eq!(config.storage.default_port, 3260);
        assert_eq!(config.logging.rotation, LogRotation::Daily);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = FleetstorConfig::default();
        config.database.url = String::new();
        assert!(config.validate().is_err());

        let mut config = FleetstorConfig::default();
        config.database.url = "postgres://localhost/fleetstor".to_string();
        assert!(config.validate().is_err());

        let mut config = FleetstorConfig::default();
        config.storage.default_port = 0;
        assert!(config.validate().is_err());

        let mut config = FleetstorConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_generate_sample_config() {
        let sample = FleetstorConfig::generate_sample();
        assert!(sample.contains("[database]"));
        assert!(sample.contains("[logging]"));
        assert!(sample.contains("[storage]"));

        let parsed: FleetstorConfig = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.storage.default_port, 3260);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[database]\nurl = \"sqlite:///tmp/fleetstor-test.db\"\n\n[storage]\nmax_volume_size_gb = 512"
        )
        .unwrap();

        let config = FleetstorConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.database.url, "sqlite:///tmp/fleetstor-test.db");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.storage.max_volume_size_gb, 512);
        assert_eq!(config.storage.default_port, 3260);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[database\nurl = ").unwrap();
        assert!(matches!(
            FleetstorConfig::load_from_file(file.path()),
            Err(ConfigError::Parse(_))
        ));

        let missing = PathBuf::from("/nonexistent/fleetstor.toml");
        assert!(matches!(
            FleetstorConfig::load_from_file(&missing),
            Err(ConfigError::FileRead(_, _))
        ));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("FLEETSTOR_DATABASE_URL", "sqlite::memory:"),
            ("FLEETSTOR_LOG_LEVEL", "debug"),
            ("FLEETSTOR_FILE_LOGGING", "false"),
            ("FLEETSTOR_LOG_ROTATION", "hourly"),
            ("FLEETSTOR_DEFAULT_PORT", "3261"),
            ("FLEETSTOR_DATABASE_MAX_CONNECTIONS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = FleetstorConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.logging.level, "debug");
        assert!(!config.logging.file_logging_enabled);
        assert_eq!(config.logging.rotation, LogRotation::Hourly);
        assert_eq!(config.storage.default_port, 3261);
        assert_eq!(config.storage.settings().default_port, 3261);
    }
}
