//! Configuration for the core crate
//!
//! This module provides configuration options for the registry ledger,
//! including payload limits, event log retention and snapshot location.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{to_config_error, Result};

/// Default cap on the advisory text of an MOT entry, in bytes
pub const DEFAULT_MAX_ADVISORY_LENGTH: usize = 4096;

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Log level
    pub log_level: String,

    /// Maximum advisory length accepted on an MOT entry
    pub max_advisory_length: usize,

    /// Number of events kept in memory (0 keeps everything)
    pub max_event_log: usize,

    /// Where snapshots are written by default
    pub snapshot_path: Option<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            log_level: "info".to_string(),
            max_advisory_length: DEFAULT_MAX_ADVISORY_LENGTH,
            max_event_log: 0,
            snapshot_path: None,
        }
    }
}

impl RegistryConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: &str) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let config: RegistryConfig = serde_json::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// Reject settings the ledger cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.max_advisory_length == 0 {
            return Err(to_config_error("max_advisory_length must be greater than zero"));
        }
        if self.log_level.parse::<log::LevelFilter>().is_err() {
            return Err(to_config_error(format!("unknown log level '{}'", self.log_level)));
        }
        Ok(())
    }

    /// Create a development configuration
    pub fn development() -> Self {
        let mut config = Self::default();
        config.log_level = "debug".to_string();
        config
    }

    /// Create a production configuration
    pub fn production() -> Self {
        let mut config = Self::default();
        config.log_level = "info".to_string();
        config.max_event_log = 100_000;
        config
    }

    /// Create a testing configuration
    pub fn testing() -> Self {
        let mut config = Self::default();
        config.log_level = "debug".to_string();
        config.max_advisory_length = 256;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();

        assert_eq!(config.log_level, "info");
        assert_eq!(config.max_advisory_length, DEFAULT_MAX_ADVISORY_LENGTH);
        assert_eq!(config.max_event_log, 0);
        assert!(config.snapshot_path.is_none());
    }

    #[test]
    fn test_presets() {
        let config = RegistryConfig::development();
        assert_eq!(config.log_level, "debug");

        let config = RegistryConfig::production();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.max_event_log, 100_000);

        let config = RegistryConfig::testing();
        assert_eq!(config.max_advisory_length, 256);
    }

    #[test]
    fn test_validate() {
        let mut config = RegistryConfig::default();
        assert!(config.validate().is_ok());

        config.log_level = "loud".to_string();
        assert!(matches!(config.validate(), Err(RegistryError::Config(_))));

        let mut config = RegistryConfig::default();
        config.max_advisory_length = 0;
        assert!(matches!(config.validate(), Err(RegistryError::Config(_))));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RegistryConfig = serde_json::from_str(r#"{"max_event_log": 10}"#).unwrap();
        assert_eq!(config.max_event_log, 10);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_config_file_io() {
        let mut config = RegistryConfig::development();
        config.snapshot_path = Some(PathBuf::from("/tmp/registry.bin"));

        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        config.to_file(path).unwrap();
        let loaded = RegistryConfig::from_file(path).unwrap();

        assert_eq!(loaded.log_level, config.log_level);
        assert_eq!(loaded.snapshot_path, config.snapshot_path);
        assert_eq!(loaded.max_advisory_length, config.max_advisory_length);
    }
}
