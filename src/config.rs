//! Store configuration.
//!
//! A [`StoreConfig`] names one LMDB environment on disk and the schema version
//! the caller expects. It is an explicit value passed to
//! [`ReportDbState::open`](crate::local_db_state::ReportDbState::open), so
//! tests and independent callers can each hold their own isolated handle.

use std::path::PathBuf;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub const DEFAULT_DB_NAME: &str = "FraudeUnicoBandaAncha";
pub const DEFAULT_SCHEMA_VERSION: u32 = 1;
/// 256 MiB. Writes beyond this fail with a quota error.
pub const DEFAULT_MAP_SIZE: usize = 256 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_map_size")]
    pub map_size: usize,
}

fn default_name() -> String {
    DEFAULT_DB_NAME.to_string()
}

fn default_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_version() -> u32 {
    DEFAULT_SCHEMA_VERSION
}

fn default_map_size() -> usize {
    DEFAULT_MAP_SIZE
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            directory: default_directory(),
            version: default_version(),
            map_size: default_map_size(),
        }
    }
}

impl StoreConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn in_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn with_map_size(mut self, map_size: usize) -> Self {
        self.map_size = map_size;
        self
    }

    /// Defaults overlaid with `FRAUD_DB_NAME`, `FRAUD_DB_DIR`,
    /// `FRAUD_DB_VERSION` and `FRAUD_DB_MAP_SIZE`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("FRAUD_DB_NAME") {
            if !name.trim().is_empty() {
                config.name = name;
            }
        }
        if let Ok(dir) = std::env::var("FRAUD_DB_DIR") {
            if !dir.trim().is_empty() {
                config.directory = PathBuf::from(dir);
            }
        }
        if let Ok(raw) = std::env::var("FRAUD_DB_VERSION") {
            match raw.parse::<u32>() {
                Ok(v) if v > 0 => config.version = v,
                _ => warn!("Ignoring invalid FRAUD_DB_VERSION: {raw}"),
            }
        }
        if let Ok(raw) = std::env::var("FRAUD_DB_MAP_SIZE") {
            match raw.parse::<usize>() {
                Ok(v) if v > 0 => config.map_size = v,
                _ => warn!("Ignoring invalid FRAUD_DB_MAP_SIZE: {raw}"),
            }
        }

        config
    }

    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let config: StoreConfig = serde_json::from_str(json)
            .map_err(|e| StoreError::Validation(format!("Invalid store configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.name.trim().is_empty() {
            return Err(StoreError::Validation("Database name cannot be empty".to_string()));
        }
        if self.version == 0 {
            return Err(StoreError::Validation("Schema version must be at least 1".to_string()));
        }
        if self.map_size == 0 {
            return Err(StoreError::Validation("Map size must be greater than zero".to_string()));
        }
        Ok(())
    }

    /// Environment directory: `<directory>/<name>.lmdb`.
    pub fn db_path(&self) -> PathBuf {
        self.directory.join(format!("{}.lmdb", self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.name, "FraudeUnicoBandaAncha");
        assert_eq!(config.version, 1);
        assert_eq!(config.db_path(), PathBuf::from("./FraudeUnicoBandaAncha.lmdb"));
    }

    #[test]
    fn test_from_json_fills_missing_fields() {
        let config = StoreConfig::from_json(r#"{"name":"denuncias","directory":"/tmp/x"}"#).unwrap();
        assert_eq!(config.name, "denuncias");
        assert_eq!(config.directory, PathBuf::from("/tmp/x"));
        assert_eq!(config.version, DEFAULT_SCHEMA_VERSION);
        assert_eq!(config.map_size, DEFAULT_MAP_SIZE);
    }

    #[test]
    fn test_from_json_rejects_bad_values() {
        assert!(matches!(
            StoreConfig::from_json(r#"{"name":"  "}"#),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            StoreConfig::from_json(r#"{"version":0}"#),
            Err(StoreError::Validation(_))
        ));
        assert!(StoreConfig::from_json("not json").is_err());
    }
}
