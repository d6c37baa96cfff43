//! Engine configuration with TOML file support.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the coordination engine.
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory of the sled database.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Keep the database in memory only. Useful for demos.
    #[serde(default)]
    pub temporary: bool,

    /// Attempts at a transaction before a storage failure is surfaced.
    #[serde(default = "default_max_transaction_attempts")]
    pub max_transaction_attempts: u32,

    /// Length of issued one-time credentials.
    #[serde(default = "default_credential_length")]
    pub credential_length: usize,

    /// Label written on self-selected and nominated assignments.
    #[serde(default = "default_external_examiner_label")]
    pub external_examiner_label: String,

    /// Log level filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./exam_data")
}

fn default_max_transaction_attempts() -> u32 {
    3
}

fn default_credential_length() -> usize {
    12
}

fn default_external_examiner_label() -> String {
    "External Examiner".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl EngineConfig {
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// In-memory configuration rooted nowhere.
    pub fn temporary() -> Self {
        Self {
            temporary: true,
            ..Self::default()
        }
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            temporary: false,
            max_transaction_attempts: default_max_transaction_attempts(),
            credential_length: default_credential_length(),
            external_examiner_label: default_external_examiner_label(),
            log_level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = EngineConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        let parsed = EngineConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config = EngineConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.max_transaction_attempts, 3);
        assert_eq!(config.credential_length, 12);
        assert_eq!(config.external_examiner_label, "External Examiner");
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            max_transaction_attempts = 5
            data_dir = "/var/lib/exams"
        "#;
        let config = EngineConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.max_transaction_attempts, 5);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/exams"));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            EngineConfig::from_toml_str("max_transaction_attempts = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
