//! Configuration for the face tracker.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::device::{DeviceFilter, DEFAULT_DEVICE_NAME};
use crate::ledger::LedgerPolicy;
use crate::selector::DEFAULT_SCAN_TIMEOUT;

/// Main configuration for the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Advertised name of the device to track
    pub device_name: String,

    /// Hardware address to pin to (empty: first device with the right name)
    pub device_address: String,

    /// Path of the SQLite database
    pub db_path: PathBuf,

    /// How long to scan before giving up
    #[serde(with = "duration_serde")]
    pub scan_timeout: Duration,

    /// Intervals shorter than this are dropped when enforcement is on
    #[serde(with = "duration_serde")]
    pub minimum_activity_length: Duration,

    /// Whether to enforce `minimum_activity_length`
    pub enforce_minimum_length: bool,

    /// Face labels imported by `activity sync`
    pub activities: Vec<ActivitySeed>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("facelog");

        Self {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            device_address: String::new(),
            db_path: data_dir.join("facelog.db"),
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            minimum_activity_length: Duration::from_secs(300), // 5 minutes
            enforce_minimum_length: false,
            activities: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("facelog")
            .join("config.json")
    }

    /// Ensure the database directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Device filter described by this configuration.
    pub fn device_filter(&self) -> DeviceFilter {
        DeviceFilter::by_name(self.device_name.clone()).with_address(&self.device_address)
    }

    /// Ledger policy described by this configuration.
    pub fn ledger_policy(&self) -> LedgerPolicy {
        LedgerPolicy {
            min_activity_length: self
                .enforce_minimum_length
                .then_some(self.minimum_activity_length),
        }
    }
}

/// A face label declared in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySeed {
    pub face: i8,
    pub label: String,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.device_name, "Timeular ZEI");
        assert_eq!(config.scan_timeout, Duration::from_secs(15));
        assert_eq!(config.minimum_activity_length, Duration::from_secs(300));
        assert!(!config.enforce_minimum_length);
        assert!(config.activities.is_empty());
        assert!(config.db_path.ends_with("facelog/facelog.db"));
    }

    #[test]
    fn test_file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"device_address": "AA:BB", "scan_timeout": 30, "activities": [{"face": 2, "label": "Dev"}]}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.device_address, "AA:BB");
        assert_eq!(config.scan_timeout, Duration::from_secs(30));
        assert_eq!(config.device_name, "Timeular ZEI");
        assert_eq!(
            config.activities,
            vec![ActivitySeed {
                face: 2,
                label: "Dev".to_string()
            }]
        );
        assert_eq!(config.device_filter().address.as_deref(), Some("AA:BB"));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            enforce_minimum_length: true,
            ..Config::default()
        };

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_ledger_policy_follows_enforcement() {
        let mut config = Config::default();
        assert_eq!(config.ledger_policy().min_activity_length, None);

        config.enforce_minimum_length = true;
        assert_eq!(
            config.ledger_policy().min_activity_length,
            Some(Duration::from_secs(300))
        );
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse(_))));
    }
}
