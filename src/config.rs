//! # Configuration Management Module
//!
//! Persistent scanner settings stored in platform-appropriate locations.
//! Handles loading, saving, validating and providing defaults.
//!
//! ## Settings
//! - `scan_timeout_secs`: How long a scan runs before it stops on its own
//! - `unknown_name_label`: Label handed forward for devices that never
//!   advertised a local name
//!
//! ## Storage Location
//! - macOS: ~/Library/Application Support/ble-scout/config.toml
//! - Linux: ~/.config/ble-scout/config.toml
//! - Windows: %APPDATA%\ble-scout\config.toml

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Auto-stop window used when nothing else is configured
pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 10;

/// Longest accepted auto-stop window (one day)
pub const MAX_SCAN_TIMEOUT_SECS: u64 = 24 * 60 * 60;

pub const DEFAULT_UNKNOWN_NAME_LABEL: &str = "Unknown device";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scan_timeout_secs: u64,
    pub unknown_name_label: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scan_timeout_secs: DEFAULT_SCAN_TIMEOUT_SECS,
            unknown_name_label: DEFAULT_UNKNOWN_NAME_LABEL.to_string(),
        }
    }
}

impl Config {
    /// Get the path to the config file
    fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ble-scout")
            .join("config.toml")
    }

    /// Load config from the default location, creating it if it doesn't exist
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`, writing out defaults if the file is missing
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let config: Config = toml::from_str(&contents)
                    .map_err(ConfigError::ParseFailed)?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config at {}, writing defaults", path.display());
                let config = Self::default();
                config.save_to(path)?;
                Ok(config)
            }
            Err(e) => Err(ConfigError::ReadFailed(e)),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(ConfigError::WriteFailed)?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(ConfigError::SerializeFailed)?;
        fs::write(path, toml_string)
            .map_err(ConfigError::WriteFailed)?;

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scan_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.scan_timeout_secs > MAX_SCAN_TIMEOUT_SECS {
            return Err(ConfigError::InvalidValue {
                field: "scan_timeout_secs",
                reason: format!("must be at most {} (one day)", MAX_SCAN_TIMEOUT_SECS),
            });
        }
        Ok(())
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }
}
