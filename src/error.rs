//! # Error Types Module
//!
//! Centralized error handling for ble-scout.
//!
//! ## Error Types
//! - `ScanError`: everything that can keep a scan from starting or running
//! - `ConfigError`: Configuration file I/O, parsing and validation errors
//!
//! None of these are fatal. The scan session turns every `ScanError` into a
//! transient notification for the front end and keeps its state consistent.

use std::fmt;

/// Errors surfaced by the scan session and the ingestion adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// A required runtime permission was not granted
    PermissionDenied,
    /// The radio reported a scan failure with a platform error code
    ScanFailed(i32),
    /// No usable BLE radio on this host
    AdapterUnavailable,
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::PermissionDenied => {
                write!(f, "Permissions are required to scan for BLE devices")
            }
            ScanError::ScanFailed(code) => {
                write!(f, "Scan error: {}", code)
            }
            ScanError::AdapterUnavailable => {
                write!(f, "No Bluetooth adapter found. Please ensure Bluetooth is enabled.")
            }
        }
    }
}

impl std::error::Error for ScanError {}

/// Errors that can occur during configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read config file
    ReadFailed(std::io::Error),
    /// Failed to write config file
    WriteFailed(std::io::Error),
    /// Failed to parse config file
    ParseFailed(toml::de::Error),
    /// Failed to serialize config
    SerializeFailed(toml::ser::Error),
    /// A setting parsed fine but is out of range
    InvalidValue { field: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ReadFailed(e) => {
                write!(f, "Failed to read config file: {}", e)
            }
            ConfigError::WriteFailed(e) => {
                write!(f, "Failed to write config file: {}", e)
            }
            ConfigError::ParseFailed(e) => {
                write!(f, "Failed to parse config file: {}", e)
            }
            ConfigError::SerializeFailed(e) => {
                write!(f, "Failed to serialize config: {}", e)
            }
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for `{}`: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadFailed(e) => Some(e),
            ConfigError::WriteFailed(e) => Some(e),
            ConfigError::ParseFailed(e) => Some(e),
            ConfigError::SerializeFailed(e) => Some(e),
            ConfigError::InvalidValue { .. } => None,
        }
    }
}
