//! # Device Model Module
//!
//! Value types that describe what the radio saw and what the session keeps.
//!
//! ## Key Types
//! - `DeviceIdentity`: hardware address used as the deduplication key
//! - `Sighting`: one advertisement observation as delivered by the adapter
//! - `DiscoveredDevice`: an admitted device, frozen at its first sighting
//! - `DeviceHandoff`: what a device-detail view receives on selection

use chrono::{DateTime, Local};
use std::fmt;

/// Stable address-like identifier of a peripheral, e.g. `AA:BB:CC:DD:EE:FF`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    #[cfg(test)]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceIdentity {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

/// A single advertisement observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sighting {
    pub identity: DeviceIdentity,
    pub name: Option<String>,
}

impl Sighting {
    pub fn new(identity: impl Into<DeviceIdentity>, name: Option<String>) -> Self {
        Self {
            identity: identity.into(),
            name,
        }
    }

    /// Shorthand for a sighting that carried a local name
    #[cfg(test)]
    pub fn named(identity: &str, name: &str) -> Self {
        Self::new(identity, Some(name.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub identity: DeviceIdentity,
    pub display_name: Option<String>,
    pub first_seen_at: DateTime<Local>,
}

impl DiscoveredDevice {
    pub fn from_sighting(sighting: Sighting, first_seen_at: DateTime<Local>) -> Self {
        Self {
            identity: sighting.identity,
            display_name: sighting.name,
            first_seen_at,
        }
    }

    /// Name to show, falling back to `fallback` when none was advertised
    pub fn name_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.display_name.as_deref().unwrap_or(fallback)
    }
}

/// Payload passed forward to a device-detail view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandoff {
    pub display_name: String,
    pub identity: DeviceIdentity,
}

impl DeviceHandoff {
    pub fn for_device(device: &DiscoveredDevice, fallback: &str) -> Self {
        Self {
            display_name: device.name_or(fallback).to_string(),
            identity: device.identity.clone(),
        }
    }
}
