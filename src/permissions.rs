//! Runtime capabilities a scan needs before the radio may be started.

use crate::error::ScanError;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequiredPermission {
    BluetoothScan,
    BluetoothConnect,
    FineLocation,
}

impl RequiredPermission {
    pub fn all() -> [RequiredPermission; 3] {
        [
            RequiredPermission::BluetoothScan,
            RequiredPermission::BluetoothConnect,
            RequiredPermission::FineLocation,
        ]
    }
}

pub trait PermissionGate {
    fn is_granted(&self, permission: RequiredPermission) -> bool;

    fn missing(&self) -> Vec<RequiredPermission> {
        RequiredPermission::all()
            .into_iter()
            .filter(|p| !self.is_granted(*p))
            .collect()
    }

    fn check(&self) -> Result<(), ScanError> {
        let missing = self.missing();
        if missing.is_empty() {
            Ok(())
        } else {
            log::warn!("Missing permissions: {:?}", missing);
            Err(ScanError::PermissionDenied)
        }
    }
}

/// Fixed set of granted permissions.
///
/// Desktop hosts grant everything up front; the OS prompts on first radio
/// use and a refusal comes back from the adapter as `PermissionDenied`.
#[derive(Debug, Clone, Default)]
pub struct PermissionSet {
    granted: HashSet<RequiredPermission>,
}

impl PermissionSet {
    pub fn all() -> Self {
        Self {
            granted: RequiredPermission::all().into_iter().collect(),
        }
    }

    #[cfg(test)]
    pub fn none() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn revoke(mut self, permission: RequiredPermission) -> Self {
        self.granted.remove(&permission);
        self
    }
}

impl PermissionGate for PermissionSet {
    fn is_granted(&self, permission: RequiredPermission) -> bool {
        self.granted.contains(&permission)
    }
}
