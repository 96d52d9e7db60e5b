//! Set of device identities already admitted during the current scan.

use crate::device::DeviceIdentity;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct DeduplicationLedger {
    seen: HashSet<DeviceIdentity>,
}

impl DeduplicationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, identity: &DeviceIdentity) -> bool {
        self.seen.contains(identity)
    }

    /// Records `identity`. Returns `false` if it was already present.
    pub fn record(&mut self, identity: DeviceIdentity) -> bool {
        self.seen.insert(identity)
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
