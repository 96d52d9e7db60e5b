//! # Ingestion Adapter Module
//!
//! The narrow contract between the scan session and whatever owns the radio.
//!
//! ## Key Types
//! - `ScanAdapter`: start/stop capability implemented by a radio backend
//! - `EventSink`: handed to the adapter on start; forwards sightings and
//!   failure codes onto the session's event channel from any thread
//! - `AdapterEvent`: one delivery, stamped with the `ScanHandle` it belongs to
//! - `Radio`: whether a backend exists at all, decided once at construction
//!
//! ## Late Events
//! Stopping is fire-and-forget, so a backend may still push events after
//! `stop` returns. Every event carries the handle of the scan that produced
//! it and the session drops anything that is not for the active scan.

use crate::device::Sighting;
use crate::error::ScanError;
use crossbeam_channel::Sender;
use std::fmt;

/// Platform scan-failure codes reported through `ScanFailed`
pub const SCAN_FAILED_ALREADY_STARTED: i32 = 1;
pub const SCAN_FAILED_INTERNAL_ERROR: i32 = 3;
pub const SCAN_FAILED_FEATURE_UNSUPPORTED: i32 = 4;

/// Identifies one start/stop cycle of the adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScanHandle(u64);

impl ScanHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for ScanHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scan#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEventKind {
    /// One or more advertisements arrived together
    Advertisement(Vec<Sighting>),
    /// The radio reported a scan error code
    ScanFailed(i32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterEvent {
    pub handle: ScanHandle,
    pub kind: AdapterEventKind,
}

/// Callback surface given to the adapter for a single scan.
///
/// Cloning is cheap and every clone reports under the same handle.
#[derive(Debug, Clone)]
pub struct EventSink {
    handle: ScanHandle,
    sender: Sender<AdapterEvent>,
}

impl EventSink {
    pub fn new(handle: ScanHandle, sender: Sender<AdapterEvent>) -> Self {
        Self { handle, sender }
    }

    pub fn handle(&self) -> ScanHandle {
        self.handle
    }

    /// Deliver a batch of sightings. Returns `false` once the session is gone.
    pub fn on_event(&self, batch: Vec<Sighting>) -> bool {
        if batch.is_empty() {
            return true;
        }
        self.send(AdapterEventKind::Advertisement(batch))
    }

    pub fn on_sighting(&self, sighting: Sighting) -> bool {
        self.on_event(vec![sighting])
    }

    pub fn on_failure(&self, code: i32) -> bool {
        self.send(AdapterEventKind::ScanFailed(code))
    }

    fn send(&self, kind: AdapterEventKind) -> bool {
        self.sender
            .send(AdapterEvent {
                handle: self.handle,
                kind,
            })
            .is_ok()
    }
}

/// A radio backend the scan session can drive.
pub trait ScanAdapter {
    /// Begin emitting sightings into `sink`.
    fn start(&mut self, sink: EventSink) -> Result<(), ScanError>;

    /// Ask the backend to stop the scan started under `handle`.
    ///
    /// Must not block. Events may still arrive afterwards.
    fn stop(&mut self, handle: ScanHandle);
}

/// Radio capability, resolved when the session is built
#[derive(Debug)]
pub enum Radio<A> {
    Available(A),
    Unavailable,
}

impl<A> From<Result<A, ScanError>> for Radio<A> {
    fn from(result: Result<A, ScanError>) -> Self {
        match result {
            Ok(adapter) => Radio::Available(adapter),
            Err(e) => {
                log::warn!("BLE radio unavailable: {}", e);
                Radio::Unavailable
            }
        }
    }
}
