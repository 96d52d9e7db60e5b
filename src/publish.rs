//! # Session Updates Module
//!
//! Everything the scan session tells the front end, and the fan-out that
//! delivers it.
//!
//! ## Key Types
//! - `SessionUpdate`: one message to subscribers (snapshot, notification or
//!   device handoff)
//! - `Notification`: transient user-facing events (toast-style)
//! - `UpdatePublisher`: list of subscriber channels; dead subscribers are
//!   pruned on the next publish
//!
//! Subscribers never see the session's own list. They get owned snapshots,
//! so rendering can't race with ingestion.

use crate::device::{DeviceHandoff, DeviceIdentity};
use crate::dispatcher::LedColor;
use crate::error::ScanError;
use crate::session::SessionSnapshot;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The user asked for it
    User,
    /// The auto-stop deadline passed
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    PermissionDenied,
    AdapterUnavailable,
    ScanFailed(i32),
    ScanStarted,
    ScanStopped(StopReason),
    CommandSent { device: DeviceIdentity, action: LedColor },
}

impl From<&ScanError> for Notification {
    fn from(error: &ScanError) -> Self {
        match error {
            ScanError::PermissionDenied => Notification::PermissionDenied,
            ScanError::ScanFailed(code) => Notification::ScanFailed(*code),
            ScanError::AdapterUnavailable => Notification::AdapterUnavailable,
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::PermissionDenied => {
                write!(f, "{}.", ScanError::PermissionDenied)
            }
            Notification::AdapterUnavailable => {
                write!(f, "{}", ScanError::AdapterUnavailable)
            }
            Notification::ScanFailed(code) => write!(f, "{}", ScanError::ScanFailed(*code)),
            Notification::ScanStarted => write!(f, "Scan started."),
            Notification::ScanStopped(StopReason::User) => write!(f, "Scan stopped."),
            Notification::ScanStopped(StopReason::Timeout) => {
                write!(f, "Scan stopped (timed out).")
            }
            Notification::CommandSent { action, .. } => write!(f, "{} LED activated", action),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Snapshot(SessionSnapshot),
    Notification(Notification),
    DeviceSelected(DeviceHandoff),
}

#[derive(Debug, Default)]
pub struct UpdatePublisher {
    subscribers: Vec<Sender<SessionUpdate>>,
}

impl UpdatePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<SessionUpdate> {
        let (sender, receiver) = unbounded();
        self.subscribers.push(sender);
        receiver
    }

    pub fn publish(&mut self, update: SessionUpdate) {
        self.subscribers.retain(|subscriber| {
            let alive = subscriber.send(update.clone()).is_ok();
            if !alive {
                log::debug!("Dropping disconnected subscriber");
            }
            alive
        });
    }

    pub fn notify(&mut self, notification: Notification) {
        log::info!("{}", notification);
        self.publish(SessionUpdate::Notification(notification));
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
