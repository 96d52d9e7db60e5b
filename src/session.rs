//! # Scan Session Module
//!
//! The discovery state machine. One `ScanSession` lives for the whole run
//! and is reset at the start of every scan.
//!
//! ## States
//! - `Idle`: no active scan, no deadline armed
//! - `Scanning`: adapter started under a `ScanHandle`, auto-stop deadline armed
//!
//! Status is derived from `active`, so a scan without a deadline (or a
//! deadline without a scan) can't be represented.
//!
//! ## Transitions
//! - `start_scan`: Idle → Scanning. Checks radio and permissions, clears the
//!   device list and ledger, starts the adapter, arms the deadline.
//! - `stop_scan`: Scanning → Idle. User stop and timeout share this path.
//! - `handle_adapter_event`: admits first sightings in arrival order; repeat
//!   sightings are dropped untouched. Scan failures are reported, not acted on.
//! - Start while scanning and stop while idle do nothing.
//!
//! ## Threading
//! The session is plain data with `&mut self` transitions. `ScanManager`
//! confines it to a single thread and feeds it commands, adapter events and
//! timer expiries.

use crate::adapter::{
    AdapterEvent, AdapterEventKind, EventSink, Radio, ScanAdapter, ScanHandle,
    SCAN_FAILED_INTERNAL_ERROR,
};
use crate::config::Config;
use crate::device::{DeviceHandoff, DeviceIdentity, DiscoveredDevice, Sighting};
use crate::error::ScanError;
use crate::ledger::DeduplicationLedger;
use crate::permissions::PermissionGate;
use crate::publish::{Notification, SessionUpdate, StopReason, UpdatePublisher};
use chrono::Local;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Idle,
    Scanning,
}

/// Owned copy of the published session state
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub status: ScanStatus,
    pub devices: Vec<DiscoveredDevice>,
}

impl SessionSnapshot {
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveScan {
    handle: ScanHandle,
    deadline: Instant,
}

pub struct ScanSession<A> {
    radio: Radio<A>,
    permissions: Box<dyn PermissionGate + Send>,
    timeout: Duration,
    unknown_name_label: String,
    devices: Vec<DiscoveredDevice>,
    ledger: DeduplicationLedger,
    active: Option<ActiveScan>,
    last_handle: ScanHandle,
    event_sender: Sender<AdapterEvent>,
    event_receiver: Receiver<AdapterEvent>,
    publisher: UpdatePublisher,
}

impl<A: ScanAdapter> ScanSession<A> {
    pub fn new(radio: Radio<A>, permissions: impl PermissionGate + Send + 'static, config: &Config) -> Self {
        let (event_sender, event_receiver) = unbounded();
        Self {
            radio,
            permissions: Box::new(permissions),
            timeout: config.scan_timeout(),
            unknown_name_label: config.unknown_name_label.clone(),
            devices: Vec::new(),
            ledger: DeduplicationLedger::new(),
            active: None,
            last_handle: ScanHandle::new(0),
            event_sender,
            event_receiver,
            publisher: UpdatePublisher::new(),
        }
    }

    pub fn status(&self) -> ScanStatus {
        if self.active.is_some() {
            ScanStatus::Scanning
        } else {
            ScanStatus::Idle
        }
    }

    #[cfg(test)]
    pub fn devices(&self) -> &[DiscoveredDevice] {
        &self.devices
    }

    #[cfg(test)]
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    #[cfg(test)]
    pub fn seen_count(&self) -> usize {
        self.ledger.len()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status(),
            devices: self.devices.clone(),
        }
    }

    /// When the active scan stops on its own, if one is running
    pub fn deadline(&self) -> Option<Instant> {
        self.active.map(|scan| scan.deadline)
    }

    /// Channel the adapter's `EventSink` feeds. Drain it into
    /// `handle_adapter_event` on the session's thread.
    pub fn event_receiver(&self) -> Receiver<AdapterEvent> {
        self.event_receiver.clone()
    }

    pub fn publisher_mut(&mut self) -> &mut UpdatePublisher {
        &mut self.publisher
    }

    /// Idle → Scanning. Starting while already scanning is a no-op.
    pub fn start_scan(&mut self, now: Instant) -> Result<(), ScanError> {
        if let Some(active) = self.active {
            log::debug!("Start requested while {} is running, ignoring", active.handle);
            return Ok(());
        }

        if matches!(self.radio, Radio::Unavailable) {
            return self.reject(ScanError::AdapterUnavailable);
        }

        if let Err(e) = self.permissions.check() {
            return self.reject(e);
        }

        let Some(deadline) = now.checked_add(self.timeout) else {
            log::error!("Auto-stop window of {:?} overflows the clock", self.timeout);
            return self.reject(ScanError::ScanFailed(SCAN_FAILED_INTERNAL_ERROR));
        };

        self.devices.clear();
        self.ledger.clear();

        let handle = self.last_handle.next();
        self.last_handle = handle;

        let sink = EventSink::new(handle, self.event_sender.clone());
        let started = match &mut self.radio {
            Radio::Available(adapter) => adapter.start(sink),
            Radio::Unavailable => Err(ScanError::AdapterUnavailable),
        };

        if let Err(e) = started {
            log::error!("Adapter failed to start {}: {}", handle, e);
            self.publish_snapshot();
            return self.reject(e);
        }

        self.active = Some(ActiveScan { handle, deadline });
        log::info!("Started {} ({}s auto-stop)", handle, self.timeout.as_secs());

        self.publish_snapshot();
        self.publisher.notify(Notification::ScanStarted);
        Ok(())
    }

    /// Scanning → Idle. Returns `false` if nothing was running.
    pub fn stop_scan(&mut self, reason: StopReason) -> bool {
        let Some(active) = self.active.take() else {
            log::debug!("Stop requested while idle, ignoring");
            return false;
        };

        if let Radio::Available(adapter) = &mut self.radio {
            adapter.stop(active.handle);
        }
        log::info!(
            "Stopped {} ({:?}) with {} device(s)",
            active.handle,
            reason,
            self.devices.len()
        );

        self.publish_snapshot();
        self.publisher.notify(Notification::ScanStopped(reason));
        true
    }

    /// Stops the active scan if its deadline has passed. Fires at most once
    /// per scan since stopping disarms the deadline.
    pub fn poll_timeout(&mut self, now: Instant) -> bool {
        match self.active {
            Some(active) if now >= active.deadline => self.stop_scan(StopReason::Timeout),
            _ => false,
        }
    }

    /// Applies one adapter delivery. Returns how many devices were admitted.
    pub fn handle_adapter_event(&mut self, event: AdapterEvent) -> usize {
        match self.active {
            Some(active) if active.handle == event.handle => {}
            Some(active) => {
                log::debug!("Dropping event from {} while {} is active", event.handle, active.handle);
                return 0;
            }
            None => {
                log::debug!("Dropping late event from {}, session is idle", event.handle);
                return 0;
            }
        }

        match event.kind {
            AdapterEventKind::Advertisement(batch) => {
                let admitted = self.admit(batch);
                if admitted > 0 {
                    self.publish_snapshot();
                }
                admitted
            }
            AdapterEventKind::ScanFailed(code) => {
                log::warn!("Radio reported scan failure code {} during {}", code, event.handle);
                self.publisher.notify(Notification::ScanFailed(code));
                0
            }
        }
    }

    fn admit(&mut self, batch: Vec<Sighting>) -> usize {
        let mut admitted = 0;
        for sighting in batch {
            if self.ledger.has(&sighting.identity) {
                continue;
            }
            self.ledger.record(sighting.identity.clone());
            log::debug!(
                "Discovered {} ({})",
                sighting.identity,
                sighting.name.as_deref().unwrap_or("no name")
            );
            self.devices.push(DiscoveredDevice::from_sighting(sighting, Local::now()));
            admitted += 1;
        }
        admitted
    }

    /// Builds the handoff for a device in the current list
    pub fn select_device(&self, identity: &DeviceIdentity) -> Option<DeviceHandoff> {
        self.devices
            .iter()
            .find(|device| &device.identity == identity)
            .map(|device| DeviceHandoff::for_device(device, &self.unknown_name_label))
    }

    fn reject(&mut self, error: ScanError) -> Result<(), ScanError> {
        self.publisher.notify(Notification::from(&error));
        Err(error)
    }

    fn publish_snapshot(&mut self) {
        let snapshot = self.snapshot();
        self.publisher.publish(SessionUpdate::Snapshot(snapshot));
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::permissions::{PermissionSet, RequiredPermission};
    use std::sync::{Arc, Mutex};

    /// What the recording adapter was asked to do
    #[derive(Debug, Default)]
    pub(crate) struct AdapterLog {
        pub starts: Vec<ScanHandle>,
        pub stops: Vec<ScanHandle>,
        pub sink: Option<EventSink>,
    }

    /// Test double that remembers calls and keeps the latest sink so tests
    /// can play the radio.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingAdapter {
        pub log: Arc<Mutex<AdapterLog>>,
        pub fail_with: Option<ScanError>,
    }

    impl RecordingAdapter {
        pub fn sink(&self) -> EventSink {
            self.log
                .lock()
                .unwrap()
                .sink
                .clone()
                .expect("adapter was never started")
        }

        pub fn start_count(&self) -> usize {
            self.log.lock().unwrap().starts.len()
        }

        pub fn stop_count(&self) -> usize {
            self.log.lock().unwrap().stops.len()
        }
    }

    impl ScanAdapter for RecordingAdapter {
        fn start(&mut self, sink: EventSink) -> Result<(), ScanError> {
            if let Some(e) = &self.fail_with {
                return Err(e.clone());
            }
            let mut log = self.log.lock().unwrap();
            log.starts.push(sink.handle());
            log.sink = Some(sink);
            Ok(())
        }

        fn stop(&mut self, handle: ScanHandle) {
            self.log.lock().unwrap().stops.push(handle);
        }
    }

    fn session_with(adapter: RecordingAdapter) -> ScanSession<RecordingAdapter> {
        ScanSession::new(Radio::Available(adapter), PermissionSet::all(), &Config::default())
    }

    /// Moves everything the adapter pushed into the session
    fn drain(session: &mut ScanSession<RecordingAdapter>) {
        let receiver = session.event_receiver();
        while let Ok(event) = receiver.try_recv() {
            session.handle_adapter_event(event);
        }
    }

    fn identities(session: &ScanSession<RecordingAdapter>) -> Vec<&str> {
        session.devices().iter().map(|d| d.identity.as_str()).collect()
    }

    fn notifications(receiver: &Receiver<SessionUpdate>) -> Vec<Notification> {
        receiver
            .try_iter()
            .filter_map(|update| match update {
                SessionUpdate::Notification(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_initial_state_is_idle() {
        let session = session_with(RecordingAdapter::default());
        assert_eq!(session.status(), ScanStatus::Idle);
        assert_eq!(session.device_count(), 0);
        assert!(session.deadline().is_none());
    }

    #[test]
    fn test_rename_is_ignored() {
        let adapter = RecordingAdapter::default();
        let mut session = session_with(adapter.clone());
        session.start_scan(Instant::now()).unwrap();

        let sink = adapter.sink();
        sink.on_event(vec![
            Sighting::named("AA:01", "Sensor1"),
            Sighting::named("AA:02", "Sensor2"),
        ]);
        sink.on_sighting(Sighting::named("AA:01", "Sensor1-renamed"));
        drain(&mut session);

        let devices: Vec<(&str, Option<&str>)> = session
            .devices()
            .iter()
            .map(|d| (d.identity.as_str(), d.display_name.as_deref()))
            .collect();
        assert_eq!(devices, vec![("AA:01", Some("Sensor1")), ("AA:02", Some("Sensor2"))]);
        assert_eq!(session.seen_count(), 2);
    }

    #[test]
    fn test_each_identity_admitted_once_in_first_seen_order() {
        let adapter = RecordingAdapter::default();
        let mut session = session_with(adapter.clone());
        session.start_scan(Instant::now()).unwrap();

        let sink = adapter.sink();
        for id in ["C", "A", "C", "B", "A", "A", "D", "B", "C"] {
            sink.on_sighting(Sighting::new(id, None));
        }
        sink.on_event(vec![Sighting::new("B", None), Sighting::new("E", None), Sighting::new("E", None)]);
        drain(&mut session);

        assert_eq!(identities(&session), vec!["C", "A", "B", "D", "E"]);
        assert_eq!(session.seen_count(), session.device_count());
    }

    #[test]
    fn test_start_resets_previous_scan() {
        let adapter = RecordingAdapter::default();
        let mut session = session_with(adapter.clone());
        session.start_scan(Instant::now()).unwrap();
        adapter.sink().on_sighting(Sighting::named("AA:01", "Sensor1"));
        drain(&mut session);
        assert!(session.stop_scan(StopReason::User));
        assert_eq!(session.device_count(), 1);

        session.start_scan(Instant::now()).unwrap();
        assert_eq!(session.device_count(), 0);
        assert_eq!(session.seen_count(), 0);
        assert_eq!(session.status(), ScanStatus::Scanning);
    }

    #[test]
    fn test_start_while_scanning_is_noop() {
        let adapter = RecordingAdapter::default();
        let mut session = session_with(adapter.clone());
        let t0 = Instant::now();
        session.start_scan(t0).unwrap();
        adapter.sink().on_sighting(Sighting::named("AA:01", "Sensor1"));
        drain(&mut session);
        let deadline = session.deadline();

        session.start_scan(t0 + Duration::from_secs(3)).unwrap();

        assert_eq!(adapter.start_count(), 1);
        assert_eq!(session.deadline(), deadline);
        assert_eq!(identities(&session), vec!["AA:01"]);
    }

    #[test]
    fn test_stop_while_idle_is_noop() {
        let adapter = RecordingAdapter::default();
        let mut session = session_with(adapter.clone());
        let updates = session.publisher_mut().subscribe();

        assert!(!session.stop_scan(StopReason::User));
        assert_eq!(adapter.stop_count(), 0);
        assert!(updates.try_recv().is_err());
    }

    #[test]
    fn test_auto_stop_fires_exactly_once_at_deadline() {
        let adapter = RecordingAdapter::default();
        let mut session = session_with(adapter.clone());
        let updates = session.publisher_mut().subscribe();
        let t0 = Instant::now();
        session.start_scan(t0).unwrap();

        assert!(!session.poll_timeout(t0 + Duration::from_millis(9_999)));
        assert_eq!(session.status(), ScanStatus::Scanning);

        assert!(session.poll_timeout(t0 + Duration::from_secs(10)));
        assert_eq!(session.status(), ScanStatus::Idle);
        assert!(!session.poll_timeout(t0 + Duration::from_secs(20)));

        assert_eq!(adapter.stop_count(), 1);
        assert_eq!(
            notifications(&updates),
            vec![Notification::ScanStarted, Notification::ScanStopped(StopReason::Timeout)]
        );
    }

    #[test]
    fn test_restart_arms_fresh_deadline() {
        let mut session = session_with(RecordingAdapter::default());
        let t0 = Instant::now();
        session.start_scan(t0).unwrap();
        session.stop_scan(StopReason::User);

        let t1 = t0 + Duration::from_secs(4);
        session.start_scan(t1).unwrap();
        assert_eq!(session.deadline(), Some(t1 + Duration::from_secs(10)));
        assert!(!session.poll_timeout(t0 + Duration::from_secs(10)));
    }

    #[test]
    fn test_scan_failure_keeps_scanning() {
        let adapter = RecordingAdapter::default();
        let mut session = session_with(adapter.clone());
        let updates = session.publisher_mut().subscribe();
        session.start_scan(Instant::now()).unwrap();
        let deadline = session.deadline();

        adapter.sink().on_failure(2);
        adapter.sink().on_sighting(Sighting::named("AA:07", "Late bloomer"));
        drain(&mut session);

        assert_eq!(session.status(), ScanStatus::Scanning);
        assert_eq!(session.deadline(), deadline);
        assert_eq!(identities(&session), vec!["AA:07"]);
        assert!(notifications(&updates).contains(&Notification::ScanFailed(2)));
    }

    #[test]
    fn test_late_events_after_stop_are_dropped() {
        let adapter = RecordingAdapter::default();
        let mut session = session_with(adapter.clone());
        session.start_scan(Instant::now()).unwrap();
        adapter.sink().on_sighting(Sighting::named("AA:01", "Sensor1"));
        drain(&mut session);
        session.stop_scan(StopReason::User);

        adapter.sink().on_sighting(Sighting::named("AA:09", "Straggler"));
        drain(&mut session);

        assert_eq!(identities(&session), vec!["AA:01"]);
        assert_eq!(session.status(), ScanStatus::Idle);
    }

    #[test]
    fn test_stale_handle_ignored_after_restart() {
        let adapter = RecordingAdapter::default();
        let mut session = session_with(adapter.clone());
        session.start_scan(Instant::now()).unwrap();
        let old_sink = adapter.sink();
        session.stop_scan(StopReason::User);
        session.start_scan(Instant::now()).unwrap();

        old_sink.on_sighting(Sighting::named("AA:09", "From the last scan"));
        adapter.sink().on_sighting(Sighting::named("AA:01", "Sensor1"));
        drain(&mut session);

        assert_eq!(identities(&session), vec!["AA:01"]);
    }

    #[test]
    fn test_unavailable_radio_rejects_every_start() {
        let mut session: ScanSession<RecordingAdapter> =
            ScanSession::new(Radio::Unavailable, PermissionSet::all(), &Config::default());
        let updates = session.publisher_mut().subscribe();

        for _ in 0..3 {
            assert_eq!(session.start_scan(Instant::now()), Err(ScanError::AdapterUnavailable));
            assert_eq!(session.status(), ScanStatus::Idle);
        }
        assert_eq!(notifications(&updates), vec![Notification::AdapterUnavailable; 3]);
    }

    #[test]
    fn test_permission_denied_stays_idle() {
        let adapter = RecordingAdapter::default();
        let permissions = PermissionSet::all().revoke(RequiredPermission::BluetoothScan);
        let mut session = ScanSession::new(Radio::Available(adapter.clone()), permissions, &Config::default());
        let updates = session.publisher_mut().subscribe();

        assert_eq!(session.start_scan(Instant::now()), Err(ScanError::PermissionDenied));
        assert_eq!(session.status(), ScanStatus::Idle);
        assert_eq!(adapter.start_count(), 0);
        assert_eq!(notifications(&updates), vec![Notification::PermissionDenied]);
    }

    #[test]
    fn test_adapter_start_failure_stays_idle() {
        let adapter = RecordingAdapter {
            fail_with: Some(ScanError::ScanFailed(1)),
            ..Default::default()
        };
        let mut session = session_with(adapter);
        let updates = session.publisher_mut().subscribe();

        assert_eq!(session.start_scan(Instant::now()), Err(ScanError::ScanFailed(1)));
        assert_eq!(session.status(), ScanStatus::Idle);
        assert!(session.deadline().is_none());
        assert_eq!(notifications(&updates), vec![Notification::ScanFailed(1)]);
    }

    #[test]
    fn test_unrepresentable_deadline_is_rejected() {
        let adapter = RecordingAdapter::default();
        let config = Config {
            scan_timeout_secs: u64::MAX,
            ..Config::default()
        };
        let mut session = ScanSession::new(Radio::Available(adapter.clone()), PermissionSet::all(), &config);
        let updates = session.publisher_mut().subscribe();

        assert_eq!(
            session.start_scan(Instant::now()),
            Err(ScanError::ScanFailed(SCAN_FAILED_INTERNAL_ERROR))
        );
        assert_eq!(session.status(), ScanStatus::Idle);
        assert_eq!(adapter.start_count(), 0);
        assert_eq!(notifications(&updates), vec![Notification::ScanFailed(SCAN_FAILED_INTERNAL_ERROR)]);

        // Still usable afterwards
        assert!(!session.stop_scan(StopReason::User));
    }

    #[test]
    fn test_one_snapshot_per_admitting_batch() {
        let adapter = RecordingAdapter::default();
        let mut session = session_with(adapter.clone());
        session.start_scan(Instant::now()).unwrap();
        let updates = session.publisher_mut().subscribe();

        let sink = adapter.sink();
        sink.on_event(vec![Sighting::new("A", None), Sighting::new("B", None)]);
        sink.on_sighting(Sighting::new("A", None));
        drain(&mut session);

        let snapshots: Vec<SessionSnapshot> = updates
            .try_iter()
            .filter_map(|update| match update {
                SessionUpdate::Snapshot(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].device_count(), 2);
        assert_eq!(snapshots[0].status, ScanStatus::Scanning);
    }

    #[test]
    fn test_select_device_handoff() {
        let adapter = RecordingAdapter::default();
        let mut session = session_with(adapter.clone());
        session.start_scan(Instant::now()).unwrap();
        adapter.sink().on_event(vec![Sighting::named("AA:01", "Sensor1"), Sighting::new("AA:02", None)]);
        drain(&mut session);

        let named = session.select_device(&DeviceIdentity::from("AA:01")).unwrap();
        assert_eq!(named.display_name, "Sensor1");
        let nameless = session.select_device(&DeviceIdentity::from("AA:02")).unwrap();
        assert_eq!(nameless.display_name, "Unknown device");
        assert!(session.select_device(&DeviceIdentity::from("FF:FF")).is_none());
    }
}
