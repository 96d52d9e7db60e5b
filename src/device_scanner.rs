//! # BLE Device Scanner Module
//!
//! `ScanAdapter` backed by btleplug. Owns a Tokio runtime and the first host
//! Bluetooth adapter, and turns central events into sightings.
//!
//! ## Lifecycle
//! 1. `BtleplugAdapter::new`: runtime + manager + first adapter, or
//!    `AdapterUnavailable` if any of them is missing
//! 2. `start`: subscribe to central events, start an unfiltered scan, spawn
//!    a forwarding task feeding the `EventSink`. The caller's thread waits
//!    at most `START_TIMEOUT` for the radio; a radio that doesn't answer in
//!    time is reported as an internal scan failure.
//! 3. `stop`: abort the forwarding task, fire off `stop_scan` without waiting
//!
//! ## Failure Codes
//! btleplug errors carry no numeric code, so start failures are mapped onto
//! the usual platform scan-failure codes before reaching the session.

use crate::adapter::{
    EventSink, ScanAdapter, ScanHandle, SCAN_FAILED_ALREADY_STARTED,
    SCAN_FAILED_FEATURE_UNSUPPORTED, SCAN_FAILED_INTERNAL_ERROR,
};
use crate::device::{DeviceIdentity, Sighting};
use crate::error::ScanError;
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use std::future::Future;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tokio_stream::{Stream, StreamExt};

/// Upper bound on how long `start` blocks waiting for the radio
const START_TIMEOUT: Duration = Duration::from_secs(5);

pub struct BtleplugAdapter {
    runtime: Runtime,
    // Keeps the platform session alive for `central`
    _manager: Manager,
    central: Adapter,
    forwarder: Option<(ScanHandle, JoinHandle<()>)>,
}

impl BtleplugAdapter {
    pub fn new() -> Result<Self, ScanError> {
        let runtime = Runtime::new().map_err(|e| {
            log::error!("Failed to create async runtime: {}", e);
            ScanError::AdapterUnavailable
        })?;

        let (manager, central) = runtime.block_on(open_first_adapter())?;

        Ok(Self {
            runtime,
            _manager: manager,
            central,
            forwarder: None,
        })
    }
}

async fn open_first_adapter() -> Result<(Manager, Adapter), ScanError> {
    let manager = Manager::new().await.map_err(|e| {
        log::error!("Failed to create BLE manager: {}", e);
        ScanError::AdapterUnavailable
    })?;

    let adapters = manager.adapters().await.map_err(|e| {
        log::error!("Failed to get adapters: {}", e);
        ScanError::AdapterUnavailable
    })?;

    let central = adapters.into_iter().next().ok_or_else(|| {
        log::error!("No Bluetooth adapter found");
        ScanError::AdapterUnavailable
    })?;

    Ok((manager, central))
}

impl ScanAdapter for BtleplugAdapter {
    fn start(&mut self, sink: EventSink) -> Result<(), ScanError> {
        if let Some((running, _)) = &self.forwarder {
            log::warn!("{} requested while {} is still running", sink.handle(), running);
            return Err(ScanError::ScanFailed(SCAN_FAILED_ALREADY_STARTED));
        }

        let central = self.central.clone();
        let events = self.runtime.block_on(start_within(START_TIMEOUT, async {
            // Subscribe first so nothing between start and subscribe is lost
            let events = central.events().await?;
            central.start_scan(ScanFilter::default()).await?;
            Ok::<_, btleplug::Error>(events)
        }))?;

        let handle = sink.handle();
        let task = self
            .runtime
            .spawn(forward_sightings(self.central.clone(), events, sink));
        self.forwarder = Some((handle, task));

        log::debug!("btleplug scan running for {}", handle);
        Ok(())
    }

    fn stop(&mut self, handle: ScanHandle) {
        match self.forwarder.take() {
            Some((running, task)) if running == handle => {
                task.abort();
                let central = self.central.clone();
                self.runtime.spawn(async move {
                    if let Err(e) = central.stop_scan().await {
                        log::warn!("Failed to stop scan: {}", e);
                    }
                });
            }
            Some((running, task)) => {
                log::warn!("Stop for {} ignored, {} is running", handle, running);
                self.forwarder = Some((running, task));
            }
            None => {
                log::debug!("Stop for {} ignored, nothing running", handle);
            }
        }
    }
}

impl Drop for BtleplugAdapter {
    fn drop(&mut self) {
        if let Some((_, task)) = self.forwarder.take() {
            task.abort();
            let central = self.central.clone();
            if let Err(e) = self.runtime.block_on(async move { central.stop_scan().await }) {
                log::warn!("Failed to stop scan on shutdown: {}", e);
            }
        }
    }
}

fn map_start_error(error: btleplug::Error) -> ScanError {
    match error {
        btleplug::Error::PermissionDenied => ScanError::PermissionDenied,
        btleplug::Error::NotSupported(what) => {
            log::error!("Scanning not supported: {}", what);
            ScanError::ScanFailed(SCAN_FAILED_FEATURE_UNSUPPORTED)
        }
        other => {
            log::error!("Failed to start scan: {}", other);
            ScanError::ScanFailed(SCAN_FAILED_INTERNAL_ERROR)
        }
    }
}

/// Runs a start sequence, giving up once `limit` has passed
async fn start_within<T, F>(limit: Duration, start: F) -> Result<T, ScanError>
where
    F: Future<Output = Result<T, btleplug::Error>>,
{
    match tokio::time::timeout(limit, start).await {
        Ok(result) => result.map_err(map_start_error),
        Err(_) => {
            log::error!("Radio did not start scanning within {:?}", limit);
            Err(ScanError::ScanFailed(SCAN_FAILED_INTERNAL_ERROR))
        }
    }
}

/// Pumps central events into `sink` until the stream ends or the session
/// hangs up. A stream that ends by itself is reported as a scan failure.
async fn forward_sightings<S>(central: Adapter, mut events: S, sink: EventSink)
where
    S: Stream<Item = CentralEvent> + Unpin,
{
    while let Some(event) = events.next().await {
        let id = match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
            _ => continue,
        };

        let Some(sighting) = sighting_for(&central, &id).await else {
            continue;
        };

        if !sink.on_sighting(sighting) {
            log::debug!("Session gone, ending forwarder for {}", sink.handle());
            return;
        }
    }

    // Aborted tasks never get here, so the radio dropped the stream on its own
    log::warn!("Central event stream ended during {}", sink.handle());
    sink.on_failure(SCAN_FAILED_INTERNAL_ERROR);
}

async fn sighting_for(central: &Adapter, id: &PeripheralId) -> Option<Sighting> {
    let peripheral = match central.peripheral(id).await {
        Ok(peripheral) => peripheral,
        Err(e) => {
            log::debug!("Peripheral {:?} vanished: {}", id, e);
            return None;
        }
    };

    let props = peripheral.properties().await.ok()??;
    Some(Sighting::new(
        DeviceIdentity::new(props.address.to_string()),
        props.local_name,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_error_maps_to_permission_denied() {
        assert_eq!(
            map_start_error(btleplug::Error::PermissionDenied),
            ScanError::PermissionDenied
        );
    }

    #[test]
    fn test_unsupported_maps_to_feature_code() {
        assert_eq!(
            map_start_error(btleplug::Error::NotSupported("scan".to_string())),
            ScanError::ScanFailed(SCAN_FAILED_FEATURE_UNSUPPORTED)
        );
    }

    #[test]
    fn test_other_errors_are_internal() {
        assert_eq!(
            map_start_error(btleplug::Error::DeviceNotFound),
            ScanError::ScanFailed(SCAN_FAILED_INTERNAL_ERROR)
        );
    }

    #[test]
    fn test_unresponsive_radio_times_out() {
        let runtime = Runtime::new().expect("Failed to create runtime");
        let hung = std::future::pending::<Result<(), btleplug::Error>>();

        let started = std::time::Instant::now();
        let result = runtime.block_on(start_within(Duration::from_millis(50), hung));

        assert_eq!(result, Err(ScanError::ScanFailed(SCAN_FAILED_INTERNAL_ERROR)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_start_within_passes_through_outcome() {
        let runtime = Runtime::new().expect("Failed to create runtime");

        let ok = runtime.block_on(start_within(START_TIMEOUT, async { Ok::<_, btleplug::Error>(7) }));
        assert_eq!(ok, Ok(7));

        let denied = runtime.block_on(start_within(START_TIMEOUT, async {
            Err::<(), _>(btleplug::Error::PermissionDenied)
        }));
        assert_eq!(denied, Err(ScanError::PermissionDenied));
    }
}
