//! Bounded device selection.
//!
//! Scans until the first matching candidate shows up or the timeout elapses,
//! whichever comes first. The scan is stopped on every exit path.

use crossbeam_channel::{after, never, select, Receiver};
use std::time::Duration;

use crate::device::{DeviceCandidate, DeviceFilter, DeviceTransport};
use crate::error::{TrackerError, TrackerResult};
use crate::quit::QuitSignal;

/// Default discovery window.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(15);

/// Selects the first device matching a filter within a time limit.
#[derive(Debug, Clone)]
pub struct DeviceSelector {
    filter: DeviceFilter,
    timeout: Duration,
}

/// Stops the scan when dropped.
struct ScanGuard<'a, T: DeviceTransport> {
    transport: &'a mut T,
}

impl<T: DeviceTransport> Drop for ScanGuard<'_, T> {
    fn drop(&mut self) {
        self.transport.stop_scan();
    }
}

impl DeviceSelector {
    pub fn new(filter: DeviceFilter, timeout: Duration) -> Self {
        Self { filter, timeout }
    }

    pub fn filter(&self) -> &DeviceFilter {
        &self.filter
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one bounded scan and return the first accepted candidate.
    pub fn select<T: DeviceTransport>(&self, transport: &mut T) -> TrackerResult<DeviceCandidate> {
        self.select_until(transport, &never())
    }

    /// Like [`DeviceSelector::select`], but a message on `quit` stops the
    /// scan and returns [`TrackerError::Cancelled`].
    pub fn select_until<T: DeviceTransport>(
        &self,
        transport: &mut T,
        quit: &Receiver<QuitSignal>,
    ) -> TrackerResult<DeviceCandidate> {
        tracing::info!(filter = %self.filter, timeout_secs = self.timeout.as_secs(), "Scanning for device");

        let candidates = transport.start_scan(&self.filter)?;
        let _guard = ScanGuard { transport };
        // The deadline channel is dropped with this frame, so it can never
        // fire after the selection has settled.
        let deadline = after(self.timeout);

        loop {
            select! {
                recv(candidates) -> candidate => match candidate {
                    Ok(candidate) if self.filter.accepts(&candidate) => {
                        tracing::info!(device = %candidate.address, "Selected device");
                        return Ok(candidate);
                    }
                    Ok(candidate) => {
                        tracing::debug!(device = %candidate.address, "Ignoring non-matching device");
                    }
                    Err(_) => {
                        tracing::warn!("Scan stopped before a device was found");
                        return Err(self.no_device());
                    }
                },
                recv(deadline) -> _ => {
                    tracing::warn!(filter = %self.filter, "Scan timed out");
                    return Err(self.no_device());
                }
                recv(quit) -> signal => {
                    let signal = signal.unwrap_or(QuitSignal::Interrupt);
                    tracing::info!(?signal, "Scan cancelled");
                    return Err(TrackerError::Cancelled(signal));
                }
            }
        }
    }

    fn no_device(&self) -> TrackerError {
        TrackerError::NoDeviceFound {
            filter: self.filter.to_string(),
            timeout: self.timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::scripted::{ScriptedDevice, ScriptedTransport};
    use crate::device::FaceId;
    use std::time::Instant;

    fn named(id: &str, name: &str, address: &str) -> DeviceCandidate {
        DeviceCandidate::new(id, Some(name.to_string()), address)
    }

    #[test]
    fn test_first_match_wins() {
        let mut transport = ScriptedTransport::new(
            vec![
                named("a", "Speaker", "00:01"),
                named("b", "Timeular ZEI", "00:02"),
                named("c", "Timeular ZEI", "00:03"),
            ],
            ScriptedDevice::new(FaceId(0)),
        );
        let selector = DeviceSelector::new(
            DeviceFilter::by_name("Timeular ZEI"),
            Duration::from_secs(5),
        );

        let selected = selector.select(&mut transport).unwrap();
        assert_eq!(selected.id, "b");
        assert!(!transport.is_scanning());
    }

    #[test]
    fn test_address_pin_skips_other_cubes() {
        let mut transport = ScriptedTransport::new(
            vec![
                named("b", "Timeular ZEI", "00:02"),
                named("c", "Timeular ZEI", "00:03"),
            ],
            ScriptedDevice::new(FaceId(0)),
        );
        let selector = DeviceSelector::new(
            DeviceFilter::by_name("Timeular ZEI").with_address("00:03"),
            Duration::from_secs(5),
        );

        assert_eq!(selector.select(&mut transport).unwrap().id, "c");
    }

    #[test]
    fn test_timeout_without_candidates() {
        let mut transport = ScriptedTransport::empty();
        let device = transport.device();
        let selector = DeviceSelector::new(
            DeviceFilter::by_name("Timeular ZEI"),
            Duration::from_millis(50),
        );

        let started = Instant::now();
        let err = selector.select(&mut transport).unwrap_err();
        assert!(matches!(err, TrackerError::NoDeviceFound { .. }));
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(!transport.is_scanning());
        assert_eq!(device.scans_started(), 1);
        assert_eq!(device.scans_stopped(), 1);
        assert_eq!(device.connect_count(), 0);
    }

    #[test]
    fn test_quit_cancels_scan() {
        let mut transport = ScriptedTransport::empty();
        let device = transport.device();
        let selector = DeviceSelector::new(
            DeviceFilter::by_name("Timeular ZEI"),
            Duration::from_secs(10),
        );
        let (quit_tx, quit_rx) = crossbeam_channel::bounded(1);
        quit_tx.send(QuitSignal::Interrupt).unwrap();

        let started = Instant::now();
        let err = selector.select_until(&mut transport, &quit_rx).unwrap_err();
        assert!(matches!(err, TrackerError::Cancelled(QuitSignal::Interrupt)));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!transport.is_scanning());
        assert_eq!(device.scans_stopped(), 1);
        assert_eq!(device.connect_count(), 0);
    }
}
