//! Transport used when no Bluetooth backend is compiled in.
//!
//! This exists so the crate (and binary) build without a BLE stack. Scans
//! never discover anything, so a tracking session ends with a discovery
//! timeout.

use crate::device::{
    DeviceCandidate, DeviceConnection, DeviceFilter, DeviceTransport, FaceId, TransportError,
};
use crossbeam_channel::{unbounded, Receiver, Sender};

/// A transport that never finds a device.
#[derive(Default)]
pub struct NoopTransport {
    scan: Option<Sender<DeviceCandidate>>,
}

impl NoopTransport {
    pub fn new() -> Result<Self, TransportError> {
        Ok(Self::default())
    }

    /// Check if a scan is currently running.
    pub fn is_scanning(&self) -> bool {
        self.scan.is_some()
    }
}

impl DeviceTransport for NoopTransport {
    type Connection = NoopConnection;

    fn start_scan(
        &mut self,
        _filter: &DeviceFilter,
    ) -> Result<Receiver<DeviceCandidate>, TransportError> {
        let (sender, receiver) = unbounded();
        // Keep the sender so the channel stays open until the scan stops.
        self.scan = Some(sender);
        Ok(receiver)
    }

    fn stop_scan(&mut self) {
        self.scan = None;
    }

    fn connect(&mut self, candidate: &DeviceCandidate) -> Result<NoopConnection, TransportError> {
        Err(TransportError::Connect {
            device: candidate.id.clone(),
            reason: "built without Bluetooth support (enable the `ble` feature)".to_string(),
        })
    }
}

/// Never constructed by [`NoopTransport`]; present to satisfy the trait.
pub struct NoopConnection;

impl DeviceConnection for NoopConnection {
    fn read_face(&mut self) -> Result<FaceId, TransportError> {
        Err(TransportError::NotConnected)
    }

    fn subscribe(&mut self) -> Result<Receiver<FaceId>, TransportError> {
        Err(TransportError::NotConnected)
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}
