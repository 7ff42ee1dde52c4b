//! In-memory transport driven by the caller.
//!
//! Used by tests and dry runs: candidates are announced as soon as a scan
//! starts, and face readings are pushed through a [`ScriptedDevice`] handle
//! that can be kept after the transport has been handed to a session.

use crate::device::{
    DeviceCandidate, DeviceConnection, DeviceFilter, DeviceTransport, FaceId, TransportError,
};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
struct DeviceState {
    initial_face: FaceId,
    notifier: Option<Sender<FaceId>>,
    notifications: Receiver<FaceId>,
    connected: bool,
    connects: usize,
    disconnects: usize,
    scans_started: usize,
    scans_stopped: usize,
    fail_connect: bool,
    fail_disconnect: bool,
}

/// Handle onto the simulated cube.
#[derive(Debug, Clone)]
pub struct ScriptedDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl ScriptedDevice {
    /// Create a device resting on `initial_face`.
    pub fn new(initial_face: FaceId) -> Self {
        let (notifier, notifications) = unbounded();
        Self {
            state: Arc::new(Mutex::new(DeviceState {
                initial_face,
                notifier: Some(notifier),
                notifications,
                connected: false,
                connects: 0,
                disconnects: 0,
                scans_started: 0,
                scans_stopped: 0,
                fail_connect: false,
                fail_disconnect: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Rotate the cube: queue a face-change notification. The value
    /// returned by a direct read stays the face the device was created with.
    pub fn push_face(&self, face: FaceId) {
        if let Some(notifier) = &self.lock().notifier {
            let _ = notifier.send(face);
        }
    }

    /// Drop the notification stream, as a lost link would.
    pub fn hang_up(&self) {
        self.lock().notifier = None;
    }

    /// Make the next connect attempt fail.
    pub fn fail_connect(&self) {
        self.lock().fail_connect = true;
    }

    /// Make disconnect report an error.
    pub fn fail_disconnect(&self) {
        self.lock().fail_disconnect = true;
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }

    pub fn disconnect_count(&self) -> usize {
        self.lock().disconnects
    }

    pub fn scans_started(&self) -> usize {
        self.lock().scans_started
    }

    pub fn scans_stopped(&self) -> usize {
        self.lock().scans_stopped
    }
}

/// Transport that announces a fixed list of candidates.
pub struct ScriptedTransport {
    candidates: Vec<DeviceCandidate>,
    device: ScriptedDevice,
    scan: Option<Sender<DeviceCandidate>>,
}

impl ScriptedTransport {
    pub fn new(candidates: Vec<DeviceCandidate>, device: ScriptedDevice) -> Self {
        Self {
            candidates,
            device,
            scan: None,
        }
    }

    /// A transport that sees no devices at all.
    pub fn empty() -> Self {
        Self::new(Vec::new(), ScriptedDevice::new(FaceId::SENTINEL))
    }

    pub fn device(&self) -> ScriptedDevice {
        self.device.clone()
    }

    pub fn is_scanning(&self) -> bool {
        self.scan.is_some()
    }
}

impl DeviceTransport for ScriptedTransport {
    type Connection = ScriptedConnection;

    fn start_scan(
        &mut self,
        _filter: &DeviceFilter,
    ) -> Result<Receiver<DeviceCandidate>, TransportError> {
        let (sender, receiver) = unbounded();
        for candidate in &self.candidates {
            sender
                .send(candidate.clone())
                .map_err(|e| TransportError::Scan(e.to_string()))?;
        }
        self.scan = Some(sender);
        self.device.lock().scans_started += 1;
        Ok(receiver)
    }

    fn stop_scan(&mut self) {
        if self.scan.take().is_some() {
            self.device.lock().scans_stopped += 1;
        }
    }

    fn connect(&mut self, candidate: &DeviceCandidate) -> Result<ScriptedConnection, TransportError> {
        let mut state = self.device.lock();
        if state.fail_connect {
            return Err(TransportError::Connect {
                device: candidate.id.clone(),
                reason: "scripted connect failure".to_string(),
            });
        }
        state.connected = true;
        state.connects += 1;
        Ok(ScriptedConnection {
            device: self.device.clone(),
        })
    }
}

/// Connection to a [`ScriptedDevice`].
pub struct ScriptedConnection {
    device: ScriptedDevice,
}

impl DeviceConnection for ScriptedConnection {
    fn read_face(&mut self) -> Result<FaceId, TransportError> {
        let state = self.device.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        Ok(state.initial_face)
    }

    fn subscribe(&mut self) -> Result<Receiver<FaceId>, TransportError> {
        let state = self.device.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        Ok(state.notifications.clone())
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        let mut state = self.device.lock();
        state.disconnects += 1;
        state.connected = false;
        if state.fail_disconnect {
            return Err(TransportError::Disconnect(
                "scripted disconnect failure".to_string(),
            ));
        }
        Ok(())
    }
}
