//! Device transport for the activity cube.
//!
//! The tracker only needs four things from a transport: scan for candidates,
//! connect to one, read/subscribe to the face characteristic and disconnect.
//! Backends are selected at compile time.

pub mod scripted;
pub mod types;

#[cfg(feature = "ble")]
pub mod ble;

#[cfg(not(feature = "ble"))]
pub mod noop;

use crossbeam_channel::Receiver;
use thiserror::Error;

// Re-export commonly used types
pub use types::{
    DeviceCandidate, DeviceFilter, FaceId, DEFAULT_DEVICE_NAME, FACE_CHANGE_CHARACTERISTIC_UUID,
    PRIMARY_SERVICE_UUID,
};

#[cfg(feature = "ble")]
pub use ble::{BleConnection, BleTransport};

/// Platform transport type alias
#[cfg(feature = "ble")]
pub type Transport = BleTransport;

#[cfg(not(feature = "ble"))]
pub use noop::{NoopConnection, NoopTransport};

/// Platform transport type alias
#[cfg(not(feature = "ble"))]
pub type Transport = NoopTransport;

/// Errors raised by a transport backend.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("No Bluetooth adapter available")]
    NoAdapter,
    #[error("Scan failed: {0}")]
    Scan(String),
    #[error("Could not connect to {device}: {reason}")]
    Connect { device: String, reason: String },
    #[error("Service or characteristic {0} not found")]
    MissingCharacteristic(String),
    #[error("Read failed: {0}")]
    Read(String),
    #[error("Subscribe failed: {0}")]
    Subscribe(String),
    #[error("Disconnect failed: {0}")]
    Disconnect(String),
    #[error("Device is not connected")]
    NotConnected,
}

/// Discovery and connection side of a transport.
pub trait DeviceTransport {
    type Connection: DeviceConnection;

    /// Begin scanning. Candidates arrive on the returned channel until
    /// [`DeviceTransport::stop_scan`] is called.
    fn start_scan(&mut self, filter: &DeviceFilter)
        -> Result<Receiver<DeviceCandidate>, TransportError>;

    /// Stop an in-progress scan. Calling this when no scan runs is a no-op.
    fn stop_scan(&mut self);

    /// Connect and resolve the face characteristic on the primary service.
    fn connect(&mut self, candidate: &DeviceCandidate) -> Result<Self::Connection, TransportError>;
}

/// A live connection to the cube.
pub trait DeviceConnection {
    /// Synchronously read the face that is currently up.
    fn read_face(&mut self) -> Result<FaceId, TransportError>;

    /// Subscribe to face-change notifications, delivered in device order.
    fn subscribe(&mut self) -> Result<Receiver<FaceId>, TransportError>;

    /// Release the connection. Must tolerate an already-dropped link.
    fn disconnect(&mut self) -> Result<(), TransportError>;
}
