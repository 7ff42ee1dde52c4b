//! Error taxonomy for the tracker.

use std::time::Duration;

use thiserror::Error;

use crate::device::TransportError;
use crate::quit::QuitSignal;
use crate::store::StoreError;

/// Errors that end a tracking session.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The scan window elapsed without a matching device.
    #[error("No device found matching '{filter}' within {}s", timeout.as_secs())]
    NoDeviceFound { filter: String, timeout: Duration },

    /// Transport-level failure while connecting or subscribing.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Any failing read or write against the interval ledger.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// A quit request arrived before a device was connected.
    #[error("Cancelled before a device was connected ({0:?})")]
    Cancelled(QuitSignal),

    /// Disconnect failed while the session was already shutting down.
    #[error("Disconnect failed during shutdown: {0}")]
    ShutdownDisconnect(String),
}

impl From<TransportError> for TrackerError {
    fn from(err: TransportError) -> Self {
        TrackerError::Connection(err.to_string())
    }
}

impl TrackerError {
    /// Whether the error should end the process with a failure status.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            TrackerError::ShutdownDisconnect(_) | TrackerError::Cancelled(_)
        )
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;
