//! Device-facing value types for the activity cube.
//!
//! The cube reports a single signed byte per reading: the index of the face
//! that is currently up. Negative values never name a face and are used as
//! the "no activity" sentinel at session start and on shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Primary GATT service exposed by the cube.
pub const PRIMARY_SERVICE_UUID: Uuid = Uuid::from_u128(0xc7e70010_c847_11e6_8175_8c89a55d403c);

/// Characteristic that carries the current face and notifies on change.
pub const FACE_CHANGE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0xc7e70012_c847_11e6_8175_8c89a55d403c);

/// Advertised name of the supported device.
pub const DEFAULT_DEVICE_NAME: &str = "Timeular ZEI";

/// Identifier of one physical face of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceId(pub i8);

impl FaceId {
    /// Out-of-range marker meaning "no activity".
    pub const SENTINEL: FaceId = FaceId(-1);

    /// Decode a raw characteristic value.
    pub fn from_raw(value: &[u8]) -> Option<Self> {
        value.first().map(|byte| FaceId(*byte as i8))
    }

    pub fn is_sentinel(self) -> bool {
        self.0 < 0
    }

    pub fn as_i64(self) -> i64 {
        i64::from(self.0)
    }
}

impl fmt::Display for FaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_sentinel() {
            write!(f, "none")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// A device seen during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCandidate {
    /// Transport-specific identifier used to connect
    pub id: String,
    /// Advertised local name, if any
    pub name: Option<String>,
    /// Hardware address as reported by the transport
    pub address: String,
}

impl DeviceCandidate {
    pub fn new(id: impl Into<String>, name: Option<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name,
            address: address.into(),
        }
    }
}

/// What the selector is looking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFilter {
    /// Exact advertised name to match
    pub name: String,
    /// Optional hardware address pin (case-insensitive)
    pub address: Option<String>,
}

impl DeviceFilter {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: None,
        }
    }

    /// Pin the filter to one hardware address. Empty strings leave it unpinned.
    pub fn with_address(mut self, address: &str) -> Self {
        let address = address.trim();
        self.address = if address.is_empty() {
            None
        } else {
            Some(address.to_string())
        };
        self
    }

    pub fn accepts(&self, candidate: &DeviceCandidate) -> bool {
        if candidate.name.as_deref() != Some(self.name.as_str()) {
            return false;
        }
        match &self.address {
            Some(address) => candidate.address.eq_ignore_ascii_case(address),
            None => true,
        }
    }
}

impl fmt::Display for DeviceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.address {
            Some(address) => write!(f, "{} ({})", self.name, address),
            None => write!(f, "{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_from_raw_is_signed() {
        assert_eq!(FaceId::from_raw(&[3]), Some(FaceId(3)));
        assert_eq!(FaceId::from_raw(&[0xff]), Some(FaceId::SENTINEL));
        assert_eq!(FaceId::from_raw(&[]), None);
    }

    #[test]
    fn test_sentinel_display() {
        assert_eq!(FaceId::SENTINEL.to_string(), "none");
        assert_eq!(FaceId(7).to_string(), "7");
        assert!(FaceId(-3).is_sentinel());
        assert!(!FaceId(0).is_sentinel());
    }

    #[test]
    fn test_filter_matches_name_and_address() {
        let candidate = DeviceCandidate::new(
            "hci0/dev_1",
            Some("Timeular ZEI".to_string()),
            "AA:BB:CC:DD:EE:FF",
        );

        assert!(DeviceFilter::by_name("Timeular ZEI").accepts(&candidate));
        assert!(!DeviceFilter::by_name("Other").accepts(&candidate));
        assert!(DeviceFilter::by_name("Timeular ZEI")
            .with_address("aa:bb:cc:dd:ee:ff")
            .accepts(&candidate));
        assert!(!DeviceFilter::by_name("Timeular ZEI")
            .with_address("11:22:33:44:55:66")
            .accepts(&candidate));
    }

    #[test]
    fn test_empty_address_leaves_filter_unpinned() {
        let filter = DeviceFilter::by_name("Timeular ZEI").with_address("  ");
        assert_eq!(filter.address, None);
    }

    #[test]
    fn test_unnamed_candidate_is_rejected() {
        let candidate = DeviceCandidate::new("id", None, "AA:BB:CC:DD:EE:FF");
        assert!(!DeviceFilter::by_name("Timeular ZEI").accepts(&candidate));
    }
}
