//! Device and packet identities.

use std::sync::Arc;

/// Identity of a transmitting device (usually its MAC address string).
///
/// Cheap to clone: the string is shared between every key and cycle that
/// refers to the same device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(Arc<str>);

impl DeviceId {
    /// Create a device identity.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Get the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

impl serde::Serialize for DeviceId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Identifies one logical packet regardless of how often it is retransmitted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PacketKey {
    /// Sending device.
    pub device: DeviceId,
    /// Measurement cycle identifier.
    pub cycle_id: u16,
    /// Packet index within the cycle.
    pub index: u8,
}

impl PacketKey {
    /// Create a new packet key.
    pub fn new(device: DeviceId, cycle_id: u16, index: u8) -> Self {
        Self {
            device,
            cycle_id,
            index,
        }
    }
}

impl std::fmt::Display for PacketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.device, self.cycle_id, self.index)
    }
}
