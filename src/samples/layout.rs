//! Per-version sample layouts.
//!
//! A layout names the contiguous groups an assembled buffer is split into.
//! Supporting a new sensor payload means registering a new layout; the
//! decoder itself does not change.

use crate::frame::{PAYLOAD_LEN, VERSION_RAW};

/// Size of one encoded sample in bytes (big-endian `i16`).
pub const SAMPLE_SIZE: usize = 2;

/// Errors raised when constructing a layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// Layout has no groups.
    NoGroups,
    /// A group has zero samples.
    EmptyGroup(&'static str),
    /// Group sizes do not add up to the samples carried by the packets.
    SampleCountMismatch {
        /// Samples carried by `packet_count` packets.
        expected: usize,
        /// Sum of group sizes.
        actual: usize,
    },
    /// Reference pair names a group that does not exist.
    UnknownReference(&'static str),
}

impl std::fmt::Display for LayoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoGroups => write!(f, "layout has no groups"),
            Self::EmptyGroup(name) => write!(f, "group '{}' has no samples", name),
            Self::SampleCountMismatch { expected, actual } => write!(
                f,
                "groups hold {} samples but packets carry {}",
                actual, expected
            ),
            Self::UnknownReference(name) => write!(f, "unknown reference group '{}'", name),
        }
    }
}

impl std::error::Error for LayoutError {}

/// One named, contiguous run of samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupSpec {
    /// Group name.
    pub name: &'static str,
    /// Number of samples.
    pub len: usize,
}

impl GroupSpec {
    /// Create a group spec.
    pub const fn new(name: &'static str, len: usize) -> Self {
        Self { name, len }
    }
}

/// Sample layout for one protocol version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleLayout {
    version: u8,
    packet_count: u8,
    groups: Vec<GroupSpec>,
    reference: Option<(&'static str, &'static str)>,
}

impl SampleLayout {
    /// Create a layout, checking that the groups exactly cover the samples
    /// carried by `packet_count` packets.
    pub fn new(version: u8, packet_count: u8, groups: Vec<GroupSpec>) -> Result<Self, LayoutError> {
        if groups.is_empty() {
            return Err(LayoutError::NoGroups);
        }
        if let Some(empty) = groups.iter().find(|g| g.len == 0) {
            return Err(LayoutError::EmptyGroup(empty.name));
        }

        let expected = usize::from(packet_count) * PAYLOAD_LEN / SAMPLE_SIZE;
        let actual: usize = groups.iter().map(|g| g.len).sum();
        if expected != actual {
            return Err(LayoutError::SampleCountMismatch { expected, actual });
        }

        Ok(Self {
            version,
            packet_count,
            groups,
            reference: None,
        })
    }

    /// Name a (high, low) reference pair; the decoder reports the difference
    /// of their means.
    pub fn with_reference(
        mut self,
        high: &'static str,
        low: &'static str,
    ) -> Result<Self, LayoutError> {
        for name in [high, low] {
            if !self.groups.iter().any(|g| g.name == name) {
                return Err(LayoutError::UnknownReference(name));
            }
        }
        self.reference = Some((high, low));
        Ok(self)
    }

    /// Standard raw capacitive-sense layout (version `0xDD`).
    ///
    /// 14 packets × 12 bytes = 168 bytes = 84 samples:
    /// supply reference, ground reference, self and mutual capacitance.
    pub fn raw_captouch() -> Self {
        Self {
            version: VERSION_RAW,
            packet_count: 14,
            groups: vec![
                GroupSpec::new("vdd_ref", 8),
                GroupSpec::new("gnd_ref", 8),
                GroupSpec::new("self_cap_raw", 34),
                GroupSpec::new("mutual_cap_raw", 34),
            ],
            reference: Some(("vdd_ref", "gnd_ref")),
        }
    }

    /// Protocol version this layout decodes.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Packets per cycle.
    pub fn packet_count(&self) -> u8 {
        self.packet_count
    }

    /// Group specs in buffer order.
    pub fn groups(&self) -> &[GroupSpec] {
        &self.groups
    }

    /// Reference pair, if any.
    pub fn reference(&self) -> Option<(&'static str, &'static str)> {
        self.reference
    }

    /// Total number of samples.
    pub fn sample_count(&self) -> usize {
        self.groups.iter().map(|g| g.len).sum()
    }

    /// Expected assembled buffer length in bytes.
    pub fn byte_len(&self) -> usize {
        self.sample_count() * SAMPLE_SIZE
    }
}
