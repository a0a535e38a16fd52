//! Per-cycle packet accumulation.
//!
//! A sensor splits each measurement into a fixed number of packets. The
//! assembler keeps one open cycle per (device, cycle id) pair, stores every
//! unique packet body at its index and hands back the ordered concatenation
//! once the number of stored packets equals the declared count.
//!
//! Packets may arrive in any order; index 0 is not assumed to come first.
//!
//! # Memory Bounds
//!
//! Open cycles are only ever removed by completion or by
//! [`CycleAssembler::expire`]. An optional cap bounds the table: once it is
//! full, packets that would open a new cycle are refused and live cycles
//! are left alone.
//!
//! # Example
//!
//! ```
//! use multipacket_ble::assembly::{CycleAssembler, CycleOutcome};
//! use multipacket_ble::frame::{DeviceId, Frame, VERSION_RAW};
//! use std::time::Instant;
//!
//! let mut assembler = CycleAssembler::new(None);
//! let device = DeviceId::new("AA:BB:CC:DD:EE:FF");
//! let now = Instant::now();
//!
//! let first = Frame::new(VERSION_RAW, 7, 1, 2, vec![0x00, 0x02]);
//! assert!(matches!(
//!     assembler.accept(&device, first, now),
//!     CycleOutcome::Accumulating { received: 1, expected: 2 }
//! ));
//!
//! let second = Frame::new(VERSION_RAW, 7, 0, 2, vec![0x00, 0x01]);
//! match assembler.accept(&device, second, now) {
//!     CycleOutcome::Complete(buffer) => assert_eq!(buffer.bytes, vec![0, 1, 0, 2]),
//!     other => panic!("unexpected outcome: {:?}", other),
//! }
//! ```

use crate::frame::{DeviceId, Frame, PAYLOAD_LEN};
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

/// Why a unique packet was not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Packet index is not below the declared packet count.
    OutOfRange {
        /// Offending index.
        index: u8,
        /// Declared packet count.
        expected: u8,
    },
    /// Declared packet count differs from the one the open cycle started with.
    InconsistentHeader {
        /// Count declared by this packet.
        declared: u8,
        /// Count the cycle was opened with (still in effect).
        original: u8,
    },
    /// Protocol version differs from the one the open cycle started with.
    VersionChanged {
        /// Version carried by this packet.
        declared: u8,
        /// Version the cycle was opened with.
        original: u8,
    },
    /// Index is already stored for this cycle.
    DuplicateIndex(u8),
    /// The packet would open a new cycle while the table is full.
    AtCapacity {
        /// Configured open cycle cap.
        limit: usize,
    },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfRange { index, expected } => {
                write!(f, "packet index {} out of range (count {})", index, expected)
            }
            Self::InconsistentHeader { declared, original } => write!(
                f,
                "packet count changed mid-cycle: declared {}, cycle has {}",
                declared, original
            ),
            Self::VersionChanged { declared, original } => write!(
                f,
                "protocol version changed mid-cycle: 0x{:02X}, cycle has 0x{:02X}",
                declared, original
            ),
            Self::DuplicateIndex(index) => write!(f, "packet index {} already stored", index),
            Self::AtCapacity { limit } => {
                write!(f, "open cycle limit of {} reached", limit)
            }
        }
    }
}

/// A cycle abandoned after the stream timeout.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ExpiredCycle {
    /// Sending device.
    pub device: DeviceId,
    /// Cycle identifier.
    pub cycle_id: u16,
    /// Unique packets stored when the cycle was dropped.
    pub received: u8,
    /// Declared packet count.
    pub expected: u8,
}

/// Ordered concatenation of every packet body of a completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledBuffer {
    /// Sending device.
    pub device: DeviceId,
    /// Cycle identifier.
    pub cycle_id: u16,
    /// Protocol version of the cycle's first packet.
    pub version: u8,
    /// Number of packets assembled.
    pub packet_count: u8,
    /// Byte length implied by the header (`packet_count × PAYLOAD_LEN`).
    pub declared_len: usize,
    /// Concatenated payload bodies.
    pub bytes: Vec<u8>,
}

impl AssembledBuffer {
    /// Check that the concatenation has the length the header declared.
    pub fn is_consistent(&self) -> bool {
        self.bytes.len() == self.declared_len
    }
}

/// Result of offering a unique packet to the assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a Complete outcome carries the only copy of the assembled data"]
pub enum CycleOutcome {
    /// Packet stored, cycle still incomplete.
    Accumulating {
        /// Unique packets stored so far.
        received: u8,
        /// Declared packet count.
        expected: u8,
    },
    /// Packet completed its cycle; the cycle has been removed.
    Complete(AssembledBuffer),
    /// Packet was not stored.
    Rejected(RejectReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CycleKey {
    device: DeviceId,
    cycle_id: u16,
}

/// Accumulation state for one (device, cycle id) pair.
#[derive(Debug)]
struct Cycle {
    version: u8,
    expected: u8,
    packets: BTreeMap<u8, Vec<u8>>,
    created: Instant,
    last_update: Instant,
}

impl Cycle {
    fn new(version: u8, expected: u8, now: Instant) -> Self {
        Self {
            version,
            expected,
            packets: BTreeMap::new(),
            created: now,
            last_update: now,
        }
    }

    fn received(&self) -> u8 {
        // Bounded by `expected`, which is a u8
        self.packets.len() as u8
    }

    fn is_complete(&self) -> bool {
        self.packets.len() == usize::from(self.expected)
    }

    fn declared_len(&self) -> usize {
        usize::from(self.expected) * PAYLOAD_LEN
    }

    /// Concatenate payloads in index order. BTreeMap iteration is sorted.
    fn assemble(self, key: CycleKey) -> AssembledBuffer {
        let declared_len = self.declared_len();
        let mut bytes = Vec::with_capacity(declared_len);
        for payload in self.packets.values() {
            bytes.extend_from_slice(payload);
        }
        AssembledBuffer {
            device: key.device,
            cycle_id: key.cycle_id,
            version: self.version,
            packet_count: self.expected,
            declared_len,
            bytes,
        }
    }
}

/// Read-only view of an open cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleProgress {
    /// Unique packets stored.
    pub received: u8,
    /// Declared packet count.
    pub expected: u8,
    /// When the first packet arrived.
    pub created: Instant,
    /// When the last packet was stored.
    pub last_update: Instant,
}

/// Table of open cycles.
#[derive(Debug)]
pub struct CycleAssembler {
    cycles: HashMap<CycleKey, Cycle>,
    max_active: Option<usize>,
}

impl CycleAssembler {
    /// Create an assembler, optionally holding at most `max_active` open
    /// cycles.
    pub fn new(max_active: Option<usize>) -> Self {
        Self {
            cycles: HashMap::new(),
            max_active,
        }
    }

    /// Store a unique packet.
    ///
    /// The caller is expected to have filtered retransmissions already;
    /// a repeated index is still rejected rather than overwritten.
    pub fn accept(&mut self, device: &DeviceId, frame: Frame, now: Instant) -> CycleOutcome {
        if frame.index >= frame.count {
            return CycleOutcome::Rejected(RejectReason::OutOfRange {
                index: frame.index,
                expected: frame.count,
            });
        }

        let key = CycleKey {
            device: device.clone(),
            cycle_id: frame.cycle_id,
        };

        if let Some(limit) = self.max_active {
            if self.cycles.len() >= limit && !self.cycles.contains_key(&key) {
                warn!(
                    "Refusing cycle {} for {}: {} cycles open",
                    frame.cycle_id, device, limit
                );
                return CycleOutcome::Rejected(RejectReason::AtCapacity { limit });
            }
        }

        let cycle = self.cycles.entry(key.clone()).or_insert_with(|| {
            debug!(
                "Opening cycle {} for {} ({} packets)",
                frame.cycle_id, device, frame.count
            );
            Cycle::new(frame.version, frame.count, now)
        });

        if frame.count != cycle.expected {
            return CycleOutcome::Rejected(RejectReason::InconsistentHeader {
                declared: frame.count,
                original: cycle.expected,
            });
        }
        if frame.version != cycle.version {
            return CycleOutcome::Rejected(RejectReason::VersionChanged {
                declared: frame.version,
                original: cycle.version,
            });
        }
        if cycle.packets.contains_key(&frame.index) {
            return CycleOutcome::Rejected(RejectReason::DuplicateIndex(frame.index));
        }

        cycle.packets.insert(frame.index, frame.payload);
        cycle.last_update = now;

        let (received, expected) = (cycle.received(), cycle.expected);
        if !cycle.is_complete() {
            return CycleOutcome::Accumulating { received, expected };
        }

        match self.cycles.remove(&key) {
            Some(cycle) => CycleOutcome::Complete(cycle.assemble(key)),
            None => CycleOutcome::Accumulating { received, expected },
        }
    }

    /// Remove cycles whose last update is older than `timeout`.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> Vec<ExpiredCycle> {
        let stale: Vec<CycleKey> = self
            .cycles
            .iter()
            .filter(|(_, cycle)| now.saturating_duration_since(cycle.last_update) > timeout)
            .map(|(key, _)| key.clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|key| {
                let cycle = self.cycles.remove(&key)?;
                Some(ExpiredCycle {
                    device: key.device,
                    cycle_id: key.cycle_id,
                    received: cycle.received(),
                    expected: cycle.expected,
                })
            })
            .collect()
    }

    /// Get the progress of an open cycle.
    pub fn progress(&self, device: &DeviceId, cycle_id: u16) -> Option<CycleProgress> {
        let key = CycleKey {
            device: device.clone(),
            cycle_id,
        };
        self.cycles.get(&key).map(|cycle| CycleProgress {
            received: cycle.received(),
            expected: cycle.expected,
            created: cycle.created,
            last_update: cycle.last_update,
        })
    }

    /// Get the number of open cycles.
    pub fn active_count(&self) -> usize {
        self.cycles.len()
    }
}
