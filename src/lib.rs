//! Deduplication and reassembly of multi-packet BLE telemetry.
//!
//! Sensors split one measurement cycle across several advertisements and
//! rebroadcast each of them many times. This library filters the
//! retransmissions, reassembles cycles in any arrival order, decodes the
//! completed buffer into sample groups and abandons cycles that stall.
//!
//! The transport is left to the caller: feed raw advertisement bytes to
//! [`Engine::ingest`] and subscribe to completions.

pub mod assembly;
pub mod dedup;
pub mod engine;
pub mod frame;
#[cfg(feature = "stats-server")]
pub mod network;
pub mod normalize;
pub mod samples;

// Re-export commonly used items
pub use assembly::{CycleAssembler, ExpiredCycle, RejectReason};
pub use dedup::DuplicateFilter;
pub use engine::{Engine, EngineConfig, EngineError, Outcome, StatsSnapshot, SubscriptionId};
pub use frame::{decode_header, DeviceId, FormatError, Frame, PacketKey};
pub use normalize::{payload_from_hex, NormalizeError};
pub use samples::{DecodedMeasurement, ProtocolRegistry, SampleDecoder, SampleLayout};

#[cfg(feature = "stats-server")]
pub use network::{StatsServer, DEFAULT_STATS_PORT};
