//! Deduplication and reassembly engine.
//!
//! The [`Engine`] composes the frame decoder, duplicate filter, cycle
//! assembler and sample decoder behind a single ingestion call, and notifies
//! subscribers when a cycle completes or is abandoned.
//!
//! # Concurrency
//!
//! One mutex guards the duplicate filter, the open cycle table, the queue of
//! completed measurements and the counters. Ingestion and sweeping both take
//! it for a short, CPU-only critical section. A completing packet is decoded
//! inside that section, so a cycle leaves the table and is counted as
//! completed or malformed in one step. Custom payload parsers therefore must
//! not call back into the engine. Subscriber callbacks run after the lock is
//! released.
//!
//! # Example
//!
//! ```
//! use multipacket_ble::engine::{Engine, EngineConfig};
//! use multipacket_ble::frame::{DeviceId, Frame, VERSION_RAW};
//! use multipacket_ble::samples::ProtocolRegistry;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let engine = Engine::new(EngineConfig::default(), ProtocolRegistry::default()).unwrap();
//! let completed = Arc::new(AtomicUsize::new(0));
//! let counter = completed.clone();
//! engine.on_complete(move |_device, _measurement| {
//!     counter.fetch_add(1, Ordering::Relaxed);
//! });
//!
//! let device = DeviceId::new("AA:BB:CC:DD:EE:FF");
//! for index in 0..14 {
//!     let raw = Frame::new(VERSION_RAW, 1000, index, 14, vec![0x05, 0x91].repeat(6)).to_bytes();
//!     for _ in 0..4 {
//!         let _ = engine.ingest(&device, &raw);
//!     }
//! }
//!
//! assert_eq!(completed.load(Ordering::Relaxed), 1);
//! let stats = engine.stats();
//! assert_eq!(stats.packets_received, 14);
//! assert_eq!(stats.packets_duplicate, 42);
//! ```

mod config;
mod outcome;
mod stats;
mod subscribers;
mod sweeper;

pub use config::{
    ConfigError, EngineConfig, DEFAULT_COMPLETED_QUEUE_CAPACITY, DEFAULT_DEDUP_RETENTION,
    DEFAULT_STREAM_TIMEOUT, DEFAULT_SWEEP_INTERVAL, ENV_COMPLETED_QUEUE_CAPACITY,
    ENV_DEDUP_RETENTION_SECS, ENV_MAX_ACTIVE_CYCLES, ENV_STREAM_TIMEOUT_SECS,
    ENV_SWEEP_INTERVAL_SECS,
};
pub use outcome::Outcome;
pub use stats::StatsSnapshot;
pub use subscribers::{CompletionCallback, SubscriptionId, TimeoutCallback};
pub use sweeper::{Sweeper, SweeperError};

use crate::assembly::{
    AssembledBuffer, CycleAssembler, CycleOutcome, CycleProgress, ExpiredCycle, RejectReason,
};
use crate::dedup::DuplicateFilter;
use crate::frame::{decode_header, DeviceId, FormatError, PacketKey};
use crate::samples::{DecodedMeasurement, ProtocolRegistry, SampleDecoder};
use log::{debug, info, warn};
use stats::Counters;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use subscribers::Subscribers;

/// Error constructing or starting an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Configuration failed validation.
    Config(ConfigError),
    /// The expiry sweeper could not be started.
    Sweeper(SweeperError),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "{}", e),
            Self::Sweeper(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ConfigError> for EngineError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<SweeperError> for EngineError {
    fn from(e: SweeperError) -> Self {
        Self::Sweeper(e)
    }
}

/// Result of one expiry pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Duplicate-filter entries removed.
    pub dedup_removed: usize,
    /// Cycles abandoned for exceeding the stream timeout.
    pub expired: Vec<ExpiredCycle>,
}

/// Mutable engine state, guarded by a single lock.
struct EngineState {
    filter: DuplicateFilter,
    assembler: CycleAssembler,
    completed: VecDeque<Arc<DecodedMeasurement>>,
    counters: Counters,
}

impl EngineState {
    /// Decode a completed buffer, count it and queue the measurement.
    fn finish(
        &mut self,
        decoder: &SampleDecoder,
        queue_capacity: usize,
        buffer: AssembledBuffer,
    ) -> Outcome {
        let decoded = if buffer.is_consistent() {
            decoder.decode(&buffer)
        } else {
            Err(FormatError::LengthMismatch {
                expected: buffer.declared_len,
                actual: buffer.bytes.len(),
            })
        };

        match decoded {
            Ok(measurement) => {
                self.counters.streams_completed += 1;
                let measurement = Arc::new(measurement);
                if self.completed.len() >= queue_capacity {
                    if let Some(dropped) = self.completed.pop_front() {
                        warn!(
                            "Completed queue full, dropping cycle {} from {}",
                            dropped.cycle_id, dropped.device
                        );
                    }
                }
                self.completed.push_back(measurement.clone());
                Outcome::Complete(measurement)
            }
            Err(e) => {
                self.counters.streams_malformed += 1;
                Outcome::Malformed(e)
            }
        }
    }
}

/// State shared between the engine handle and the sweep task.
pub(crate) struct Shared {
    config: EngineConfig,
    decoder: SampleDecoder,
    state: Mutex<EngineState>,
    subscribers: Subscribers,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        // No invariant spans a panic point inside the lock; recover the data
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn sweep(&self, now: Instant) -> SweepReport {
        let report = {
            let mut state = self.lock_state();
            let dedup_removed = state.filter.sweep(now);
            let expired = state.assembler.expire(now, self.config.stream_timeout);
            state.counters.streams_timeout += expired.len() as u64;
            SweepReport {
                dedup_removed,
                expired,
            }
        };

        for cycle in &report.expired {
            warn!(
                "Timeout: cycle {} from {} incomplete ({}/{} packets)",
                cycle.cycle_id, cycle.device, cycle.received, cycle.expected
            );
        }
        self.subscribers.notify_expired(&report.expired);
        report
    }
}

/// Packet deduplication and cycle reassembly engine.
///
/// Share across ingestion handlers as `Arc<Engine>`. Dropping the engine
/// stops its expiry sweeper.
pub struct Engine {
    shared: Arc<Shared>,
    sweeper: Option<Sweeper>,
}

impl Engine {
    /// Create an engine without a background sweeper.
    ///
    /// Call [`Engine::sweep`] yourself, or [`Engine::start_sweeper`] from
    /// within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: EngineConfig, registry: ProtocolRegistry) -> Result<Self, ConfigError> {
        config.validate()?;
        let state = EngineState {
            filter: DuplicateFilter::new(config.dedup_retention),
            assembler: CycleAssembler::new(config.max_active_cycles),
            completed: VecDeque::new(),
            counters: Counters::default(),
        };
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                decoder: SampleDecoder::new(registry),
                state: Mutex::new(state),
                subscribers: Subscribers::default(),
            }),
            sweeper: None,
        })
    }

    /// Create an engine and start its expiry sweeper on the current tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or no runtime is
    /// available.
    pub fn start(config: EngineConfig, registry: ProtocolRegistry) -> Result<Self, EngineError> {
        let mut engine = Self::new(config, registry)?;
        engine.start_sweeper()?;
        Ok(engine)
    }

    /// Start the periodic expiry sweeper.
    pub fn start_sweeper(&mut self) -> Result<(), SweeperError> {
        if self.sweeper.as_ref().is_some_and(Sweeper::is_running) {
            return Err(SweeperError::AlreadyRunning);
        }
        let interval = self.shared.config.sweep_interval;
        self.sweeper = Some(Sweeper::spawn(Arc::downgrade(&self.shared), interval)?);
        Ok(())
    }

    /// Stop the expiry sweeper and wait for it to exit.
    pub async fn stop_sweeper(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.shutdown().await;
        }
    }

    /// Check if the expiry sweeper is running.
    pub fn sweeper_running(&self) -> bool {
        self.sweeper.as_ref().is_some_and(Sweeper::is_running)
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Get the protocol registry.
    pub fn registry(&self) -> &ProtocolRegistry {
        self.shared.decoder.registry()
    }

    /// Ingest one advertisement received now.
    pub fn ingest(&self, device: &DeviceId, raw: &[u8]) -> Outcome {
        self.ingest_at(device, raw, Instant::now())
    }

    /// Ingest one advertisement received at `now`.
    ///
    /// Never fails: decode errors, duplicates and rejections are all
    /// reported through the returned [`Outcome`].
    pub fn ingest_at(&self, device: &DeviceId, raw: &[u8], now: Instant) -> Outcome {
        let frame = match decode_header(raw, self.shared.decoder.registry()) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Dropping advertisement from {}: {}", device, e);
                self.shared.lock_state().counters.packets_invalid += 1;
                return Outcome::Invalid(e);
            }
        };

        let key = PacketKey::new(device.clone(), frame.cycle_id, frame.index);
        let (cycle_id, index, count) = (frame.cycle_id, frame.index, frame.count);

        let outcome = {
            let mut state = self.shared.lock_state();
            if !state.filter.admit(key.clone(), now) {
                state.counters.packets_duplicate += 1;
                drop(state);
                debug!("Duplicate packet: {} cycle {} index {}", device, cycle_id, index);
                return Outcome::Duplicate;
            }

            match state.assembler.accept(device, frame, now) {
                CycleOutcome::Accumulating { received, expected } => {
                    state.counters.packets_received += 1;
                    Outcome::Accumulating { received, expected }
                }
                CycleOutcome::Rejected(reason) => {
                    state.counters.packets_rejected += 1;
                    if let RejectReason::AtCapacity { .. } = reason {
                        // Never stored; let a retransmission retry
                        state.filter.forget(&key);
                    }
                    Outcome::Rejected(reason)
                }
                CycleOutcome::Complete(buffer) => {
                    state.counters.packets_received += 1;
                    let capacity = self.shared.config.completed_queue_capacity;
                    state.finish(&self.shared.decoder, capacity, buffer)
                }
            }
        };

        match &outcome {
            Outcome::Accumulating { received, .. } => debug!(
                "Cycle {} from {}: packet {}/{} ({} stored)",
                cycle_id,
                device,
                u16::from(index) + 1,
                count,
                received
            ),
            Outcome::Rejected(reason) => {
                warn!("Rejected packet from {} cycle {}: {}", device, cycle_id, reason)
            }
            Outcome::Complete(measurement) => {
                info!(
                    "Cycle {} from {} complete: {} bytes, version 0x{:02X}",
                    cycle_id, device, measurement.byte_len, measurement.version
                );
                self.shared.subscribers.notify_complete(device, measurement);
            }
            Outcome::Malformed(e) => warn!("Cycle {} from {} malformed: {}", cycle_id, device, e),
            Outcome::Invalid(_) | Outcome::Duplicate => {}
        }
        outcome
    }

    /// Run one expiry pass now.
    pub fn sweep(&self) -> SweepReport {
        self.shared.sweep(Instant::now())
    }

    /// Run one expiry pass as of `now`.
    pub fn sweep_at(&self, now: Instant) -> SweepReport {
        self.shared.sweep(now)
    }

    /// Subscribe to completed cycles.
    pub fn on_complete<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&DeviceId, Arc<DecodedMeasurement>) + Send + Sync + 'static,
    {
        self.shared.subscribers.add_completion(Arc::new(callback))
    }

    /// Subscribe to cycles abandoned after the stream timeout.
    pub fn on_timeout<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ExpiredCycle) + Send + Sync + 'static,
    {
        self.shared.subscribers.add_timeout(Arc::new(callback))
    }

    /// Remove a subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.subscribers.remove(id)
    }

    /// Take the oldest completed measurement not yet taken.
    ///
    /// Completed measurements are queued in completion order alongside the
    /// completion callbacks; at capacity the oldest is dropped.
    pub fn take_completed(&self) -> Option<Arc<DecodedMeasurement>> {
        self.shared.lock_state().completed.pop_front()
    }

    /// Get a snapshot of the counters and current table sizes.
    pub fn stats(&self) -> StatsSnapshot {
        let state = self.shared.lock_state();
        StatsSnapshot::new(
            &state.counters,
            state.assembler.active_count(),
            state.filter.len(),
            state.completed.len(),
        )
    }

    /// Zero every monotonic counter. Gauges are unaffected.
    pub fn reset_counters(&self) {
        self.shared.lock_state().counters = Counters::default();
        info!("Engine counters reset");
    }

    /// Get the progress of an open cycle.
    pub fn progress(&self, device: &DeviceId, cycle_id: u16) -> Option<CycleProgress> {
        self.shared.lock_state().assembler.progress(device, cycle_id)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .field("sweeper", &self.sweeper)
            .finish()
    }
}
