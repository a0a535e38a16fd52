//! Engine counters.
//!
//! Counters live inside the engine's state lock so they always agree with
//! the maps they describe. Callers only ever see a [`StatsSnapshot`].

use serde::Serialize;

/// Monotonic counters, reset only by an explicit operator call.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Counters {
    pub packets_received: u64,
    pub packets_duplicate: u64,
    pub packets_invalid: u64,
    pub packets_rejected: u64,
    pub streams_completed: u64,
    pub streams_timeout: u64,
    pub streams_malformed: u64,
}

/// Point-in-time view of engine statistics.
///
/// # Example Output
///
/// ```json
/// {
///   "packets_received": 14,
///   "packets_duplicate": 42,
///   "packets_invalid": 0,
///   "packets_rejected": 0,
///   "streams_completed": 1,
///   "streams_timeout": 0,
///   "streams_malformed": 0,
///   "active_streams": 0,
///   "dedup_cache_size": 14,
///   "completed_pending": 1
/// }
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Unique packets stored by the assembler.
    pub packets_received: u64,
    /// Retransmissions dropped by the duplicate filter.
    pub packets_duplicate: u64,
    /// Advertisements that failed frame decoding.
    pub packets_invalid: u64,
    /// Unique packets the assembler refused.
    pub packets_rejected: u64,
    /// Cycles completed and decoded.
    pub streams_completed: u64,
    /// Cycles abandoned after the stream timeout.
    pub streams_timeout: u64,
    /// Cycles completed but not decodable.
    pub streams_malformed: u64,
    /// Currently open cycles.
    pub active_streams: usize,
    /// Currently remembered packet keys.
    pub dedup_cache_size: usize,
    /// Completed measurements waiting to be taken.
    pub completed_pending: usize,
}

impl StatsSnapshot {
    pub(crate) fn new(
        counters: &Counters,
        active_streams: usize,
        dedup_cache_size: usize,
        completed_pending: usize,
    ) -> Self {
        Self {
            packets_received: counters.packets_received,
            packets_duplicate: counters.packets_duplicate,
            packets_invalid: counters.packets_invalid,
            packets_rejected: counters.packets_rejected,
            streams_completed: counters.streams_completed,
            streams_timeout: counters.streams_timeout,
            streams_malformed: counters.streams_malformed,
            active_streams,
            dedup_cache_size,
            completed_pending,
        }
    }

    /// Fraction of filtered advertisements that were retransmissions.
    pub fn duplicate_rate(&self) -> f64 {
        let seen = self.packets_received + self.packets_rejected + self.packets_duplicate;
        if seen == 0 {
            return 0.0;
        }
        self.packets_duplicate as f64 / seen as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_copies_counters() {
        let counters = Counters {
            packets_received: 14,
            packets_duplicate: 42,
            streams_completed: 1,
            ..Counters::default()
        };
        let snapshot = StatsSnapshot::new(&counters, 2, 14, 1);
        assert_eq!(snapshot.packets_received, 14);
        assert_eq!(snapshot.packets_duplicate, 42);
        assert_eq!(snapshot.streams_completed, 1);
        assert_eq!(snapshot.active_streams, 2);
        assert_eq!(snapshot.dedup_cache_size, 14);
        assert_eq!(snapshot.completed_pending, 1);
    }

    #[test]
    fn test_duplicate_rate() {
        assert_eq!(StatsSnapshot::default().duplicate_rate(), 0.0);
        let snapshot = StatsSnapshot {
            packets_received: 14,
            packets_duplicate: 42,
            ..StatsSnapshot::default()
        };
        assert!((snapshot.duplicate_rate() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_json_fields() {
        let json = serde_json::to_value(StatsSnapshot::default()).unwrap();
        for field in [
            "packets_received",
            "packets_duplicate",
            "streams_completed",
            "streams_timeout",
            "active_streams",
            "dedup_cache_size",
            "completed_pending",
        ] {
            assert_eq!(json[field], 0, "missing field {}", field);
        }
    }
}
