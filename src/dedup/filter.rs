//! Time-windowed duplicate filter.
//!
//! Every advertisement is repeated several times over the air. Each packet is
//! identified by its [`PacketKey`]; the filter remembers keys for a retention
//! window so that retransmissions are dropped before they reach assembly,
//! including retransmissions that arrive after their cycle already finished.
//!
//! Entries age out only through [`DuplicateFilter::sweep`]. An entry past
//! its retention window still rejects its key until a sweep runs.

use crate::frame::PacketKey;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Entry stored for each admitted packet key.
#[derive(Debug, Clone, Copy)]
pub struct FilterEntry {
    /// When this key was first admitted.
    pub first_seen: Instant,
}

/// Set of recently seen packet keys.
///
/// # Example
///
/// ```
/// use multipacket_ble::dedup::DuplicateFilter;
/// use multipacket_ble::frame::{DeviceId, PacketKey};
/// use std::time::{Duration, Instant};
///
/// let mut filter = DuplicateFilter::new(Duration::from_secs(120));
/// let key = PacketKey::new(DeviceId::new("AA:BB:CC:DD:EE:FF"), 1000, 0);
/// let now = Instant::now();
///
/// assert!(filter.admit(key.clone(), now));
/// assert!(!filter.admit(key, now));
/// ```
#[derive(Debug)]
pub struct DuplicateFilter {
    retention: Duration,
    entries: HashMap<PacketKey, FilterEntry>,
}

impl DuplicateFilter {
    /// Create a filter that remembers keys for `retention`.
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            entries: HashMap::new(),
        }
    }

    /// Admit a key if it has not been seen.
    ///
    /// Returns `true` the first time a key is offered and records `now`.
    /// Returns `false` without touching state for any later offer.
    #[must_use = "a false result means the packet is a retransmission"]
    pub fn admit(&mut self, key: PacketKey, now: Instant) -> bool {
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, FilterEntry { first_seen: now });
        true
    }

    /// Check if a key is remembered.
    pub fn contains(&self, key: &PacketKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Look up the entry for a key.
    pub fn peek(&self, key: &PacketKey) -> Option<&FilterEntry> {
        self.entries.get(key)
    }

    /// Remove entries older than the retention window.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let retention = self.retention;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.first_seen) <= retention);
        before - self.entries.len()
    }

    /// Get the retention window.
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Get the number of remembered keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the filter is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget a single key so its next sighting is admitted again.
    ///
    /// Used for packets that were admitted but could not be stored.
    pub fn forget(&mut self, key: &PacketKey) -> bool {
        self.entries.remove(key).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::DeviceId;

    const RETENTION: Duration = Duration::from_secs(120);

    fn key(cycle_id: u16, index: u8) -> PacketKey {
        PacketKey::new(DeviceId::new("AA:BB:CC:DD:EE:FF"), cycle_id, index)
    }

    #[test]
    fn test_first_admit_true_second_false() {
        let mut filter = DuplicateFilter::new(RETENTION);
        let now = Instant::now();

        assert!(filter.admit(key(100, 0), now));
        assert!(!filter.admit(key(100, 0), now));
        assert!(!filter.admit(key(100, 0), now + Duration::from_secs(60)));
        assert_eq!(filter.len(), 1);
    }

    #[test]
    fn test_duplicate_does_not_refresh_first_seen() {
        let mut filter = DuplicateFilter::new(RETENTION);
        let t0 = Instant::now();

        assert!(filter.admit(key(100, 0), t0));
        assert!(!filter.admit(key(100, 0), t0 + Duration::from_secs(100)));
        assert_eq!(filter.peek(&key(100, 0)).unwrap().first_seen, t0);

        // Age is measured from the first sighting
        assert_eq!(filter.sweep(t0 + RETENTION + Duration::from_secs(1)), 1);
    }

    #[test]
    fn test_distinct_keys_admitted() {
        let mut filter = DuplicateFilter::new(RETENTION);
        let now = Instant::now();

        for index in 0..5 {
            assert!(filter.admit(key(100, index), now));
        }
        for cycle_id in [101, 102] {
            assert!(filter.admit(key(cycle_id, 0), now));
        }
        assert!(filter.admit(PacketKey::new(DeviceId::new("other"), 100, 0), now));
        assert_eq!(filter.len(), 8);
    }

    #[test]
    fn test_expired_key_rejected_until_swept() {
        let mut filter = DuplicateFilter::new(RETENTION);
        let t0 = Instant::now();
        let later = t0 + RETENTION + Duration::from_secs(30);

        assert!(filter.admit(key(100, 0), t0));
        assert!(!filter.admit(key(100, 0), later));

        assert_eq!(filter.sweep(later), 1);
        assert!(filter.is_empty());
        assert!(filter.admit(key(100, 0), later));
    }

    #[test]
    fn test_sweep_keeps_fresh_entries() {
        let mut filter = DuplicateFilter::new(RETENTION);
        let t0 = Instant::now();

        assert!(filter.admit(key(1, 0), t0));
        assert!(filter.admit(key(2, 0), t0 + Duration::from_secs(90)));

        let removed = filter.sweep(t0 + Duration::from_secs(150));
        assert_eq!(removed, 1);
        assert!(!filter.contains(&key(1, 0)));
        assert!(filter.contains(&key(2, 0)));
    }

    #[test]
    fn test_sweep_at_exact_boundary_keeps_entry() {
        let mut filter = DuplicateFilter::new(RETENTION);
        let t0 = Instant::now();
        assert!(filter.admit(key(1, 0), t0));
        assert_eq!(filter.sweep(t0 + RETENTION), 0);
    }

    #[test]
    fn test_forget_readmits_key() {
        let mut filter = DuplicateFilter::new(RETENTION);
        let now = Instant::now();
        for index in 0..3 {
            assert!(filter.admit(key(1, index), now));
        }

        assert!(filter.forget(&key(1, 1)));
        assert!(!filter.forget(&key(1, 1)));
        assert_eq!(filter.len(), 2);
        assert!(filter.admit(key(1, 1), now));
        assert!(!filter.admit(key(1, 0), now));
        assert_eq!(filter.retention(), RETENTION);
    }
}
