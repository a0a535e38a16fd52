//! Completion and timeout subscriptions.
//!
//! Callbacks run synchronously on the thread that triggered them, outside
//! the engine state lock. A panicking callback is logged and skipped; it
//! cannot leave engine state half-updated.

use crate::assembly::ExpiredCycle;
use crate::frame::DeviceId;
use crate::samples::DecodedMeasurement;
use log::error;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Callback invoked once per completed cycle.
pub type CompletionCallback = Arc<dyn Fn(&DeviceId, Arc<DecodedMeasurement>) + Send + Sync>;

/// Callback invoked once per abandoned cycle.
pub type TimeoutCallback = Arc<dyn Fn(&ExpiredCycle) + Send + Sync>;

/// Handle returned by subscriptions, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub(crate) struct Subscribers {
    next_id: AtomicU64,
    completion: Mutex<Vec<(SubscriptionId, CompletionCallback)>>,
    timeout: Mutex<Vec<(SubscriptionId, TimeoutCallback)>>,
}

impl Subscribers {
    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn add_completion(&self, callback: CompletionCallback) -> SubscriptionId {
        let id = self.next_id();
        self.completion
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback));
        id
    }

    pub(crate) fn add_timeout(&self, callback: TimeoutCallback) -> SubscriptionId {
        let id = self.next_id();
        self.timeout
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback));
        id
    }

    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        let mut removed = false;
        {
            let mut list = self.completion.lock().unwrap_or_else(PoisonError::into_inner);
            let before = list.len();
            list.retain(|(sub, _)| *sub != id);
            removed |= list.len() != before;
        }
        {
            let mut list = self.timeout.lock().unwrap_or_else(PoisonError::into_inner);
            let before = list.len();
            list.retain(|(sub, _)| *sub != id);
            removed |= list.len() != before;
        }
        removed
    }

    pub(crate) fn notify_complete(&self, device: &DeviceId, measurement: &Arc<DecodedMeasurement>) {
        // Snapshot so callbacks may subscribe or unsubscribe re-entrantly
        let callbacks: Vec<CompletionCallback> = self
            .completion
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();

        for callback in callbacks {
            let shared = measurement.clone();
            if catch_unwind(AssertUnwindSafe(|| callback(device, shared))).is_err() {
                error!(
                    "Completion callback panicked for {} cycle {}",
                    device, measurement.cycle_id
                );
            }
        }
    }

    pub(crate) fn notify_expired(&self, expired: &[ExpiredCycle]) {
        if expired.is_empty() {
            return;
        }
        let callbacks: Vec<TimeoutCallback> = self
            .timeout
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();

        for cycle in expired {
            for callback in &callbacks {
                if catch_unwind(AssertUnwindSafe(|| callback(cycle))).is_err() {
                    error!(
                        "Timeout callback panicked for {} cycle {}",
                        cycle.device, cycle.cycle_id
                    );
                }
            }
        }
    }
}
