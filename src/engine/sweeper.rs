//! Background expiry sweep.
//!
//! A tokio task that periodically trims the duplicate filter and abandons
//! stale cycles. The task is owned by a [`Sweeper`] handle: dropping the
//! handle cancels it, and the task only holds a weak reference to engine
//! state, so it also exits once the engine is gone.

use super::Shared;
use log::{debug, info};
use std::sync::Weak;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Error starting the sweep task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweeperError {
    /// Not called from within a tokio runtime.
    NoRuntime,
    /// A sweep task is already running for this engine.
    AlreadyRunning,
}

impl std::fmt::Display for SweeperError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoRuntime => write!(f, "no tokio runtime available for the sweep task"),
            Self::AlreadyRunning => write!(f, "sweep task already running"),
        }
    }
}

impl std::error::Error for SweeperError {}

/// Handle to a running sweep task.
pub struct Sweeper {
    /// Cancellation token for shutdown.
    cancel: CancellationToken,
    /// Background task handle.
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Spawn the sweep loop on the current tokio runtime.
    pub(crate) fn spawn(shared: Weak<Shared>, interval: Duration) -> Result<Self, SweeperError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SweeperError::NoRuntime)?;
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        let handle = runtime.spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer.tick().await; // Skip first

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        debug!("Expiry sweeper shutting down");
                        break;
                    }

                    _ = timer.tick() => {
                        let Some(shared) = shared.upgrade() else {
                            debug!("Engine dropped, expiry sweeper exiting");
                            break;
                        };
                        let report = shared.sweep(Instant::now());
                        if report.dedup_removed > 0 || !report.expired.is_empty() {
                            debug!(
                                "Sweep removed {} dedup entries, expired {} cycles",
                                report.dedup_removed,
                                report.expired.len()
                            );
                        }
                    }
                }
            }
        });

        info!("Expiry sweeper started (interval {:?})", interval);
        Ok(Self {
            cancel,
            handle: Some(handle),
        })
    }

    /// Check if the sweep task is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the task and wait for it to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Sweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sweeper")
            .field("running", &self.is_running())
            .finish()
    }
}
