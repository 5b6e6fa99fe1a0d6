//! Mutual exclusion between publish-triggered exports.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::sync::watch;
use tracing::{debug, error};

const METRIC_PUBLISH_ABANDONED: &str = "static_export_publish_abandoned_total";
const METRIC_BUSY: &str = "static_export_busy";

/// Single busy flag guarding scrub and export.
///
/// Waiters poll instead of queueing; after `max_polls` intervals they give
/// up. A shutdown signal ends the wait early with the same outcome.
#[derive(Clone)]
pub struct BusyGate {
    busy: Arc<AtomicBool>,
    poll: Duration,
    max_polls: u32,
    shutdown: watch::Receiver<bool>,
}

impl BusyGate {
    pub fn new(poll: Duration, max_polls: u32, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            busy: Arc::new(AtomicBool::new(false)),
            poll,
            max_polls,
            shutdown,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Take the flag if it is free right now.
    pub fn try_acquire(&self) -> Option<BusyGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| {
                gauge!(METRIC_BUSY).set(1.0);
                BusyGuard {
                    busy: Arc::clone(&self.busy),
                }
            })
    }

    /// Wait for the flag. `None` means the request was abandoned.
    pub async fn acquire(&self) -> Option<BusyGuard> {
        let mut shutdown = self.shutdown.clone();
        for attempt in 0..=self.max_polls {
            if *shutdown.borrow() {
                break;
            }
            if let Some(guard) = self.try_acquire() {
                return Some(guard);
            }
            if attempt == self.max_polls {
                break;
            }
            debug!(
                target = "static_export::gate",
                attempt = attempt + 1,
                max_polls = self.max_polls,
                "Export busy, waiting"
            );
            tokio::select! {
                _ = tokio::time::sleep(self.poll) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        counter!(METRIC_PUBLISH_ABANDONED).increment(1);
        error!(
            target = "static_export::gate",
            waited_polls = self.max_polls,
            "Export still busy, abandoning publish-triggered export"
        );
        None
    }
}

/// Releases the busy flag when dropped.
pub struct BusyGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
        gauge!(METRIC_BUSY).set(0.0);
    }
}
