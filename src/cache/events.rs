//! Cache events.
//!
//! Every invalidation is described by an event so it can be logged and
//! inspected after the fact. The caches themselves are cleared synchronously
//! by [`super::CacheTrigger`].

use std::collections::VecDeque;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use time::OffsetDateTime;
use uuid::Uuid;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::events";
const HISTORY_LIMIT: usize = 64;

/// Monotonic epoch for ordering events within this process.
pub type Epoch = u64;

#[derive(Debug, Clone)]
pub struct CacheEvent {
    /// Unique identifier for correlating log lines (UUIDv4).
    pub id: Uuid,
    pub epoch: Epoch,
    pub kind: EventKind,
    pub timestamp: OffsetDateTime,
}

impl CacheEvent {
    pub fn new(kind: EventKind, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            kind,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Events that invalidate every export cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A project was published.
    PublishProject { publish_id: Uuid },
    /// Export rules or exported files were changed by an operator.
    UpdateExports,
    /// Explicit request to drop all cached state.
    ClearCaches,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PublishProject { .. } => "publish_project",
            EventKind::UpdateExports => "update_exports",
            EventKind::ClearCaches => "clear_caches",
        }
    }
}

/// Bounded history of recently applied events, newest last.
pub struct EventLog {
    recent: RwLock<VecDeque<CacheEvent>>,
    epoch_counter: AtomicU64,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            recent: RwLock::new(VecDeque::with_capacity(HISTORY_LIMIT)),
            epoch_counter: AtomicU64::new(0),
        }
    }

    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn record(&self, event: CacheEvent) {
        let mut recent = rw_write(&self.recent, SOURCE, "record");
        if recent.len() == HISTORY_LIMIT {
            recent.pop_front();
        }
        recent.push_back(event);
    }

    pub fn recent(&self) -> Vec<CacheEvent> {
        rw_read(&self.recent, SOURCE, "recent")
            .iter()
            .cloned()
            .collect()
    }

    pub fn last(&self) -> Option<CacheEvent> {
        rw_read(&self.recent, SOURCE, "last").back().cloned()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
