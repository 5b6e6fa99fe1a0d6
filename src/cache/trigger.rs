//! Cache trigger service.
//!
//! Turns publish and maintenance notifications into cache events and clears
//! the export caches before returning.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use super::events::{CacheEvent, EventKind, EventLog};
use super::store::ExportCaches;

pub struct CacheTrigger {
    caches: Arc<ExportCaches>,
    log: EventLog,
}

impl CacheTrigger {
    pub fn new(caches: Arc<ExportCaches>) -> Self {
        Self {
            caches,
            log: EventLog::new(),
        }
    }

    /// Record `kind` and clear every cache synchronously.
    pub fn trigger(&self, kind: EventKind) -> CacheEvent {
        let event = CacheEvent::new(kind, self.log.next_epoch());

        info!(
            target = "static_export::cache",
            event_id = %event.id,
            event_epoch = event.epoch,
            event_kind = event.kind.as_str(),
            "Clearing export caches"
        );

        self.caches.clear_all();
        self.log.record(event.clone());
        event
    }

    pub fn publish_project(&self, publish_id: Uuid) -> CacheEvent {
        self.trigger(EventKind::PublishProject { publish_id })
    }

    pub fn update_exports(&self) -> CacheEvent {
        self.trigger(EventKind::UpdateExports)
    }

    pub fn clear_caches(&self) -> CacheEvent {
        self.trigger(EventKind::ClearCaches)
    }

    pub fn caches(&self) -> &Arc<ExportCaches> {
        &self.caches
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }
}
