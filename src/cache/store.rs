//! Export cache storage.
//!
//! Three keyed LRU maps plus the single-slot export-name registry. All four
//! are emptied together by [`ExportCaches::clear_all`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use lru::LruCache;
use metrics::counter;
use tokio::sync::{Mutex, MutexGuard};

use crate::application::aliases::ExportNameRegistry;
use crate::domain::entities::ExportData;

use super::config::CacheConfig;
use super::keys::{CacheKey, CacheName};
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";
const METRIC_CACHE_HIT: &str = "static_export_cache_hit_total";
const METRIC_CACHE_MISS: &str = "static_export_cache_miss_total";

/// Cached outcome of a reverse translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportLookup {
    Found(ExportData),
    /// The real name has no mapping; kept so repeated misses stay cheap.
    Missing,
}

/// Snapshot of the cache generation taken before computing a value.
///
/// A value computed under an older generation is dropped on insert, so a
/// computation racing with [`ExportCaches::clear_all`] cannot repopulate the
/// cache with stale data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

pub struct ExportCaches {
    export_data: RwLock<LruCache<CacheKey, ExportLookup>>,
    export_flags: RwLock<LruCache<CacheKey, bool>>,
    secure_flags: RwLock<LruCache<CacheKey, bool>>,
    export_names: RwLock<Option<Arc<ExportNameRegistry>>>,
    export_names_rebuild: Mutex<()>,
    generation: AtomicU64,
}

impl ExportCaches {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            export_data: RwLock::new(LruCache::new(config.export_data_limit_non_zero())),
            export_flags: RwLock::new(LruCache::new(config.export_flag_limit_non_zero())),
            secure_flags: RwLock::new(LruCache::new(config.secure_flag_limit_non_zero())),
            export_names: RwLock::new(None),
            export_names_rebuild: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn generation(&self) -> Generation {
        Generation(self.generation.load(Ordering::SeqCst))
    }

    fn is_current(&self, generation: Generation) -> bool {
        self.generation.load(Ordering::SeqCst) == generation.0
    }

    pub fn get_export_data(&self, key: &CacheKey) -> Option<ExportLookup> {
        let value = rw_write(&self.export_data, SOURCE, "get_export_data")
            .get(key)
            .cloned();
        record_lookup(CacheName::ExportData, value.is_some());
        value
    }

    pub fn put_export_data(&self, generation: Generation, key: CacheKey, value: ExportLookup) {
        let mut map = rw_write(&self.export_data, SOURCE, "put_export_data");
        if self.is_current(generation) {
            map.put(key, value);
        }
    }

    pub fn get_export_flag(&self, key: &CacheKey) -> Option<bool> {
        let value = rw_write(&self.export_flags, SOURCE, "get_export_flag")
            .get(key)
            .copied();
        record_lookup(CacheName::ExportFlags, value.is_some());
        value
    }

    pub fn put_export_flag(&self, generation: Generation, key: CacheKey, value: bool) {
        let mut map = rw_write(&self.export_flags, SOURCE, "put_export_flag");
        if self.is_current(generation) {
            map.put(key, value);
        }
    }

    pub fn get_secure_flag(&self, key: &CacheKey) -> Option<bool> {
        let value = rw_write(&self.secure_flags, SOURCE, "get_secure_flag")
            .get(key)
            .copied();
        record_lookup(CacheName::SecureFlags, value.is_some());
        value
    }

    pub fn put_secure_flag(&self, generation: Generation, key: CacheKey, value: bool) {
        let mut map = rw_write(&self.secure_flags, SOURCE, "put_secure_flag");
        if self.is_current(generation) {
            map.put(key, value);
        }
    }

    pub fn export_names(&self) -> Option<Arc<ExportNameRegistry>> {
        let value = rw_read(&self.export_names, SOURCE, "export_names").clone();
        record_lookup(CacheName::ExportNames, value.is_some());
        value
    }

    pub fn set_export_names(&self, generation: Generation, registry: Arc<ExportNameRegistry>) {
        let mut slot = rw_write(&self.export_names, SOURCE, "set_export_names");
        if self.is_current(generation) {
            *slot = Some(registry);
        }
    }

    /// Serialises registry rebuilds so concurrent misses compute it once.
    pub async fn lock_export_names_rebuild(&self) -> MutexGuard<'_, ()> {
        self.export_names_rebuild.lock().await
    }

    /// Empty every cache. Once this returns, every lookup misses until a
    /// value computed after the call is stored.
    pub fn clear_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        rw_write(&self.export_data, SOURCE, "clear_all.export_data").clear();
        rw_write(&self.export_flags, SOURCE, "clear_all.export_flags").clear();
        rw_write(&self.secure_flags, SOURCE, "clear_all.secure_flags").clear();
        *rw_write(&self.export_names, SOURCE, "clear_all.export_names") = None;
    }

    pub fn len(&self, cache: CacheName) -> usize {
        match cache {
            CacheName::ExportData => rw_read(&self.export_data, SOURCE, "len").len(),
            CacheName::ExportFlags => rw_read(&self.export_flags, SOURCE, "len").len(),
            CacheName::SecureFlags => rw_read(&self.secure_flags, SOURCE, "len").len(),
            CacheName::ExportNames => {
                usize::from(rw_read(&self.export_names, SOURCE, "len").is_some())
            }
        }
    }
}

fn record_lookup(cache: CacheName, hit: bool) {
    let metric = if hit {
        METRIC_CACHE_HIT
    } else {
        METRIC_CACHE_MISS
    };
    counter!(metric, "cache" => cache.as_str()).increment(1);
}
