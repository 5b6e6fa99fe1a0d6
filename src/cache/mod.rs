//! Export cache layer.
//!
//! Memoises reverse translations and the export/secure decisions per
//! `(site_root, path)`, plus the export-name registry as a single slot:
//!
//! - **export data**: real name → translation result (or a missing marker)
//! - **export flags**: virtual name → must be exported
//! - **secure flags**: virtual name → must be served securely
//! - **export names**: folder aliases, rebuilt lazily after a clear
//!
//! ```toml
//! [cache]
//! export_data_limit = 2048
//! export_flag_limit = 2048
//! secure_flag_limit = 2048
//! ```

mod config;
mod events;
mod keys;
mod lock;
mod store;
mod trigger;

pub use config::CacheConfig;
pub use events::{CacheEvent, Epoch, EventKind, EventLog};
pub use keys::{CacheKey, CacheName};
pub use store::{ExportCaches, ExportLookup, Generation};
pub use trigger::CacheTrigger;
