//! Cache sizing.

use std::num::NonZeroUsize;

const DEFAULT_EXPORT_DATA_LIMIT: usize = 2_048;
const DEFAULT_EXPORT_FLAG_LIMIT: usize = 2_048;
const DEFAULT_SECURE_FLAG_LIMIT: usize = 2_048;

/// Capacity of each keyed export cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Real name → translation result.
    pub export_data_limit: usize,
    /// Virtual name → "must be exported".
    pub export_flag_limit: usize,
    /// Virtual name → "must be served securely".
    pub secure_flag_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            export_data_limit: DEFAULT_EXPORT_DATA_LIMIT,
            export_flag_limit: DEFAULT_EXPORT_FLAG_LIMIT,
            secure_flag_limit: DEFAULT_SECURE_FLAG_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            export_data_limit: settings.export_data_limit,
            export_flag_limit: settings.export_flag_limit,
            secure_flag_limit: settings.secure_flag_limit,
        }
    }
}

impl CacheConfig {
    /// Returns the export data limit as NonZeroUsize, clamping to 1 if zero.
    pub fn export_data_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.export_data_limit).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn export_flag_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.export_flag_limit).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn secure_flag_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.secure_flag_limit).unwrap_or(NonZeroUsize::MIN)
    }
}
