//! Cache key definitions.

use std::fmt;

/// Composite `site_root:path` key shared by the keyed export caches.
///
/// The same virtual path under two site roots names two different resources,
/// so the site root is always part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(site_root: &str, path: &str) -> Self {
        Self(format!("{}:{}", site_root.trim_end_matches('/'), path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Label of each cache, used in metrics and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheName {
    ExportData,
    ExportFlags,
    SecureFlags,
    ExportNames,
}

impl CacheName {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheName::ExportData => "export_data",
            CacheName::ExportFlags => "export_flags",
            CacheName::SecureFlags => "secure_flags",
            CacheName::ExportNames => "export_names",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_root_is_part_of_the_key() {
        let a = CacheKey::new("/sites/a/", "/index.html");
        let b = CacheKey::new("/sites/b", "/index.html");
        assert_eq!(a.as_str(), "/sites/a:/index.html");
        assert_ne!(a, b);
    }
}
