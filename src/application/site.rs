//! Site roots served by this installation.

use crate::domain::paths;

/// Configured site roots, longest first so nested sites win.
#[derive(Debug, Clone, Default)]
pub struct SiteRoots {
    roots: Vec<String>,
}

impl SiteRoots {
    pub fn new<I, S>(roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut roots: Vec<String> = roots
            .into_iter()
            .map(|root| root.as_ref().trim().trim_end_matches('/').to_string())
            .filter(|root| !root.is_empty())
            .collect();
        roots.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        roots.dedup();
        Self { roots }
    }

    /// Site root owning `root_path`; empty for system paths and unknown roots.
    pub fn site_root_for(&self, root_path: &str) -> &str {
        if paths::is_system_path(root_path) {
            return "";
        }
        self.roots
            .iter()
            .find(|root| paths::remove_site_root(root, root_path).is_some())
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.roots.iter().map(String::as_str)
    }
}
