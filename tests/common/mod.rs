#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use static_export::application::manager::StaticExportManager;
use static_export::application::repos::ExportCollaborators;
use static_export::cache::CacheConfig;
use static_export::config::{ExportSettings, RuleSettings};
use static_export::domain::entities::{Identity, SiteContext};
use static_export::infra::memory::MemoryBackend;
use tempfile::TempDir;

pub const SITE: &str = "/sites/default";

/// Settings writing below `dir`, otherwise the defaults.
pub fn settings(dir: &Path) -> ExportSettings {
    ExportSettings {
        export_path: dir.join("export"),
        work_path: dir.join("work"),
        busy_poll: Duration::from_secs(1),
        busy_max_polls: 60,
        ..ExportSettings::default()
    }
}

pub fn rule(name: &str, source: &str, prefix: &str, dir: &Path) -> RuleSettings {
    RuleSettings {
        name: name.to_string(),
        source: source.to_string(),
        rfs_prefix: prefix.to_string(),
        export_path: dir.join(name),
        work_path: dir.join(format!("{name}-work")),
        backup_count: 0,
        relative_links: None,
        related_system: Vec::new(),
    }
}

pub fn manager(
    backend: &MemoryBackend,
    settings: ExportSettings,
    rules: &[RuleSettings],
) -> StaticExportManager {
    manager_with(backend.collaborators(), settings, rules)
}

pub fn manager_with(
    collaborators: ExportCollaborators,
    settings: ExportSettings,
    rules: &[RuleSettings],
) -> StaticExportManager {
    StaticExportManager::new(settings, rules, CacheConfig::default(), collaborators)
        .expect("valid configuration")
}

/// Export-user context of the default site.
pub fn ctx() -> SiteContext {
    SiteContext::offline(SITE, Identity::new("Export"))
}

pub fn tempdir() -> TempDir {
    tempfile::tempdir().expect("temp dir")
}

pub fn read(path: impl AsRef<Path>) -> String {
    std::fs::read_to_string(path.as_ref())
        .unwrap_or_else(|err| panic!("reading {}: {err}", path.as_ref().display()))
}

/// Every file below `root`, relative and sorted.
pub fn files_below(root: &Path) -> Vec<String> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path: PathBuf = entry.path();
            if path.is_dir() {
                walk(root, &path, out);
            } else if let Ok(relative) = path.strip_prefix(root) {
                out.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}
