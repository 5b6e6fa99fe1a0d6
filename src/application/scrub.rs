//! Removal of stale exported files after a publish.
//!
//! The engine expands the batch along moved resources, resolves every sibling
//! name of a changed entry to its real file and deletes it together with its
//! parameter variants, default-document copies, detail pages and the
//! container pages that embed it. Filesystem failures are logged and counted;
//! they never stop the run.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use metrics::{counter, histogram};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::error::ExportError;
use crate::application::repos::{ExportCollaborators, RepoError};
use crate::application::translator::PathTranslator;
use crate::domain::entities::{PublishedEntry, ResourceRecord};
use crate::domain::paths;
use crate::domain::types::{ChangeState, LoaderKind, ResourceKind};
use crate::infra::fs as export_fs;

const METRIC_FILES_PURGED: &str = "static_export_files_purged_total";
const METRIC_SCRUB_MS: &str = "static_export_scrub_ms";

/// Extra files removed whenever an exported file is purged.
#[async_trait]
pub trait RelatedFiles: Send + Sync {
    async fn related_files_to_purge(&self, file: &Path) -> Result<Vec<PathBuf>, std::io::Error>;
}

/// Only the file itself and its parameter variants are purged.
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnFileOnly;

#[async_trait]
impl RelatedFiles for OwnFileOnly {
    async fn related_files_to_purge(&self, _file: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
        Ok(Vec::new())
    }
}

/// Every rendered file below the purged file's folder goes as well, since
/// rendered pages embed navigation that may mention the purged file.
#[derive(Debug, Clone)]
pub struct RenderedSubtree {
    export_suffix: String,
}

impl RenderedSubtree {
    pub fn new(export_suffix: impl Into<String>) -> Self {
        Self {
            export_suffix: export_suffix.into(),
        }
    }
}

#[async_trait]
impl RelatedFiles for RenderedSubtree {
    async fn related_files_to_purge(&self, file: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
        match file.parent() {
            Some(folder) => export_fs::files_with_suffix(folder, &self.export_suffix).await,
            None => Ok(Vec::new()),
        }
    }
}

/// Outcome of one scrub run.
#[derive(Debug, Default)]
pub struct ScrubReport {
    /// Batch after move expansion; the export worklist.
    pub entries: Vec<PublishedEntry>,
    pub purged_files: usize,
    pub errors: usize,
}

#[derive(Default)]
struct ScrubRun {
    files: HashSet<PathBuf>,
    folders: HashSet<PathBuf>,
    containers: HashSet<Uuid>,
    purged: usize,
    errors: usize,
}

impl ScrubRun {
    fn is_scrubbed(&self, path: &Path) -> bool {
        self.files.contains(path) || self.folders.iter().any(|folder| path.starts_with(folder))
    }
}

pub struct ScrubEngine {
    translator: Arc<PathTranslator>,
    collaborators: ExportCollaborators,
    related: Arc<dyn RelatedFiles>,
}

impl ScrubEngine {
    pub fn new(
        translator: Arc<PathTranslator>,
        collaborators: ExportCollaborators,
        related: Arc<dyn RelatedFiles>,
    ) -> Self {
        Self {
            translator,
            collaborators,
            related,
        }
    }

    /// Scrub the real files of `entries`.
    ///
    /// `None` stands for the whole content tree. Nothing is deleted in that
    /// case; the tree is only listed so a full export has its worklist.
    pub async fn scrub(
        &self,
        entries: Option<Vec<PublishedEntry>>,
    ) -> Result<ScrubReport, ExportError> {
        let entries = match entries {
            Some(entries) => entries,
            None => {
                let resources = self.collaborators.tree.list_all().await?;
                return Ok(ScrubReport {
                    entries: resources
                        .iter()
                        .map(|resource| {
                            PublishedEntry::from_resource(resource, ChangeState::Unchanged)
                        })
                        .collect(),
                    ..ScrubReport::default()
                });
            }
        };

        let started = Instant::now();
        let entries = self.close_move_graph(entries).await;
        let mut run = ScrubRun::default();

        for entry in entries.iter().filter(|entry| !entry.state.is_unchanged()) {
            self.scrub_entry(&mut run, entry).await;
        }

        histogram!(METRIC_SCRUB_MS).record(started.elapsed().as_secs_f64() * 1000.0);
        info!(
            target = "static_export::scrub",
            entries = entries.len(),
            purged = run.purged,
            errors = run.errors,
            "Scrubbed export folders"
        );

        Ok(ScrubReport {
            entries,
            purged_files: run.purged,
            errors: run.errors,
        })
    }

    /// Add every resource that links to a moved destination, until nothing new turns up.
    async fn close_move_graph(&self, mut entries: Vec<PublishedEntry>) -> Vec<PublishedEntry> {
        let mut known: HashSet<String> = entries.iter().map(|e| e.root_path.clone()).collect();
        let mut expanded: HashSet<String> = HashSet::new();

        loop {
            let destinations: Vec<String> = entries
                .iter()
                .filter(|entry| entry.state == ChangeState::MovedDestination)
                .filter(|entry| !expanded.contains(&entry.root_path))
                .map(|entry| entry.root_path.clone())
                .collect();

            let mut added = Vec::new();
            for destination in destinations {
                expanded.insert(destination.clone());
                let sources = match self
                    .collaborators
                    .relations
                    .incoming_references(&destination)
                    .await
                {
                    Ok(sources) => sources,
                    Err(err) => {
                        warn!(
                            target = "static_export::scrub",
                            root_path = %destination,
                            error = %err,
                            "Reading incoming references failed"
                        );
                        continue;
                    }
                };
                for source in sources {
                    if known.insert(source.clone()) {
                        added.push(self.referencing_entry(source).await);
                    }
                }
            }

            if added.is_empty() {
                return entries;
            }
            debug!(
                target = "static_export::scrub",
                added = added.len(),
                "Expanded batch along moved resources"
            );
            entries.extend(added);
        }
    }

    async fn referencing_entry(&self, root_path: String) -> PublishedEntry {
        match self
            .collaborators
            .tree
            .read_resource(self.translator.export_identity(), &root_path)
            .await
        {
            Ok(resource) => PublishedEntry::from_resource(&resource, ChangeState::Changed),
            Err(_) => {
                let kind = if paths::is_folder(&root_path) {
                    ResourceKind::Folder
                } else {
                    ResourceKind::File
                };
                PublishedEntry::new(Uuid::nil(), root_path, kind, ChangeState::Changed)
            }
        }
    }

    async fn scrub_entry(&self, run: &mut ScrubRun, entry: &PublishedEntry) {
        let mut siblings = match self
            .collaborators
            .tree
            .read_siblings(&entry.root_path)
            .await
        {
            Ok(siblings) => siblings,
            Err(RepoError::NotFound) => Vec::new(),
            Err(err) => {
                debug!(
                    target = "static_export::scrub",
                    root_path = %entry.root_path,
                    error = %err,
                    "Sibling lookup failed"
                );
                Vec::new()
            }
        };
        if !siblings.contains(&entry.root_path) {
            siblings.push(entry.root_path.clone());
        }

        for sibling in siblings {
            if entry.is_folder() {
                if entry.state.is_gone() {
                    self.scrub_folder(run, &sibling).await;
                }
                continue;
            }
            self.purge_resource(run, &sibling).await;
        }

        if entry.is_file() {
            self.purge_template_content(run, entry).await;
        }
    }

    async fn scrub_folder(&self, run: &mut ScrubRun, root_path: &str) {
        let Some(folder) = self.export_file(run, root_path).await else {
            return;
        };
        if run.is_scrubbed(&folder) {
            return;
        }
        match export_fs::remove_tree(&folder).await {
            Ok(removed) => {
                debug!(
                    target = "static_export::scrub",
                    folder = %folder.display(),
                    removed,
                    "Scrubbed folder"
                );
            }
            Err(err) => {
                run.errors += 1;
                warn!(
                    target = "static_export::scrub",
                    folder = %folder.display(),
                    error = %err,
                    "Removing exported folder failed"
                );
            }
        }
        run.folders.insert(folder);
    }

    /// Purge the exported file of `root_path` and, for default documents,
    /// the folder's exported default file.
    async fn purge_resource(&self, run: &mut ScrubRun, root_path: &str) {
        let (ctx, vfs_name) = self.translator.context_for(root_path);
        let target = match self.translator.locate(&ctx, &vfs_name, None).await {
            Ok(target) => target,
            Err(err) => {
                run.errors += 1;
                warn!(
                    target = "static_export::scrub",
                    root_path,
                    error = %err,
                    "Translating scrubbed resource failed"
                );
                return;
            }
        };

        if self.is_default_document(root_path).await {
            let folder = paths::folder_of(&vfs_name);
            match self.translator.locate(&ctx, folder, None).await {
                Ok(folder_target) => {
                    let default_file = folder_target
                        .export_file
                        .join(self.translator.settings().default_file());
                    self.purge_file(run, &default_file, &target.export_root).await;
                }
                Err(err) => {
                    run.errors += 1;
                    warn!(
                        target = "static_export::scrub",
                        root_path,
                        error = %err,
                        "Translating default document folder failed"
                    );
                }
            }
        }

        self.purge_file(run, &target.export_file, &target.export_root)
            .await;
    }

    async fn is_default_document(&self, root_path: &str) -> bool {
        let name = paths::name(root_path);
        if self
            .translator
            .settings()
            .default_files
            .iter()
            .any(|default| default == name)
        {
            return true;
        }
        matches!(
            self.collaborators
                .tree
                .read_default_file(paths::folder_of(root_path))
                .await,
            Ok(Some(ResourceRecord { root_path: ref default, .. })) if default == root_path
        )
    }

    async fn purge_file(&self, run: &mut ScrubRun, file: &Path, export_root: &Path) {
        if run.is_scrubbed(file) {
            return;
        }
        run.files.insert(file.to_path_buf());

        let mut doomed = vec![file.to_path_buf()];
        match export_fs::parameter_variants(file).await {
            Ok(variants) => doomed.extend(variants),
            Err(err) => {
                run.errors += 1;
                warn!(
                    target = "static_export::scrub",
                    file = %file.display(),
                    error = %err,
                    "Listing parameter variants failed"
                );
            }
        }
        match self.related.related_files_to_purge(file).await {
            Ok(related) => doomed.extend(related.into_iter().filter(|path| path != file)),
            Err(err) => {
                run.errors += 1;
                warn!(
                    target = "static_export::scrub",
                    file = %file.display(),
                    error = %err,
                    "Listing related files failed"
                );
            }
        }

        for path in doomed {
            self.remove_file(run, &path, export_root).await;
        }
    }

    async fn remove_file(&self, run: &mut ScrubRun, path: &Path, export_root: &Path) {
        run.files.insert(path.to_path_buf());
        match export_fs::remove_file(path).await {
            Ok(true) => {
                run.purged += 1;
                counter!(METRIC_FILES_PURGED).increment(1);
                debug!(
                    target = "static_export::scrub",
                    file = %path.display(),
                    "Purged exported file"
                );
            }
            Ok(false) => return,
            Err(err) => {
                run.errors += 1;
                warn!(
                    target = "static_export::scrub",
                    file = %path.display(),
                    error = %err,
                    "Purging exported file failed"
                );
                return;
            }
        }

        if let Some(parent) = path.parent()
            && let Err(err) = export_fs::remove_if_empty(parent, export_root).await
        {
            warn!(
                target = "static_export::scrub",
                folder = %parent.display(),
                error = %err,
                "Removing empty folder failed"
            );
        }
    }

    /// Detail pages and container pages showing the content of `entry`.
    async fn purge_template_content(&self, run: &mut ScrubRun, entry: &PublishedEntry) {
        let type_name = match entry.type_name.clone() {
            Some(type_name) => type_name,
            None => match self
                .collaborators
                .tree
                .read_resource(self.translator.export_identity(), &entry.root_path)
                .await
            {
                Ok(resource) => resource.type_name,
                Err(_) => return,
            },
        };
        if !self.collaborators.loaders.classify(&type_name).is_template_content() {
            return;
        }

        self.purge_detail_pages(run, entry, &type_name).await;
        self.purge_containers(run, entry.structure_id).await;
    }

    async fn purge_detail_pages(
        &self,
        run: &mut ScrubRun,
        entry: &PublishedEntry,
        type_name: &str,
    ) {
        let details = &self.collaborators.details;
        let pages = match details.detail_pages_for(type_name).await {
            Ok(pages) => pages,
            Err(err) => {
                warn!(
                    target = "static_export::scrub",
                    type_name,
                    error = %err,
                    "Reading detail pages failed"
                );
                return;
            }
        };
        if pages.is_empty() {
            return;
        }
        let url_names = match details.url_names_for(entry.structure_id).await {
            Ok(url_names) => url_names,
            Err(err) => {
                warn!(
                    target = "static_export::scrub",
                    root_path = %entry.root_path,
                    error = %err,
                    "Reading URL names failed"
                );
                return;
            }
        };

        for page in &pages {
            for url_name in &url_names {
                let detail_root = format!("{}{}/", paths::folder_of(page), url_name);
                self.scrub_folder(run, &detail_root).await;
            }
        }
    }

    /// Container pages embedding `structure_id`, directly or through group containers.
    async fn purge_containers(&self, run: &mut ScrubRun, structure_id: Uuid) {
        let mut pending = VecDeque::from([structure_id]);
        while let Some(id) = pending.pop_front() {
            if !run.containers.insert(id) {
                continue;
            }
            let referrers = match self.collaborators.relations.content_referrers(id).await {
                Ok(referrers) => referrers,
                Err(err) => {
                    warn!(
                        target = "static_export::scrub",
                        structure_id = %id,
                        error = %err,
                        "Reading container references failed"
                    );
                    continue;
                }
            };

            for referrer in referrers {
                if referrer.structure_id == id {
                    warn!(
                        target = "static_export::scrub",
                        root_path = %referrer.root_path,
                        "Container references itself, skipping"
                    );
                    continue;
                }
                match self.collaborators.loaders.classify(&referrer.type_name) {
                    LoaderKind::GroupContainer => pending.push_back(referrer.structure_id),
                    _ => self.purge_resource(run, &referrer.root_path).await,
                }
            }
        }
    }

    async fn export_file(&self, run: &mut ScrubRun, root_path: &str) -> Option<PathBuf> {
        let (ctx, vfs_name) = self.translator.context_for(root_path);
        match self.translator.locate(&ctx, &vfs_name, None).await {
            Ok(target) => Some(target.export_file),
            Err(err) => {
                run.errors += 1;
                warn!(
                    target = "static_export::scrub",
                    root_path,
                    error = %err,
                    "Translating scrubbed folder failed"
                );
                None
            }
        }
    }
}
