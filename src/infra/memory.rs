//! In-memory implementations of the collaborator traits.
//!
//! Backs the command-line tool (loaded from a content archive) and the test
//! suites. All stores are safe to share between tasks.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{
    ContentTree, DetailPageOracle, ExportCollaborators, LoaderCatalog, ParameterLinks,
    PendingTemplates, RelationIndex, RenderError, RenderRequest, RenderedPage, Renderer,
    RepoError,
};
use crate::domain::entities::{ExportLink, Identity, PendingTemplate, ResourceRecord};
use crate::domain::paths;
use crate::domain::types::{LinkMode, LoaderKind, ResourceKind};

pub const PLAIN_TYPE: &str = "plain";
pub const FOLDER_TYPE: &str = "folder";

#[derive(Debug, Clone)]
struct StoredResource {
    record: ResourceRecord,
    attributes: BTreeMap<String, String>,
    content: Bytes,
    /// Identities that may not read this resource.
    denied: HashSet<String>,
    /// Name of the default document, for folders.
    default_file: Option<String>,
}

/// Content tree keyed by root path.
#[derive(Default)]
pub struct MemoryContentTree {
    resources: DashMap<String, StoredResource>,
    attributes_offline: AtomicBool,
}

impl MemoryContentTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a file. Missing parent folders are created.
    pub fn insert_file(
        &self,
        root_path: &str,
        type_name: &str,
        content: impl Into<Bytes>,
    ) -> ResourceRecord {
        self.ensure_parents(root_path);
        let structure_id = self
            .resources
            .get(root_path)
            .map(|existing| existing.record.structure_id)
            .unwrap_or_else(Uuid::new_v4);
        let record = ResourceRecord {
            structure_id,
            root_path: root_path.to_string(),
            kind: ResourceKind::File,
            type_name: type_name.to_string(),
            date_last_modified: OffsetDateTime::now_utc(),
        };
        self.store(record.clone(), content.into());
        record
    }

    pub fn insert_folder(&self, root_path: &str) -> ResourceRecord {
        let root_path = paths::as_folder_name(root_path);
        self.ensure_parents(&root_path);
        if let Some(existing) = self.resources.get(&root_path) {
            return existing.record.clone();
        }
        let record = ResourceRecord {
            structure_id: Uuid::new_v4(),
            root_path: root_path.clone(),
            kind: ResourceKind::Folder,
            type_name: FOLDER_TYPE.to_string(),
            date_last_modified: OffsetDateTime::now_utc(),
        };
        self.store(record.clone(), Bytes::new());
        record
    }

    /// Add `sibling` as another name of the content stored at `root_path`.
    pub fn insert_sibling(
        &self,
        root_path: &str,
        sibling: &str,
    ) -> Result<ResourceRecord, RepoError> {
        let original = self
            .resources
            .get(root_path)
            .map(|stored| stored.clone())
            .ok_or(RepoError::NotFound)?;
        self.ensure_parents(sibling);
        let mut stored = original;
        stored.record.root_path = sibling.to_string();
        let record = stored.record.clone();
        self.resources.insert(sibling.to_string(), stored);
        Ok(record)
    }

    fn ensure_parents(&self, root_path: &str) {
        let mut folder = paths::parent_folder(root_path);
        while let Some(current) = folder {
            if !self.resources.contains_key(current) {
                let record = ResourceRecord {
                    structure_id: Uuid::new_v4(),
                    root_path: current.to_string(),
                    kind: ResourceKind::Folder,
                    type_name: FOLDER_TYPE.to_string(),
                    date_last_modified: OffsetDateTime::now_utc(),
                };
                self.store(record, Bytes::new());
            }
            folder = paths::parent_folder(current);
        }
    }

    fn store(&self, record: ResourceRecord, content: Bytes) {
        let key = record.root_path.clone();
        match self.resources.get_mut(&key) {
            Some(mut existing) => {
                existing.record = record;
                existing.content = content;
            }
            None => {
                self.resources.insert(
                    key,
                    StoredResource {
                        record,
                        attributes: BTreeMap::new(),
                        content,
                        denied: HashSet::new(),
                        default_file: None,
                    },
                );
            }
        }
    }

    pub fn set_attribute(&self, root_path: &str, name: &str, value: &str) -> Result<(), RepoError> {
        let mut stored = self.resources.get_mut(root_path).ok_or(RepoError::NotFound)?;
        stored.attributes.insert(name.to_string(), value.to_string());
        Ok(())
    }

    pub fn remove_attribute(&self, root_path: &str, name: &str) -> Result<(), RepoError> {
        let mut stored = self.resources.get_mut(root_path).ok_or(RepoError::NotFound)?;
        stored.attributes.remove(name);
        Ok(())
    }

    pub fn set_default_file(&self, folder: &str, name: &str) -> Result<(), RepoError> {
        let mut stored = self
            .resources
            .get_mut(&paths::as_folder_name(folder))
            .ok_or(RepoError::NotFound)?;
        stored.default_file = Some(name.to_string());
        Ok(())
    }

    pub fn set_modified(&self, root_path: &str, modified: OffsetDateTime) -> Result<(), RepoError> {
        let mut stored = self.resources.get_mut(root_path).ok_or(RepoError::NotFound)?;
        stored.record.date_last_modified = modified;
        Ok(())
    }

    pub fn deny(&self, root_path: &str, identity: &Identity) -> Result<(), RepoError> {
        let mut stored = self.resources.get_mut(root_path).ok_or(RepoError::NotFound)?;
        stored.denied.insert(identity.name().to_string());
        Ok(())
    }

    /// Remove `root_path` and, for folders, everything below it.
    pub fn remove(&self, root_path: &str) -> Option<ResourceRecord> {
        let removed = self.resources.remove(root_path).map(|(_, stored)| stored.record);
        if paths::is_folder(root_path) {
            self.resources.retain(|path, _| !path.starts_with(root_path));
        }
        removed
    }

    /// Move a resource to a new path, keeping its structure id.
    pub fn rename(&self, from: &str, to: &str) -> Result<ResourceRecord, RepoError> {
        let (_, mut stored) = self.resources.remove(from).ok_or(RepoError::NotFound)?;
        self.ensure_parents(to);
        stored.record.root_path = to.to_string();
        let record = stored.record.clone();
        self.resources.insert(to.to_string(), stored);
        Ok(record)
    }

    /// Make attribute reads fail as if the backing store were down.
    pub fn set_attributes_offline(&self, offline: bool) {
        self.attributes_offline.store(offline, Ordering::SeqCst);
    }

    pub fn record(&self, root_path: &str) -> Option<ResourceRecord> {
        self.resources.get(root_path).map(|stored| stored.record.clone())
    }

    fn readable(&self, identity: &Identity, root_path: &str) -> Result<StoredResource, RepoError> {
        let stored = self
            .resources
            .get(root_path)
            .map(|stored| stored.clone())
            .ok_or(RepoError::NotFound)?;
        if stored.denied.contains(identity.name()) {
            return Err(RepoError::PermissionDenied);
        }
        Ok(stored)
    }
}

#[async_trait]
impl ContentTree for MemoryContentTree {
    async fn read_resource(
        &self,
        identity: &Identity,
        root_path: &str,
    ) -> Result<ResourceRecord, RepoError> {
        Ok(self.readable(identity, root_path)?.record)
    }

    async fn read_siblings(&self, root_path: &str) -> Result<Vec<String>, RepoError> {
        let structure_id = self
            .resources
            .get(root_path)
            .map(|stored| stored.record.structure_id)
            .ok_or(RepoError::NotFound)?;
        let mut siblings: Vec<String> = self
            .resources
            .iter()
            .filter(|entry| entry.record.structure_id == structure_id)
            .map(|entry| entry.key().clone())
            .collect();
        siblings.sort();
        Ok(siblings)
    }

    async fn read_default_file(&self, folder: &str) -> Result<Option<ResourceRecord>, RepoError> {
        let name = self
            .resources
            .get(folder)
            .ok_or(RepoError::NotFound)?
            .default_file
            .clone();
        Ok(name.and_then(|name| {
            self.resources
                .get(&format!("{folder}{name}"))
                .map(|stored| stored.record.clone())
        }))
    }

    async fn read_attribute(
        &self,
        identity: &Identity,
        root_path: &str,
        name: &str,
        inherit: bool,
    ) -> Result<Option<String>, RepoError> {
        if self.attributes_offline.load(Ordering::SeqCst) {
            return Err(RepoError::Persistence("attribute store offline".to_string()));
        }
        let stored = self.readable(identity, root_path)?;
        if let Some(value) = stored.attributes.get(name) {
            return Ok(Some(value.clone()));
        }
        if !inherit {
            return Ok(None);
        }
        let mut folder = paths::parent_folder(root_path);
        while let Some(current) = folder {
            if let Some(value) = self
                .resources
                .get(current)
                .and_then(|stored| stored.attributes.get(name).cloned())
            {
                return Ok(Some(value));
            }
            folder = paths::parent_folder(current);
        }
        Ok(None)
    }

    async fn read_content(&self, root_path: &str) -> Result<Bytes, RepoError> {
        self.resources
            .get(root_path)
            .map(|stored| stored.content.clone())
            .ok_or(RepoError::NotFound)
    }

    async fn resources_with_attribute(
        &self,
        name: &str,
    ) -> Result<Vec<(String, String)>, RepoError> {
        let mut found: Vec<(String, String)> = self
            .resources
            .iter()
            .filter_map(|entry| {
                entry
                    .attributes
                    .get(name)
                    .map(|value| (entry.key().clone(), value.clone()))
            })
            .collect();
        found.sort();
        Ok(found)
    }

    async fn list_all(&self) -> Result<Vec<ResourceRecord>, RepoError> {
        let mut records: Vec<ResourceRecord> = self
            .resources
            .iter()
            .map(|entry| entry.record.clone())
            .collect();
        records.sort_by(|a, b| a.root_path.cmp(&b.root_path));
        Ok(records)
    }
}

/// Link and containment relations.
#[derive(Default)]
pub struct MemoryRelations {
    incoming: DashMap<String, Vec<String>>,
    referrers: DashMap<Uuid, Vec<ResourceRecord>>,
}

impl MemoryRelations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `source` links to `target`.
    pub fn add_reference(&self, source: &str, target: &str) {
        let mut sources = self.incoming.entry(target.to_string()).or_default();
        if !sources.iter().any(|existing| existing == source) {
            sources.push(source.to_string());
        }
    }

    /// Record that `container` embeds the content `structure_id`.
    pub fn add_content_referrer(&self, structure_id: Uuid, container: ResourceRecord) {
        let mut containers = self.referrers.entry(structure_id).or_default();
        if !containers
            .iter()
            .any(|existing| existing.root_path == container.root_path)
        {
            containers.push(container);
        }
    }
}

#[async_trait]
impl RelationIndex for MemoryRelations {
    async fn incoming_references(&self, root_path: &str) -> Result<Vec<String>, RepoError> {
        Ok(self
            .incoming
            .get(root_path)
            .map(|sources| sources.clone())
            .unwrap_or_default())
    }

    async fn content_referrers(
        &self,
        structure_id: Uuid,
    ) -> Result<Vec<ResourceRecord>, RepoError> {
        Ok(self
            .referrers
            .get(&structure_id)
            .map(|containers| containers.clone())
            .unwrap_or_default())
    }
}

/// Renderer producing a marker line followed by the stored content.
///
/// Outgoing links are whatever was registered for the rendered path.
pub struct MemoryRenderer {
    tree: Arc<MemoryContentTree>,
    links: DashMap<String, Vec<ExportLink>>,
    failing: DashMap<String, String>,
    renders: AtomicUsize,
}

impl MemoryRenderer {
    pub fn new(tree: Arc<MemoryContentTree>) -> Self {
        Self {
            tree,
            links: DashMap::new(),
            failing: DashMap::new(),
            renders: AtomicUsize::new(0),
        }
    }

    pub fn add_link(&self, source: &str, link: ExportLink) {
        self.links.entry(source.to_string()).or_default().push(link);
    }

    pub fn fail(&self, root_path: &str, message: &str) {
        self.failing.insert(root_path.to_string(), message.to_string());
    }

    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for MemoryRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RenderedPage, RenderError> {
        if let Some(message) = self.failing.get(&request.root_path) {
            return Err(RenderError::failed(&request.root_path, message.clone()));
        }
        let content = self.tree.read_content(&request.root_path).await?;
        self.renders.fetch_add(1, Ordering::SeqCst);

        let mut body = format!("<!-- {}", request.root_path);
        if let Some(parameters) = request.parameters.as_deref() {
            body.push('?');
            body.push_str(parameters);
        }
        body.push_str(" -->\n");
        let mut body = body.into_bytes();
        body.extend_from_slice(&content);

        Ok(RenderedPage {
            body: Bytes::from(body),
            links: self
                .links
                .get(&request.root_path)
                .map(|links| links.clone())
                .unwrap_or_default(),
        })
    }
}

/// Detail pages per content type and URL names per content.
#[derive(Default)]
pub struct MemoryDetailPages {
    pages: DashMap<String, Vec<String>>,
    url_names: DashMap<Uuid, Vec<String>>,
    contents: DashMap<String, ResourceRecord>,
}

impl MemoryDetailPages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_detail_page(&self, type_name: &str, page: &str) {
        self.pages
            .entry(type_name.to_string())
            .or_default()
            .push(page.to_string());
    }

    pub fn add_url_name(&self, content: &ResourceRecord, url_name: &str) {
        self.url_names
            .entry(content.structure_id)
            .or_default()
            .push(url_name.to_string());
        self.contents.insert(url_name.to_string(), content.clone());
    }
}

#[async_trait]
impl DetailPageOracle for MemoryDetailPages {
    async fn detail_pages_for(&self, type_name: &str) -> Result<Vec<String>, RepoError> {
        Ok(self
            .pages
            .get(type_name)
            .map(|pages| pages.clone())
            .unwrap_or_default())
    }

    async fn url_names_for(&self, structure_id: Uuid) -> Result<Vec<String>, RepoError> {
        Ok(self
            .url_names
            .get(&structure_id)
            .map(|names| names.clone())
            .unwrap_or_default())
    }

    async fn resolve_detail_url(
        &self,
        root_path: &str,
    ) -> Result<Option<ResourceRecord>, RepoError> {
        for entry in self.pages.iter() {
            for page in entry.value() {
                let Some(rest) = root_path.strip_prefix(paths::folder_of(page)) else {
                    continue;
                };
                let url_name = rest.trim_end_matches('/');
                if url_name.is_empty() || url_name.contains('/') {
                    continue;
                }
                if let Some(content) = self.contents.get(url_name)
                    && content.type_name == *entry.key()
                {
                    return Ok(Some(content.clone()));
                }
            }
        }
        Ok(None)
    }
}

/// Pending-template rows keyed by name, mode and parameters.
#[derive(Default)]
pub struct MemoryPendingTemplates {
    rows: DashMap<(String, LinkMode, String), OffsetDateTime>,
}

impl MemoryPendingTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl PendingTemplates for MemoryPendingTemplates {
    async fn write(
        &self,
        rfs_name: &str,
        mode: LinkMode,
        parameters: Option<&str>,
        timestamp: OffsetDateTime,
    ) -> Result<(), RepoError> {
        let key = (
            rfs_name.to_string(),
            mode,
            parameters.unwrap_or_default().to_string(),
        );
        self.rows.insert(key, timestamp);
        Ok(())
    }

    async fn query(
        &self,
        mode: LinkMode,
        since: OffsetDateTime,
    ) -> Result<Vec<PendingTemplate>, RepoError> {
        let mut rows: Vec<(OffsetDateTime, PendingTemplate)> = self
            .rows
            .iter()
            .filter(|entry| entry.key().1 == mode && *entry.value() >= since)
            .map(|entry| {
                let (rfs_name, _, parameters) = entry.key();
                (
                    *entry.value(),
                    PendingTemplate {
                        rfs_name: rfs_name.clone(),
                        parameters: Some(parameters.clone()).filter(|value| !value.is_empty()),
                    },
                )
            })
            .collect();
        rows.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.rfs_name.cmp(&b.1.rfs_name))
                .then_with(|| a.1.parameters.cmp(&b.1.parameters))
        });
        Ok(rows.into_iter().map(|(_, row)| row).collect())
    }

    async fn delete_all(&self, mode: LinkMode) -> Result<(), RepoError> {
        self.rows.retain(|key, _| key.1 != mode);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryParameterLinks {
    ids: DashMap<(String, String), u64>,
    by_id: DashMap<u64, (String, String)>,
    next: AtomicU64,
}

impl MemoryParameterLinks {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ParameterLinks for MemoryParameterLinks {
    async fn link_id(&self, rfs_name: &str, parameters: &str) -> Result<u64, RepoError> {
        let key = (rfs_name.to_string(), parameters.to_string());
        let id = *self.ids.entry(key.clone()).or_insert_with(|| {
            let id = self.next.fetch_add(1, Ordering::SeqCst) + 1;
            self.by_id.insert(id, key);
            id
        });
        Ok(id)
    }

    async fn resolve(&self, id: u64) -> Result<Option<(String, String)>, RepoError> {
        Ok(self.by_id.get(&id).map(|entry| entry.clone()))
    }
}

/// Loader kinds per resource type; unknown types are plain.
#[derive(Debug, Clone)]
pub struct TypeLoaderCatalog {
    kinds: HashMap<String, LoaderKind>,
}

impl Default for TypeLoaderCatalog {
    fn default() -> Self {
        let kinds = [
            ("jsp", LoaderKind::Template),
            ("xmlpage", LoaderKind::Template),
            ("xmlcontent", LoaderKind::Template),
            ("containerpage", LoaderKind::ContainerPage),
            ("groupcontainer", LoaderKind::GroupContainer),
        ]
        .into_iter()
        .map(|(name, kind)| (name.to_string(), kind))
        .collect();
        Self { kinds }
    }
}

impl TypeLoaderCatalog {
    pub fn with(mut self, type_name: &str, kind: LoaderKind) -> Self {
        self.kinds.insert(type_name.to_string(), kind);
        self
    }
}

impl LoaderCatalog for TypeLoaderCatalog {
    fn classify(&self, type_name: &str) -> LoaderKind {
        self.kinds
            .get(type_name)
            .copied()
            .unwrap_or(LoaderKind::Plain)
    }
}

/// All in-memory collaborators, keeping the concrete handles for setup.
pub struct MemoryBackend {
    pub tree: Arc<MemoryContentTree>,
    pub relations: Arc<MemoryRelations>,
    pub renderer: Arc<MemoryRenderer>,
    pub details: Arc<MemoryDetailPages>,
    pub pending: Arc<MemoryPendingTemplates>,
    pub parameters: Arc<MemoryParameterLinks>,
    pub loaders: Arc<TypeLoaderCatalog>,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("loaders", &self.loaders)
            .finish_non_exhaustive()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(TypeLoaderCatalog::default())
    }
}

impl MemoryBackend {
    pub fn new(loaders: TypeLoaderCatalog) -> Self {
        let tree = Arc::new(MemoryContentTree::new());
        Self {
            renderer: Arc::new(MemoryRenderer::new(Arc::clone(&tree))),
            tree,
            relations: Arc::new(MemoryRelations::new()),
            details: Arc::new(MemoryDetailPages::new()),
            pending: Arc::new(MemoryPendingTemplates::new()),
            parameters: Arc::new(MemoryParameterLinks::new()),
            loaders: Arc::new(loaders),
        }
    }

    pub fn collaborators(&self) -> ExportCollaborators {
        ExportCollaborators {
            tree: self.tree.clone(),
            relations: self.relations.clone(),
            renderer: self.renderer.clone(),
            details: self.details.clone(),
            pending: self.pending.clone(),
            parameters: self.parameters.clone(),
            loaders: self.loaders.clone(),
        }
    }

    /// Replace the pending and parameter stores, e.g. with database tables.
    pub fn collaborators_with(
        &self,
        pending: Arc<dyn PendingTemplates>,
        parameters: Arc<dyn ParameterLinks>,
    ) -> ExportCollaborators {
        ExportCollaborators {
            pending,
            parameters,
            ..self.collaborators()
        }
    }
}
