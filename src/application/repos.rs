//! Collaborator traits the export core consumes.
//!
//! Storage, rendering and relation tracking live outside this crate; the core
//! only depends on the contracts below.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{ExportLink, Identity, PendingTemplate, ResourceRecord};
use crate::domain::types::{LinkMode, LoaderKind};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("resource not found")]
    NotFound,
    #[error("permission denied")]
    PermissionDenied,
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("rendering `{root_path}` failed: {message}")]
    Failed { root_path: String, message: String },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl RenderError {
    pub fn failed(root_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            root_path: root_path.into(),
            message: message.into(),
        }
    }
}

/// Read access to the content tree. Paths are full root paths.
#[async_trait]
pub trait ContentTree: Send + Sync {
    async fn read_resource(
        &self,
        identity: &Identity,
        root_path: &str,
    ) -> Result<ResourceRecord, RepoError>;

    /// Every root path carrying the same content as `root_path`.
    async fn read_siblings(&self, root_path: &str) -> Result<Vec<String>, RepoError>;

    /// Configured default document of `folder`, if it has one.
    async fn read_default_file(&self, folder: &str) -> Result<Option<ResourceRecord>, RepoError>;

    async fn read_attribute(
        &self,
        identity: &Identity,
        root_path: &str,
        name: &str,
        inherit: bool,
    ) -> Result<Option<String>, RepoError>;

    async fn read_content(&self, root_path: &str) -> Result<Bytes, RepoError>;

    /// `(root_path, value)` pairs of all resources that set `name` directly.
    async fn resources_with_attribute(&self, name: &str)
    -> Result<Vec<(String, String)>, RepoError>;

    async fn list_all(&self) -> Result<Vec<ResourceRecord>, RepoError>;
}

#[async_trait]
pub trait RelationIndex: Send + Sync {
    /// Root paths of the resources that link to `root_path`.
    async fn incoming_references(&self, root_path: &str) -> Result<Vec<String>, RepoError>;

    /// Container pages and group containers that embed the content `structure_id`.
    async fn content_referrers(&self, structure_id: Uuid)
    -> Result<Vec<ResourceRecord>, RepoError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub root_path: String,
    pub parameters: Option<String>,
    pub site_root: String,
}

#[derive(Debug, Clone, Default)]
pub struct RenderedPage {
    pub body: Bytes,
    /// Outgoing links found in the output, as content-tree root paths.
    pub links: Vec<ExportLink>,
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<RenderedPage, RenderError>;
}

#[async_trait]
pub trait DetailPageOracle: Send + Sync {
    /// Root paths of the detail pages that display content of `type_name`.
    async fn detail_pages_for(&self, type_name: &str) -> Result<Vec<String>, RepoError>;

    async fn url_names_for(&self, structure_id: Uuid) -> Result<Vec<String>, RepoError>;

    /// Content displayed under the detail URL `root_path`, if any.
    async fn resolve_detail_url(
        &self,
        root_path: &str,
    ) -> Result<Option<ResourceRecord>, RepoError>;
}

/// Side table of rendered names awaiting the template phase.
#[async_trait]
pub trait PendingTemplates: Send + Sync {
    /// Insert or refresh the row for `(rfs_name, mode, parameters)`.
    async fn write(
        &self,
        rfs_name: &str,
        mode: LinkMode,
        parameters: Option<&str>,
        timestamp: OffsetDateTime,
    ) -> Result<(), RepoError>;

    /// Rows of `mode` written at or after `since`.
    async fn query(
        &self,
        mode: LinkMode,
        since: OffsetDateTime,
    ) -> Result<Vec<PendingTemplate>, RepoError>;

    async fn delete_all(&self, mode: LinkMode) -> Result<(), RepoError>;
}

/// Stable numeric ids for parameterised links.
#[async_trait]
pub trait ParameterLinks: Send + Sync {
    /// Id recorded for `(rfs_name, parameters)`, created on first use.
    async fn link_id(&self, rfs_name: &str, parameters: &str) -> Result<u64, RepoError>;

    /// `(rfs_name, parameters)` previously recorded under `id`.
    async fn resolve(&self, id: u64) -> Result<Option<(String, String)>, RepoError>;
}

/// Loader capabilities per resource type.
pub trait LoaderCatalog: Send + Sync {
    fn classify(&self, type_name: &str) -> LoaderKind;
}

/// Collaborators shared by the translator, scrub engine and orchestrator.
#[derive(Clone)]
pub struct ExportCollaborators {
    pub tree: Arc<dyn ContentTree>,
    pub relations: Arc<dyn RelationIndex>,
    pub renderer: Arc<dyn Renderer>,
    pub details: Arc<dyn DetailPageOracle>,
    pub pending: Arc<dyn PendingTemplates>,
    pub parameters: Arc<dyn ParameterLinks>,
    pub loaders: Arc<dyn LoaderCatalog>,
}
