//! Records exchanged between the export core and its collaborators.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::paths;
use super::types::{ChangeState, ResourceKind};

/// A resource read from the content tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Identifier shared by all siblings of the same content.
    pub structure_id: Uuid,
    /// Full path including the site root, folders end with `/`.
    pub root_path: String,
    pub kind: ResourceKind,
    /// Resource type name used to pick the loader.
    pub type_name: String,
    pub date_last_modified: OffsetDateTime,
}

impl ResourceRecord {
    pub fn is_folder(&self) -> bool {
        matches!(self.kind, ResourceKind::Folder)
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, ResourceKind::File)
    }
}

/// One entry of a publish batch. Consumed, never owned, by the scrub engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedEntry {
    pub structure_id: Uuid,
    pub root_path: String,
    pub kind: ResourceKind,
    pub state: ChangeState,
    /// Resource type at publish time, when the publish pipeline knows it.
    #[serde(default)]
    pub type_name: Option<String>,
}

impl PublishedEntry {
    pub fn new(
        structure_id: Uuid,
        root_path: impl Into<String>,
        kind: ResourceKind,
        state: ChangeState,
    ) -> Self {
        Self {
            structure_id,
            root_path: root_path.into(),
            kind,
            state,
            type_name: None,
        }
    }

    pub fn from_resource(resource: &ResourceRecord, state: ChangeState) -> Self {
        Self::new(
            resource.structure_id,
            resource.root_path.clone(),
            resource.kind,
            state,
        )
        .with_type(resource.type_name.clone())
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.kind, ResourceKind::Folder)
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, ResourceKind::File)
    }
}

/// Principal used for permission-scoped content-tree reads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    name: String,
}

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Request-scoped information the translator needs besides the path itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteContext {
    /// Active site root without trailing slash, empty for the root site.
    pub site_root: String,
    /// Root path of the resource currently being rendered, if any.
    pub source_root_path: Option<String>,
    /// Identity of the requesting user.
    pub identity: Identity,
    /// Whether the request runs against the published ("live") tree.
    pub live: bool,
}

impl SiteContext {
    pub fn live(site_root: impl Into<String>, identity: Identity) -> Self {
        Self {
            site_root: site_root.into().trim_end_matches('/').to_string(),
            source_root_path: None,
            identity,
            live: true,
        }
    }

    pub fn offline(site_root: impl Into<String>, identity: Identity) -> Self {
        Self {
            live: false,
            ..Self::live(site_root, identity)
        }
    }

    pub fn with_source(mut self, source_root_path: impl Into<String>) -> Self {
        self.source_root_path = Some(source_root_path.into());
        self
    }

    pub fn root_path(&self, vfs_name: &str) -> String {
        if paths::is_system_path(vfs_name) {
            return vfs_name.to_string();
        }
        paths::add_site_root(&self.site_root, vfs_name)
    }
}

/// Result of translating a real name back into the content tree.
///
/// Immutable once built, apart from the real name which callers may override
/// when they write the output under an explicit name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportData {
    /// Site-relative virtual name.
    pub vfs_name: String,
    /// Virtual root path rendered for this real name.
    pub root_path: String,
    rfs_name: String,
    pub parameters: Option<String>,
    /// Backing content entry, when the lookup resolved one.
    pub resource: Option<ResourceRecord>,
    pub is_detail_page: bool,
}

impl ExportData {
    pub fn new(
        vfs_name: impl Into<String>,
        root_path: impl Into<String>,
        rfs_name: impl Into<String>,
        parameters: Option<String>,
        resource: Option<ResourceRecord>,
    ) -> Self {
        Self {
            vfs_name: vfs_name.into(),
            root_path: root_path.into(),
            rfs_name: rfs_name.into(),
            parameters,
            resource,
            is_detail_page: false,
        }
    }

    pub fn detail_page(mut self) -> Self {
        self.is_detail_page = true;
        self
    }

    pub fn rfs_name(&self) -> &str {
        &self.rfs_name
    }

    pub fn set_rfs_name(&mut self, rfs_name: impl Into<String>) {
        self.rfs_name = rfs_name.into();
    }
}

/// Outgoing link discovered while rendering a template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExportLink {
    pub root_path: String,
    #[serde(default)]
    pub parameters: Option<String>,
}

impl ExportLink {
    pub fn new(root_path: impl Into<String>) -> Self {
        Self {
            root_path: root_path.into(),
            parameters: None,
        }
    }

    pub fn with_parameters(mut self, parameters: impl Into<String>) -> Self {
        self.parameters = Some(parameters.into());
        self
    }
}

/// Row of the pending-template side table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTemplate {
    pub rfs_name: String,
    pub parameters: Option<String>,
}
