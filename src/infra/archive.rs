//! Content archives: a TOML description of a content tree.
//!
//! ```toml
//! [[folder]]
//! path = "/sites/default/news/"
//! default_file = "index.html"
//! attributes = { exportname = "latest" }
//!
//! [[resource]]
//! path = "/sites/default/news/index.html"
//! type = "jsp"
//! content = "<h1>News</h1>"
//! links = ["/sites/default/news/article.html"]
//!
//! [[detail_page]]
//! type = "article"
//! path = "/sites/default/news/detail.jsp"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::info;

use crate::application::repos::RepoError;
use crate::domain::entities::{ExportLink, Identity};
use crate::domain::error::DomainError;
use crate::domain::paths;
use crate::domain::types::LoaderKind;

use super::memory::{MemoryBackend, PLAIN_TYPE, TypeLoaderCatalog};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("reading archive `{path}` failed: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing archive failed: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Invalid(#[from] DomainError),
    #[error("archive references `{path}`: {source}")]
    Reference {
        path: String,
        #[source]
        source: RepoError,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ArchiveFile {
    folder: Vec<FolderEntry>,
    resource: Vec<ResourceEntry>,
    detail_page: Vec<DetailPageEntry>,
    /// Extra type → loader kind mappings (`plain`, `template`, ...).
    loaders: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct FolderEntry {
    path: String,
    #[serde(default)]
    default_file: Option<String>,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ResourceEntry {
    path: String,
    #[serde(rename = "type", default = "default_type")]
    type_name: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    modified: Option<OffsetDateTime>,
    #[serde(default)]
    siblings: Vec<String>,
    /// Outgoing links reported when the resource is rendered.
    #[serde(default)]
    links: Vec<String>,
    /// Container pages embedding this content.
    #[serde(default)]
    contained_in: Vec<String>,
    #[serde(default)]
    url_names: Vec<String>,
    /// Identities denied read access.
    #[serde(default)]
    denied: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DetailPageEntry {
    #[serde(rename = "type")]
    type_name: String,
    path: String,
}

fn default_type() -> String {
    PLAIN_TYPE.to_string()
}

/// Read and load the archive at `path`.
pub async fn load_file(path: &Path) -> Result<MemoryBackend, ArchiveError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ArchiveError::Read {
            path: path.display().to_string(),
            source,
        })?;
    let backend = load_str(&text)?;
    info!(
        target = "static_export::archive",
        archive = %path.display(),
        "Loaded content archive"
    );
    Ok(backend)
}

pub fn load_str(text: &str) -> Result<MemoryBackend, ArchiveError> {
    let archive: ArchiveFile = toml::from_str(text)?;

    let mut loaders = TypeLoaderCatalog::default();
    for (type_name, kind) in &archive.loaders {
        loaders = loaders.with(type_name, loader_kind(kind)?);
    }
    let backend = MemoryBackend::new(loaders);
    let tree = &backend.tree;

    for folder in &archive.folder {
        validate_path(&folder.path)?;
        let record = tree.insert_folder(&folder.path);
        for (name, value) in &folder.attributes {
            tree.set_attribute(&record.root_path, name, value)
                .map_err(|source| reference(&record.root_path, source))?;
        }
        if let Some(default_file) = folder.default_file.as_deref() {
            tree.set_default_file(&record.root_path, default_file)
                .map_err(|source| reference(&record.root_path, source))?;
        }
    }

    for resource in &archive.resource {
        validate_path(&resource.path)?;
        let record = if paths::is_folder(&resource.path) {
            tree.insert_folder(&resource.path)
        } else {
            tree.insert_file(&resource.path, &resource.type_name, resource.content.clone())
        };
        for (name, value) in &resource.attributes {
            tree.set_attribute(&record.root_path, name, value)
                .map_err(|source| reference(&record.root_path, source))?;
        }
        if let Some(modified) = resource.modified {
            tree.set_modified(&record.root_path, modified)
                .map_err(|source| reference(&record.root_path, source))?;
        }
        for identity in &resource.denied {
            tree.deny(&record.root_path, &Identity::new(identity.as_str()))
                .map_err(|source| reference(&record.root_path, source))?;
        }
        for sibling in &resource.siblings {
            validate_path(sibling)?;
            tree.insert_sibling(&record.root_path, sibling)
                .map_err(|source| reference(sibling, source))?;
        }
        for url_name in &resource.url_names {
            backend.details.add_url_name(&record, url_name);
        }
    }

    // Relations need every resource in place first.
    for resource in &archive.resource {
        for target in &resource.links {
            validate_path(target)?;
            backend
                .renderer
                .add_link(&resource.path, link_for(target));
            backend
                .relations
                .add_reference(&resource.path, strip_query(target));
        }
        if resource.contained_in.is_empty() {
            continue;
        }
        let structure_id = tree
            .record(&resource.path)
            .map(|record| record.structure_id)
            .ok_or_else(|| reference(&resource.path, RepoError::NotFound))?;
        for container in &resource.contained_in {
            let record = tree
                .record(container)
                .ok_or_else(|| reference(container, RepoError::NotFound))?;
            backend.relations.add_content_referrer(structure_id, record);
        }
    }

    for detail in &archive.detail_page {
        validate_path(&detail.path)?;
        backend.details.add_detail_page(&detail.type_name, &detail.path);
    }

    Ok(backend)
}

fn loader_kind(value: &str) -> Result<LoaderKind, DomainError> {
    match value.trim() {
        "plain" => Ok(LoaderKind::Plain),
        "template" => Ok(LoaderKind::Template),
        "container-page" => Ok(LoaderKind::ContainerPage),
        "group-container" => Ok(LoaderKind::GroupContainer),
        other => Err(DomainError::validation(format!(
            "unknown loader kind `{other}`"
        ))),
    }
}

fn validate_path(path: &str) -> Result<(), DomainError> {
    if !path.starts_with('/') {
        return Err(DomainError::invalid_path(path, "must start with `/`"));
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(DomainError::invalid_path(path, "must not contain `..`"));
    }
    Ok(())
}

fn reference(path: &str, source: RepoError) -> ArchiveError {
    ArchiveError::Reference {
        path: path.to_string(),
        source,
    }
}

fn strip_query(target: &str) -> &str {
    target.split_once('?').map_or(target, |(path, _)| path)
}

fn link_for(target: &str) -> ExportLink {
    match target.split_once('?') {
        Some((path, query)) if !query.is_empty() => ExportLink::new(path).with_parameters(query),
        _ => ExportLink::new(strip_query(target)),
    }
}
