use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::{
    application::repos::{RenderError, RepoError},
    domain::error::DomainError,
};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no export mapping for `{path}`")]
    NotFound { path: String },
    #[error("permission denied for `{path}`")]
    PermissionDenied { path: String },
    #[error("filesystem operation failed on `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("export misconfigured: {message}")]
    Configuration { message: String },
    #[error("another export is still running")]
    Busy,
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(RepoError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl ExportError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied { path: path.into() }
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Map a collaborator failure for `path` onto the export taxonomy.
    pub fn from_repo(path: &str, err: RepoError) -> Self {
        match err {
            RepoError::NotFound => Self::not_found(path),
            RepoError::PermissionDenied => Self::permission_denied(path),
            other => Self::Repo(other),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ExportError::NotFound { .. })
    }
}

impl From<RepoError> for ExportError {
    fn from(err: RepoError) -> Self {
        Self::Repo(err)
    }
}
