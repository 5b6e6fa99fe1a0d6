//! Shared domain enumerations aligned with persisted side-table values.

use serde::{Deserialize, Serialize};

/// Publish state of a content entry as reported by the publish pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeState {
    Unchanged,
    New,
    Changed,
    Deleted,
    MovedSource,
    MovedDestination,
}

impl ChangeState {
    pub fn is_unchanged(self) -> bool {
        matches!(self, ChangeState::Unchanged)
    }

    /// The entry no longer exists at its path after the publish.
    pub fn is_gone(self) -> bool {
        matches!(self, ChangeState::Deleted | ChangeState::MovedSource)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Folder,
    File,
}

/// How the loader responsible for a resource type produces output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderKind {
    /// Bytes are served as stored.
    Plain,
    /// Dynamic content rendered through a template.
    Template,
    /// Aggregating page whose output is assembled from referenced content.
    ContainerPage,
    /// Reusable group of content referenced from container pages.
    GroupContainer,
}

impl LoaderKind {
    pub fn is_render_required(self) -> bool {
        !matches!(self, LoaderKind::Plain)
    }

    /// Content that can appear on detail pages and inside container pages.
    pub fn is_template_content(self) -> bool {
        matches!(self, LoaderKind::Template)
    }
}

/// Mode of a record in the pending-template side table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkMode {
    Parameterless,
    Parameterized,
}

impl LinkMode {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkMode::Parameterless => "parameterless",
            LinkMode::Parameterized => "parameterized",
        }
    }

    pub fn for_parameters(parameters: Option<&str>) -> Self {
        match parameters {
            Some(_) => LinkMode::Parameterized,
            None => LinkMode::Parameterless,
        }
    }
}

impl TryFrom<&str> for LinkMode {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "parameterless" => Ok(LinkMode::Parameterless),
            "parameterized" => Ok(LinkMode::Parameterized),
            _ => Err(()),
        }
    }
}

/// Result of an on-demand export request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    /// The file was written and can be served statically.
    Exported,
    /// The exported file is already current.
    NotModified,
    /// Nothing was written; the caller should serve the resource dynamically.
    NotExported,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moved_source_counts_as_gone() {
        assert!(ChangeState::MovedSource.is_gone());
        assert!(ChangeState::Deleted.is_gone());
        assert!(!ChangeState::MovedDestination.is_gone());
    }

    #[test]
    fn link_mode_round_trips_through_str() {
        for mode in [LinkMode::Parameterless, LinkMode::Parameterized] {
            assert_eq!(LinkMode::try_from(mode.as_str()), Ok(mode));
        }
        assert!(LinkMode::try_from("other").is_err());
    }
}
