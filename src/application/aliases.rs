//! Export-name registry.
//!
//! Folders carrying the `exportname` attribute are exported under that name
//! instead of their own path. The registry is a read-only snapshot of all such
//! folders; it is rebuilt wholesale after the caches are cleared.

use std::collections::{BTreeMap, HashMap};

use crate::application::repos::{ContentTree, RepoError};
use crate::domain::paths;

pub const EXPORT_NAME_ATTRIBUTE: &str = "exportname";

#[derive(Debug, Default)]
pub struct ExportNameRegistry {
    /// Folder root path → alias (`/alias/`).
    by_folder: HashMap<String, String>,
    /// Alias → folder root paths, in root-path order.
    by_alias: BTreeMap<String, Vec<String>>,
}

impl ExportNameRegistry {
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut registry = Self::default();
        for (root_path, value) in entries {
            if value.trim().is_empty() {
                continue;
            }
            let folder = paths::folder_of(&root_path).to_string();
            let alias = paths::as_folder_name(&value);
            registry
                .by_alias
                .entry(alias.clone())
                .or_default()
                .push(folder.clone());
            registry.by_folder.insert(folder, alias);
        }
        for folders in registry.by_alias.values_mut() {
            folders.sort();
            folders.dedup();
        }
        registry
    }

    pub async fn load(tree: &dyn ContentTree) -> Result<Self, RepoError> {
        let entries = tree.resources_with_attribute(EXPORT_NAME_ATTRIBUTE).await?;
        Ok(Self::from_entries(entries))
    }

    /// Aliased name of `root_path`, using the nearest aliased ancestor folder.
    pub fn rfs_name_for(&self, root_path: &str) -> Option<String> {
        paths::ancestors(root_path).find_map(|folder| {
            self.by_folder
                .get(folder)
                .map(|alias| format!("{alias}{}", &root_path[folder.len()..]))
        })
    }

    /// Root paths `rfs_name` may stand for, most specific alias first.
    pub fn root_candidates(&self, rfs_name: &str) -> Vec<String> {
        paths::ancestors(rfs_name)
            .filter_map(|leading| {
                self.by_alias
                    .get(leading)
                    .map(|folders| (leading, folders))
            })
            .flat_map(|(leading, folders)| {
                let remainder = &rfs_name[leading.len()..];
                folders
                    .iter()
                    .map(move |folder| format!("{folder}{remainder}"))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_folder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_folder.is_empty()
    }
}
