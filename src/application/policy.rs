//! Cached export and secure-serving decisions.

use std::sync::Arc;

use tracing::warn;

use crate::application::repos::{ContentTree, RepoError};
use crate::cache::{CacheKey, ExportCaches};
use crate::config::ExportSettings;
use crate::domain::entities::{Identity, SiteContext};
use crate::domain::paths;

pub const EXPORT_ATTRIBUTE: &str = "export";
pub const SECURE_ATTRIBUTE: &str = "secure";

pub struct ExportPolicy {
    settings: Arc<ExportSettings>,
    tree: Arc<dyn ContentTree>,
    caches: Arc<ExportCaches>,
    export_identity: Identity,
}

impl ExportPolicy {
    pub fn new(
        settings: Arc<ExportSettings>,
        tree: Arc<dyn ContentTree>,
        caches: Arc<ExportCaches>,
    ) -> Self {
        let export_identity = Identity::new(settings.export_user.clone());
        Self {
            settings,
            tree,
            caches,
            export_identity,
        }
    }

    /// Whether `vfs_name` is served from the export folder.
    ///
    /// The `export` attribute is read as the export user, never as the
    /// requesting user, so the cached answer holds for everybody. Store
    /// failures answer `false` and are not cached.
    pub async fn is_export_required(&self, ctx: &SiteContext, vfs_name: &str) -> bool {
        if !self.settings.enabled {
            return false;
        }
        let key = CacheKey::new(&ctx.site_root, vfs_name);
        if let Some(required) = self.caches.get_export_flag(&key) {
            return required;
        }

        let generation = self.caches.generation();
        let root_path = ctx.root_path(vfs_name);
        let attribute = match self
            .tree
            .read_attribute(&self.export_identity, &root_path, EXPORT_ATTRIBUTE, true)
            .await
        {
            Ok(value) => value,
            Err(RepoError::NotFound | RepoError::PermissionDenied) => None,
            Err(err) => {
                warn!(
                    target = "static_export::policy",
                    root_path = %root_path,
                    error = %err,
                    "Reading export attribute failed"
                );
                return false;
            }
        };

        let required = match attribute {
            Some(value) => is_true(&value),
            None => self.default_export(vfs_name),
        };
        self.caches.put_export_flag(generation, key, required);
        required
    }

    fn default_export(&self, vfs_name: &str) -> bool {
        if self.settings.default_export {
            return true;
        }
        if paths::is_folder(vfs_name) {
            return false;
        }
        let name = paths::name(vfs_name).to_ascii_lowercase();
        self.settings
            .default_suffixes
            .iter()
            .any(|suffix| name.ends_with(suffix.as_str()))
    }

    /// Whether `vfs_name` must be served over a secure connection.
    ///
    /// Only meaningful for the live tree. Denied reads depend on the
    /// requesting identity and are therefore not cached.
    pub async fn is_secure_required(&self, ctx: &SiteContext, vfs_name: &str) -> bool {
        if !ctx.live {
            return false;
        }
        let key = CacheKey::new(&ctx.site_root, vfs_name);
        if let Some(secure) = self.caches.get_secure_flag(&key) {
            return secure;
        }

        let generation = self.caches.generation();
        let root_path = ctx.root_path(vfs_name);
        match self
            .tree
            .read_attribute(&ctx.identity, &root_path, SECURE_ATTRIBUTE, true)
            .await
        {
            Ok(value) => {
                let secure = value.as_deref().is_some_and(is_true);
                self.caches.put_secure_flag(generation, key, secure);
                secure
            }
            Err(RepoError::NotFound) => {
                self.caches.put_secure_flag(generation, key, false);
                false
            }
            Err(RepoError::PermissionDenied) => false,
            Err(err) => {
                warn!(
                    target = "static_export::policy",
                    root_path = %root_path,
                    error = %err,
                    "Reading secure attribute failed"
                );
                false
            }
        }
    }
}

fn is_true(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}
