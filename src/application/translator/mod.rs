//! Bidirectional translation between virtual names and real (exported) names.
//!
//! A real name is `rule prefix + rfs name`. The rfs name is the virtual name
//! after export-name aliasing, locale folders, output-suffix rewriting and
//! parameter encoding, in that order.

mod params;
mod strategy;
mod suffix;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::application::aliases::ExportNameRegistry;
use crate::application::error::ExportError;
use crate::application::repos::{ExportCollaborators, RepoError};
use crate::application::rules::{RfsRule, RuleTable};
use crate::application::site::SiteRoots;
use crate::cache::{CacheKey, ExportCaches, ExportLookup};
use crate::config::ExportSettings;
use crate::domain::entities::{ExportData, Identity, ResourceRecord, SiteContext};
use crate::domain::paths;

pub use params::{decode_link_id, encode_link_id, normalize_parameters};
pub use strategy::LinkStrategy;
pub use suffix::{has_template_suffix, strip_outer_suffix, with_export_suffix};

pub const EXPORT_SUFFIX_ATTRIBUTE: &str = "export.suffix";
pub const LOCALE_ATTRIBUTE: &str = "locale";

/// Where a virtual name ends up when exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTarget {
    /// Name below the rule prefix, parameters already encoded.
    pub rfs_name: String,
    /// Name as linked from exported pages.
    pub real_name: String,
    pub export_file: PathBuf,
    /// Location used while a full export is staged.
    pub work_file: PathBuf,
    /// Export folder of the governing rule.
    pub export_root: PathBuf,
}

pub struct PathTranslator {
    settings: Arc<ExportSettings>,
    rules: Arc<RuleTable>,
    caches: Arc<ExportCaches>,
    collaborators: ExportCollaborators,
    site_roots: SiteRoots,
    export_identity: Identity,
}

impl PathTranslator {
    pub fn new(
        settings: Arc<ExportSettings>,
        rules: Arc<RuleTable>,
        caches: Arc<ExportCaches>,
        collaborators: ExportCollaborators,
    ) -> Self {
        let export_identity = Identity::new(settings.export_user.clone());
        let site_roots = SiteRoots::new(&settings.site_roots);
        Self {
            settings,
            rules,
            caches,
            collaborators,
            site_roots,
            export_identity,
        }
    }

    pub fn site_roots(&self) -> &SiteRoots {
        &self.site_roots
    }

    /// Export-user context for `root_path` and its site-relative name.
    pub fn context_for(&self, root_path: &str) -> (SiteContext, String) {
        let site_root = self.site_roots.site_root_for(root_path);
        let vfs_name = paths::remove_site_root(site_root, root_path)
            .unwrap_or(root_path)
            .to_string();
        let ctx = SiteContext::offline(site_root, self.export_identity.clone());
        (ctx, vfs_name)
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    pub fn export_identity(&self) -> &Identity {
        &self.export_identity
    }

    /// Rule deciding where `root_path` is written for a request in `ctx`.
    ///
    /// System resources referenced from a page stay with the page's rule when
    /// that rule lists them as related; otherwise they follow the site root.
    pub fn rule_for(&self, ctx: &SiteContext, root_path: &str) -> &RfsRule {
        if paths::is_system_path(root_path) {
            if let Some(rule) = ctx
                .source_root_path
                .as_deref()
                .and_then(|source| self.rules.match_related(source, root_path))
            {
                return rule;
            }
            return self.rules.match_rule(&format!("{}/", ctx.site_root));
        }
        self.rules.match_rule(root_path)
    }

    /// Current export-name registry, rebuilt from the content tree after a clear.
    pub async fn export_names(&self) -> Result<Arc<ExportNameRegistry>, ExportError> {
        if let Some(registry) = self.caches.export_names() {
            return Ok(registry);
        }
        let _rebuild = self.caches.lock_export_names_rebuild().await;
        if let Some(registry) = self.caches.export_names() {
            return Ok(registry);
        }

        let generation = self.caches.generation();
        let registry = Arc::new(ExportNameRegistry::load(self.collaborators.tree.as_ref()).await?);
        debug!(
            target = "static_export::translator",
            aliases = registry.len(),
            "Rebuilt export-name registry"
        );
        self.caches.set_export_names(generation, Arc::clone(&registry));
        Ok(registry)
    }

    pub async fn virtual_to_real(
        &self,
        ctx: &SiteContext,
        vfs_name: &str,
        parameters: Option<&str>,
    ) -> Result<String, ExportError> {
        Ok(self.locate(ctx, vfs_name, parameters).await?.real_name)
    }

    /// Full output location of `vfs_name`.
    pub async fn locate(
        &self,
        ctx: &SiteContext,
        vfs_name: &str,
        parameters: Option<&str>,
    ) -> Result<ExportTarget, ExportError> {
        let root_path = ctx.root_path(vfs_name);
        let rule = self.rule_for(ctx, &root_path);
        let mut rfs_name = self.rfs_name(vfs_name, &root_path, rule).await?;

        if let Some(parameters) = parameters.and_then(normalize_parameters) {
            let id = self
                .collaborators
                .parameters
                .link_id(&rfs_name, &parameters)
                .await
                .map_err(|err| ExportError::from_repo(&root_path, err))?;
            rfs_name = encode_link_id(&rfs_name, id);
        }

        Ok(ExportTarget {
            real_name: rule.real_name(&rfs_name),
            export_file: rule.export_file(&rfs_name),
            work_file: rule.file_in(rule.work_path(), &rfs_name),
            export_root: rule.export_path().to_path_buf(),
            rfs_name,
        })
    }

    async fn rfs_name(
        &self,
        vfs_name: &str,
        root_path: &str,
        rule: &RfsRule,
    ) -> Result<String, ExportError> {
        let registry = self.export_names().await?;
        let mut rfs_name = registry
            .rfs_name_for(root_path)
            .unwrap_or_else(|| vfs_name.to_string());

        if matches!(self.settings.strategy, LinkStrategy::LocaleFolders { .. })
            && !paths::is_system_path(root_path)
        {
            let locale = self
                .read_inherited(root_path, LOCALE_ATTRIBUTE)
                .await?;
            rfs_name = self.settings.strategy.apply(&rfs_name, locale.as_deref());
        }

        if paths::is_folder(root_path) {
            return Ok(rfs_name);
        }

        match self
            .collaborators
            .tree
            .read_resource(&self.export_identity, root_path)
            .await
        {
            Ok(resource) => {
                let kind = self.collaborators.loaders.classify(&resource.type_name);
                if kind.is_render_required() {
                    let suffix = self.export_suffix_for(root_path).await?;
                    rfs_name = with_export_suffix(&rfs_name, &suffix);
                }
            }
            Err(RepoError::NotFound) => {
                if has_template_suffix(&rfs_name, &self.settings.template_suffixes) {
                    rfs_name = self.deleted_template_name(&rfs_name, rule).await;
                }
            }
            Err(RepoError::PermissionDenied) => {}
            Err(err) => return Err(ExportError::from_repo(root_path, err)),
        }

        Ok(rfs_name)
    }

    async fn export_suffix_for(&self, root_path: &str) -> Result<String, ExportError> {
        let suffix = self
            .read_inherited(root_path, EXPORT_SUFFIX_ATTRIBUTE)
            .await?
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(|value| {
                if value.starts_with('.') {
                    value
                } else {
                    format!(".{value}")
                }
            });
        Ok(suffix.unwrap_or_else(|| self.settings.export_suffix.clone()))
    }

    /// Rendered name of a template that no longer exists.
    async fn deleted_template_name(&self, rfs_name: &str, rule: &RfsRule) -> String {
        let file = rule.export_file(rfs_name);
        let sibling = match file.parent() {
            Some(dir) => suffix::sibling_with_suffix(dir, paths::name(rfs_name)).await,
            None => None,
        };
        match sibling {
            Some(name) => {
                let folder = &rfs_name[..rfs_name.len() - paths::name(rfs_name).len()];
                format!("{folder}{name}")
            }
            None => with_export_suffix(rfs_name, &self.settings.export_suffix),
        }
    }

    async fn read_inherited(
        &self,
        root_path: &str,
        attribute: &str,
    ) -> Result<Option<String>, ExportError> {
        match self
            .collaborators
            .tree
            .read_attribute(&self.export_identity, root_path, attribute, true)
            .await
        {
            Ok(value) => Ok(value),
            Err(RepoError::NotFound | RepoError::PermissionDenied) => Ok(None),
            Err(err) => Err(ExportError::from_repo(root_path, err)),
        }
    }

    /// Reverse translation; misses are cached as well as hits.
    pub async fn real_to_virtual(
        &self,
        ctx: &SiteContext,
        real_name: &str,
    ) -> Result<ExportData, ExportError> {
        let key = CacheKey::new(&ctx.site_root, real_name);
        if let Some(cached) = self.caches.get_export_data(&key) {
            return match cached {
                ExportLookup::Found(data) => Ok(data),
                ExportLookup::Missing => Err(ExportError::not_found(real_name)),
            };
        }

        let generation = self.caches.generation();
        match self.lookup_real_name(ctx, real_name).await? {
            Some(data) => {
                self.caches
                    .put_export_data(generation, key, ExportLookup::Found(data.clone()));
                Ok(data)
            }
            None => {
                debug!(
                    target = "static_export::translator",
                    real_name,
                    site_root = %ctx.site_root,
                    "No export mapping"
                );
                self.caches
                    .put_export_data(generation, key, ExportLookup::Missing);
                Err(ExportError::not_found(real_name))
            }
        }
    }

    async fn lookup_real_name(
        &self,
        ctx: &SiteContext,
        real_name: &str,
    ) -> Result<Option<ExportData>, ExportError> {
        let Some((_, rfs_name)) = self.rules.match_real_name(real_name) else {
            return Ok(None);
        };
        if paths::is_folder(rfs_name) {
            return self.lookup_folder(ctx, rfs_name).await;
        }
        self.lookup_rfs_name(ctx, rfs_name).await
    }

    /// Folder requests are answered with the folder's default document.
    async fn lookup_folder(
        &self,
        ctx: &SiteContext,
        rfs_folder: &str,
    ) -> Result<Option<ExportData>, ExportError> {
        let exported_name = format!("{rfs_folder}{}", self.settings.default_file());
        let Some(mut data) = self.lookup_plain(ctx, rfs_folder).await? else {
            let data = self.lookup_plain(ctx, &exported_name).await?;
            return Ok(data);
        };

        let default_file = match self
            .collaborators
            .tree
            .read_default_file(&data.root_path)
            .await
        {
            Ok(Some(resource)) => Some(resource),
            Ok(None) | Err(RepoError::NotFound) => self.first_default_file(&data.root_path).await?,
            Err(err) => return Err(ExportError::from_repo(&data.root_path, err)),
        };
        if default_file.is_some() {
            data.resource = default_file;
        }
        data.set_rfs_name(exported_name);
        Ok(Some(data))
    }

    async fn first_default_file(
        &self,
        folder: &str,
    ) -> Result<Option<ResourceRecord>, ExportError> {
        for name in &self.settings.default_files {
            if let Some(resource) = self.read_existing(&format!("{folder}{name}")).await? {
                return Ok(Some(resource));
            }
        }
        Ok(None)
    }

    async fn lookup_rfs_name(
        &self,
        ctx: &SiteContext,
        rfs_name: &str,
    ) -> Result<Option<ExportData>, ExportError> {
        if let Some(data) = self.lookup_plain(ctx, rfs_name).await? {
            return Ok(Some(data));
        }

        if let Some((base, id)) = decode_link_id(rfs_name) {
            let recorded = self
                .collaborators
                .parameters
                .resolve(id)
                .await
                .map_err(|err| ExportError::from_repo(rfs_name, err))?;
            if let Some((recorded_name, parameters)) = recorded
                && recorded_name == base
                && let Some(mut data) = self.lookup_plain(ctx, &base).await?
            {
                data.parameters = Some(parameters);
                data.set_rfs_name(rfs_name);
                return Ok(Some(data));
            }
        }

        let root_path = ctx.root_path(rfs_name);
        match self
            .collaborators
            .details
            .resolve_detail_url(&root_path)
            .await
        {
            Ok(Some(resource)) => Ok(Some(
                ExportData::new(rfs_name, root_path, rfs_name, None, Some(resource)).detail_page(),
            )),
            Ok(None) | Err(RepoError::NotFound) => Ok(None),
            Err(err) => Err(ExportError::from_repo(&root_path, err)),
        }
    }

    /// Aliases, then the name itself, each time with one outer suffix less.
    async fn lookup_plain(
        &self,
        ctx: &SiteContext,
        rfs_name: &str,
    ) -> Result<Option<ExportData>, ExportError> {
        let mut names = vec![rfs_name.to_string()];
        if let Some(stripped) = self.settings.strategy.strip(rfs_name) {
            names.push(stripped.to_string());
        }
        let registry = self.export_names().await?;

        for name in names {
            let mut candidate = name;
            loop {
                for root_path in registry.root_candidates(&candidate) {
                    if let Some(resource) = self.read_existing(&root_path).await? {
                        return Ok(Some(self.found(ctx, root_path, resource, rfs_name)));
                    }
                }
                let root_path = ctx.root_path(&candidate);
                if let Some(resource) = self.read_existing(&root_path).await? {
                    return Ok(Some(self.found(ctx, root_path, resource, rfs_name)));
                }
                match strip_outer_suffix(&candidate, &self.settings.export_suffix) {
                    Some(stripped) => candidate = stripped,
                    None => {
                        if let Some(data) = self
                            .lookup_custom_suffix(ctx, &registry, &candidate, rfs_name)
                            .await?
                        {
                            return Ok(Some(data));
                        }
                        break;
                    }
                }
            }
        }
        Ok(None)
    }

    /// A rendered resource whose own `export.suffix` produced the last
    /// extension of `candidate` (`/news.htm` for an extensionless `/news`).
    async fn lookup_custom_suffix(
        &self,
        ctx: &SiteContext,
        registry: &ExportNameRegistry,
        candidate: &str,
        rfs_name: &str,
    ) -> Result<Option<ExportData>, ExportError> {
        let Some(extension) = paths::extension(paths::name(candidate)) else {
            return Ok(None);
        };
        let suffix = format!(".{extension}");
        let stem = &candidate[..candidate.len() - suffix.len()];

        let mut root_paths = registry.root_candidates(stem);
        root_paths.push(ctx.root_path(stem));
        for root_path in root_paths {
            let Some(resource) = self.read_existing(&root_path).await? else {
                continue;
            };
            let kind = self.collaborators.loaders.classify(&resource.type_name);
            if kind.is_render_required() && self.export_suffix_for(&root_path).await? == suffix {
                return Ok(Some(self.found(ctx, root_path, resource, rfs_name)));
            }
        }
        Ok(None)
    }

    fn found(
        &self,
        ctx: &SiteContext,
        root_path: String,
        resource: ResourceRecord,
        rfs_name: &str,
    ) -> ExportData {
        let vfs_name = paths::remove_site_root(&ctx.site_root, &root_path)
            .unwrap_or(&root_path)
            .to_string();
        ExportData::new(vfs_name, root_path, rfs_name, None, Some(resource))
    }

    async fn read_existing(&self, root_path: &str) -> Result<Option<ResourceRecord>, ExportError> {
        match self
            .collaborators
            .tree
            .read_resource(&self.export_identity, root_path)
            .await
        {
            Ok(resource) => Ok(Some(resource)),
            Err(RepoError::NotFound) => Ok(None),
            Err(err) => Err(ExportError::from_repo(root_path, err)),
        }
    }
}
