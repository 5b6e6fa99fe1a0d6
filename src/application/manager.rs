//! Entry point wiring translation, caching, scrubbing and export together.
//!
//! One manager is built at startup and shared by the serving and publish
//! pipelines. Request-time calls (`virtual_to_real`, `is_export_required`,
//! `export_on_demand`, ...) run on the caller's task; publish-triggered work
//! runs on a spawned task serialised by the busy gate.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::error::ExportError;
use crate::application::export::{
    BusyGate, ExportOrchestrator, ExportReport, InFlightExports, OutputTarget,
};
use crate::application::policy::ExportPolicy;
use crate::application::repos::ExportCollaborators;
use crate::application::rules::RuleTable;
use crate::application::scrub::ScrubEngine;
use crate::application::translator::PathTranslator;
use crate::cache::{CacheConfig, CacheEvent, CacheTrigger, ExportCaches};
use crate::config::{ExportSettings, RuleSettings, Settings};
use crate::domain::entities::{ExportData, PublishedEntry, SiteContext};
use crate::domain::types::ExportStatus;
use crate::infra::fs as export_fs;

/// Result of a publish-triggered background run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Completed {
        purged_files: usize,
        scrub_errors: usize,
        /// `None` when the handler leaves exporting to on-demand requests.
        export: Option<ExportReport>,
    },
    /// Another export held the busy flag for the whole wait.
    Abandoned,
}

pub struct StaticExportManager {
    settings: Arc<ExportSettings>,
    trigger: CacheTrigger,
    translator: Arc<PathTranslator>,
    policy: Arc<ExportPolicy>,
    scrub: Arc<ScrubEngine>,
    orchestrator: Arc<ExportOrchestrator>,
    gate: BusyGate,
    in_flight: InFlightExports,
    shutdown: watch::Sender<bool>,
}

impl StaticExportManager {
    pub fn from_settings(
        settings: &Settings,
        collaborators: ExportCollaborators,
    ) -> Result<Self, ExportError> {
        Self::new(
            settings.export.clone(),
            &settings.rules,
            CacheConfig::from(&settings.cache),
            collaborators,
        )
    }

    /// Build the manager. Fails only on configuration errors.
    pub fn new(
        export: ExportSettings,
        rules: &[RuleSettings],
        cache: CacheConfig,
        collaborators: ExportCollaborators,
    ) -> Result<Self, ExportError> {
        let rules = Arc::new(RuleTable::from_settings(&export, rules)?);
        let settings = Arc::new(export);
        let caches = Arc::new(ExportCaches::new(&cache));

        let translator = Arc::new(PathTranslator::new(
            Arc::clone(&settings),
            rules,
            Arc::clone(&caches),
            collaborators.clone(),
        ));
        let policy = Arc::new(ExportPolicy::new(
            Arc::clone(&settings),
            Arc::clone(&collaborators.tree),
            Arc::clone(&caches),
        ));
        let scrub = Arc::new(ScrubEngine::new(
            Arc::clone(&translator),
            collaborators.clone(),
            settings.handler.related_files(&settings),
        ));
        let orchestrator = Arc::new(ExportOrchestrator::new(
            Arc::clone(&translator),
            Arc::clone(&policy),
            collaborators,
        ));

        let (shutdown, shutdown_rx) = watch::channel(false);
        let gate = BusyGate::new(settings.busy_poll, settings.busy_max_polls, shutdown_rx);

        info!(
            target = "static_export::manager",
            enabled = settings.enabled,
            handler = settings.handler.as_str(),
            strategy = settings.strategy.as_str(),
            rules = translator.rules().iter().count(),
            "Static export initialised"
        );

        Ok(Self {
            trigger: CacheTrigger::new(caches),
            settings,
            translator,
            policy,
            scrub,
            orchestrator,
            gate,
            in_flight: InFlightExports::new(),
            shutdown,
        })
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    pub fn caches(&self) -> &Arc<ExportCaches> {
        self.trigger.caches()
    }

    pub fn cache_trigger(&self) -> &CacheTrigger {
        &self.trigger
    }

    pub fn translator(&self) -> &Arc<PathTranslator> {
        &self.translator
    }

    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    pub async fn virtual_to_real(
        &self,
        ctx: &SiteContext,
        vfs_name: &str,
        parameters: Option<&str>,
    ) -> Result<String, ExportError> {
        self.translator
            .virtual_to_real(ctx, vfs_name, parameters)
            .await
    }

    pub async fn real_to_virtual(
        &self,
        ctx: &SiteContext,
        real_name: &str,
    ) -> Result<ExportData, ExportError> {
        self.translator.real_to_virtual(ctx, real_name).await
    }

    pub async fn is_export_required(&self, ctx: &SiteContext, vfs_name: &str) -> bool {
        self.policy.is_export_required(ctx, vfs_name).await
    }

    pub async fn is_secure_required(&self, ctx: &SiteContext, vfs_name: &str) -> bool {
        self.policy.is_secure_required(ctx, vfs_name).await
    }

    /// Link written into rendered output for `vfs_name`.
    ///
    /// Exported resources link to their real name; everything else keeps the
    /// dynamic address below `vfs_prefix`.
    pub async fn link_for(
        &self,
        ctx: &SiteContext,
        vfs_name: &str,
        parameters: Option<&str>,
    ) -> Result<String, ExportError> {
        if self.policy.is_export_required(ctx, vfs_name).await {
            return self
                .translator
                .virtual_to_real(ctx, vfs_name, parameters)
                .await;
        }
        let query = parameters
            .filter(|parameters| !parameters.is_empty())
            .map(|parameters| format!("?{}", parameters.trim_start_matches('?')))
            .unwrap_or_default();
        Ok(format!("{}{vfs_name}{query}", self.settings.vfs_prefix))
    }

    /// Whether the rule governing `vfs_name` writes relative links.
    pub fn rule_for_link(&self, ctx: &SiteContext, vfs_name: &str) -> bool {
        self.translator
            .rule_for(ctx, &ctx.root_path(vfs_name))
            .use_relative_links(self.settings.relative_links)
    }

    /// Clear the caches now and scrub/export `entries` in the background.
    ///
    /// Returns `None` when static export is disabled. The publish itself is
    /// never blocked: the returned task waits for the busy flag on its own.
    pub fn on_publish(
        &self,
        publish_id: Uuid,
        entries: Vec<PublishedEntry>,
    ) -> Option<JoinHandle<PublishOutcome>> {
        self.trigger.publish_project(publish_id);
        if !self.settings.enabled {
            debug!(
                target = "static_export::manager",
                publish_id = %publish_id,
                "Static export disabled, skipping publish"
            );
            return None;
        }

        let gate = self.gate.clone();
        let scrub = Arc::clone(&self.scrub);
        let orchestrator = Arc::clone(&self.orchestrator);
        let export_after_publish = self.settings.handler.exports_after_publish();

        Some(tokio::spawn(async move {
            let Some(_busy) = gate.acquire().await else {
                return PublishOutcome::Abandoned;
            };

            let scrubbed = match scrub.scrub(Some(entries)).await {
                Ok(report) => report,
                Err(err) => {
                    warn!(
                        target = "static_export::manager",
                        publish_id = %publish_id,
                        error = %err,
                        "Scrub failed"
                    );
                    return PublishOutcome::Completed {
                        purged_files: 0,
                        scrub_errors: 1,
                        export: None,
                    };
                }
            };

            let export = if export_after_publish {
                Some(
                    orchestrator
                        .export_batch(&scrubbed.entries, OutputTarget::Export)
                        .await,
                )
            } else {
                None
            };

            info!(
                target = "static_export::manager",
                publish_id = %publish_id,
                purged = scrubbed.purged_files,
                exported = export.as_ref().map(|report| report.exported),
                "Publish processed"
            );
            PublishOutcome::Completed {
                purged_files: scrubbed.purged_files,
                scrub_errors: scrubbed.errors,
                export,
            }
        }))
    }

    /// Export the whole tree, waiting for the busy flag like a publish would.
    pub async fn run_full_export(&self, purge_first: bool) -> Result<ExportReport, ExportError> {
        self.trigger.update_exports();
        let _busy = self.gate.acquire().await.ok_or(ExportError::Busy)?;
        self.orchestrator
            .run_full_export(&self.scrub, purge_first)
            .await
    }

    pub fn on_clear_caches(&self) -> CacheEvent {
        self.trigger.clear_caches()
    }

    pub fn on_update_exports(&self) -> CacheEvent {
        self.trigger.update_exports()
    }

    /// Write the file behind `real_name` if it is missing or outdated.
    ///
    /// Any failure yields [`ExportStatus::NotExported`] so the caller can fall
    /// back to serving the resource dynamically.
    pub async fn export_on_demand(&self, ctx: &SiteContext, real_name: &str) -> ExportStatus {
        if !self.settings.enabled {
            return ExportStatus::NotExported;
        }
        let _guard = match self.in_flight.acquire(real_name) {
            Ok(guard) => guard,
            Err(err) => {
                debug!(
                    target = "static_export::manager",
                    error = %err,
                    "Skipping on-demand export"
                );
                return ExportStatus::NotExported;
            }
        };

        match self.try_export_on_demand(ctx, real_name).await {
            Ok(status) => status,
            Err(err) => {
                if err.is_not_found() {
                    debug!(
                        target = "static_export::manager",
                        real_name,
                        "Nothing to export on demand"
                    );
                } else {
                    warn!(
                        target = "static_export::manager",
                        real_name,
                        error = %err,
                        "On-demand export failed"
                    );
                }
                ExportStatus::NotExported
            }
        }
    }

    async fn try_export_on_demand(
        &self,
        ctx: &SiteContext,
        real_name: &str,
    ) -> Result<ExportStatus, ExportError> {
        let data = self.translator.real_to_virtual(ctx, real_name).await?;
        if !self.policy.is_export_required(ctx, &data.vfs_name).await {
            return Ok(ExportStatus::NotExported);
        }
        let (rule, _) = self
            .translator
            .rules()
            .match_real_name(real_name)
            .ok_or_else(|| ExportError::not_found(real_name))?;
        let file = rule.export_file(data.rfs_name());

        if let Some(resource) = data.resource.as_ref() {
            let modified = export_fs::modified(&file)
                .await
                .map_err(|err| ExportError::io(&file, err))?;
            if modified
                .map(OffsetDateTime::from)
                .is_some_and(|written| written >= resource.date_last_modified)
            {
                return Ok(ExportStatus::NotModified);
            }
        }

        let page = self
            .orchestrator
            .produce(ctx, &data, data.parameters.as_deref())
            .await?;
        self.orchestrator.write(&file, &page.body).await?;
        debug!(
            target = "static_export::manager",
            real_name,
            file = %file.display(),
            "Exported on demand"
        );
        Ok(ExportStatus::Exported)
    }

    /// Stop waiting for the busy flag. Running exports are not interrupted.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        info!(target = "static_export::manager", "Static export shutting down");
    }
}
