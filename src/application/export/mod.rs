//! Two-phase export of a publish batch.
//!
//! Phase one copies plain resources straight into the export folders and
//! records every resource that needs rendering in the pending-template table.
//! Phase two renders the recorded names breadth first, following the links
//! each rendered page reports until no unseen link remains.

mod full;
mod gate;
mod in_flight;

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::application::error::ExportError;
use crate::application::policy::ExportPolicy;
use crate::application::repos::{ExportCollaborators, RenderRequest, RenderedPage};
use crate::application::rules::RfsRule;
use crate::application::scrub::{OwnFileOnly, RelatedFiles, RenderedSubtree};
use crate::application::translator::{ExportTarget, PathTranslator};
use crate::config::ExportSettings;
use crate::domain::entities::{ExportData, ExportLink, PendingTemplate, PublishedEntry, SiteContext};
use crate::domain::types::LinkMode;
use crate::infra::fs as export_fs;

pub use gate::{BusyGate, BusyGuard};
pub use in_flight::{ExportGuard, InFlightError, InFlightExports};

const METRIC_FILES_WRITTEN: &str = "static_export_files_written_total";
const METRIC_EXPORT_MS: &str = "static_export_export_ms";

/// What happens after a publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportHandler {
    /// Scrub, then export the batch.
    #[default]
    AfterPublish,
    /// Scrub only; files are recreated when requested.
    OnDemand,
    /// Like `OnDemand`, also purging the rendered files around each purged file.
    OnDemandHtmlSubtree,
}

impl ExportHandler {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportHandler::AfterPublish => "after-publish",
            ExportHandler::OnDemand => "on-demand",
            ExportHandler::OnDemandHtmlSubtree => "on-demand-html-subtree",
        }
    }

    pub fn exports_after_publish(self) -> bool {
        matches!(self, ExportHandler::AfterPublish)
    }

    pub fn related_files(self, settings: &ExportSettings) -> Arc<dyn RelatedFiles> {
        match self {
            ExportHandler::OnDemandHtmlSubtree => {
                Arc::new(RenderedSubtree::new(settings.export_suffix.clone()))
            }
            ExportHandler::AfterPublish | ExportHandler::OnDemand => Arc::new(OwnFileOnly),
        }
    }
}

impl fmt::Display for ExportHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportHandler {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "after-publish" | "after_publish" => Ok(ExportHandler::AfterPublish),
            "on-demand" | "on_demand" => Ok(ExportHandler::OnDemand),
            "on-demand-html-subtree" | "on_demand_html_subtree" => {
                Ok(ExportHandler::OnDemandHtmlSubtree)
            }
            other => Err(format!(
                "unknown export handler `{other}` (expected after-publish, on-demand or on-demand-html-subtree)"
            )),
        }
    }
}

/// Which folder set receives output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputTarget {
    /// Live export folders.
    Export,
    /// Staging folders of a full export.
    Work,
}

impl OutputTarget {
    fn base(self, rule: &RfsRule) -> &Path {
        match self {
            OutputTarget::Export => rule.export_path(),
            OutputTarget::Work => rule.work_path(),
        }
    }

    fn file(self, target: &ExportTarget) -> &PathBuf {
        match self {
            OutputTarget::Export => &target.export_file,
            OutputTarget::Work => &target.work_file,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    pub exported: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl ExportReport {
    pub fn is_clean(&self) -> bool {
        self.errors == 0
    }
}

/// A pending row is identified by its real name and parameters.
type PendingKey = (String, Option<String>);

fn pending_key(row: &PendingTemplate) -> PendingKey {
    (row.rfs_name.clone(), row.parameters.clone())
}

pub struct ExportOrchestrator {
    translator: Arc<PathTranslator>,
    policy: Arc<ExportPolicy>,
    collaborators: ExportCollaborators,
}

impl ExportOrchestrator {
    pub fn new(
        translator: Arc<PathTranslator>,
        policy: Arc<ExportPolicy>,
        collaborators: ExportCollaborators,
    ) -> Self {
        Self {
            translator,
            policy,
            collaborators,
        }
    }

    /// Export the resources of `entries` and everything their pages link to.
    pub async fn export_batch(
        &self,
        entries: &[PublishedEntry],
        output: OutputTarget,
    ) -> ExportReport {
        let started = Instant::now();
        let batch_start = OffsetDateTime::now_utc();
        let mut report = ExportReport::default();

        let previously_exported = self.previously_exported(&mut report).await;
        let templates_found = self
            .export_plain(entries, output, batch_start, &mut report)
            .await;

        if templates_found || !self.translator.settings().plain_export_optimization {
            self.export_templates(output, batch_start, &previously_exported, &mut report)
                .await;
        }

        histogram!(METRIC_EXPORT_MS).record(started.elapsed().as_secs_f64() * 1000.0);
        info!(
            target = "static_export::export",
            entries = entries.len(),
            exported = report.exported,
            skipped = report.skipped,
            errors = report.errors,
            "Export finished"
        );
        report
    }

    async fn previously_exported(&self, report: &mut ExportReport) -> HashSet<PendingKey> {
        let mut seen = HashSet::new();
        for mode in [LinkMode::Parameterless, LinkMode::Parameterized] {
            match self
                .collaborators
                .pending
                .query(mode, OffsetDateTime::UNIX_EPOCH)
                .await
            {
                Ok(rows) => seen.extend(rows.iter().map(pending_key)),
                Err(err) => {
                    report.errors += 1;
                    warn!(
                        target = "static_export::export",
                        mode = mode.as_str(),
                        error = %err,
                        "Reading previously exported links failed"
                    );
                }
            }
        }
        seen
    }

    /// Phase one. Returns whether any entry needs rendering.
    async fn export_plain(
        &self,
        entries: &[PublishedEntry],
        output: OutputTarget,
        batch_start: OffsetDateTime,
        report: &mut ExportReport,
    ) -> bool {
        let mut templates_found = false;

        for entry in entries {
            if entry.is_folder() || entry.state.is_gone() {
                continue;
            }
            let (ctx, vfs_name) = self.translator.context_for(&entry.root_path);
            if !self.policy.is_export_required(&ctx, &vfs_name).await {
                report.skipped += 1;
                continue;
            }

            let resource = match self
                .collaborators
                .tree
                .read_resource(self.translator.export_identity(), &entry.root_path)
                .await
            {
                Ok(resource) => resource,
                Err(err) => {
                    report.skipped += 1;
                    debug!(
                        target = "static_export::export",
                        root_path = %entry.root_path,
                        error = %err,
                        "Skipping unreadable entry"
                    );
                    continue;
                }
            };
            let target = match self.translator.locate(&ctx, &vfs_name, None).await {
                Ok(target) => target,
                Err(err) => {
                    self.record_error(report, &entry.root_path, &err);
                    continue;
                }
            };

            if self
                .collaborators
                .loaders
                .classify(&resource.type_name)
                .is_render_required()
            {
                templates_found = true;
                if let Err(err) = self
                    .collaborators
                    .pending
                    .write(&target.real_name, LinkMode::Parameterless, None, batch_start)
                    .await
                {
                    self.record_error(report, &entry.root_path, &ExportError::from(err));
                }
                continue;
            }

            let result = match self.collaborators.tree.read_content(&entry.root_path).await {
                Ok(body) => self.write(output.file(&target), &body).await,
                Err(err) => Err(ExportError::from_repo(&entry.root_path, err)),
            };
            match result {
                Ok(()) => report.exported += 1,
                Err(err) => self.record_error(report, &entry.root_path, &err),
            }
        }

        templates_found
    }

    /// Phase two: breadth-first rendering over the pending-template table.
    async fn export_templates(
        &self,
        output: OutputTarget,
        batch_start: OffsetDateTime,
        previously_exported: &HashSet<PendingKey>,
        report: &mut ExportReport,
    ) {
        let mut seen: HashSet<PendingKey> = HashSet::new();
        let mut queue: VecDeque<PendingTemplate> = VecDeque::new();
        // Every parameterless template is rendered again; parameterised
        // links only from this batch on.
        let mut parameterless_since = OffsetDateTime::UNIX_EPOCH;
        let mut parameterized_since = batch_start;

        loop {
            let pass_start = OffsetDateTime::now_utc();
            for (mode, since) in [
                (LinkMode::Parameterless, parameterless_since),
                (LinkMode::Parameterized, parameterized_since),
            ] {
                match self.collaborators.pending.query(mode, since).await {
                    Ok(rows) => queue.extend(
                        rows.into_iter()
                            .filter(|row| seen.insert(pending_key(row))),
                    ),
                    Err(err) => {
                        report.errors += 1;
                        warn!(
                            target = "static_export::export",
                            mode = mode.as_str(),
                            error = %err,
                            "Reading pending templates failed"
                        );
                    }
                }
            }
            if queue.is_empty() {
                break;
            }
            parameterless_since = pass_start;
            parameterized_since = pass_start;

            while let Some(row) = queue.pop_front() {
                let links = match self.render_pending(&row, output).await {
                    Ok(links) => {
                        report.exported += 1;
                        links
                    }
                    Err(err)
                        if err.is_not_found()
                            && previously_exported.contains(&pending_key(&row)) =>
                    {
                        report.skipped += 1;
                        debug!(
                            target = "static_export::export",
                            real_name = %row.rfs_name,
                            "Skipping recorded template that no longer exists"
                        );
                        continue;
                    }
                    Err(err) => {
                        self.record_error(report, &row.rfs_name, &err);
                        continue;
                    }
                };
                for link in links {
                    self.record_link(&link, &seen, previously_exported, report)
                        .await;
                }
            }
        }
    }

    async fn render_pending(
        &self,
        row: &PendingTemplate,
        output: OutputTarget,
    ) -> Result<Vec<ExportLink>, ExportError> {
        let (ctx, data) = self.resolve_real_name(&row.rfs_name).await?;
        let file = match row.parameters.as_deref() {
            Some(parameters) => {
                let target = self
                    .translator
                    .locate(&ctx, &data.vfs_name, Some(parameters))
                    .await?;
                output.file(&target).clone()
            }
            None => {
                let rule = self
                    .translator
                    .rules()
                    .match_real_name(&row.rfs_name)
                    .map(|(rule, _)| rule)
                    .ok_or_else(|| ExportError::not_found(&row.rfs_name))?;
                rule.file_in(output.base(rule), data.rfs_name())
            }
        };

        let page = self
            .produce(&ctx, &data, row.parameters.as_deref())
            .await?;
        self.write(&file, &page.body).await?;
        debug!(
            target = "static_export::export",
            real_name = %row.rfs_name,
            links = page.links.len(),
            "Rendered pending template"
        );
        Ok(page.links)
    }

    /// Queue a discovered link unless it is already known.
    async fn record_link(
        &self,
        link: &ExportLink,
        seen: &HashSet<PendingKey>,
        previously_exported: &HashSet<PendingKey>,
        report: &mut ExportReport,
    ) {
        let (ctx, vfs_name) = self.translator.context_for(&link.root_path);
        if !self.policy.is_export_required(&ctx, &vfs_name).await {
            return;
        }
        let target = match self.translator.locate(&ctx, &vfs_name, None).await {
            Ok(target) => target,
            Err(err) => {
                debug!(
                    target = "static_export::export",
                    root_path = %link.root_path,
                    error = %err,
                    "Ignoring untranslatable link"
                );
                return;
            }
        };

        let key = (target.real_name.clone(), link.parameters.clone());
        if seen.contains(&key) || previously_exported.contains(&key) {
            return;
        }
        let mode = LinkMode::for_parameters(link.parameters.as_deref());
        if let Err(err) = self
            .collaborators
            .pending
            .write(
                &target.real_name,
                mode,
                link.parameters.as_deref(),
                OffsetDateTime::now_utc(),
            )
            .await
        {
            self.record_error(report, &link.root_path, &ExportError::from(err));
        }
    }

    /// Reverse-translate `real_name` in whichever site it belongs to.
    pub(crate) async fn resolve_real_name(
        &self,
        real_name: &str,
    ) -> Result<(SiteContext, ExportData), ExportError> {
        let identity = self.translator.export_identity().clone();
        let mut last_error = ExportError::not_found(real_name);
        for site_root in self.translator.site_roots().iter().chain(std::iter::once("")) {
            let ctx = SiteContext::offline(site_root, identity.clone());
            match self.translator.real_to_virtual(&ctx, real_name).await {
                Ok(data) => return Ok((ctx, data)),
                Err(err) if err.is_not_found() => last_error = err,
                Err(err) => return Err(err),
            }
        }
        Err(last_error)
    }

    /// Output of `data`: stored bytes for plain resources, a render otherwise.
    pub(crate) async fn produce(
        &self,
        ctx: &SiteContext,
        data: &ExportData,
        parameters: Option<&str>,
    ) -> Result<RenderedPage, ExportError> {
        let resource = data.resource.as_ref();
        let plain = !data.is_detail_page
            && resource.is_some_and(|resource| {
                !self
                    .collaborators
                    .loaders
                    .classify(&resource.type_name)
                    .is_render_required()
            });
        let root_path = match resource {
            Some(resource) if !data.is_detail_page => resource.root_path.clone(),
            _ => data.root_path.clone(),
        };

        if plain {
            let body = self
                .collaborators
                .tree
                .read_content(&root_path)
                .await
                .map_err(|err| ExportError::from_repo(&root_path, err))?;
            return Ok(RenderedPage {
                body,
                links: Vec::new(),
            });
        }

        let request = RenderRequest {
            root_path,
            parameters: parameters.map(str::to_string),
            site_root: ctx.site_root.clone(),
        };
        Ok(self.collaborators.renderer.render(&request).await?)
    }

    pub(crate) async fn write(&self, file: &Path, body: &[u8]) -> Result<(), ExportError> {
        export_fs::write_file(file, body)
            .await
            .map_err(|err| ExportError::io(file, err))?;
        counter!(METRIC_FILES_WRITTEN).increment(1);
        Ok(())
    }

    fn record_error(&self, report: &mut ExportReport, path: &str, err: &ExportError) {
        report.errors += 1;
        warn!(
            target = "static_export::export",
            path,
            error = %err,
            "Exporting resource failed"
        );
    }
}
