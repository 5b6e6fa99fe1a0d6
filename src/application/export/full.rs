//! Export of the whole content tree through staging folders.

use std::collections::HashSet;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::application::error::ExportError;
use crate::application::scrub::ScrubEngine;
use crate::domain::types::LinkMode;
use crate::infra::fs as export_fs;

use super::{ExportOrchestrator, ExportReport, OutputTarget};

/// Export and work folder of one rule, with its backup depth.
struct Destination {
    export_path: PathBuf,
    work_path: PathBuf,
    backup_count: u32,
}

impl ExportOrchestrator {
    /// Render the whole tree into the work folders and swap them in.
    ///
    /// The live folders are only replaced when the export reported no error.
    /// With `purge_first` the live folders are emptied before rendering.
    pub async fn run_full_export(
        &self,
        scrub: &ScrubEngine,
        purge_first: bool,
    ) -> Result<ExportReport, ExportError> {
        let destinations = self.destinations();

        for destination in &destinations {
            export_fs::remove_tree(&destination.work_path)
                .await
                .map_err(|err| ExportError::io(&destination.work_path, err))?;
            if purge_first {
                export_fs::remove_tree(&destination.export_path)
                    .await
                    .map_err(|err| ExportError::io(&destination.export_path, err))?;
                info!(
                    target = "static_export::export",
                    export_path = %destination.export_path.display(),
                    "Purged export folder"
                );
            }
        }

        for mode in [LinkMode::Parameterless, LinkMode::Parameterized] {
            self.collaborators.pending.delete_all(mode).await?;
        }

        let worklist = scrub.scrub(None).await?;
        let report = self.export_batch(&worklist.entries, OutputTarget::Work).await;
        if !report.is_clean() {
            warn!(
                target = "static_export::export",
                errors = report.errors,
                "Full export reported errors, live folders left untouched"
            );
            return Ok(report);
        }

        for destination in &destinations {
            if !export_fs::exists(&destination.work_path)
                .await
                .map_err(|err| ExportError::io(&destination.work_path, err))?
            {
                continue;
            }
            export_fs::rotate_backups(&destination.export_path, destination.backup_count)
                .await
                .map_err(|err| ExportError::io(&destination.export_path, err))?;
            export_fs::promote(&destination.work_path, &destination.export_path)
                .await
                .map_err(|err| ExportError::io(&destination.export_path, err))?;
            info!(
                target = "static_export::export",
                export_path = %destination.export_path.display(),
                backups = destination.backup_count,
                "Published full export"
            );
        }

        Ok(report)
    }

    /// One destination per distinct export folder, in rule order.
    fn destinations(&self) -> Vec<Destination> {
        let mut seen = HashSet::new();
        self.translator
            .rules()
            .iter()
            .filter(|rule| seen.insert(rule.export_path().to_path_buf()))
            .map(|rule| Destination {
                export_path: rule.export_path().to_path_buf(),
                work_path: rule.work_path().to_path_buf(),
                backup_count: rule.backup_count(),
            })
            .collect()
    }
}
