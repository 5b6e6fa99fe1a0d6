use std::{process, sync::Arc};

use serde_json::json;
use static_export::{
    application::{error::ExportError, manager::StaticExportManager},
    config::{self, Command, LoadError},
    domain::entities::{Identity, SiteContext},
    infra::{
        archive::{self, ArchiveError},
        db::PostgresSideTables,
        error::InfraError,
        memory::MemoryBackend,
        telemetry,
    },
};
use thiserror::Error;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[derive(Debug, Error)]
enum RunError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &RunError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), RunError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    let backend = archive::load_file(cli_args.command.archive()).await?;
    let manager = build_manager(&settings, &backend).await?;

    match cli_args.command {
        Command::Export(args) => run_export(&manager, args.purge).await,
        Command::Translate(args) => {
            let ctx = context(&settings, &manager, args.site_root);
            let real_name = manager
                .virtual_to_real(&ctx, &args.vfs_path, args.params.as_deref())
                .await?;
            println!("{real_name}");
            Ok(())
        }
        Command::Resolve(args) => {
            let ctx = context(&settings, &manager, args.site_root);
            let data = manager.real_to_virtual(&ctx, &args.real_path).await?;
            let output = json!({
                "vfs_name": data.vfs_name,
                "root_path": data.root_path,
                "rfs_name": data.rfs_name(),
                "parameters": data.parameters,
                "is_detail_page": data.is_detail_page,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
    }
}

async fn run_export(manager: &StaticExportManager, purge: bool) -> Result<(), RunError> {
    info!(
        target = "static_export::cli",
        purge,
        export_path = %manager.settings().export_path.display(),
        "Starting full export"
    );
    let report = manager.run_full_export(purge).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_clean() {
        return Err(RunError::Export(ExportError::configuration(format!(
            "export finished with {} error(s)",
            report.errors
        ))));
    }
    Ok(())
}

/// Side tables live in Postgres when a database is configured, in memory otherwise.
async fn build_manager(
    settings: &config::Settings,
    backend: &MemoryBackend,
) -> Result<StaticExportManager, RunError> {
    let collaborators = match settings.database.url.as_deref() {
        Some(url) => {
            let pool = PostgresSideTables::connect(url, settings.database.max_connections.get())
                .await
                .map_err(|err| InfraError::database(err.to_string()))?;
            PostgresSideTables::run_migrations(&pool)
                .await
                .map_err(|err| InfraError::database(err.to_string()))?;
            let tables = Arc::new(PostgresSideTables::new(pool));
            tables
                .health_check()
                .await
                .map_err(|err| InfraError::database(err.to_string()))?;
            info!(target = "static_export::cli", "Using Postgres side tables");
            backend.collaborators_with(tables.clone(), tables)
        }
        None => backend.collaborators(),
    };
    Ok(StaticExportManager::from_settings(settings, collaborators)?)
}

fn context(
    settings: &config::Settings,
    manager: &StaticExportManager,
    site_root: Option<String>,
) -> SiteContext {
    let site_root = site_root
        .or_else(|| manager.translator().site_roots().iter().next().map(str::to_string))
        .unwrap_or_default();
    SiteContext::offline(site_root, Identity::new(settings.export.export_user.clone()))
}
