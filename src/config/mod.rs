//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::NonZeroU32,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::export::ExportHandler;
use crate::application::translator::LinkStrategy;

mod cli;

pub use cli::{CliArgs, Command, CommonOverrides, ExportArgs, ResolveArgs, TranslateArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "static-export";
const ENV_PREFIX: &str = "STATIC_EXPORT";
const DEFAULT_EXPORT_PATH: &str = "export";
const DEFAULT_WORK_PATH: &str = "export-work";
const DEFAULT_RFS_PREFIX: &str = "/export";
const DEFAULT_EXPORT_SUFFIX: &str = ".html";
const DEFAULT_EXPORT_USER: &str = "Export";
const DEFAULT_SITE_ROOT: &str = "/sites/default";
const DEFAULT_BUSY_POLL_MS: u64 = 1_000;
const DEFAULT_BUSY_MAX_POLLS: u32 = 60;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 4;
const DEFAULT_EXPORT_DATA_LIMIT: usize = 2_048;
const DEFAULT_EXPORT_FLAG_LIMIT: usize = 2_048;
const DEFAULT_SECURE_FLAG_LIMIT: usize = 2_048;
const DEFAULT_SUFFIXES: &[&str] = &[
    ".css", ".js", ".jpg", ".jpeg", ".gif", ".png", ".svg", ".ico", ".pdf", ".txt", ".zip",
];
const DEFAULT_TEMPLATE_SUFFIXES: &[&str] = &[".jsp"];
const DEFAULT_FILES: &[&str] = &["index.html", "index.htm"];

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub export: ExportSettings,
    pub rules: Vec<RuleSettings>,
    pub cache: CacheSettings,
    pub database: DatabaseSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// Global export behaviour shared by every rule.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub enabled: bool,
    pub handler: ExportHandler,
    pub strategy: LinkStrategy,
    /// Folder the default rule writes to.
    pub export_path: PathBuf,
    /// Folder a full export of the default rule is staged in.
    pub work_path: PathBuf,
    /// Installation folder of the application itself; never exported into.
    pub install_path: Option<PathBuf>,
    /// Link prefix of exported names, without trailing slash.
    pub rfs_prefix: String,
    /// Link prefix of dynamically served names, without trailing slash.
    pub vfs_prefix: String,
    pub backup_count: u32,
    pub default_export: bool,
    /// Suffixes exported when `default_export` is off and no attribute decides.
    pub default_suffixes: Vec<String>,
    pub export_suffix: String,
    pub template_suffixes: Vec<String>,
    /// Folder default documents, first entry names exported folder requests.
    pub default_files: Vec<String>,
    pub plain_export_optimization: bool,
    pub relative_links: bool,
    pub export_user: String,
    pub site_roots: Vec<String>,
    pub busy_poll: Duration,
    pub busy_max_polls: u32,
}

impl ExportSettings {
    pub fn default_file(&self) -> &str {
        self.default_files
            .first()
            .map(String::as_str)
            .unwrap_or("index.html")
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            handler: ExportHandler::default(),
            strategy: LinkStrategy::default(),
            export_path: PathBuf::from(DEFAULT_EXPORT_PATH),
            work_path: PathBuf::from(DEFAULT_WORK_PATH),
            install_path: None,
            rfs_prefix: DEFAULT_RFS_PREFIX.to_string(),
            vfs_prefix: String::new(),
            backup_count: 0,
            default_export: true,
            default_suffixes: to_strings(DEFAULT_SUFFIXES),
            export_suffix: DEFAULT_EXPORT_SUFFIX.to_string(),
            template_suffixes: to_strings(DEFAULT_TEMPLATE_SUFFIXES),
            default_files: to_strings(DEFAULT_FILES),
            plain_export_optimization: true,
            relative_links: false,
            export_user: DEFAULT_EXPORT_USER.to_string(),
            site_roots: vec![DEFAULT_SITE_ROOT.to_string()],
            busy_poll: Duration::from_millis(DEFAULT_BUSY_POLL_MS),
            busy_max_polls: DEFAULT_BUSY_MAX_POLLS,
        }
    }
}

/// One explicit export rule, in configured order.
#[derive(Debug, Clone)]
pub struct RuleSettings {
    pub name: String,
    /// Regex over the full virtual root path.
    pub source: String,
    pub rfs_prefix: String,
    pub export_path: PathBuf,
    pub work_path: PathBuf,
    pub backup_count: u32,
    /// `None` inherits the global setting.
    pub relative_links: Option<bool>,
    pub related_system: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub export_data_limit: usize,
    pub export_flag_limit: usize,
    pub secure_flag_limit: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            export_data_limit: DEFAULT_EXPORT_DATA_LIMIT,
            export_flag_limit: DEFAULT_EXPORT_FLAG_LIMIT,
            secure_flag_limit: DEFAULT_SECURE_FLAG_LIMIT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(cli.command.overrides());

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    export: RawExportSettings,
    rules: Vec<RawRuleSettings>,
    cache: RawCacheSettings,
    database: RawDatabaseSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &CommonOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(path) = overrides.export_path.as_ref() {
            self.export.export_path = Some(path.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            export,
            rules,
            cache,
            database,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let export = build_export_settings(export)?;
        let rules = build_rule_settings(rules, &export)?;
        let cache = build_cache_settings(cache);
        let database = build_database_settings(database)?;

        Ok(Self {
            logging,
            export,
            rules,
            cache,
            database,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_export_settings(export: RawExportSettings) -> Result<ExportSettings, LoadError> {
    let defaults = ExportSettings::default();

    let handler = match export.handler {
        Some(value) => ExportHandler::from_str(&value)
            .map_err(|reason| LoadError::invalid("export.handler", reason))?,
        None => defaults.handler,
    };

    let locales: Vec<String> = export
        .locales
        .unwrap_or_default()
        .into_iter()
        .map(|locale| locale.trim().to_string())
        .filter(|locale| !locale.is_empty())
        .collect();
    let strategy = match export.strategy.as_deref().map(str::trim) {
        None | Some("default") => LinkStrategy::Default,
        Some("locale-folders") => {
            if locales.is_empty() {
                return Err(LoadError::invalid(
                    "export.locales",
                    "the locale-folders strategy needs at least one locale",
                ));
            }
            LinkStrategy::LocaleFolders { locales }
        }
        Some(other) => {
            return Err(LoadError::invalid(
                "export.strategy",
                format!("unknown link strategy `{other}`"),
            ));
        }
    };

    let export_path = export.export_path.unwrap_or(defaults.export_path);
    ensure_not_empty(&export_path, "export.export_path")?;
    let work_path = export.work_path.unwrap_or(defaults.work_path);
    ensure_not_empty(&work_path, "export.work_path")?;
    if work_path == export_path {
        return Err(LoadError::invalid(
            "export.work_path",
            "work folder must differ from the export folder",
        ));
    }

    let install_path = export
        .install_path
        .filter(|path| !path.as_os_str().is_empty());
    if let Some(install) = install_path.as_ref() {
        ensure_outside_install(&export_path, install, "export.export_path")?;
        ensure_outside_install(&work_path, install, "export.work_path")?;
    }

    let busy_poll_ms = export.busy_poll_ms.unwrap_or(DEFAULT_BUSY_POLL_MS);
    if busy_poll_ms == 0 {
        return Err(LoadError::invalid(
            "export.busy_poll_ms",
            "must be greater than zero",
        ));
    }
    let busy_max_polls = export.busy_max_polls.unwrap_or(DEFAULT_BUSY_MAX_POLLS);

    let default_files = match export.default_files {
        Some(files) => {
            let files: Vec<String> = files
                .into_iter()
                .map(|file| file.trim().trim_matches('/').to_string())
                .filter(|file| !file.is_empty())
                .collect();
            if files.is_empty() {
                return Err(LoadError::invalid(
                    "export.default_files",
                    "at least one default file is required",
                ));
            }
            files
        }
        None => defaults.default_files,
    };

    let site_roots = export
        .site_roots
        .map(|roots| {
            roots
                .into_iter()
                .map(|root| root.trim().trim_end_matches('/').to_string())
                .collect()
        })
        .unwrap_or(defaults.site_roots);

    Ok(ExportSettings {
        enabled: export.enabled.unwrap_or(defaults.enabled),
        handler,
        strategy,
        export_path,
        work_path,
        install_path,
        rfs_prefix: export
            .rfs_prefix
            .map(|prefix| normalize_prefix(&prefix))
            .unwrap_or(defaults.rfs_prefix),
        vfs_prefix: export
            .vfs_prefix
            .map(|prefix| normalize_prefix(&prefix))
            .unwrap_or(defaults.vfs_prefix),
        backup_count: export.backup_count.unwrap_or(defaults.backup_count),
        default_export: export.default_export.unwrap_or(defaults.default_export),
        default_suffixes: export
            .default_suffixes
            .map(|suffixes| suffixes.iter().map(|s| normalize_suffix(s)).collect())
            .unwrap_or(defaults.default_suffixes),
        export_suffix: export
            .export_suffix
            .map(|suffix| normalize_suffix(&suffix))
            .filter(|suffix| suffix.len() > 1)
            .unwrap_or(defaults.export_suffix),
        template_suffixes: export
            .template_suffixes
            .map(|suffixes| suffixes.iter().map(|s| normalize_suffix(s)).collect())
            .unwrap_or(defaults.template_suffixes),
        default_files,
        plain_export_optimization: export
            .plain_export_optimization
            .unwrap_or(defaults.plain_export_optimization),
        relative_links: export.relative_links.unwrap_or(defaults.relative_links),
        export_user: export
            .export_user
            .map(|user| user.trim().to_string())
            .filter(|user| !user.is_empty())
            .unwrap_or(defaults.export_user),
        site_roots,
        busy_poll: Duration::from_millis(busy_poll_ms),
        busy_max_polls,
    })
}

fn build_rule_settings(
    rules: Vec<RawRuleSettings>,
    export: &ExportSettings,
) -> Result<Vec<RuleSettings>, LoadError> {
    rules
        .into_iter()
        .enumerate()
        .map(|(index, rule)| {
            let source = rule
                .source
                .filter(|source| !source.trim().is_empty())
                .ok_or_else(|| {
                    LoadError::invalid("rules.source", format!("rule #{index} has no source"))
                })?;
            Regex::new(&source).map_err(|err| {
                LoadError::invalid("rules.source", format!("`{source}` is not a regex: {err}"))
            })?;
            for pattern in &rule.related_system {
                Regex::new(pattern).map_err(|err| {
                    LoadError::invalid(
                        "rules.related_system",
                        format!("`{pattern}` is not a regex: {err}"),
                    )
                })?;
            }

            let export_path = rule
                .export_path
                .unwrap_or_else(|| export.export_path.clone());
            ensure_not_empty(&export_path, "rules.export_path")?;
            let work_path = rule.work_path.unwrap_or_else(|| export.work_path.clone());
            if let Some(install) = export.install_path.as_ref() {
                ensure_outside_install(&export_path, install, "rules.export_path")?;
                ensure_outside_install(&work_path, install, "rules.work_path")?;
            }

            Ok(RuleSettings {
                name: rule.name.unwrap_or_else(|| format!("rule-{index}")),
                source,
                rfs_prefix: rule
                    .rfs_prefix
                    .map(|prefix| normalize_prefix(&prefix))
                    .unwrap_or_else(|| export.rfs_prefix.clone()),
                export_path,
                work_path,
                backup_count: rule.backup_count.unwrap_or(export.backup_count),
                relative_links: rule.relative_links,
                related_system: rule.related_system,
            })
        })
        .collect()
}

fn build_cache_settings(cache: RawCacheSettings) -> CacheSettings {
    let defaults = CacheSettings::default();
    CacheSettings {
        export_data_limit: cache.export_data_limit.unwrap_or(defaults.export_data_limit),
        export_flag_limit: cache.export_flag_limit.unwrap_or(defaults.export_flag_limit),
        secure_flag_limit: cache.secure_flag_limit.unwrap_or(defaults.secure_flag_limit),
    }
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let value = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = non_zero_u32(value.into(), "database.max_connections")?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawExportSettings {
    enabled: Option<bool>,
    handler: Option<String>,
    strategy: Option<String>,
    locales: Option<Vec<String>>,
    export_path: Option<PathBuf>,
    work_path: Option<PathBuf>,
    install_path: Option<PathBuf>,
    rfs_prefix: Option<String>,
    vfs_prefix: Option<String>,
    backup_count: Option<u32>,
    default_export: Option<bool>,
    default_suffixes: Option<Vec<String>>,
    export_suffix: Option<String>,
    template_suffixes: Option<Vec<String>>,
    default_files: Option<Vec<String>>,
    plain_export_optimization: Option<bool>,
    relative_links: Option<bool>,
    export_user: Option<String>,
    site_roots: Option<Vec<String>>,
    busy_poll_ms: Option<u64>,
    busy_max_polls: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRuleSettings {
    name: Option<String>,
    source: Option<String>,
    rfs_prefix: Option<String>,
    export_path: Option<PathBuf>,
    work_path: Option<PathBuf>,
    backup_count: Option<u32>,
    relative_links: Option<bool>,
    related_system: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    export_data_limit: Option<usize>,
    export_flag_limit: Option<usize>,
    secure_flag_limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn ensure_not_empty(path: &Path, key: &'static str) -> Result<(), LoadError> {
    if path.as_os_str().is_empty() {
        return Err(LoadError::invalid(key, "path must not be empty"));
    }
    Ok(())
}

fn ensure_outside_install(path: &Path, install: &Path, key: &'static str) -> Result<(), LoadError> {
    if path == install || install.starts_with(path) {
        return Err(LoadError::invalid(
            key,
            format!(
                "`{}` would overwrite the installation folder `{}`",
                path.display(),
                install.display()
            ),
        ));
    }
    Ok(())
}

/// `export/` and `/export` both become `/export`; an empty prefix stays empty.
fn normalize_prefix(value: &str) -> String {
    let trimmed = value.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

fn normalize_suffix(value: &str) -> String {
    let trimmed = value.trim().to_ascii_lowercase();
    if trimmed.starts_with('.') {
        trimmed
    } else {
        format!(".{trimmed}")
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[cfg(test)]
mod tests;
