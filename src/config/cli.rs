use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the static-export binary.
#[derive(Debug, Parser)]
#[command(
    name = "static-export",
    version,
    about = "Export a content tree to static files"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "STATIC_EXPORT_CONFIG_FILE",
        value_name = "PATH"
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a full export of a content archive.
    Export(ExportArgs),
    /// Print the real name of a virtual path.
    Translate(TranslateArgs),
    /// Print the virtual path behind a real name.
    Resolve(ResolveArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct CommonOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the folder exported files are written to.
    #[arg(long = "export-path", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub export_path: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct ExportArgs {
    #[command(flatten)]
    pub overrides: CommonOverrides,

    /// Remove the current export folders before exporting.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub purge: bool,

    /// Content archive to export.
    #[arg(value_name = "ARCHIVE", value_hint = ValueHint::FilePath)]
    pub archive: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct TranslateArgs {
    #[command(flatten)]
    pub overrides: CommonOverrides,

    #[arg(value_name = "ARCHIVE", value_hint = ValueHint::FilePath)]
    pub archive: PathBuf,

    /// Site-relative virtual path, e.g. `/news/index.html`.
    #[arg(value_name = "VFS_PATH")]
    pub vfs_path: String,

    /// Query string appended to the link.
    #[arg(long = "params", value_name = "QUERY")]
    pub params: Option<String>,

    /// Site root the path belongs to.
    #[arg(long = "site-root", value_name = "ROOT")]
    pub site_root: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub overrides: CommonOverrides,

    #[arg(value_name = "ARCHIVE", value_hint = ValueHint::FilePath)]
    pub archive: PathBuf,

    /// Real name including the export prefix, e.g. `/export/news/index.html`.
    #[arg(value_name = "REAL_PATH")]
    pub real_path: String,

    #[arg(long = "site-root", value_name = "ROOT")]
    pub site_root: Option<String>,
}

impl Command {
    pub fn overrides(&self) -> &CommonOverrides {
        match self {
            Command::Export(args) => &args.overrides,
            Command::Translate(args) => &args.overrides,
            Command::Resolve(args) => &args.overrides,
        }
    }

    pub fn archive(&self) -> &PathBuf {
        match self {
            Command::Export(args) => &args.archive,
            Command::Translate(args) => &args.archive,
            Command::Resolve(args) => &args.archive,
        }
    }
}
