//! Command-line interface definitions.
//!
//! # Example
//!
//! ```bash
//! # Queue a folder for tenant firm-1 and print the table
//! queuedupe ingest ~/matters/smith --tenant firm-1
//!
//! # Fast prefilter ingestion, verified afterwards, JSON output
//! queuedupe ingest ~/matters --mode prefilter --output json
//!
//! # Run the hash worker protocol on a set of files
//! queuedupe worker a.pdf b.pdf
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::duplicates::IngestMode;
use crate::scanner::HashAlgorithm;

/// Deduplicating upload queue.
///
/// Files are sorted into ready, copy, and duplicate rows using a size
/// shortcut, a tenant-scoped metadata digest, and a content digest, then
/// tentative rows are verified in the background.
#[derive(Debug, Parser)]
#[command(name = "queuedupe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Report errors as structured JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Add files to an upload queue and print the result
    Ingest(IngestArgs),
    /// Classify files with the hash worker protocol
    Worker(WorkerArgs),
}

/// Arguments for the ingest subcommand.
#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Files or directories to queue
    #[arg(value_name = "PATH", required = true, num_args = 1..)]
    pub paths: Vec<PathBuf>,

    /// Tenant the upload belongs to
    #[arg(long, value_name = "ID", env = "QUEUEDUPE_TENANT_ID")]
    pub tenant: Option<String>,

    /// How colliding sizes are resolved
    #[arg(long, value_enum)]
    pub mode: Option<IngestMode>,

    /// Content digest algorithm
    #[arg(long, value_enum)]
    pub algorithm: Option<HashAlgorithm>,

    /// Files materialized before the first paint
    #[arg(long, value_name = "N")]
    pub phase1_size: Option<usize>,

    /// Files per Phase 2 batch
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Number of I/O threads for hashing
    #[arg(long, value_name = "N")]
    pub io_threads: Option<usize>,

    /// Skip the verification pass for tentative rows
    #[arg(long)]
    pub no_verify: bool,

    /// Only print rows that will be uploaded
    #[arg(long)]
    pub hide_duplicates: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub output: OutputFormat,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,

    /// Follow symbolic links while collecting files
    #[arg(long)]
    pub follow_symlinks: bool,
}

/// Arguments for the worker subcommand.
#[derive(Debug, Args)]
pub struct WorkerArgs {
    /// Files or directories to classify
    #[arg(value_name = "PATH", required_unless_present = "health_check", num_args = 1..)]
    pub paths: Vec<PathBuf>,

    /// Only probe the worker and print the health response
    #[arg(long)]
    pub health_check: bool,

    /// Content digest algorithm
    #[arg(long, value_enum)]
    pub algorithm: Option<HashAlgorithm>,

    /// Print compact JSON
    #[arg(long)]
    pub compact: bool,
}

/// Output format for queue results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Coloured terminal table
    Table,
    /// JSON for scripting
    Json,
    /// CSV for spreadsheets
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}
