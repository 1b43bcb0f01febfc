//! Command-line flags. Each flag overrides the matching environment variable.

use std::path::PathBuf;

use clap::Parser;

/// Mirror records changed in the source repository into the target repository.
#[derive(Debug, Default, Parser)]
#[command(name = "mirrorsyncd")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Base URL of the target repository
    #[arg(long, value_name = "URL")]
    pub target_url: Option<String>,

    /// Target collection new records are created in
    #[arg(long, value_name = "ALIAS")]
    pub collection: Option<String>,

    /// Name of the environment variable holding the target API key
    #[arg(long, value_name = "VAR")]
    pub api_key_env: Option<String>,

    /// Institutional filter (ROR identifier) for the change listing
    #[arg(long, value_name = "ROR")]
    pub affiliation: Option<String>,

    /// Path of the SQLite ledger
    #[arg(long, value_name = "PATH")]
    pub ledger: Option<PathBuf>,

    /// Classify and diff only; write nothing
    #[arg(long)]
    pub dry_run: bool,

    /// External ids to skip (repeatable)
    #[arg(long, value_name = "ID", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Warn when at least this many records are due in one cycle
    #[arg(long, value_name = "N")]
    pub warn_threshold: Option<usize>,

    /// Log filter directive, e.g. `info` or `mirrorsync_reconcile=debug`
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,
}
