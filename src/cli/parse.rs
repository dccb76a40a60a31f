//! CLI parse: clap types for revdoc. No behavior; definitions only.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// revdoc CLI - revisioned document store
#[derive(Parser)]
#[command(name = "revdoc")]
#[command(about = "Revisioned JSON document store with conflict resolution")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (for config/config.toml lookup)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Store directory (overrides storage.path)
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the current revision of a document
    Get {
        id: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Set properties on a document and save it
    Set {
        id: String,
        /// key=value pairs; values are parsed as JSON, falling back to a plain string
        #[arg(required = true)]
        assignments: Vec<String>,
        /// Edit on top of this revision instead of the current one
        #[arg(long)]
        base: Option<String>,
        /// How to resolve a conflict with the stored revision
        #[arg(long, value_enum, default_value_t = ResolverChoice::Generation)]
        resolver: ResolverChoice,
    },
    /// Delete a document (commits a tombstone)
    Delete { id: String },
    /// Remove every trace of a document
    Purge { id: String },
    /// Count live documents
    Count,
    /// Show database and store summary
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResolverChoice {
    /// Default: the side that is not behind wins
    Generation,
    LocalWins,
    RemoteWins,
    /// Fail on any conflict
    Reject,
    /// Per-key merge against the common ancestor
    ThreeWay,
}
