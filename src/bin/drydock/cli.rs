//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Drydock - an incremental build orchestrator for C and C++ target graphs
#[derive(Parser)]
#[command(name = "drydock")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the targets declared in Drydock.toml
    Build(BuildArgs),

    /// Remove the incremental cache and, optionally, build outputs
    Clean(CleanArgs),
}

/// Flags every command can see.
#[derive(Debug, Clone, Copy)]
pub struct GlobalArgs {
    pub verbose: bool,
    pub color: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum MessageFormat {
    /// Log lines and a progress spinner
    #[default]
    Human,
    /// One JSON event per line on stdout
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StampModeArg {
    /// Compare modification times
    Mtime,
    /// Compare content hashes
    Content,
}

#[derive(Args)]
pub struct BuildArgs {
    /// Build only the named targets and their dependencies
    #[arg(short, long)]
    pub target: Vec<String>,

    /// Number of parallel jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// How the incremental cache detects changed inputs
    #[arg(long, value_enum)]
    pub stamp_mode: Option<StampModeArg>,

    /// Reject argument paths that do not exist
    #[arg(long)]
    pub strict_paths: bool,

    /// Ignore the incremental cache and rerun every unit
    #[arg(long)]
    pub force: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = MessageFormat::Human)]
    pub message_format: MessageFormat,

    /// Path to Drydock.toml
    #[arg(long)]
    pub manifest_path: Option<PathBuf>,
}

#[derive(Args)]
pub struct CleanArgs {
    /// Also remove the build directory
    #[arg(long)]
    pub all: bool,

    /// Path to Drydock.toml
    #[arg(long)]
    pub manifest_path: Option<PathBuf>,
}
