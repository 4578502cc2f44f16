//! CLI parse: clap types for pagesmith. No behavior; definitions only.

use crate::generation::pool::ExecutionMode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// pagesmith - generate site content from a page plan
#[derive(Parser)]
#[command(name = "pagesmith")]
#[command(about = "Generate site pages from a plan with a rate-limited completion provider")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate every pending page of a plan
    Run {
        /// Plan file (JSON)
        #[arg(long)]
        plan: PathBuf,
        /// Execution mode
        #[arg(long, value_enum)]
        mode: Option<ExecutionMode>,
        /// Generate without writing artifacts or saving the plan
        #[arg(long)]
        dry_run: bool,
        /// Regenerate pages whose files already exist
        #[arg(long)]
        overwrite: bool,
        /// Stop the run at the first failed page
        #[arg(long)]
        stop_on_error: bool,
    },
    /// Show plan progress
    Status {
        /// Plan file (JSON)
        #[arg(long)]
        plan: PathBuf,
    },
    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
}
