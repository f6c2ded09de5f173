//! CLI structure and argument parsing

use crate::commands::Commands;
use clap::Parser;

/// coldvault - database backup and recovery
#[derive(Debug, Parser)]
#[command(name = "coldvault")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Commands
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}
