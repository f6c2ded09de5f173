//! coldvault - database backup and recovery CLI

use clap::Parser;
use coldvault_cli::{Cli, CliConfig, Result};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Load configuration and execute
    let config = CliConfig::load(cli.config.as_deref())?;
    cli.command.execute(config).await
}
