//! Health report command

use crate::{output, CliConfig, Result};
use backup_engine::HealthMonitor;
use chrono::Utc;
use clap::Args;

#[derive(Debug, Clone, Args)]
pub struct HealthArgs {
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: HealthArgs, config: CliConfig) -> Result<()> {
    config.engine.validate()?;
    let store = super::primary_store(&config);

    let monitor = HealthMonitor::new(store, &config.engine);
    let report = monitor.check(Utc::now()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        if !report.ok {
            std::process::exit(1);
        }
        return Ok(());
    }

    if report.ok {
        output::success("Backup health check passed");
        return Ok(());
    }

    output::error("Backup issues detected");
    for issue in &report.issues {
        output::bullet(&issue.to_string());
    }
    anyhow::bail!("{} issue(s) found", report.issues.len());
}
