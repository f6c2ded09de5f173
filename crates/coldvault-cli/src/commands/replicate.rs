//! Manual offsite replication trigger

use crate::{output, CliConfig, Result};
use backup_engine::ReplicationScheduler;
use chrono::Utc;
use clap::Args;

#[derive(Debug, Clone, Args)]
pub struct ReplicateArgs {}

pub async fn execute(_args: ReplicateArgs, config: CliConfig) -> Result<()> {
    config.engine.validate()?;
    let primary = super::primary_store(&config);
    let offsite = super::offsite_store(&config);

    output::info("Starting offsite replication");
    let scheduler = ReplicationScheduler::new(primary, offsite, &config.engine);
    let result = scheduler.replicate(Utc::now()).await?;

    if result.transferred.is_empty() && result.failed.is_empty() && result.skipped.is_empty() {
        output::info("Nothing to transfer; offsite copy is current");
        return Ok(());
    }

    for id in &result.transferred {
        output::bullet(&format!("transferred {id}"));
    }
    for id in &result.skipped {
        output::warn(&format!("skipped {id}: primary copy already pruned"));
    }
    for (id, error) in &result.failed {
        output::error(&format!("failed {id}: {error}"));
    }

    if result.failed.is_empty() {
        output::success(&format!(
            "Replicated {} snapshot(s) offsite",
            result.transferred.len()
        ));
    } else {
        anyhow::bail!(
            "{} of {} transfers failed; they will be retried on the next run",
            result.failed.len(),
            result.failed.len() + result.transferred.len()
        );
    }

    Ok(())
}
