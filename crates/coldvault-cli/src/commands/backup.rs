//! Manual backup trigger

use crate::{output, CliConfig, Result};
use backup_engine::{retention, SnapshotProducer};
use clap::Args;

#[derive(Debug, Clone, Args)]
pub struct BackupArgs {
    /// Skip the retention pass after the backup
    #[arg(long)]
    pub no_prune: bool,
}

pub async fn execute(args: BackupArgs, config: CliConfig) -> Result<()> {
    config.engine.validate()?;
    let store = super::primary_store(&config);
    let database = super::database()?;

    output::info("Starting database backup");
    let producer = SnapshotProducer::new(store.clone(), database, &config.engine);
    let snapshot = producer.produce().await?;

    output::success("Backup completed");
    output::kv("snapshot", &snapshot.id);
    output::kv("created", &snapshot.created_at.to_rfc3339());
    output::kv("size", &format!("{} bytes", snapshot.size_bytes));
    if let Some(digest) = &snapshot.digest {
        output::kv("digest", digest);
    }

    if args.no_prune {
        return Ok(());
    }

    let pruned = retention::prune(&*store, &config.engine.retention).await?;
    if !pruned.deleted.is_empty() {
        output::info(&format!(
            "Retention: deleted {} expired snapshot(s), kept {}",
            pruned.deleted.len(),
            pruned.kept.len()
        ));
    }
    for (id, error) in &pruned.failed {
        output::warn(&format!("Could not delete {id}: {error}"));
    }

    Ok(())
}
