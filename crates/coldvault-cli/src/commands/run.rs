//! Long-running scheduler mode

use crate::{output, CliConfig, Result};
use backup_engine::{
    BackupScheduler, HealthMonitor, LogNotifier, ReplicationScheduler, SnapshotProducer,
};
use clap::Args;
use std::sync::Arc;

#[derive(Debug, Clone, Args)]
pub struct RunArgs {}

pub async fn execute(_args: RunArgs, config: CliConfig) -> Result<()> {
    config.engine.validate()?;
    let primary = super::primary_store(&config);
    let offsite = super::offsite_store(&config);
    let database = super::database()?;

    let producer = Arc::new(SnapshotProducer::new(
        Arc::clone(&primary),
        database,
        &config.engine,
    ));
    let replication = Arc::new(ReplicationScheduler::new(
        Arc::clone(&primary),
        Arc::clone(&offsite),
        &config.engine,
    ));
    let monitor = Arc::new(HealthMonitor::new(Arc::clone(&primary), &config.engine));

    let scheduler = BackupScheduler::new(
        producer,
        replication,
        monitor,
        Arc::new(LogNotifier),
        Arc::clone(&primary),
        Arc::clone(&offsite),
        config.engine.retention,
        config.engine.schedule,
    );

    scheduler.start();
    output::info("Scheduler running; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    scheduler.shutdown();
    output::success("Scheduler stopped");
    Ok(())
}
