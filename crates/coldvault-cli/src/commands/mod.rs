//! Command implementations

pub mod backup;
pub mod health;
pub mod list;
pub mod replicate;
pub mod restore;
pub mod run;

use crate::{CliConfig, Result};
use backup_engine::{DatabaseDump, PgConfig, PgDump};
use blob_store::{FsStore, ObjectStore};
use clap::Subcommand;
use std::sync::Arc;

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Create a snapshot of the protected database now
    Backup(backup::BackupArgs),

    /// Transfer recent snapshots to the offsite store now
    Replicate(replicate::ReplicateArgs),

    /// List the snapshots held by both stores
    List(list::ListArgs),

    /// Check backup health and print the report
    Health(health::HealthArgs),

    /// Restore a snapshot, replacing the live database
    Restore(restore::RestoreArgs),

    /// Run the periodic backup, replication, and health schedules
    Run(run::RunArgs),
}

impl Commands {
    pub async fn execute(self, config: CliConfig) -> Result<()> {
        match self {
            Commands::Backup(args) => backup::execute(args, config).await,
            Commands::Replicate(args) => replicate::execute(args, config).await,
            Commands::List(args) => list::execute(args, config).await,
            Commands::Health(args) => health::execute(args, config).await,
            Commands::Restore(args) => restore::execute(args, config).await,
            Commands::Run(args) => run::execute(args, config).await,
        }
    }
}

/// Primary store from the configured root.
pub(crate) fn primary_store(config: &CliConfig) -> Arc<dyn ObjectStore> {
    Arc::new(FsStore::new(&config.primary_root))
}

/// Offsite store from the configured root.
pub(crate) fn offsite_store(config: &CliConfig) -> Arc<dyn ObjectStore> {
    Arc::new(FsStore::new(&config.offsite_root))
}

/// The protected database, from the standard PG* environment.
pub(crate) fn database() -> Result<Arc<dyn DatabaseDump>> {
    let config = PgConfig::from_env()?;
    Ok(Arc::new(PgDump::new(config)))
}
