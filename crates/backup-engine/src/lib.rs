//! Database backup and recovery engine
//!
//! This crate implements the core of the coldvault backup system:
//! - Snapshot production: consistent dump, gzip compression, content
//!   digest, upload with read-back verification
//! - Tiered retention (daily/weekly/monthly) with calendar-rule
//!   classification and a never-delete-the-newest guarantee
//! - Offsite replication with per-transfer verification and bounded
//!   retries
//! - Health monitoring over the append-only run log
//! - Operator-driven restore with an explicit confirmation gate and
//!   rollback on failure
//! - A store-backed lease serializing backup and restore runs
//!
//! Storage is abstracted behind [`blob_store::ObjectStore`]; the
//! protected database behind [`dump::DatabaseDump`].

pub mod config;
pub mod dump;
pub mod error;
pub mod health;
pub mod lease;
pub mod producer;
pub mod replication;
pub mod restore;
pub mod retention;
pub mod scheduler;
pub mod snapshot;
pub mod sync_log;

pub use config::EngineConfig;
pub use dump::{DatabaseDump, MemoryDatabase, PgConfig, PgDump};
pub use error::{BackupError, BackupResult};
pub use health::{HealthConfig, HealthMonitor, HealthReport, Issue, LogNotifier, Notifier};
pub use lease::{LeaseGuard, LeaseManager};
pub use producer::SnapshotProducer;
pub use replication::{ReplicationResult, ReplicationScheduler};
pub use restore::{RestoreOrchestrator, RestorePhase, RestoreSummary};
pub use retention::{prune, tier_membership, PruneResult, RetentionPolicy, Tier};
pub use scheduler::{BackupScheduler, ScheduleConfig};
pub use snapshot::{Snapshot, SnapshotLocation, SnapshotManifest};
pub use sync_log::{RunKind, SyncLog, SyncRecord};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_wires_the_documented_policy() {
        let config = EngineConfig::default();
        assert_eq!(config.retention.daily_keep, 7);
        assert_eq!(config.retention.weekly_keep, 4);
        assert_eq!(config.retention.monthly_keep, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn public_surface_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}

        assert_send_sync::<BackupError>();
        assert_send_sync::<Snapshot>();
        assert_send_sync::<EngineConfig>();
        assert_send_sync::<SyncRecord>();
    }
}
