//! Periodic triggers
//!
//! Three independent loops: backup plus primary pruning, offsite
//! replication plus offsite pruning, and the health check. Triggering is
//! at-least-once; every driven operation is idempotent or lease guarded,
//! so a double fire is harmless.

use blob_store::ObjectStore;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::error::BackupError;
use crate::health::{HealthMonitor, Notifier};
use crate::producer::SnapshotProducer;
use crate::replication::ReplicationScheduler;
use crate::retention::{self, RetentionPolicy};

/// Trigger intervals, in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Backup and primary pruning cadence (default daily)
    pub backup_interval_secs: u64,
    /// Offsite replication cadence (default weekly)
    pub replication_interval_secs: u64,
    /// Health check cadence (default daily)
    pub health_interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            backup_interval_secs: 86_400,
            replication_interval_secs: 604_800,
            health_interval_secs: 86_400,
        }
    }
}

/// Owns the three periodic loops. Each loop fires once on start and then
/// on its interval, until [`BackupScheduler::shutdown`] is called.
pub struct BackupScheduler {
    producer: Arc<SnapshotProducer>,
    replication: Arc<ReplicationScheduler>,
    monitor: Arc<HealthMonitor>,
    notifier: Arc<dyn Notifier>,
    primary: Arc<dyn ObjectStore>,
    offsite: Arc<dyn ObjectStore>,
    retention: RetentionPolicy,
    config: ScheduleConfig,
    shutdown: Arc<RwLock<bool>>,
}

impl BackupScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        producer: Arc<SnapshotProducer>,
        replication: Arc<ReplicationScheduler>,
        monitor: Arc<HealthMonitor>,
        notifier: Arc<dyn Notifier>,
        primary: Arc<dyn ObjectStore>,
        offsite: Arc<dyn ObjectStore>,
        retention: RetentionPolicy,
        config: ScheduleConfig,
    ) -> Self {
        Self {
            producer,
            replication,
            monitor,
            notifier,
            primary,
            offsite,
            retention,
            config,
            shutdown: Arc::new(RwLock::new(false)),
        }
    }

    /// Spawn the three loops.
    pub fn start(&self) {
        info!(
            backup_secs = self.config.backup_interval_secs,
            replication_secs = self.config.replication_interval_secs,
            health_secs = self.config.health_interval_secs,
            "starting backup scheduler"
        );
        self.spawn_backup_loop();
        self.spawn_replication_loop();
        self.spawn_health_loop();
    }

    /// Ask all loops to stop at their next tick.
    pub fn shutdown(&self) {
        info!("stopping backup scheduler");
        *self.shutdown.write() = true;
    }

    fn spawn_backup_loop(&self) {
        let producer = Arc::clone(&self.producer);
        let primary = Arc::clone(&self.primary);
        let retention = self.retention;
        let shutdown = Arc::clone(&self.shutdown);
        let period = Duration::from_secs(self.config.backup_interval_secs);

        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                if *shutdown.read() {
                    break;
                }

                match producer.produce().await {
                    Ok(snapshot) => info!(id = %snapshot.id, "scheduled backup completed"),
                    // Another run holds the lease; this fire is redundant.
                    Err(BackupError::OperationInProgress { .. }) => {
                        info!("backup already in progress, skipping this trigger")
                    }
                    Err(err) => error!(error = %err, "scheduled backup failed"),
                }

                match retention::prune(&*primary, &retention).await {
                    Ok(result) if !result.failed.is_empty() => warn!(
                        failed = result.failed.len(),
                        "some deletions failed, retrying next pass"
                    ),
                    Ok(_) => {}
                    Err(err) => error!(error = %err, "primary retention pass failed"),
                }
            }
        });
    }

    fn spawn_replication_loop(&self) {
        let replication = Arc::clone(&self.replication);
        let offsite = Arc::clone(&self.offsite);
        let retention = self.retention;
        let shutdown = Arc::clone(&self.shutdown);
        let period = Duration::from_secs(self.config.replication_interval_secs);

        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                if *shutdown.read() {
                    break;
                }

                if let Err(err) = replication.replicate(Utc::now()).await {
                    error!(error = %err, "scheduled replication failed");
                }

                match retention::prune(&*offsite, &retention).await {
                    Ok(result) if !result.failed.is_empty() => warn!(
                        failed = result.failed.len(),
                        "some offsite deletions failed, retrying next pass"
                    ),
                    Ok(_) => {}
                    Err(err) => error!(error = %err, "offsite retention pass failed"),
                }
            }
        });
    }

    fn spawn_health_loop(&self) {
        let monitor = Arc::clone(&self.monitor);
        let notifier = Arc::clone(&self.notifier);
        let shutdown = Arc::clone(&self.shutdown);
        let period = Duration::from_secs(self.config.health_interval_secs);

        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                if *shutdown.read() {
                    break;
                }

                match monitor.check(Utc::now()).await {
                    Ok(report) => {
                        if let Err(err) = notifier.notify(&report).await {
                            warn!(error = %err, "health notification failed");
                        }
                    }
                    Err(err) => error!(error = %err, "health check failed"),
                }
            }
        });
    }
}
