//! Backup health monitoring
//!
//! Read-only checks over the run log and snapshot metadata: backup
//! recency, snapshot size anomalies against a rolling baseline, and
//! offsite staleness. The monitor only produces a report; delivery is
//! behind the [`Notifier`] seam.

use async_trait::async_trait;
use blob_store::ObjectStore;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::BackupResult;
use crate::snapshot::{self, SnapshotLocation};
use crate::sync_log::{RunKind, SyncLog};

/// Health monitor thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// A successful backup must exist within this many hours
    pub backup_staleness_hours: i64,
    /// A successful offsite run must exist within this many days
    pub offsite_staleness_days: i64,
    /// The newest snapshot must be at least this fraction of the rolling
    /// median size
    pub undersized_ratio: f64,
    /// How many prior snapshots feed the rolling median
    pub baseline_window: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            backup_staleness_hours: 36,
            offsite_staleness_days: 8,
            undersized_ratio: 0.5,
            baseline_window: 7,
        }
    }
}

/// One detected problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Issue {
    /// No successful backup within the staleness window
    NoRecentBackup {
        last_success: Option<DateTime<Utc>>,
    },
    /// The newest snapshot is anomalously small
    UndersizedSnapshot {
        id: String,
        size_bytes: u64,
        baseline_bytes: u64,
    },
    /// No successful offsite replication within the weekly window
    OffsiteStale {
        last_success: Option<DateTime<Utc>>,
    },
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Issue::NoRecentBackup { last_success } => match last_success {
                Some(at) => write!(f, "no recent backup (last success {at})"),
                None => write!(f, "no recent backup (no successful run on record)"),
            },
            Issue::UndersizedSnapshot {
                id,
                size_bytes,
                baseline_bytes,
            } => write!(
                f,
                "snapshot {id} is suspiciously small ({size_bytes} bytes against a baseline of {baseline_bytes})"
            ),
            Issue::OffsiteStale { last_success } => match last_success {
                Some(at) => write!(f, "offsite copy is stale (last success {at})"),
                None => write!(f, "offsite copy is stale (no successful run on record)"),
            },
        }
    }
}

/// Result of one health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub checked_at: DateTime<Utc>,
    pub ok: bool,
    pub issues: Vec<Issue>,
}

/// Delivery seam for health reports. The in-tree implementation logs;
/// email or chat delivery plugs in behind this trait.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, report: &HealthReport) -> BackupResult<()>;
}

/// [`Notifier`] that writes the report to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, report: &HealthReport) -> BackupResult<()> {
        if report.ok {
            info!(checked_at = %report.checked_at, "backup health check passed");
        } else {
            for issue in &report.issues {
                warn!(checked_at = %report.checked_at, %issue, "backup health issue");
            }
        }
        Ok(())
    }
}

/// Inspects the run log and primary store metadata.
pub struct HealthMonitor {
    store: Arc<dyn ObjectStore>,
    log: SyncLog,
    config: HealthConfig,
    min_snapshot_bytes: u64,
}

impl HealthMonitor {
    pub fn new(store: Arc<dyn ObjectStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            log: SyncLog::new(&config.sync_log_path, config.sync_log_cap),
            config: config.health.clone(),
            min_snapshot_bytes: config.min_snapshot_bytes,
        }
    }

    /// Evaluate every rule. Never mutates snapshot state.
    pub async fn check(&self, now: DateTime<Utc>) -> BackupResult<HealthReport> {
        let mut issues = Vec::new();

        let last_backup = self.log.latest_success(RunKind::Backup).await?;
        let backup_fresh = last_backup
            .as_ref()
            .map(|r| now - r.timestamp <= Duration::hours(self.config.backup_staleness_hours))
            .unwrap_or(false);
        if !backup_fresh {
            issues.push(Issue::NoRecentBackup {
                last_success: last_backup.map(|r| r.timestamp),
            });
        }

        if let Some(issue) = self.check_newest_size().await? {
            issues.push(issue);
        }

        let last_offsite = self.log.latest_success(RunKind::OffsiteSync).await?;
        let offsite_fresh = last_offsite
            .as_ref()
            .map(|r| now - r.timestamp <= Duration::days(self.config.offsite_staleness_days))
            .unwrap_or(false);
        if !offsite_fresh {
            issues.push(Issue::OffsiteStale {
                last_success: last_offsite.map(|r| r.timestamp),
            });
        }

        Ok(HealthReport {
            checked_at: now,
            ok: issues.is_empty(),
            issues,
        })
    }

    async fn check_newest_size(&self) -> BackupResult<Option<Issue>> {
        let snapshots = snapshot::list_snapshots(
            &*self.store,
            SnapshotLocation {
                primary: true,
                offsite: false,
            },
        )
        .await?;

        let Some(newest) = snapshots.first() else {
            return Ok(None);
        };

        if newest.size_bytes < self.min_snapshot_bytes {
            return Ok(Some(Issue::UndersizedSnapshot {
                id: newest.id.clone(),
                size_bytes: newest.size_bytes,
                baseline_bytes: self.min_snapshot_bytes,
            }));
        }

        let prior_sizes: Vec<u64> = snapshots
            .iter()
            .skip(1)
            .take(self.config.baseline_window)
            .map(|s| s.size_bytes)
            .collect();
        let Some(baseline) = median(&prior_sizes) else {
            return Ok(None);
        };

        let floor = (baseline as f64 * self.config.undersized_ratio) as u64;
        if newest.size_bytes < floor {
            return Ok(Some(Issue::UndersizedSnapshot {
                id: newest.id.clone(),
                size_bytes: newest.size_bytes,
                baseline_bytes: baseline,
            }));
        }

        Ok(None)
    }
}

fn median(values: &[u64]) -> Option<u64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2)
    } else {
        Some(sorted[mid])
    }
}
