//! Tiered retention and pruning
//!
//! Snapshots are classified into daily, weekly, and monthly tiers by a
//! pure calendar function, each tier keeps its newest N members, and a
//! snapshot survives pruning if any tier keeps it. The newest snapshot
//! overall is always exempt so a restore target exists after the first
//! successful run, whatever the configured counts.

use blob_store::{ObjectStore, StoreError};
use chrono::{DateTime, Datelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

use crate::error::BackupResult;
use crate::snapshot::{self, Snapshot, SnapshotLocation};

/// Retention bucket with its own keep count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Every snapshot
    Daily,
    /// Snapshots created on the weekly anchor day (Sunday)
    Weekly,
    /// Snapshots created on the first day of a calendar month
    Monthly,
}

/// Keep counts per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    pub daily_keep: usize,
    pub weekly_keep: usize,
    pub monthly_keep: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            daily_keep: 7,
            weekly_keep: 4,
            monthly_keep: 3,
        }
    }
}

impl RetentionPolicy {
    fn keep_for(&self, tier: Tier) -> usize {
        match tier {
            Tier::Daily => self.daily_keep,
            Tier::Weekly => self.weekly_keep,
            Tier::Monthly => self.monthly_keep,
        }
    }
}

/// Tiers a snapshot created at `created_at` belongs to.
///
/// Pure calendar classification; a Sunday that is also the first of a
/// month belongs to all three tiers at once.
pub fn tier_membership(created_at: DateTime<Utc>) -> Vec<Tier> {
    let mut tiers = vec![Tier::Daily];
    if created_at.weekday() == Weekday::Sun {
        tiers.push(Tier::Weekly);
    }
    if created_at.day() == 1 {
        tiers.push(Tier::Monthly);
    }
    tiers
}

/// Outcome of one pruning pass.
#[derive(Debug, Default)]
pub struct PruneResult {
    /// Snapshots that survived, newest first
    pub kept: Vec<Snapshot>,
    /// Snapshots removed from the store
    pub deleted: Vec<Snapshot>,
    /// Snapshot ids whose deletion failed, with the error; retried on the
    /// next pass
    pub failed: Vec<(String, String)>,
}

/// Compute which of `snapshots` (newest first) survive under `policy`.
///
/// Separated from the deleting pass so the selection is unit-testable
/// without a store.
pub fn select_survivors(snapshots: &[Snapshot], policy: &RetentionPolicy) -> HashSet<String> {
    let mut survivors = HashSet::new();

    // The newest snapshot is exempt from every count.
    if let Some(newest) = snapshots.first() {
        survivors.insert(newest.id.clone());
    }

    for tier in [Tier::Daily, Tier::Weekly, Tier::Monthly] {
        let keep = policy.keep_for(tier);
        survivors.extend(
            snapshots
                .iter()
                .filter(|s| tier_membership(s.created_at).contains(&tier))
                .take(keep)
                .map(|s| s.id.clone()),
        );
    }

    survivors
}

/// Prune one store under `policy`.
///
/// Idempotent: a second pass over an unchanged store deletes nothing.
/// Per-item delete failures are recorded, never fatal; an object that is
/// already gone counts as deleted.
pub async fn prune(
    store: &dyn ObjectStore,
    policy: &RetentionPolicy,
) -> BackupResult<PruneResult> {
    let snapshots = snapshot::list_snapshots(store, SnapshotLocation::default()).await?;
    let survivors = select_survivors(&snapshots, policy);

    let mut result = PruneResult::default();
    for snapshot in snapshots {
        if survivors.contains(&snapshot.id) {
            result.kept.push(snapshot);
            continue;
        }

        match delete_snapshot(store, &snapshot).await {
            Ok(()) => {
                info!(id = %snapshot.id, "deleted expired snapshot");
                result.deleted.push(snapshot);
            }
            Err(err) => {
                warn!(id = %snapshot.id, error = %err, "failed to delete expired snapshot");
                result.failed.push((snapshot.id.clone(), err.to_string()));
            }
        }
    }

    info!(
        kept = result.kept.len(),
        deleted = result.deleted.len(),
        failed = result.failed.len(),
        "retention pass finished"
    );
    Ok(result)
}

async fn delete_snapshot(store: &dyn ObjectStore, snapshot: &Snapshot) -> Result<(), StoreError> {
    match store.delete(&snapshot.artifact_key()).await {
        Ok(()) | Err(StoreError::NotFound { .. }) => {}
        Err(err) => return Err(err),
    }
    match store.delete(&snapshot.manifest_key()).await {
        Ok(()) | Err(StoreError::NotFound { .. }) => Ok(()),
        Err(err) => Err(err),
    }
}
