//! Offsite replication
//!
//! Copies recent snapshots from the primary store to the offsite store,
//! verifying every transfer before it counts. Failures are isolated per
//! snapshot so one bad transfer never aborts the batch, and a snapshot
//! pruned between listing and transfer is skipped, not fatal.

use blob_store::{with_retries, ObjectStore, RetryPolicy, StoreError};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::{BackupError, BackupResult};
use crate::snapshot::{self, Snapshot, SnapshotLocation, SNAPSHOT_PREFIX};
use crate::sync_log::{RunKind, SyncLog, SyncRecord};

/// Outcome of one replication run. Partial success is valid.
#[derive(Debug, Default)]
pub struct ReplicationResult {
    /// Snapshot ids now verified on the offsite store
    pub transferred: Vec<String>,
    /// Snapshot ids that failed, with the error
    pub failed: Vec<(String, String)>,
    /// Snapshot ids whose primary copy disappeared before transfer
    pub skipped: Vec<String>,
}

/// Drives snapshot transfers to the offsite store.
pub struct ReplicationScheduler {
    primary: Arc<dyn ObjectStore>,
    offsite: Arc<dyn ObjectStore>,
    log: SyncLog,
    window: Duration,
    retry: RetryPolicy,
}

impl ReplicationScheduler {
    pub fn new(
        primary: Arc<dyn ObjectStore>,
        offsite: Arc<dyn ObjectStore>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            primary,
            offsite,
            log: SyncLog::new(&config.sync_log_path, config.sync_log_cap),
            window: config.replication_window(),
            retry: config.retry_policy(),
        }
    }

    /// Transfer every snapshot created within the replication window that
    /// has no offsite copy yet. Appends one sync record per run.
    pub async fn replicate(&self, now: DateTime<Utc>) -> BackupResult<ReplicationResult> {
        let snapshots = snapshot::list_snapshots(
            &*self.primary,
            SnapshotLocation {
                primary: true,
                offsite: false,
            },
        )
        .await?;

        let offsite_keys: HashSet<String> = self
            .offsite
            .list(SNAPSHOT_PREFIX)
            .await?
            .into_iter()
            .map(|info| info.key)
            .collect();

        let cutoff = now - self.window;
        let mut result = ReplicationResult::default();

        for candidate in snapshots
            .iter()
            .filter(|s| s.created_at >= cutoff)
            .filter(|s| !offsite_keys.contains(&s.artifact_key()))
        {
            let artifact_key = candidate.artifact_key();
            let data = match with_retries(&self.retry, || self.primary.get(&artifact_key)).await
            {
                Ok(data) => data,
                Err(StoreError::NotFound { .. }) => {
                    warn!(id = %candidate.id, "primary copy already pruned, skipping transfer");
                    result.skipped.push(candidate.id.clone());
                    continue;
                }
                Err(err) => {
                    warn!(id = %candidate.id, error = %err, "could not read primary copy");
                    result.failed.push((candidate.id.clone(), err.to_string()));
                    continue;
                }
            };

            match self.upload_and_verify(candidate, &data).await {
                Ok(()) => {
                    info!(id = %candidate.id, bytes = data.len(), "snapshot replicated offsite");
                    result.transferred.push(candidate.id.clone());
                }
                Err(err) => {
                    warn!(id = %candidate.id, error = %err, "offsite transfer failed");
                    result.failed.push((candidate.id.clone(), err.to_string()));
                }
            }
        }

        let record = SyncRecord {
            timestamp: Utc::now(),
            kind: RunKind::OffsiteSync,
            success: result.failed.is_empty(),
            items_count: result.transferred.len(),
            error_message: (!result.failed.is_empty()).then(|| {
                result
                    .failed
                    .iter()
                    .map(|(id, err)| format!("{id}: {err}"))
                    .collect::<Vec<_>>()
                    .join("; ")
            }),
        };
        if let Err(err) = self.log.append(record).await {
            warn!(error = %err, "failed to append replication sync record");
        }

        info!(
            transferred = result.transferred.len(),
            failed = result.failed.len(),
            skipped = result.skipped.len(),
            "replication run finished"
        );
        Ok(result)
    }

    /// Upload one artifact and prove the offsite copy matches before it is
    /// counted. A partial upload is deleted rather than trusted.
    async fn upload_and_verify(&self, candidate: &Snapshot, data: &[u8]) -> BackupResult<()> {
        let artifact_key = candidate.artifact_key();

        with_retries(&self.retry, || self.offsite.put(&artifact_key, data)).await?;

        let remote = with_retries(&self.retry, || self.offsite.get(&artifact_key)).await?;
        if remote.len() != data.len() {
            self.discard_partial(&artifact_key).await;
            return Err(BackupError::Integrity {
                expected: format!("{} bytes", data.len()),
                actual: format!("{} bytes", remote.len()),
            });
        }

        let expected_digest = candidate
            .digest
            .clone()
            .unwrap_or_else(|| snapshot::sha256_hex(data));
        let remote_digest = snapshot::sha256_hex(&remote);
        if remote_digest != expected_digest {
            self.discard_partial(&artifact_key).await;
            return Err(BackupError::Integrity {
                expected: expected_digest,
                actual: remote_digest,
            });
        }

        // The manifest travels with the artifact so offsite restores can
        // verify digests; losing it degrades verification, not the copy.
        let manifest_key = candidate.manifest_key();
        match self.primary.get(&manifest_key).await {
            Ok(manifest) => {
                if let Err(err) =
                    with_retries(&self.retry, || self.offsite.put(&manifest_key, &manifest)).await
                {
                    warn!(id = %candidate.id, error = %err, "manifest copy failed");
                }
            }
            Err(StoreError::NotFound { .. }) => {}
            Err(err) => warn!(id = %candidate.id, error = %err, "manifest read failed"),
        }

        Ok(())
    }

    async fn discard_partial(&self, artifact_key: &str) {
        if let Err(err) = self.offsite.delete(artifact_key).await {
            if !err.is_not_found() {
                warn!(key = artifact_key, error = %err, "could not remove partial offsite object");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use blob_store::{MemoryStore, ObjectInfo};
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    /// Store wrapper that fails scripted operations, for simulating
    /// transient backend trouble.
    struct FlakyStore {
        inner: MemoryStore,
        failing_puts: Mutex<HashSet<String>>,
        vanished_gets: Mutex<HashSet<String>>,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                failing_puts: Mutex::new(HashSet::new()),
                vanished_gets: Mutex::new(HashSet::new()),
            }
        }

        fn fail_puts_for(&self, key: &str) {
            self.failing_puts.lock().insert(key.to_string());
        }

        fn heal_puts_for(&self, key: &str) {
            self.failing_puts.lock().remove(key);
        }

        fn vanish_gets_for(&self, key: &str) {
            self.vanished_gets.lock().insert(key.to_string());
        }
    }

    #[async_trait]
    impl ObjectStore for FlakyStore {
        async fn put(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
            if self.failing_puts.lock().contains(key) {
                return Err(StoreError::Transient {
                    reason: "connection reset".to_string(),
                });
            }
            self.inner.put(key, data).await
        }

        async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
            if self.vanished_gets.lock().contains(key) {
                return Err(StoreError::NotFound {
                    key: key.to_string(),
                });
            }
            self.inner.get(key).await
        }

        async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StoreError> {
            self.inner.list(prefix).await
        }

        async fn delete(&self, key: &str) -> Result<(), StoreError> {
            self.inner.delete(key).await
        }
    }

    fn at(y: i32, mo: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, 3, 0, 0).unwrap()
    }

    async fn seed(store: &dyn ObjectStore, created_at: DateTime<Utc>) -> Snapshot {
        let id = snapshot::snapshot_id(created_at);
        let artifact = format!("artifact for {id}").into_bytes();
        let manifest = snapshot::SnapshotManifest {
            id: id.clone(),
            created_at,
            size_bytes: artifact.len() as u64,
            digest: snapshot::sha256_hex(&artifact),
        };

        store
            .put(&snapshot::artifact_key(&id), &artifact)
            .await
            .unwrap();
        store
            .put(
                &snapshot::manifest_key(&id),
                &serde_json::to_vec(&manifest).unwrap(),
            )
            .await
            .unwrap();

        manifest.into_snapshot(SnapshotLocation {
            primary: true,
            offsite: false,
        })
    }

    fn config_in(dir: &TempDir) -> EngineConfig {
        EngineConfig {
            database: "appdb".to_string(),
            sync_log_path: dir.path().join("backup_log.json"),
            retry_delay_ms: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn replicates_window_snapshots_and_skips_old_ones() {
        let dir = TempDir::new().unwrap();
        let primary = Arc::new(MemoryStore::new());
        let offsite = Arc::new(MemoryStore::new());
        let now = at(2026, 8, 7);

        let recent_a = seed(&*primary, at(2026, 8, 6)).await;
        let recent_b = seed(&*primary, at(2026, 8, 3)).await;
        let old = seed(&*primary, at(2026, 7, 1)).await;

        let scheduler =
            ReplicationScheduler::new(primary, Arc::clone(&offsite) as Arc<dyn ObjectStore>, &config_in(&dir));
        let result = scheduler.replicate(now).await.unwrap();

        assert_eq!(result.transferred.len(), 2);
        assert!(result.transferred.contains(&recent_a.id));
        assert!(result.transferred.contains(&recent_b.id));
        assert!(result.failed.is_empty());

        assert!(offsite.get(&recent_a.artifact_key()).await.is_ok());
        assert!(offsite.get(&recent_a.manifest_key()).await.is_ok());
        assert!(offsite.get(&old.artifact_key()).await.is_err());
    }

    #[tokio::test]
    async fn already_replicated_snapshots_are_not_retransferred() {
        let dir = TempDir::new().unwrap();
        let primary = Arc::new(MemoryStore::new());
        let offsite = Arc::new(MemoryStore::new());
        let now = at(2026, 8, 7);

        seed(&*primary, at(2026, 8, 6)).await;

        let scheduler =
            ReplicationScheduler::new(primary, Arc::clone(&offsite) as Arc<dyn ObjectStore>, &config_in(&dir));
        let first = scheduler.replicate(now).await.unwrap();
        assert_eq!(first.transferred.len(), 1);

        let second = scheduler.replicate(now).await.unwrap();
        assert!(second.transferred.is_empty());
        assert!(second.failed.is_empty());
    }

    #[tokio::test]
    async fn one_failing_transfer_does_not_abort_the_batch() {
        let dir = TempDir::new().unwrap();
        let primary = Arc::new(MemoryStore::new());
        let offsite = Arc::new(FlakyStore::new());
        let now = at(2026, 8, 7);

        let mut seeded = Vec::new();
        for day in 2..=6 {
            seeded.push(seed(&*primary, at(2026, 8, day)).await);
        }
        // The transfer of the 3rd snapshot fails persistently this run.
        let victim = &seeded[2];
        offsite.fail_puts_for(&victim.artifact_key());

        let scheduler = ReplicationScheduler::new(
            Arc::clone(&primary) as Arc<dyn ObjectStore>,
            Arc::clone(&offsite) as Arc<dyn ObjectStore>,
            &config_in(&dir),
        );

        let result = scheduler.replicate(now).await.unwrap();
        assert_eq!(result.transferred.len(), 4);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].0, victim.id);

        // The run is recorded as a partial failure.
        let log = SyncLog::new(dir.path().join("backup_log.json"), 100);
        let records = log.load().await.unwrap();
        assert!(!records.last().unwrap().success);
        assert_eq!(records.last().unwrap().items_count, 4);

        // Next run only retries the failed snapshot.
        offsite.heal_puts_for(&victim.artifact_key());
        let retry = scheduler.replicate(now).await.unwrap();
        assert_eq!(retry.transferred, vec![victim.id.clone()]);
        assert!(retry.failed.is_empty());

        for snapshot in &seeded {
            assert!(offsite.get(&snapshot.artifact_key()).await.is_ok());
        }
    }

    #[tokio::test]
    async fn pruned_primary_copy_is_skipped_with_a_warning() {
        let dir = TempDir::new().unwrap();
        let primary = Arc::new(FlakyStore::new());
        let offsite = Arc::new(MemoryStore::new());
        let now = at(2026, 8, 7);

        let kept = seed(&*primary, at(2026, 8, 6)).await;
        let pruned = seed(&*primary, at(2026, 8, 5)).await;
        // Simulate the retention manager deleting the artifact between the
        // listing and the transfer.
        primary.vanish_gets_for(&pruned.artifact_key());

        let scheduler = ReplicationScheduler::new(
            Arc::clone(&primary) as Arc<dyn ObjectStore>,
            Arc::clone(&offsite) as Arc<dyn ObjectStore>,
            &config_in(&dir),
        );

        let result = scheduler.replicate(now).await.unwrap();
        assert_eq!(result.transferred, vec![kept.id.clone()]);
        assert_eq!(result.skipped, vec![pruned.id.clone()]);
        assert!(result.failed.is_empty());
    }

    #[tokio::test]
    async fn nothing_to_do_is_a_successful_run() {
        let dir = TempDir::new().unwrap();
        let primary = Arc::new(MemoryStore::new());
        let offsite = Arc::new(MemoryStore::new());

        let scheduler = ReplicationScheduler::new(primary, offsite, &config_in(&dir));
        let result = scheduler.replicate(at(2026, 8, 7)).await.unwrap();

        assert!(result.transferred.is_empty());
        assert!(result.failed.is_empty());

        let log = SyncLog::new(dir.path().join("backup_log.json"), 100);
        let records = log.load().await.unwrap();
        assert!(records.last().unwrap().success);
        assert_eq!(records.last().unwrap().items_count, 0);
    }
}
