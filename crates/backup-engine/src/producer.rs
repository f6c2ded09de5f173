//! Snapshot producer
//!
//! One producer run dumps the database, compresses the export, uploads it
//! with its manifest, and verifies the stored artifact by reading it
//! back. The database lease serializes runs; a second invocation while
//! one is in flight is rejected, never run in parallel. Every run that
//! starts appends exactly one sync record, success or failure.

use blob_store::{with_retries, ObjectStore, RetryPolicy};
use chrono::{SubsecRound, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::dump::DatabaseDump;
use crate::error::{BackupError, BackupResult};
use crate::lease::LeaseManager;
use crate::snapshot::{self, Snapshot, SnapshotLocation, SnapshotManifest};
use crate::sync_log::{RunKind, SyncLog, SyncRecord};

/// Produces snapshots into the primary store.
pub struct SnapshotProducer {
    store: Arc<dyn ObjectStore>,
    database: Arc<dyn DatabaseDump>,
    lease: LeaseManager,
    log: SyncLog,
    retry: RetryPolicy,
    min_snapshot_bytes: u64,
}

impl SnapshotProducer {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        database: Arc<dyn DatabaseDump>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            lease: LeaseManager::new(Arc::clone(&store), &config.database, config.lease_ttl()),
            log: SyncLog::new(&config.sync_log_path, config.sync_log_cap),
            retry: config.retry_policy(),
            min_snapshot_bytes: config.min_snapshot_bytes,
            store,
            database,
        }
    }

    /// Run one backup. Fails with [`BackupError::OperationInProgress`]
    /// without touching the database when another backup or restore holds
    /// the lease; a rejected invocation is not a run and leaves no record.
    pub async fn produce(&self) -> BackupResult<Snapshot> {
        let guard = self.lease.acquire().await?;
        let outcome = self.run().await;

        if let Err(err) = guard.release().await {
            warn!(error = %err, "failed to release backup lease");
        }

        let record = match &outcome {
            Ok(snapshot) => {
                info!(
                    id = %snapshot.id,
                    size_bytes = snapshot.size_bytes,
                    "backup completed"
                );
                SyncRecord::success(RunKind::Backup, 1)
            }
            Err(err) => SyncRecord::failure(RunKind::Backup, err.to_string()),
        };
        if let Err(err) = self.log.append(record).await {
            warn!(error = %err, "failed to append backup sync record");
        }

        outcome
    }

    async fn run(&self) -> BackupResult<Snapshot> {
        let started = Utc::now().trunc_subsecs(0);

        // A failed dump uploads nothing; all-or-nothing.
        let raw = self.database.dump().await?;
        let artifact = snapshot::compress(&raw)?;
        let digest = snapshot::sha256_hex(&artifact);
        let size_bytes = artifact.len() as u64;

        let id = snapshot::snapshot_id(started);
        let artifact_key = snapshot::artifact_key(&id);
        let manifest_key = snapshot::manifest_key(&id);

        with_retries(&self.retry, || self.store.put(&artifact_key, &artifact)).await?;

        let manifest = SnapshotManifest {
            id: id.clone(),
            created_at: started,
            size_bytes,
            digest: digest.clone(),
        };
        let manifest_bytes = serde_json::to_vec_pretty(&manifest)?;
        with_retries(&self.retry, || self.store.put(&manifest_key, &manifest_bytes)).await?;

        self.verify_uploaded(&artifact_key, &digest, size_bytes)
            .await?;

        Ok(Snapshot {
            id,
            created_at: started,
            size_bytes,
            digest: Some(digest),
            location: SnapshotLocation {
                primary: true,
                offsite: false,
            },
        })
    }

    /// Read the uploaded artifact back and reject runs whose stored bytes
    /// do not match what was produced, or that are implausibly small.
    async fn verify_uploaded(
        &self,
        artifact_key: &str,
        digest: &str,
        size_bytes: u64,
    ) -> BackupResult<()> {
        let stored = with_retries(&self.retry, || self.store.get(artifact_key)).await?;

        if (stored.len() as u64) < self.min_snapshot_bytes {
            return Err(BackupError::Integrity {
                expected: format!("at least {} bytes", self.min_snapshot_bytes),
                actual: format!("{} bytes", stored.len()),
            });
        }
        if stored.len() as u64 != size_bytes {
            return Err(BackupError::Integrity {
                expected: format!("{size_bytes} bytes"),
                actual: format!("{} bytes", stored.len()),
            });
        }

        let stored_digest = snapshot::sha256_hex(&stored);
        if stored_digest != digest {
            return Err(BackupError::Integrity {
                expected: digest.to_string(),
                actual: stored_digest,
            });
        }
        Ok(())
    }
}
