//! Restore orchestration
//!
//! A typed state machine walks an operator from listing to replacement:
//! list, select, fetch, verify, replace. Replacement is destructive, so
//! it sits behind an explicit confirmation gate separate from selection,
//! takes a safety dump first, and rolls the database back to it if the
//! restore mechanism fails.

use blob_store::{with_retries, ObjectStore, RetryPolicy, StoreError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::dump::DatabaseDump;
use crate::error::{BackupError, BackupResult};
use crate::lease::LeaseManager;
use crate::snapshot::{self, Snapshot, SnapshotLocation};

/// Phase of the restore state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestorePhase {
    /// Snapshots listed, awaiting selection
    List,
    /// One snapshot chosen
    Selected,
    /// Artifact downloaded
    Fetched,
    /// Artifact decompressed and digest-checked
    Verified,
    /// Live database replaced
    Replaced,
    /// Fetch or verification failed; the artifact is discarded
    Failed,
}

impl RestorePhase {
    fn name(self) -> &'static str {
        match self {
            RestorePhase::List => "list",
            RestorePhase::Selected => "selected",
            RestorePhase::Fetched => "fetched",
            RestorePhase::Verified => "verified",
            RestorePhase::Replaced => "replaced",
            RestorePhase::Failed => "failed",
        }
    }
}

/// Summary emitted after a completed restore.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// Walks one restore from listing to replacement against a chosen store.
pub struct RestoreOrchestrator {
    store: Arc<dyn ObjectStore>,
    database: Arc<dyn DatabaseDump>,
    lease: LeaseManager,
    retry: RetryPolicy,
    phase: RestorePhase,
    available: Vec<Snapshot>,
    selected: Option<Snapshot>,
    artifact: Option<Vec<u8>>,
    verified_dump: Option<Vec<u8>>,
}

impl RestoreOrchestrator {
    /// Orchestrator reading from `store`; the lease marker lives in
    /// `lease_store` (the primary store, shared with the producer) so
    /// backup and restore exclude each other even when restoring from
    /// offsite.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        lease_store: Arc<dyn ObjectStore>,
        database: Arc<dyn DatabaseDump>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            lease: LeaseManager::new(lease_store, &config.database, config.lease_ttl()),
            retry: config.retry_policy(),
            store,
            database,
            phase: RestorePhase::List,
            available: Vec::new(),
            selected: None,
            artifact: None,
            verified_dump: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> RestorePhase {
        self.phase
    }

    /// Snapshot chosen by the operator, once selected.
    pub fn selected(&self) -> Option<&Snapshot> {
        self.selected.as_ref()
    }

    /// Enumerate restorable snapshots, newest first. Re-entering the
    /// listing resets any earlier selection.
    pub async fn list_snapshots(&mut self) -> BackupResult<&[Snapshot]> {
        self.available =
            snapshot::list_snapshots(&*self.store, SnapshotLocation::default()).await?;
        self.phase = RestorePhase::List;
        self.selected = None;
        self.artifact = None;
        self.verified_dump = None;
        Ok(&self.available)
    }

    /// Choose a snapshot by id. An unknown id surfaces an error and keeps
    /// the machine in the listing phase; no fetch is attempted.
    pub fn select(&mut self, id: &str) -> BackupResult<Snapshot> {
        self.expect_phase(&[RestorePhase::List, RestorePhase::Selected])?;

        match self.available.iter().find(|s| s.id == id).cloned() {
            Some(snapshot) => {
                self.selected = Some(snapshot.clone());
                self.phase = RestorePhase::Selected;
                Ok(snapshot)
            }
            None => Err(BackupError::InvalidSelection { id: id.to_string() }),
        }
    }

    /// Download the selected artifact with bounded retries.
    pub async fn fetch(&mut self) -> BackupResult<()> {
        self.expect_phase(&[RestorePhase::Selected])?;
        let selected = self
            .selected
            .clone()
            .ok_or(BackupError::InvalidPhase {
                expected: "selected".to_string(),
                actual: self.phase.name().to_string(),
            })?;

        let artifact_key = selected.artifact_key();
        match with_retries(&self.retry, || self.store.get(&artifact_key)).await {
            Ok(data) => {
                info!(id = %selected.id, bytes = data.len(), "fetched restore artifact");
                self.artifact = Some(data);
                self.phase = RestorePhase::Fetched;
                Ok(())
            }
            Err(StoreError::NotFound { .. }) => {
                self.phase = RestorePhase::Failed;
                Err(BackupError::SnapshotMissing { id: selected.id })
            }
            Err(err) => {
                self.phase = RestorePhase::Failed;
                Err(err.into())
            }
        }
    }

    /// Decompress the artifact and validate it against the recorded
    /// digest. A mismatch discards the artifact and fails the restore;
    /// the live database is untouched.
    pub fn verify(&mut self) -> BackupResult<()> {
        self.expect_phase(&[RestorePhase::Fetched])?;
        let selected = self.selected.clone().ok_or(BackupError::InvalidPhase {
            expected: "fetched".to_string(),
            actual: self.phase.name().to_string(),
        })?;
        let artifact = self.artifact.take().ok_or(BackupError::InvalidPhase {
            expected: "fetched".to_string(),
            actual: self.phase.name().to_string(),
        })?;

        if let Some(expected) = &selected.digest {
            let actual = snapshot::sha256_hex(&artifact);
            if &actual != expected {
                self.phase = RestorePhase::Failed;
                return Err(BackupError::Integrity {
                    expected: expected.clone(),
                    actual,
                });
            }
        } else {
            warn!(id = %selected.id, "no recorded digest, verifying structure only");
        }

        match snapshot::decompress(&artifact) {
            Ok(plain) => {
                self.verified_dump = Some(plain);
                self.phase = RestorePhase::Verified;
                Ok(())
            }
            Err(err) => {
                self.phase = RestorePhase::Failed;
                Err(err)
            }
        }
    }

    /// Replace the live database with the verified dump.
    ///
    /// `confirmed` is the explicit operator gate; without it nothing
    /// happens and the machine stays in the verified phase. On a restore
    /// mechanism failure the database is rolled back to the safety dump
    /// taken just before replacement.
    pub async fn replace(&mut self, confirmed: bool) -> BackupResult<RestoreSummary> {
        self.expect_phase(&[RestorePhase::Verified])?;
        if !confirmed {
            return Err(BackupError::ConfirmationRequired);
        }

        let selected = self.selected.clone().ok_or(BackupError::InvalidPhase {
            expected: "verified".to_string(),
            actual: self.phase.name().to_string(),
        })?;
        let dump = self.verified_dump.clone().ok_or(BackupError::InvalidPhase {
            expected: "verified".to_string(),
            actual: self.phase.name().to_string(),
        })?;

        // A lease rejection leaves the machine verified; the operator can
        // try again once the concurrent run finishes.
        let guard = self.lease.acquire().await?;

        // Abort before touching the database if no rollback point can be
        // taken; the prior state stays intact.
        let safety = match self.database.dump().await {
            Ok(safety) => safety,
            Err(err) => {
                if let Err(release_err) = guard.release().await {
                    warn!(error = %release_err, "failed to release restore lease");
                }
                return Err(err);
            }
        };

        let outcome = self.database.restore(&dump).await;
        if let Err(err) = &outcome {
            error!(id = %selected.id, error = %err, "restore failed, rolling back");
            match self.database.restore(&safety).await {
                Ok(()) => warn!(id = %selected.id, "database rolled back to pre-restore state"),
                Err(rollback_err) => {
                    error!(
                        id = %selected.id,
                        error = %rollback_err,
                        "rollback failed, manual intervention required"
                    );
                }
            }
        }

        if let Err(err) = guard.release().await {
            warn!(error = %err, "failed to release restore lease");
        }

        match outcome {
            Ok(()) => {
                self.verified_dump = None;
                self.phase = RestorePhase::Replaced;
                info!(
                    id = %selected.id,
                    created_at = %selected.created_at,
                    size_bytes = selected.size_bytes,
                    "restore completed"
                );
                Ok(RestoreSummary {
                    id: selected.id,
                    created_at: selected.created_at,
                    size_bytes: selected.size_bytes,
                })
            }
            Err(err) => {
                self.phase = RestorePhase::Failed;
                Err(err)
            }
        }
    }

    fn expect_phase(&self, allowed: &[RestorePhase]) -> BackupResult<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(BackupError::InvalidPhase {
                expected: allowed
                    .iter()
                    .map(|p| p.name())
                    .collect::<Vec<_>>()
                    .join(" or "),
                actual: self.phase.name().to_string(),
            })
        }
    }
}
