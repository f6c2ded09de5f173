//! Database lease
//!
//! Backup and restore must never run concurrently against the same
//! database, and the scheduler may double-fire. Mutual exclusion is a
//! marker object in the primary store keyed by database identity, holding
//! an owner token and a UTC expiry. The lease is advisory: backends
//! without compare-and-swap rely on the expiry to recover from a crashed
//! holder.

use blob_store::{ObjectStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{BackupError, BackupResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LeaseState {
    owner: Uuid,
    acquired_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Acquires and releases the exclusive lease for one database.
#[derive(Clone)]
pub struct LeaseManager {
    store: Arc<dyn ObjectStore>,
    key: String,
    ttl: Duration,
}

impl LeaseManager {
    /// Lease manager for `database`, storing the marker in `store`.
    pub fn new(store: Arc<dyn ObjectStore>, database: &str, ttl: Duration) -> Self {
        Self {
            store,
            key: format!("locks/{database}.lease"),
            ttl,
        }
    }

    /// Storage key of the lease marker.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Acquire the lease, failing with [`BackupError::OperationInProgress`]
    /// while an unexpired lease exists. Expired leases are taken over.
    pub async fn acquire(&self) -> BackupResult<LeaseGuard> {
        let now = Utc::now();

        match self.store.get(&self.key).await {
            Ok(bytes) => match serde_json::from_slice::<LeaseState>(&bytes) {
                Ok(state) if state.expires_at > now => {
                    return Err(BackupError::OperationInProgress {
                        owner: state.owner.to_string(),
                        expires_at: state.expires_at,
                    });
                }
                Ok(state) => {
                    warn!(
                        owner = %state.owner,
                        expired_at = %state.expires_at,
                        "taking over expired lease"
                    );
                }
                Err(err) => {
                    warn!(error = %err, "replacing unreadable lease marker");
                }
            },
            Err(StoreError::NotFound { .. }) => {}
            Err(err) => return Err(err.into()),
        }

        let state = LeaseState {
            owner: Uuid::new_v4(),
            acquired_at: now,
            expires_at: now + self.ttl,
        };
        self.store
            .put(&self.key, &serde_json::to_vec(&state)?)
            .await?;

        debug!(owner = %state.owner, expires_at = %state.expires_at, "lease acquired");
        Ok(LeaseGuard {
            store: Arc::clone(&self.store),
            key: self.key.clone(),
            owner: state.owner,
        })
    }
}

/// Proof of lease ownership. Release explicitly when the guarded
/// operation finishes; a crashed holder is recovered via the expiry.
pub struct LeaseGuard {
    store: Arc<dyn ObjectStore>,
    key: String,
    owner: Uuid,
}

impl LeaseGuard {
    /// Owner token of this guard.
    pub fn owner(&self) -> Uuid {
        self.owner
    }

    /// Release the lease. Only deletes a marker this guard still owns, so
    /// releasing after an expiry takeover is harmless.
    pub async fn release(self) -> BackupResult<()> {
        match self.store.get(&self.key).await {
            Ok(bytes) => {
                let state: LeaseState = serde_json::from_slice(&bytes)?;
                if state.owner != self.owner {
                    warn!(
                        held_by = %state.owner,
                        releasing = %self.owner,
                        "lease was taken over, leaving marker in place"
                    );
                    return Ok(());
                }
            }
            Err(StoreError::NotFound { .. }) => return Ok(()),
            Err(err) => return Err(err.into()),
        }

        match self.store.delete(&self.key).await {
            Ok(()) | Err(StoreError::NotFound { .. }) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
