//! Snapshot metadata, artifact naming, and the on-store catalog
//!
//! A snapshot is one compressed database dump stored under a
//! timestamp-derived key, with a small JSON manifest stored next to it.
//! Keys are fixed width so a lexicographic listing is also a chronological
//! one, and prefix filtering needs no separate index.

use blob_store::{ObjectStore, StoreError};
use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use tracing::warn;

use crate::error::{BackupError, BackupResult};

/// Key prefix under which all snapshot artifacts live.
pub const SNAPSHOT_PREFIX: &str = "backups/";

/// Artifact filename suffix: a gzipped database dump.
pub const ARTIFACT_SUFFIX: &str = ".sql.gz";

/// Manifest sidecar suffix, appended after the artifact suffix.
pub const MANIFEST_SUFFIX: &str = ".meta";

const ID_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Which storage tiers currently hold a copy of a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotLocation {
    /// Present in the primary store
    pub primary: bool,
    /// Present in the offsite store
    pub offsite: bool,
}

/// Metadata for one backup artifact.
///
/// Immutable once written; only the location set changes as the
/// replication scheduler and retention manager act on the stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Timestamp-derived identifier, e.g. `backup_20260807T030000Z`
    pub id: String,
    /// UTC timestamp of dump start, second precision
    pub created_at: DateTime<Utc>,
    /// Compressed artifact size in bytes
    pub size_bytes: u64,
    /// Hex Sha256 of the compressed artifact; absent when the manifest
    /// was lost and only the listing is available
    pub digest: Option<String>,
    /// Which stores hold a copy
    #[serde(default)]
    pub location: SnapshotLocation,
}

impl Snapshot {
    /// Key of the compressed artifact in a store.
    pub fn artifact_key(&self) -> String {
        artifact_key(&self.id)
    }

    /// Key of the manifest sidecar in a store.
    pub fn manifest_key(&self) -> String {
        manifest_key(&self.id)
    }
}

/// Manifest persisted next to each artifact so integrity metadata
/// survives listing round trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub digest: String,
}

impl SnapshotManifest {
    /// Build the snapshot this manifest describes, located in one store.
    pub fn into_snapshot(self, location: SnapshotLocation) -> Snapshot {
        Snapshot {
            id: self.id,
            created_at: self.created_at,
            size_bytes: self.size_bytes,
            digest: Some(self.digest),
            location,
        }
    }
}

/// Derive the snapshot id for a dump started at `created_at`.
pub fn snapshot_id(created_at: DateTime<Utc>) -> String {
    format!("backup_{}", created_at.format(ID_TIMESTAMP_FORMAT))
}

/// Artifact key for a snapshot id.
pub fn artifact_key(id: &str) -> String {
    format!("{SNAPSHOT_PREFIX}{id}{ARTIFACT_SUFFIX}")
}

/// Manifest key for a snapshot id.
pub fn manifest_key(id: &str) -> String {
    format!("{SNAPSHOT_PREFIX}{id}{ARTIFACT_SUFFIX}{MANIFEST_SUFFIX}")
}

/// Recover the snapshot id from an artifact key, rejecting manifests and
/// foreign objects.
pub fn id_from_artifact_key(key: &str) -> Option<&str> {
    key.strip_prefix(SNAPSHOT_PREFIX)?
        .strip_suffix(ARTIFACT_SUFFIX)
        .filter(|id| id.starts_with("backup_"))
}

/// Recover the creation timestamp encoded in a snapshot id.
pub fn created_at_from_id(id: &str) -> Option<DateTime<Utc>> {
    let stamp = id.strip_prefix("backup_")?;
    let naive = chrono::NaiveDateTime::parse_from_str(stamp, ID_TIMESTAMP_FORMAT).ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

/// Gzip-compress a raw dump.
pub fn compress(data: &[u8]) -> BackupResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|source| BackupError::Compression { source })
}

/// Gzip-decompress an artifact.
pub fn decompress(data: &[u8]) -> BackupResult<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut plain = Vec::new();
    decoder
        .read_to_end(&mut plain)
        .map_err(|source| BackupError::Compression { source })?;
    Ok(plain)
}

/// Hex Sha256 digest of an artifact.
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// List the snapshots held by one store, newest first.
///
/// Snapshots whose manifest is missing or unreadable are still reported,
/// with the timestamp parsed from the key and no digest, so pruning and
/// replication keep working after a partial failure.
pub async fn list_snapshots(
    store: &dyn ObjectStore,
    location: SnapshotLocation,
) -> BackupResult<Vec<Snapshot>> {
    let objects = store.list(SNAPSHOT_PREFIX).await?;

    let mut snapshots = Vec::new();
    for info in &objects {
        let Some(id) = id_from_artifact_key(&info.key) else {
            continue;
        };

        let snapshot = match store.get(&manifest_key(id)).await {
            Ok(bytes) => match serde_json::from_slice::<SnapshotManifest>(&bytes) {
                Ok(manifest) => manifest.into_snapshot(location),
                Err(err) => {
                    warn!(id, error = %err, "unreadable snapshot manifest, falling back to listing");
                    snapshot_from_listing(id, info.size, location)
                }
            },
            Err(StoreError::NotFound { .. }) => snapshot_from_listing(id, info.size, location),
            Err(err) => return Err(err.into()),
        };

        snapshots.push(snapshot);
    }

    snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    Ok(snapshots)
}

fn snapshot_from_listing(id: &str, size: u64, location: SnapshotLocation) -> Snapshot {
    Snapshot {
        id: id.to_string(),
        created_at: created_at_from_id(id).unwrap_or_else(|| Utc::now().trunc_subsecs(0)),
        size_bytes: size,
        digest: None,
        location,
    }
}
