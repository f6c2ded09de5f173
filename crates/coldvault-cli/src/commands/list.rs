//! Snapshot listing across both stores

use crate::{output, CliConfig, Result};
use backup_engine::{snapshot, Snapshot, SnapshotLocation};
use blob_store::ObjectStore;
use clap::Args;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Args)]
pub struct ListArgs {}

pub async fn execute(_args: ListArgs, config: CliConfig) -> Result<()> {
    let primary = super::primary_store(&config);
    let offsite = super::offsite_store(&config);

    let merged = merged_listing(&primary, &offsite).await?;
    if merged.is_empty() {
        output::info("No snapshots found");
        return Ok(());
    }

    output::header("Available snapshots");
    for (index, snapshot) in merged.iter().enumerate() {
        println!(
            "{index:3}. {}  {}  {:>12} bytes  [{}]",
            snapshot.created_at.format("%Y-%m-%d %H:%M:%S"),
            snapshot.id,
            snapshot.size_bytes,
            location_label(snapshot.location),
        );
    }

    Ok(())
}

/// Union of both stores, newest first, with per-snapshot locations.
pub(crate) async fn merged_listing(
    primary: &Arc<dyn ObjectStore>,
    offsite: &Arc<dyn ObjectStore>,
) -> Result<Vec<Snapshot>> {
    let near = snapshot::list_snapshots(
        &**primary,
        SnapshotLocation {
            primary: true,
            offsite: false,
        },
    )
    .await?;
    let far = snapshot::list_snapshots(
        &**offsite,
        SnapshotLocation {
            primary: false,
            offsite: true,
        },
    )
    .await?;

    let mut by_id: BTreeMap<String, Snapshot> = BTreeMap::new();
    for snapshot in near.into_iter().chain(far) {
        by_id
            .entry(snapshot.id.clone())
            .and_modify(|existing| {
                existing.location.primary |= snapshot.location.primary;
                existing.location.offsite |= snapshot.location.offsite;
            })
            .or_insert(snapshot);
    }

    let mut merged: Vec<Snapshot> = by_id.into_values().collect();
    merged.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    Ok(merged)
}

fn location_label(location: SnapshotLocation) -> &'static str {
    match (location.primary, location.offsite) {
        (true, true) => "primary+offsite",
        (true, false) => "primary",
        (false, true) => "offsite",
        (false, false) => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blob_store::MemoryStore;
    use chrono::{TimeZone, Utc};

    async fn seed(store: &MemoryStore, day: u32) -> String {
        let created_at = Utc.with_ymd_and_hms(2026, 8, day, 3, 0, 0).unwrap();
        let id = snapshot::snapshot_id(created_at);
        let artifact = b"artifact".to_vec();
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
        id
    }

    #[tokio::test]
    async fn merged_listing_unions_locations() {
        let primary = Arc::new(MemoryStore::new());
        let offsite = Arc::new(MemoryStore::new());

        let both = seed(&primary, 6).await;
        seed(&offsite, 6).await;
        let near_only = seed(&primary, 7).await;
        let far_only = seed(&offsite, 1).await;

        let merged = merged_listing(
            &(primary as Arc<dyn ObjectStore>),
            &(offsite as Arc<dyn ObjectStore>),
        )
        .await
        .unwrap();

        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].id, near_only);
        assert_eq!(merged[2].id, far_only);

        let replicated = merged.iter().find(|s| s.id == both).unwrap();
        assert!(replicated.location.primary && replicated.location.offsite);
        assert_eq!(location_label(replicated.location), "primary+offsite");

        let near = merged.iter().find(|s| s.id == near_only).unwrap();
        assert_eq!(location_label(near.location), "primary");
    }
}
