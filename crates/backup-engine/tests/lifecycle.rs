//! End-to-end lifecycle: backup, replicate, monitor, restore.

use backup_engine::{
    retention, snapshot, DatabaseDump, EngineConfig, HealthMonitor, MemoryDatabase,
    ReplicationScheduler, RestoreOrchestrator, SnapshotProducer,
};
use blob_store::{FsStore, ObjectStore};
use chrono::Utc;
use std::sync::Arc;
use tempfile::TempDir;

fn config_in(dir: &TempDir) -> EngineConfig {
    EngineConfig {
        database: "appdb".to_string(),
        sync_log_path: dir.path().join("backup_log.json"),
        min_snapshot_bytes: 1,
        retry_delay_ms: 1,
        ..Default::default()
    }
}

#[tokio::test]
async fn backup_replicate_check_and_restore() {
    let dir = TempDir::new().unwrap();
    let primary: Arc<dyn ObjectStore> = Arc::new(FsStore::new(dir.path().join("primary")));
    let offsite: Arc<dyn ObjectStore> = Arc::new(FsStore::new(dir.path().join("offsite")));
    let database = Arc::new(MemoryDatabase::new(
        b"INSERT INTO notes VALUES ('v1');".repeat(32),
    ));
    let config = config_in(&dir);

    // Backup.
    let producer = SnapshotProducer::new(
        Arc::clone(&primary),
        Arc::clone(&database) as Arc<dyn DatabaseDump>,
        &config,
    );
    let produced = producer.produce().await.unwrap();
    assert!(primary.get(&produced.artifact_key()).await.is_ok());

    // Retention keeps the lone snapshot.
    let pruned = retention::prune(&*primary, &config.retention).await.unwrap();
    assert_eq!(pruned.kept.len(), 1);
    assert!(pruned.deleted.is_empty());

    // Replicate offsite and verify the copy is bit-identical.
    let replication =
        ReplicationScheduler::new(Arc::clone(&primary), Arc::clone(&offsite), &config);
    let replicated = replication.replicate(Utc::now()).await.unwrap();
    assert_eq!(replicated.transferred, vec![produced.id.clone()]);

    let near = primary.get(&produced.artifact_key()).await.unwrap();
    let far = offsite.get(&produced.artifact_key()).await.unwrap();
    assert_eq!(near, far);

    // Health is green after both runs.
    let monitor = HealthMonitor::new(Arc::clone(&primary), &config);
    let report = monitor.check(Utc::now()).await.unwrap();
    assert!(report.ok, "unexpected issues: {:?}", report.issues);

    // The database drifts; restore from the offsite copy brings it back.
    database.set_contents(b"DROP TABLE notes;".to_vec());

    let mut orchestrator = RestoreOrchestrator::new(
        Arc::clone(&offsite),
        Arc::clone(&primary),
        Arc::clone(&database) as Arc<dyn DatabaseDump>,
        &config,
    );
    let listed = orchestrator.list_snapshots().await.unwrap().to_vec();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, produced.id);

    orchestrator.select(&produced.id).unwrap();
    orchestrator.fetch().await.unwrap();
    orchestrator.verify().unwrap();
    let summary = orchestrator.replace(true).await.unwrap();
    assert_eq!(summary.id, produced.id);

    // Round trip: dumping the restored state reproduces the recorded
    // digest.
    let redump = snapshot::compress(&database.dump().await.unwrap()).unwrap();
    assert_eq!(
        snapshot::sha256_hex(&redump),
        produced.digest.clone().unwrap()
    );
}
