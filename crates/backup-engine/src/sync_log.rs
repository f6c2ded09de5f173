//! Append-only run log
//!
//! Every backup run and offsite transfer run appends exactly one record,
//! success or failure. The health monitor and the CLI read this log; the
//! file keeps a bounded tail so it never grows without limit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::error::BackupResult;

/// Which kind of run produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunKind {
    /// A snapshot producer run
    Backup,
    /// An offsite replication run
    OffsiteSync,
}

/// One run outcome. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: RunKind,
    pub success: bool,
    pub items_count: usize,
    pub error_message: Option<String>,
}

impl SyncRecord {
    /// Record a successful run over `items_count` items.
    pub fn success(kind: RunKind, items_count: usize) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            success: true,
            items_count,
            error_message: None,
        }
    }

    /// Record a failed run.
    pub fn failure(kind: RunKind, error_message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            success: false,
            items_count: 0,
            error_message: Some(error_message.into()),
        }
    }
}

/// File-backed log of [`SyncRecord`]s with a bounded tail.
#[derive(Debug, Clone)]
pub struct SyncLog {
    path: PathBuf,
    cap: usize,
}

impl SyncLog {
    /// Open a log at `path`, keeping at most `cap` records. The file is
    /// created on first append.
    pub fn new(path: impl Into<PathBuf>, cap: usize) -> Self {
        Self {
            path: path.into(),
            cap,
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all records, oldest first. A missing file is an empty log.
    pub async fn load(&self) -> BackupResult<Vec<SyncRecord>> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    /// Append one record, trimming the oldest entries beyond the cap.
    pub async fn append(&self, record: SyncRecord) -> BackupResult<()> {
        let mut records = self.load().await?;
        records.push(record);

        if records.len() > self.cap {
            let excess = records.len() - self.cap;
            records.drain(..excess);
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(&self.path, serde_json::to_vec_pretty(&records)?).await?;
        debug!(path = %self.path.display(), total = records.len(), "appended sync record");
        Ok(())
    }

    /// The most recent successful record of `kind`, if any.
    pub async fn latest_success(&self, kind: RunKind) -> BackupResult<Option<SyncRecord>> {
        let records = self.load().await?;
        Ok(records
            .into_iter()
            .rev()
            .find(|r| r.kind == kind && r.success))
    }

    /// All records of `kind` at or after `since`, oldest first.
    pub async fn records_since(
        &self,
        kind: RunKind,
        since: DateTime<Utc>,
    ) -> BackupResult<Vec<SyncRecord>> {
        let records = self.load().await?;
        Ok(records
            .into_iter()
            .filter(|r| r.kind == kind && r.timestamp >= since)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn log_in(dir: &TempDir, cap: usize) -> SyncLog {
        SyncLog::new(dir.path().join("backup_log.json"), cap)
    }

    #[tokio::test]
    async fn missing_file_is_an_empty_log() {
        let dir = TempDir::new().unwrap();
        let log = log_in(&dir, 10);

        assert!(log.load().await.unwrap().is_empty());
        assert!(log.latest_success(RunKind::Backup).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn append_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let log = log_in(&dir, 10);

        log.append(SyncRecord::success(RunKind::Backup, 1))
            .await
            .unwrap();
        log.append(SyncRecord::failure(RunKind::OffsiteSync, "network down"))
            .await
            .unwrap();

        let records = log.load().await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].success);
        assert_eq!(records[0].kind, RunKind::Backup);
        assert!(!records[1].success);
        assert_eq!(records[1].error_message.as_deref(), Some("network down"));
    }

    #[tokio::test]
    async fn cap_trims_oldest_records() {
        let dir = TempDir::new().unwrap();
        let log = log_in(&dir, 3);

        for count in 0..5 {
            log.append(SyncRecord::success(RunKind::Backup, count))
                .await
                .unwrap();
        }

        let records = log.load().await.unwrap();
        assert_eq!(records.len(), 3);
        let counts: Vec<usize> = records.iter().map(|r| r.items_count).collect();
        assert_eq!(counts, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn latest_success_skips_failures_and_other_kinds() {
        let dir = TempDir::new().unwrap();
        let log = log_in(&dir, 10);

        log.append(SyncRecord::success(RunKind::Backup, 1))
            .await
            .unwrap();
        log.append(SyncRecord::success(RunKind::OffsiteSync, 4))
            .await
            .unwrap();
        log.append(SyncRecord::failure(RunKind::Backup, "dump failed"))
            .await
            .unwrap();

        let latest = log.latest_success(RunKind::Backup).await.unwrap().unwrap();
        assert_eq!(latest.items_count, 1);

        let offsite = log
            .latest_success(RunKind::OffsiteSync)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(offsite.items_count, 4);
    }

    #[tokio::test]
    async fn records_since_filters_by_time_and_kind() {
        let dir = TempDir::new().unwrap();
        let log = log_in(&dir, 10);

        let mut old = SyncRecord::success(RunKind::Backup, 1);
        old.timestamp = Utc::now() - chrono::Duration::days(10);
        log.append(old).await.unwrap();
        log.append(SyncRecord::success(RunKind::Backup, 2))
            .await
            .unwrap();

        let since = Utc::now() - chrono::Duration::days(1);
        let recent = log.records_since(RunKind::Backup, since).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].items_count, 2);
    }
}
