//! Filesystem-backed store implementation
//!
//! Keys map to paths beneath a root directory, so a prefix listing over
//! `backups/` is a directory walk. The primary and offsite tiers are two
//! instances of this store rooted on different mounts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::{ObjectInfo, ObjectStore, StoreError};

/// [`ObjectStore`] rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create a store rooted at `root`. The directory is created lazily on
    /// the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty()
            || key.starts_with('/')
            || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
        {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
            });
        }

        let mut path = self.root.clone();
        for segment in key.split('/') {
            path.push(segment);
        }
        Ok(path)
    }

    fn map_io(err: std::io::Error, key: &str) -> StoreError {
        match err.kind() {
            ErrorKind::NotFound => StoreError::NotFound {
                key: key.to_string(),
            },
            ErrorKind::PermissionDenied => StoreError::PermissionDenied {
                reason: format!("{key}: {err}"),
            },
            _ => StoreError::Io(err),
        }
    }

    async fn walk(&self) -> Result<Vec<(String, u64, DateTime<Utc>)>, StoreError> {
        let mut found = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(StoreError::Io(err)),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let metadata = entry.metadata().await?;

                if metadata.is_dir() {
                    pending.push(path);
                    continue;
                }

                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                let modified = metadata
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());

                found.push((key, metadata.len(), modified));
            }
        }

        Ok(found)
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| Self::map_io(err, key))?;
        }

        fs::write(&path, data)
            .await
            .map_err(|err| Self::map_io(err, key))?;

        debug!(key, bytes = data.len(), "stored object");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(key)?;
        fs::read(&path).await.map_err(|err| Self::map_io(err, key))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StoreError> {
        let mut infos: Vec<ObjectInfo> = self
            .walk()
            .await?
            .into_iter()
            .filter(|(key, _, _)| key.starts_with(prefix))
            .map(|(key, size, modified)| ObjectInfo {
                key,
                size,
                modified,
            })
            .collect();

        infos.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(infos)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        fs::remove_file(&path)
            .await
            .map_err(|err| Self::map_io(err, key))?;

        debug!(key, "deleted object");
        Ok(())
    }
}
