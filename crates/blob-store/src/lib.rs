//! Object storage capability for the coldvault backup system
//!
//! This crate provides the storage seam the backup engine is written
//! against:
//! - A uniform put/get/list/delete trait over keyed blobs
//! - A filesystem-backed store for the primary and offsite tiers
//! - An in-memory store for development and testing
//! - Bounded retries with timeout and backoff for unreliable backends

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod error;
pub mod fs;
pub mod memory;
pub mod retry;

pub use error::StoreError;
pub use fs::FsStore;
pub use memory::MemoryStore;
pub use retry::{with_retries, RetryPolicy};

/// Metadata for one stored object, as returned by [`ObjectStore::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Object key, including any prefix
    pub key: String,
    /// Object size in bytes
    pub size: u64,
    /// Last-modified timestamp
    pub modified: DateTime<Utc>,
}

/// Uniform interface over a keyed blob store.
///
/// The primary and offsite backup tiers are both implementations of this
/// trait; engine components are parameterized by it rather than bound to a
/// concrete backend.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key`, overwriting any existing object.
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StoreError>;

    /// Fetch the object stored under `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// List objects whose key starts with `prefix`, in key order.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StoreError>;

    /// Delete the object stored under `key`.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
