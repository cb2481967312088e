//! # Object Store Gateway
//!
//! Key-addressed remote storage consumed by the lock and snapshot layers.
//!
//! ## Implementations
//! - **S3Store**: S3-compatible HTTP API (Cloudflare R2, MinIO, AWS S3)
//! - **LocalStore**: a directory tree, e.g. on a shared network mount
//! - **MemoryStore**: in-process map with fault injection for tests
//!
//! ## Semantics
//! - A missing object is always reported as [`StoreError::NotFound`]
//! - `list` returns every object under a prefix; paging is handled inside
//!   the backend
//! - `put_if_absent` is optional; backends without a conditional create
//!   report [`StoreError::Unsupported`]

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::{constants, StoreError};

pub mod local;
pub mod memory;
pub mod s3;
mod sigv4;

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use s3::S3Store;

/// Result alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Store-listed metadata for one object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch a whole object into memory
    async fn get(&self, key: &str) -> StoreResult<Bytes>;

    /// Create or replace an object
    async fn put(&self, key: &str, body: Bytes, content_type: Option<&str>) -> StoreResult<()>;

    /// Create an object only if the key is free.
    ///
    /// Returns `Ok(false)` when another writer got there first.
    async fn put_if_absent(
        &self,
        _key: &str,
        _body: Bytes,
        _content_type: Option<&str>,
    ) -> StoreResult<bool> {
        Err(StoreError::Unsupported(constants::ERR_CONDITIONAL_PUT))
    }

    /// Remove an object
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Metadata without the body
    async fn head(&self, key: &str) -> StoreResult<ObjectMeta>;

    /// Every object whose key starts with `prefix`
    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectMeta>>;

    /// Upload a local file
    async fn put_file(&self, key: &str, path: &Path) -> StoreResult<()> {
        let body = tokio::fs::read(path).await?;
        self.put(key, Bytes::from(body), None).await
    }

    /// Download an object into a local file, replacing it
    async fn get_to_file(&self, key: &str, path: &Path) -> StoreResult<()> {
        let body = self.get(key).await?;
        tokio::fs::write(path, &body).await?;
        Ok(())
    }
}
