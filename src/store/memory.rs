use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::{ObjectMeta, ObjectStore, StoreResult};
use crate::error::StoreError;

#[derive(Debug, Clone)]
struct Entry {
    body: Bytes,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<String, Entry>,
    failing_deletes: HashSet<String>,
    deleted: Vec<String>,
}

/// In-process object store.
///
/// Supports conditional creates and lets tests make individual deletes fail.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("memory store mutex poisoned".to_string()))
    }

    /// Insert an object with an explicit modification time
    pub fn insert_at(&self, key: &str, body: impl Into<Bytes>, last_modified: DateTime<Utc>) {
        if let Ok(mut inner) = self.lock() {
            inner.objects.insert(
                key.to_string(),
                Entry {
                    body: body.into(),
                    last_modified,
                },
            );
        }
    }

    /// Make every later delete of `key` fail with a backend error
    pub fn fail_delete(&self, key: &str) {
        if let Ok(mut inner) = self.lock() {
            inner.failing_deletes.insert(key.to_string());
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock()
            .map(|inner| inner.objects.contains_key(key))
            .unwrap_or(false)
    }

    /// Keys currently stored, in lexical order
    pub fn keys(&self) -> Vec<String> {
        self.lock()
            .map(|inner| inner.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Keys removed through `delete`, in call order
    pub fn deleted_keys(&self) -> Vec<String> {
        self.lock()
            .map(|inner| inner.deleted.clone())
            .unwrap_or_default()
    }

    fn meta(key: &str, entry: &Entry) -> ObjectMeta {
        ObjectMeta {
            key: key.to_string(),
            last_modified: entry.last_modified,
            size: entry.body.len() as u64,
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Bytes> {
        self.lock()?
            .objects
            .get(key)
            .map(|entry| entry.body.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, body: Bytes, _content_type: Option<&str>) -> StoreResult<()> {
        self.lock()?.objects.insert(
            key.to_string(),
            Entry {
                body,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn put_if_absent(
        &self,
        key: &str,
        body: Bytes,
        _content_type: Option<&str>,
    ) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        if inner.objects.contains_key(key) {
            return Ok(false);
        }
        inner.objects.insert(
            key.to_string(),
            Entry {
                body,
                last_modified: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut inner = self.lock()?;
        if inner.failing_deletes.contains(key) {
            return Err(StoreError::Backend(format!("injected delete failure for {key}")));
        }
        match inner.objects.remove(key) {
            Some(_) => {
                inner.deleted.push(key.to_string());
                Ok(())
            }
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    async fn head(&self, key: &str) -> StoreResult<ObjectMeta> {
        self.lock()?
            .objects
            .get(key)
            .map(|entry| Self::meta(key, entry))
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectMeta>> {
        Ok(self
            .lock()?
            .objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, entry)| Self::meta(key, entry))
            .collect())
    }
}
