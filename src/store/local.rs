use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{ObjectMeta, ObjectStore, StoreResult};
use crate::error::StoreError;

/// Object store backed by a directory tree.
///
/// Keys map to relative paths (`backups/x.tar.gz` → `<root>/backups/x.tar.gz`).
/// Writes go through a sibling temp file and a rename, so readers never see a
/// half-written object.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(StoreError::Backend(format!("invalid object key: {key:?}")));
        }
        Ok(self.root.join(relative))
    }

    async fn ensure_parent(path: &Path) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    fn staging_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".partial.{}", std::process::id()));
        path.with_file_name(name)
    }

    async fn write_atomic(path: &Path, body: &[u8]) -> StoreResult<()> {
        Self::ensure_parent(path).await?;
        let staging = Self::staging_path(path);
        tokio::fs::write(&staging, body).await?;
        if let Err(e) = tokio::fs::rename(&staging, path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e.into());
        }
        Ok(())
    }
}

fn not_found(key: &str) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |e| match e.kind() {
        ErrorKind::NotFound => StoreError::NotFound(key.to_string()),
        _ => StoreError::Io(e),
    }
}

fn modified_time(meta: &std::fs::Metadata) -> DateTime<Utc> {
    meta.modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn get(&self, key: &str) -> StoreResult<Bytes> {
        let path = self.path_for(key)?;
        let body = tokio::fs::read(&path).await.map_err(not_found(key))?;
        Ok(Bytes::from(body))
    }

    async fn put(&self, key: &str, body: Bytes, _content_type: Option<&str>) -> StoreResult<()> {
        let path = self.path_for(key)?;
        Self::write_atomic(&path, &body).await
    }

    async fn put_if_absent(
        &self,
        key: &str,
        body: Bytes,
        _content_type: Option<&str>,
    ) -> StoreResult<bool> {
        let path = self.path_for(key)?;
        Self::ensure_parent(&path).await?;
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        file.write_all(&body).await?;
        file.sync_all().await?;
        Ok(true)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let path = self.path_for(key)?;
        tokio::fs::remove_file(&path).await.map_err(not_found(key))
    }

    async fn head(&self, key: &str) -> StoreResult<ObjectMeta> {
        let path = self.path_for(key)?;
        let meta = tokio::fs::metadata(&path).await.map_err(not_found(key))?;
        if !meta.is_file() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        Ok(ObjectMeta {
            key: key.to_string(),
            last_modified: modified_time(&meta),
            size: meta.len(),
        })
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectMeta>> {
        let root = self.root.clone();
        let prefix = prefix.to_string();
        debug!(root = %root.display(), prefix = %prefix, "Listing local store");

        tokio::task::spawn_blocking(move || -> StoreResult<Vec<ObjectMeta>> {
            if !root.exists() {
                return Ok(Vec::new());
            }
            let mut objects = Vec::new();
            for entry in walkdir::WalkDir::new(&root).min_depth(1) {
                let entry = entry.map_err(|e| StoreError::Backend(e.to_string()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(&root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if !key.starts_with(&prefix) || key.contains(".partial.") {
                    continue;
                }
                let meta = entry
                    .metadata()
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                objects.push(ObjectMeta {
                    key,
                    last_modified: modified_time(&meta),
                    size: meta.len(),
                });
            }
            objects.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(objects)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("listing task failed: {e}")))?
    }

    async fn put_file(&self, key: &str, path: &Path) -> StoreResult<()> {
        let target = self.path_for(key)?;
        Self::ensure_parent(&target).await?;
        let staging = Self::staging_path(&target);
        tokio::fs::copy(path, &staging).await?;
        if let Err(e) = tokio::fs::rename(&staging, &target).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn get_to_file(&self, key: &str, path: &Path) -> StoreResult<()> {
        let source = self.path_for(key)?;
        tokio::fs::copy(&source, path).await.map_err(not_found(key))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        store
            .put("backups/backup-20240101-000000.tar.gz", Bytes::from_static(b"x"), None)
            .await
            .unwrap();
        store.put("server.lock", Bytes::from_static(b"{}"), None).await.unwrap();

        let listed = store.list("backups/").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "backups/backup-20240101-000000.tar.gz");
        assert_eq!(store.get("server.lock").await.unwrap(), Bytes::from_static(b"{}"));
    }

    #[tokio::test]
    async fn test_not_found_and_conditional_create() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        assert!(store.get("server.lock").await.unwrap_err().is_not_found());
        assert!(store.delete("server.lock").await.unwrap_err().is_not_found());

        assert!(store.put_if_absent("server.lock", Bytes::from_static(b"a"), None).await.unwrap());
        assert!(!store.put_if_absent("server.lock", Bytes::from_static(b"b"), None).await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        assert!(store.get("../etc/passwd").await.is_err());
        assert!(store.get("/abs").await.is_err());
    }
}
