//! Dataset snapshots: upload, download, timestamped backups and retention.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::config::{ARCHIVE_SUFFIX, DATA_ARCHIVE_KEY};
use crate::error::{Result, SyncError};
use crate::store::{ObjectMeta, ObjectStore};
use crate::sync::archive::Archiver;
use crate::utils::time::{backup_stamp, Clock};

/// Outcome of one retention pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationReport {
    /// Backups present before rotation
    pub found: usize,
    /// Keys removed, oldest first
    pub deleted: Vec<String>,
    /// Keys whose delete failed; they stay in the store
    pub failed: Vec<String>,
}

/// Moves the local dataset to and from the object store
pub struct SnapshotManager {
    store: Arc<dyn ObjectStore>,
    archiver: Arc<dyn Archiver>,
    clock: Arc<dyn Clock>,
}

impl SnapshotManager {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        archiver: Arc<dyn Archiver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            archiver,
            clock,
        }
    }

    /// Archive `local_dir` and upload it under `key`
    async fn push_archive(&self, local_dir: &Path, key: &str) -> Result<()> {
        // Removed on drop, whichever way this returns
        let scratch = tempfile::Builder::new()
            .prefix(".world-sync-")
            .suffix(ARCHIVE_SUFFIX)
            .tempfile_in(staging_parent(local_dir))?;

        self.archiver.create(local_dir, scratch.path()).await?;
        let size = tokio::fs::metadata(scratch.path()).await?.len();
        debug!(key, size, "Uploading archive");
        self.store.put_file(key, scratch.path()).await?;
        Ok(())
    }

    /// Replace the stored dataset with the contents of `local_dir`.
    ///
    /// A missing directory is a no-op.
    #[instrument(skip(self), fields(dir = %local_dir.display()))]
    pub async fn upload(&self, local_dir: &Path) -> Result<()> {
        if !tokio::fs::try_exists(local_dir).await? {
            warn!("Local data directory does not exist, nothing to upload");
            return Ok(());
        }

        self.push_archive(local_dir, DATA_ARCHIVE_KEY).await?;
        info!(key = DATA_ARCHIVE_KEY, "Dataset uploaded");
        Ok(())
    }

    /// Replace the contents of `local_dir` with the stored dataset.
    ///
    /// Nothing stored yet is a silent success that leaves the filesystem
    /// alone. The archive is fully extracted into a staging directory before
    /// `local_dir` is touched, so a corrupt archive leaves the existing data in
    /// place.
    #[instrument(skip(self), fields(dir = %local_dir.display()))]
    pub async fn download(&self, local_dir: &Path) -> Result<()> {
        match self.store.head(DATA_ARCHIVE_KEY).await {
            Ok(meta) => debug!(size = meta.size, "Stored dataset found"),
            Err(e) if e.is_not_found() => {
                info!("No stored dataset yet, starting fresh");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let parent = staging_parent(local_dir);
        tokio::fs::create_dir_all(&parent).await?;

        let archive = tempfile::Builder::new()
            .prefix(".world-sync-")
            .suffix(ARCHIVE_SUFFIX)
            .tempfile_in(&parent)?;
        match self.store.get_to_file(DATA_ARCHIVE_KEY, archive.path()).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                info!("Stored dataset disappeared before download");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let staging = tempfile::Builder::new()
            .prefix(".world-sync-")
            .tempdir_in(&parent)?;
        self.archiver.extract(archive.path(), staging.path()).await?;

        let from = staging.path().to_path_buf();
        let to = local_dir.to_path_buf();
        tokio::task::spawn_blocking(move || replace_contents(&from, &to))
            .await
            .map_err(|e| SyncError::ExtractionError(format!("install task failed: {e}")))??;

        info!(key = DATA_ARCHIVE_KEY, "Dataset downloaded");
        Ok(())
    }

    /// Upload `local_dir` as `<prefix>backup-YYYYMMDD-HHMMSS.tar.gz` and return the key
    #[instrument(skip(self), fields(dir = %local_dir.display()))]
    pub async fn create_timestamped_backup(&self, local_dir: &Path, prefix: &str) -> Result<String> {
        let key = format!(
            "{prefix}backup-{}{ARCHIVE_SUFFIX}",
            backup_stamp(self.clock.now())
        );
        self.push_archive(local_dir, &key).await?;
        info!(key = %key, "Backup created");
        Ok(key)
    }

    /// Backups under `prefix`, oldest first
    pub async fn list_backups(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let mut backups: Vec<ObjectMeta> = self
            .store
            .list(prefix)
            .await?
            .into_iter()
            .filter(|meta| meta.key.ends_with(ARCHIVE_SUFFIX))
            .collect();
        backups.sort_by(|a, b| {
            a.last_modified
                .cmp(&b.last_modified)
                .then_with(|| a.key.cmp(&b.key))
        });
        Ok(backups)
    }

    /// Keep the newest `keep` backups under `prefix` and delete the rest.
    ///
    /// A failed delete is logged and the pass continues.
    #[instrument(skip(self))]
    pub async fn rotate(&self, prefix: &str, keep: usize) -> Result<RotationReport> {
        let backups = self.list_backups(prefix).await?;
        let mut report = RotationReport {
            found: backups.len(),
            ..Default::default()
        };
        let excess = backups.len().saturating_sub(keep);
        if excess == 0 {
            debug!(found = report.found, keep, "Nothing to rotate");
            return Ok(report);
        }

        for meta in backups.into_iter().take(excess) {
            match self.store.delete(&meta.key).await {
                Ok(()) => {
                    info!(key = %meta.key, "Deleted old backup");
                    report.deleted.push(meta.key);
                }
                Err(e) => {
                    warn!(key = %meta.key, error = %e, "Failed to delete old backup");
                    report.failed.push(meta.key);
                }
            }
        }
        Ok(report)
    }
}

/// Directory to hold staging files next to `local_dir`, so the final moves
/// stay on one filesystem
fn staging_parent(local_dir: &Path) -> PathBuf {
    match local_dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn remove_entry(path: &Path) -> io::Result<()> {
    if std::fs::symlink_metadata(path)?.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    for entry in walkdir::WalkDir::new(from) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(io::Error::other)?;
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Empty `dest` (keeping the directory itself) and move every entry of
/// `staging` into it
fn replace_contents(staging: &Path, dest: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(dest)? {
        remove_entry(&entry?.path())?;
    }

    for entry in std::fs::read_dir(staging)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if std::fs::rename(entry.path(), &target).is_err() {
            copy_tree(&entry.path(), &target)?;
        }
    }
    Ok(())
}
