//! Host lifecycle: claim the dataset before the server starts, hand it back
//! after it stops.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::error::Result;
use crate::sync::{ExclusiveLock, LockRecord, SnapshotManager};
use crate::utils::time::Clock;

/// Identity of this host in lock records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    pub hostname: String,
    pub pid: i64,
}

impl HostIdentity {
    pub fn new(hostname: impl Into<String>, pid: i64) -> Self {
        Self {
            hostname: hostname.into(),
            pid,
        }
    }

    /// Machine hostname and this process id
    pub fn current() -> Self {
        let hostname = hostname::get()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());
        Self::new(hostname, i64::from(std::process::id()))
    }
}

pub struct HostLifecycle {
    lock: ExclusiveLock,
    snapshots: Arc<SnapshotManager>,
    clock: Arc<dyn Clock>,
    identity: HostIdentity,
    local_dir: PathBuf,
}

impl HostLifecycle {
    pub fn new(
        lock: ExclusiveLock,
        snapshots: Arc<SnapshotManager>,
        clock: Arc<dyn Clock>,
        identity: HostIdentity,
        local_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            lock,
            snapshots,
            clock,
            identity,
            local_dir: local_dir.into(),
        }
    }

    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }

    /// Take the lock and pull the latest dataset.
    ///
    /// If the download fails the lock is released again before returning.
    #[instrument(skip(self), fields(host = %self.identity.hostname))]
    pub async fn init(&self) -> Result<LockRecord> {
        let record = self
            .lock
            .acquire(&self.identity.hostname, self.identity.pid, self.clock.as_ref())
            .await?;

        if let Err(e) = self.snapshots.download(&self.local_dir).await {
            error!(error = %e, "Download failed, releasing lock");
            self.lock.release().await;
            return Err(e);
        }

        info!("Host initialized");
        Ok(record)
    }

    /// Push the dataset and release the lock.
    ///
    /// The lock is released even when the upload fails; the upload error is
    /// still returned.
    #[instrument(skip(self), fields(host = %self.identity.hostname))]
    pub async fn shutdown(&self) -> Result<()> {
        let uploaded = self.snapshots.upload(&self.local_dir).await;
        if let Err(e) = &uploaded {
            error!(error = %e, "Upload failed");
        }

        self.lock.release().await;
        if uploaded.is_ok() {
            info!("Host shut down cleanly");
        }
        uploaded
    }
}
