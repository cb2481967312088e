//! Periodic world backups with save control and chat notices.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::config::{BackupConfig, RconConfig};
use crate::error::Result;
use crate::protocol::{commands, RconSession};
use crate::service::probe::wait_for_server;
use crate::store::ObjectMeta;
use crate::sync::SnapshotManager;
use crate::utils::retry::sleep_unless_cancelled;
use crate::utils::time::Clock;

#[derive(Debug, Clone, Copy)]
enum SaveStep {
    Flush,
    Off,
    On,
}

/// One line of the backup listing
pub fn describe_backup(index: usize, meta: &ObjectMeta) -> String {
    let size_mb = meta.size as f64 / 1024.0 / 1024.0;
    format!(
        "{:>3}. {}  {:.2} MB  {}",
        index + 1,
        meta.key,
        size_mb,
        meta.last_modified.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

pub struct BackupScheduler {
    snapshots: Arc<SnapshotManager>,
    clock: Arc<dyn Clock>,
    backup: BackupConfig,
    rcon: RconConfig,
    local_dir: PathBuf,
}

impl BackupScheduler {
    pub fn new(
        snapshots: Arc<SnapshotManager>,
        clock: Arc<dyn Clock>,
        backup: BackupConfig,
        rcon: RconConfig,
        local_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            snapshots,
            clock,
            backup,
            rcon,
            local_dir: local_dir.into(),
        }
    }

    async fn notify(session: &mut Option<RconSession>, message: &str) {
        let Some(session) = session.as_mut() else {
            return;
        };
        if let Err(e) = commands::notify(session, message).await {
            warn!(error = %e, "Chat notice failed");
        }
    }

    async fn save(session: &mut Option<RconSession>, step: SaveStep) {
        let Some(session) = session.as_mut() else {
            return;
        };
        let result = match step {
            SaveStep::Flush => commands::save_all_flush(session).await,
            SaveStep::Off => commands::save_off(session).await,
            SaveStep::On => commands::save_on(session).await,
        };
        if let Err(e) = result {
            warn!(?step, error = %e, "Save command failed");
        }
    }

    async fn try_connect(&self) -> Option<RconSession> {
        match RconSession::open(&self.rcon).await {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, "RCON unavailable, backing up without save control");
                None
            }
        }
    }

    /// One backup: notice, flush, save-off, upload, rotate, notice.
    ///
    /// Saving is switched back on whatever happens. RCON problems are
    /// logged and never abort the backup itself.
    #[instrument(skip(self, session))]
    pub async fn backup_once(&self, session: &mut Option<RconSession>) -> Result<String> {
        let started = self.clock.now();
        info!(at = %started.format("%Y-%m-%d %H:%M:%S"), "Backup starting");

        Self::notify(
            session,
            &format!("Backup starting... ({})", started.format("%H:%M")),
        )
        .await;
        Self::save(session, SaveStep::Flush).await;
        if session.is_some() && !self.backup.flush_grace.is_zero() {
            tokio::time::sleep(self.backup.flush_grace).await;
        }
        Self::save(session, SaveStep::Off).await;

        let outcome = self
            .snapshots
            .create_timestamped_backup(&self.local_dir, &self.backup.prefix)
            .await;

        match &outcome {
            Ok(key) => {
                match self
                    .snapshots
                    .rotate(&self.backup.prefix, self.backup.max_backups)
                    .await
                {
                    Ok(report) => info!(
                        found = report.found,
                        deleted = report.deleted.len(),
                        failed = report.failed.len(),
                        "Rotation finished"
                    ),
                    Err(e) => warn!(error = %e, "Rotation failed"),
                }
                let finished = self.clock.now();
                Self::notify(
                    session,
                    &format!("Backup complete! ({})", finished.format("%Y-%m-%d %H:%M")),
                )
                .await;
                info!(key = %key, "Backup finished");
            }
            Err(e) => {
                Self::notify(session, "Backup failed").await;
                error!(error = %e, "Backup failed");
            }
        }

        Self::save(session, SaveStep::On).await;
        outcome
    }

    /// Wait for the server, then back up every interval until cancelled
    #[instrument(skip(self, cancel))]
    pub async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        let mut session = Some(wait_for_server(&self.rcon, cancel).await?);
        info!(
            interval_mins = self.backup.interval.as_secs() / 60,
            max_backups = self.backup.max_backups,
            "Backup scheduler started"
        );

        loop {
            if session.as_ref().map_or(true, |s| !s.is_ready()) {
                session = self.try_connect().await;
            }
            // Failures are logged inside; the schedule keeps going
            let _ = self.backup_once(&mut session).await;

            info!(
                next_in_mins = self.backup.interval.as_secs() / 60,
                "Waiting for next backup"
            );
            if !sleep_unless_cancelled(cancel, self.backup.interval).await {
                break;
            }
        }

        if let Some(session) = session.as_mut() {
            session.disconnect().await;
        }
        info!("Backup scheduler stopped");
        Ok(())
    }

    /// A single backup right now; RCON is optional
    pub async fn now(&self) -> Result<String> {
        let mut session = self.try_connect().await;
        let outcome = self.backup_once(&mut session).await;
        if let Some(session) = session.as_mut() {
            session.disconnect().await;
        }
        outcome
    }

    /// Stored backups, newest first
    pub async fn list(&self) -> Result<Vec<ObjectMeta>> {
        let mut backups = self.snapshots.list_backups(&self.backup.prefix).await?;
        backups.reverse();
        Ok(backups)
    }
}
