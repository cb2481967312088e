//! Advisory single-owner lock stored as one JSON object.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::LOCK_KEY;
use crate::error::{Result, StoreError, SyncError};
use crate::store::ObjectStore;
use crate::utils::time::{iso8601, Clock};

const UNKNOWN: &str = "unknown";

fn unknown() -> String {
    UNKNOWN.to_string()
}

/// Who holds the dataset and since when
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    #[serde(default = "unknown")]
    pub hostname: String,
    #[serde(default = "unknown")]
    pub timestamp: String,
    #[serde(default)]
    pub pid: i64,
}

impl LockRecord {
    /// Placeholder owner for a lock object whose body could not be read
    pub fn unknown_owner() -> Self {
        Self {
            hostname: unknown(),
            timestamp: unknown(),
            pid: 0,
        }
    }

    /// Keep whatever fields of a malformed record still read as expected
    fn salvage(body: &[u8]) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_slice(body).ok()?;
        let object = value.as_object()?;
        let text = |field: &str| {
            object
                .get(field)
                .and_then(serde_json::Value::as_str)
                .map_or_else(unknown, str::to_string)
        };
        Some(Self {
            hostname: text("hostname"),
            timestamp: text("timestamp"),
            pid: object
                .get("pid")
                .and_then(serde_json::Value::as_i64)
                .unwrap_or(0),
        })
    }
}

/// Lock over the shared dataset.
///
/// The check-then-write in [`acquire`](Self::acquire) is not atomic. When
/// `conditional` is set and the store supports it, the write is a conditional
/// create and a lost race surfaces as [`SyncError::LockConflict`]. Otherwise two
/// hosts acquiring in the same instant can both succeed.
pub struct ExclusiveLock {
    store: Arc<dyn ObjectStore>,
    key: String,
    conditional: bool,
}

impl ExclusiveLock {
    pub fn new(store: Arc<dyn ObjectStore>, conditional: bool) -> Self {
        Self {
            store,
            key: LOCK_KEY.to_string(),
            conditional,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current holder, if any
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn check(&self) -> Result<Option<LockRecord>> {
        let body = match self.store.get(&self.key).await {
            Ok(body) => body,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<LockRecord>(&body) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                // The object exists, so the dataset is held even if we can't say by whom
                warn!(error = %e, "Lock record is malformed");
                Ok(Some(
                    LockRecord::salvage(&body).unwrap_or_else(LockRecord::unknown_owner),
                ))
            }
        }
    }

    /// Take the lock for `hostname`/`pid`, stamped with `clock`.
    ///
    /// An existing record is never overwritten.
    #[instrument(skip(self, clock), fields(key = %self.key))]
    pub async fn acquire(&self, hostname: &str, pid: i64, clock: &dyn Clock) -> Result<LockRecord> {
        if let Some(existing) = self.check().await? {
            return Err(SyncError::LockConflict(existing));
        }

        let record = LockRecord {
            hostname: hostname.to_string(),
            timestamp: iso8601(clock.now()),
            pid,
        };
        let body = Bytes::from(serde_json::to_vec_pretty(&record)?);

        if self.conditional {
            match self
                .store
                .put_if_absent(&self.key, body.clone(), Some("application/json"))
                .await
            {
                Ok(true) => {
                    info!(hostname, "Lock acquired");
                    return Ok(record);
                }
                Ok(false) => {
                    let winner = self.check().await?.unwrap_or_else(LockRecord::unknown_owner);
                    return Err(SyncError::LockConflict(winner));
                }
                Err(StoreError::Unsupported(reason)) => {
                    debug!(reason, "Falling back to unconditional lock write");
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.store
            .put(&self.key, body, Some("application/json"))
            .await?;
        info!(hostname, "Lock acquired");
        Ok(record)
    }

    /// Drop the lock. Never fails; problems are logged.
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn release(&self) {
        match self.store.delete(&self.key).await {
            Ok(()) => info!("Lock released"),
            Err(e) if e.is_not_found() => debug!("Lock was not held"),
            Err(e) => warn!(error = %e, "Failed to release lock"),
        }
    }
}
