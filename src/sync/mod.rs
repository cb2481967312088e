//! # Dataset Coordination
//!
//! Keeps one writer per dataset and moves the dataset between hosts.
//!
//! ## Components
//! - **ExclusiveLock**: JSON lock record in the object store
//! - **SnapshotManager**: upload, download, timestamped backups, retention
//! - **Archiver**: directory to `.tar.gz` and back

pub mod archive;
pub mod lock;
pub mod snapshot;

pub use archive::{Archiver, TarGzArchiver};
pub use lock::{ExclusiveLock, LockRecord};
pub use snapshot::{RotationReport, SnapshotManager};
