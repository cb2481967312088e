//! # Operational Services
//!
//! Long-running jobs built from the protocol, store and sync layers.
//!
//! ## Components
//! - **host**: claim the dataset at startup, hand it back at shutdown
//! - **probe**: wait for the server to answer RCON
//! - **scheduler**: periodic backups with save control and retention
//! - **watch**: player join/leave events from the server log

pub mod host;
pub mod probe;
pub mod scheduler;
pub mod watch;

pub use host::{HostIdentity, HostLifecycle};
pub use probe::wait_for_server;
pub use scheduler::BackupScheduler;
pub use watch::{PlayerEvent, PlayerWatcher};
