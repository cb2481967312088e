//! # world-sync
//!
//! Moves one game-server dataset between hosts through an S3-compatible
//! object store, and talks to the running server over RCON.
//!
//! ## Layers
//! - **core**: RCON packet framing (pure functions and a tokio codec)
//! - **protocol**: authenticated RCON sessions and console commands
//! - **store**: object store gateway (S3, local directory, in-memory)
//! - **sync**: exclusive lock, snapshot upload/download, backup rotation
//! - **service**: host lifecycle, server probe, backup scheduler, log watcher
//! - **utils**: logging, retry, clock, log tailing
//!
//! Every operation runs as a single sequential flow; there is at most one
//! request in flight per RCON session.

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod store;
pub mod sync;
pub mod utils;

pub use config::SyncConfig;
pub use error::{Result, StoreError, SyncError};
pub use protocol::RconSession;
pub use store::ObjectStore;
pub use sync::{ExclusiveLock, LockRecord, SnapshotManager};
