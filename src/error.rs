//! # Error Types
//!
//! Error handling for the RCON client and the object-store coordination layer.
//!
//! ## Error Categories
//! - **Connection Errors**: unreachable/refused/timed out servers, sockets closed mid-read
//! - **Framing Errors**: truncated, malformed or oversized RCON packets
//! - **Authentication Errors**: the server rejected the RCON password
//! - **Lock Errors**: the dataset is already owned by another host
//! - **Store Errors**: transient or permanent object-store failures
//! - **Archive Errors**: the archive tool failed to create or extract a snapshot
//!
//! All errors implement `std::error::Error` for interoperability.
//!
//! ## Example Usage
//! ```rust
//! use world_sync::error::{Result, SyncError};
//!
//! fn require_port(port: u16) -> Result<u16> {
//!     if port == 0 {
//!         return Err(SyncError::ConfigError("RCON port cannot be 0".into()));
//!     }
//!     Ok(port)
//! }
//!
//! assert!(require_port(0).is_err());
//! ```

use std::io;
use thiserror::Error;

use crate::sync::lock::LockRecord;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Connection errors
    pub const ERR_CONNECT_TIMEOUT: &str = "Connection attempt timed out";
    pub const ERR_NOT_CONNECTED: &str = "not connected";

    /// Authentication errors
    pub const ERR_AUTH_REJECTED: &str = "RCON authentication failed";

    /// Archive errors
    pub const ERR_ARCHIVE_CREATE: &str = "Failed to create archive";
    pub const ERR_ARCHIVE_EXTRACT: &str = "Failed to extract archive";

    /// Store errors
    pub const ERR_CONDITIONAL_PUT: &str = "Store does not support conditional writes";
}

/// Errors reported by an [`ObjectStore`](crate::store::ObjectStore) backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Unsupported store operation: {0}")]
    Unsupported(&'static str),
}

impl StoreError {
    /// Whether this error means the object simply does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

// SyncError is the primary error type for all crate operations
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to connect to {addr}: {reason}")]
    ConnectionError { addr: String, reason: String },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Truncated packet: expected {expected} bytes, received {received}")]
    TruncatedPacket { expected: usize, received: usize },

    #[error("Malformed packet: declared length {0}")]
    MalformedPacket(i32),

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("RCON authentication failed")]
    AuthenticationError,

    #[error("Server is already locked by {} since {}", .0.hostname, .0.timestamp)]
    LockConflict(LockRecord),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Archive error: {0}")]
    ArchiveError(String),

    #[error("Extraction error: {0}")]
    ExtractionError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Gave up after {0} attempts")]
    RetriesExhausted(u32),
}

impl SyncError {
    /// Whether a caller-level retry loop may try again after this error.
    ///
    /// Authentication and configuration failures are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::ConnectionError { .. }
                | SyncError::ConnectionClosed
                | SyncError::TruncatedPacket { .. }
                | SyncError::Io(_)
        )
    }
}

/// Type alias for Results using SyncError
pub type Result<T> = std::result::Result<T, SyncError>;
