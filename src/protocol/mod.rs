//! # RCON Protocol Layer
//!
//! Authenticated request/response sessions on top of the packet codec in
//! [`crate::core`].
//!
//! ## Components
//! - **RconSession**: connect, authenticate, run commands, disconnect
//! - **commands**: console commands the host and backup tooling send
//!
//! ## Example
//! ```no_run
//! use world_sync::protocol::RconSession;
//! use world_sync::config::RconConfig;
//!
//! # async fn demo() -> world_sync::error::Result<()> {
//! let mut session = RconSession::open(&RconConfig::default()).await?;
//! let reply = session.command("list").await?;
//! println!("{reply}");
//! session.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod commands;
pub mod session;

pub use session::{RconSession, SessionState};
