//! # Core Protocol Components
//!
//! Low-level RCON packet handling and stream framing.
//!
//! ## Components
//! - **Packet**: wire format, pure `to_bytes` / `from_bytes`
//! - **Codec**: Tokio codec for framing over byte streams, plus a
//!   read-exactly-one-packet helper
//!
//! ## Wire Format
//! ```text
//! [Length(4)] [RequestId(4)] [Type(4)] [Body(N)] [0x00 0x00]
//! ```
//!
//! ## Limitations
//! - One response per packet: multi-packet command output is not reassembled
//! - Maximum packet size: 1MB (length validated before allocation)

pub mod codec;
pub mod packet;
