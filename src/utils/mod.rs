//! # Utility Modules
//!
//! Supporting utilities for logging, time, retries and log tailing.
//!
//! ## Components
//! - **Logging**: Structured logging configuration
//! - **Time**: Injectable UTC clock
//! - **Retry**: Bounded retry-with-interval, cancellable between attempts
//! - **Tail**: Follow a growing text file with a poll interval

pub mod logging;
pub mod retry;
pub mod tail;
pub mod time;

pub use retry::RetryPolicy;
pub use time::{Clock, SystemClock};
