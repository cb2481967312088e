//! Structured logging setup.
//!
//! `RUST_LOG` directives take precedence over the configured level so a single
//! module can be turned up without touching the rest.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{Result, SyncError};

/// Install the global tracing subscriber.
///
/// Logs go to stderr so command output on stdout stays clean.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(config.log_level.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let result = if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| SyncError::ConfigError(format!("Failed to initialize logging: {e}")))
}
