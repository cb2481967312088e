use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::config::RconConfig;
use crate::error::Result;
use crate::protocol::{commands, RconSession};
use crate::utils::retry::RetryPolicy;

/// Wait until the server answers RCON, retrying per `config`.
///
/// Each attempt connects, authenticates and runs `list`. A rejected password
/// ends the wait immediately.
#[instrument(skip(config, cancel), fields(addr = %config.address()))]
pub async fn wait_for_server(config: &RconConfig, cancel: &CancellationToken) -> Result<RconSession> {
    let policy = RetryPolicy::new(config.max_retries, config.retry_interval);
    info!(max_attempts = policy.max_attempts, "Waiting for server");

    let session = policy
        .run(cancel, |attempt| async move {
            info!(attempt, "Probing server");
            let mut session = RconSession::open(config).await?;
            commands::player_count(&mut session).await?;
            Ok(session)
        })
        .await?;

    info!("Server is up");
    Ok(session)
}
