//! Server console commands used by the backup and host tooling.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::protocol::session::RconSession;

/// Bossbar that shows which host is serving the world
pub const BOSSBAR_ID: &str = "minecraft:host_info";

/// Prefix on every chat notice sent by the backup job
pub const NOTICE_PREFIX: &str = "[Backup] ";

async fn run(session: &mut RconSession, command: &str) -> Result<String> {
    let reply = session.command(command).await?;
    if reply.is_empty() {
        debug!(command, "Command ok");
    } else {
        debug!(command, reply = %reply, "Command ok");
    }
    Ok(reply)
}

/// Flush all chunks to disk
pub async fn save_all_flush(session: &mut RconSession) -> Result<String> {
    run(session, "save-all flush").await
}

/// Stop the server writing world files
pub async fn save_off(session: &mut RconSession) -> Result<String> {
    run(session, "save-off").await
}

/// Resume automatic saving
pub async fn save_on(session: &mut RconSession) -> Result<String> {
    run(session, "save-on").await
}

/// `tellraw` command showing `message` to every player
pub fn notice_command(message: &str) -> String {
    let component = json!({
        "text": format!("{NOTICE_PREFIX}{message}"),
        "color": "aqua",
    });
    format!("tellraw @a {component}")
}

/// Broadcast a chat notice
pub async fn notify(session: &mut RconSession, message: &str) -> Result<()> {
    run(session, &notice_command(message)).await?;
    Ok(())
}

fn player_count_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"There are (\d+)").expect("static regex"))
}

/// Online player count from a `list` reply
pub fn parse_player_count(reply: &str) -> Option<u32> {
    player_count_pattern()
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Ask the server how many players are online.
///
/// `Ok(None)` when the reply has an unexpected shape.
pub async fn player_count(session: &mut RconSession) -> Result<Option<u32>> {
    let reply = run(session, "list").await?;
    Ok(parse_player_count(&reply))
}

/// Commands that (re)create the host bossbar for `host_name`
pub fn bossbar_commands(host_name: &str) -> Vec<String> {
    let title = json!({
        "text": format!("Current Host: {host_name}"),
        "color": "green",
    });
    vec![
        format!("bossbar remove {BOSSBAR_ID}"),
        format!("bossbar add {BOSSBAR_ID} {title}"),
        format!("bossbar set {BOSSBAR_ID} color green"),
        format!("bossbar set {BOSSBAR_ID} style progress"),
        format!("bossbar set {BOSSBAR_ID} max 100"),
        format!("bossbar set {BOSSBAR_ID} value 100"),
        format!("bossbar set {BOSSBAR_ID} visible true"),
        format!("bossbar set {BOSSBAR_ID} players @a"),
    ]
}

/// Show every player which host is running the server
#[instrument(skip(session))]
pub async fn setup_bossbar(session: &mut RconSession, host_name: &str) -> Result<()> {
    for command in bossbar_commands(host_name) {
        run(session, &command).await?;
    }
    info!(host_name, "Host bossbar configured");
    Ok(())
}
