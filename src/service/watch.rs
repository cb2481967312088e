//! Player join/leave events from the server log.

use std::sync::OnceLock;

use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::RconConfig;
use crate::error::Result;
use crate::protocol::{commands, RconSession};
use crate::utils::tail::LogTail;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    Joined(String),
    Left(String),
}

impl PlayerEvent {
    pub fn player(&self) -> &str {
        match self {
            PlayerEvent::Joined(name) | PlayerEvent::Left(name) => name,
        }
    }
}

fn patterns() -> &'static (Regex, Regex) {
    static PATTERNS: OnceLock<(Regex, Regex)> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        (
            Regex::new(r"\[Server thread/INFO\].*: (\w+) joined the game").expect("static regex"),
            Regex::new(r"\[Server thread/INFO\].*: (\w+) left the game").expect("static regex"),
        )
    })
}

/// Recognize a join or leave line
pub fn parse_event(line: &str) -> Option<PlayerEvent> {
    let (join, leave) = patterns();
    if let Some(caps) = join.captures(line) {
        return Some(PlayerEvent::Joined(caps[1].to_string()));
    }
    leave
        .captures(line)
        .map(|caps| PlayerEvent::Left(caps[1].to_string()))
}

/// Follows the server log and reports player events with the online count
pub struct PlayerWatcher {
    tail: LogTail,
    rcon: Option<RconConfig>,
    session: Option<RconSession>,
}

impl PlayerWatcher {
    /// `rcon` is used to look up the player count; `None` skips it
    pub fn new(tail: LogTail, rcon: Option<RconConfig>) -> Self {
        Self {
            tail,
            rcon,
            session: None,
        }
    }

    async fn player_count(&mut self) -> Option<u32> {
        let config = self.rcon.as_ref()?;

        if self.session.as_ref().map_or(true, |s| !s.is_ready()) {
            match RconSession::open(config).await {
                Ok(session) => self.session = Some(session),
                Err(e) => {
                    warn!(error = %e, "RCON reconnect failed");
                    return None;
                }
            }
        }

        let session = self.session.as_mut()?;
        match commands::player_count(session).await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Player count lookup failed");
                session.disconnect().await;
                None
            }
        }
    }

    /// Report events until `cancel` fires
    #[instrument(skip_all, fields(log = %self.tail.path().display()))]
    pub async fn run<F>(&mut self, cancel: &CancellationToken, mut on_event: F) -> Result<()>
    where
        F: FnMut(&PlayerEvent, Option<u32>),
    {
        info!("Watching server log");
        if !self.tail.open_at_end(cancel).await? {
            return Ok(());
        }

        while let Some(line) = self.tail.next_line(cancel).await? {
            let Some(event) = parse_event(line.trim()) else {
                continue;
            };
            let count = self.player_count().await;
            on_event(&event, count);
        }

        if let Some(session) = self.session.as_mut() {
            session.disconnect().await;
        }
        info!("Log watcher stopped");
        Ok(())
    }
}

/// Default event sink: one structured log line per event
pub fn log_event(event: &PlayerEvent, online: Option<u32>) {
    let online = online.map_or_else(|| "?".to_string(), |n| n.to_string());
    match event {
        PlayerEvent::Joined(name) => info!(player = %name, online = %online, "Player joined"),
        PlayerEvent::Left(name) => info!(player = %name, online = %online, "Player left"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_parse_event() {
        assert_eq!(
            parse_event("[12:00:01] [Server thread/INFO]: Steve joined the game"),
            Some(PlayerEvent::Joined("Steve".into()))
        );
        assert_eq!(
            parse_event("[12:30:00] [Server thread/INFO]: Alex left the game"),
            Some(PlayerEvent::Left("Alex".into()))
        );
        assert_eq!(parse_event("[12:00:01] [Server thread/INFO]: Done (3.2s)!"), None);
        assert_eq!(
            parse_event("[12:00:01] [User Authenticator #1/INFO]: Steve joined the game"),
            None
        );
    }

    #[tokio::test]
    async fn test_watcher_reports_new_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latest.log");
        std::fs::write(&path, "[00:00:00] [Server thread/INFO]: Old joined the game\n").unwrap();

        let cancel = CancellationToken::new();
        let mut watcher = PlayerWatcher::new(LogTail::new(&path, Duration::from_millis(10)), None);

        let writer = {
            let path = path.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
                writeln!(file, "[00:00:01] [Server thread/INFO]: Steve joined the game").unwrap();
                writeln!(file, "[00:00:02] [Server thread/INFO]: Steve left the game").unwrap();
                file.flush().unwrap();
                tokio::time::sleep(Duration::from_millis(200)).await;
                cancel.cancel();
            })
        };

        let mut seen = Vec::new();
        watcher
            .run(&cancel, |event, count| seen.push((event.clone(), count)))
            .await
            .unwrap();
        writer.await.unwrap();

        assert_eq!(
            seen,
            [
                (PlayerEvent::Joined("Steve".into()), None),
                (PlayerEvent::Left("Steve".into()), None),
            ]
        );
    }
}
