use std::fmt;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info, instrument, warn};

use crate::config::RconConfig;
use crate::core::codec::RconCodec;
use crate::core::packet::{Packet, PacketType, AUTH_FAILED_ID};
use crate::error::{constants, Result, SyncError};

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
}

/// One authenticated RCON connection.
///
/// Requests are strictly sequential: each `command` sends one packet and
/// reads exactly one reply. Responses the server splits over several packets
/// are not reassembled; only the first packet's body is returned.
pub struct RconSession {
    framed: Option<Framed<TcpStream, RconCodec>>,
    addr: Option<String>,
    next_request_id: i32,
    state: SessionState,
    connect_timeout: Duration,
}

impl fmt::Debug for RconSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RconSession")
            .field("state", &self.state)
            .field("addr", &self.addr)
            .field("next_request_id", &self.next_request_id)
            .finish()
    }
}

impl Default for RconSession {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl RconSession {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            framed: None,
            addr: None,
            next_request_id: 1,
            state: SessionState::Disconnected,
            connect_timeout,
        }
    }

    /// Connect and authenticate using `config`
    pub async fn open(config: &RconConfig) -> Result<Self> {
        let mut session = Self::new(config.connect_timeout);
        session
            .connect(&config.host, config.port, &config.password)
            .await?;
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Id the next outgoing packet will carry
    pub fn next_request_id(&self) -> i32 {
        self.next_request_id
    }

    /// `host:port` of the last connection attempt
    pub fn addr(&self) -> Option<&str> {
        self.addr.as_deref()
    }

    fn not_connected(&self) -> SyncError {
        SyncError::ConnectionError {
            addr: self.addr.clone().unwrap_or_else(|| "-".to_string()),
            reason: constants::ERR_NOT_CONNECTED.to_string(),
        }
    }

    fn take_request_id(&mut self) -> i32 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1).max(1);
        id
    }

    /// Open the TCP connection and authenticate with `password`.
    ///
    /// Any existing connection is dropped first. On failure the session is
    /// left disconnected with its socket closed.
    #[instrument(skip(self, password))]
    pub async fn connect(&mut self, host: &str, port: u16, password: &str) -> Result<()> {
        self.disconnect().await;
        let addr = format!("{host}:{port}");
        self.addr = Some(addr.clone());

        match self.establish(&addr, password).await {
            Ok(()) => {
                self.state = SessionState::Ready;
                info!(addr = %addr, "RCON session ready");
                Ok(())
            }
            Err(e) => {
                self.disconnect().await;
                Err(e)
            }
        }
    }

    /// TCP connect and authenticate; the caller cleans up on error
    async fn establish(&mut self, addr: &str, password: &str) -> Result<()> {
        let connection_error = |reason: String| SyncError::ConnectionError {
            addr: addr.to_string(),
            reason,
        };

        self.state = SessionState::Connecting;
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| connection_error(constants::ERR_CONNECT_TIMEOUT.to_string()))?
            .map_err(|e| connection_error(e.to_string()))?;
        stream
            .set_nodelay(true)
            .map_err(|e| connection_error(e.to_string()))?;
        self.framed = Some(Framed::new(stream, RconCodec));

        self.state = SessionState::Authenticating;
        self.authenticate(password).await
    }

    async fn authenticate(&mut self, password: &str) -> Result<()> {
        let id = self.take_request_id();
        let reply = self
            .exchange(Packet::new(id, PacketType::AUTH, password.as_bytes()))
            .await?;

        if reply.request_id == AUTH_FAILED_ID || reply.packet_type != PacketType::AUTH_RESPONSE {
            warn!(
                reply_id = reply.request_id,
                reply_type = reply.packet_type.0,
                "{}",
                constants::ERR_AUTH_REJECTED
            );
            return Err(SyncError::AuthenticationError);
        }
        Ok(())
    }

    async fn exchange(&mut self, packet: Packet) -> Result<Packet> {
        let not_connected = self.not_connected();
        let framed = self.framed.as_mut().ok_or(not_connected)?;
        framed.send(packet).await?;
        framed.next().await.ok_or(SyncError::ConnectionClosed)?
    }

    /// Run one console command and return the server's reply text
    #[instrument(skip(self), level = "debug")]
    pub async fn command(&mut self, text: &str) -> Result<String> {
        if self.state != SessionState::Ready {
            return Err(self.not_connected());
        }

        let id = self.take_request_id();
        let reply = match self
            .exchange(Packet::new(id, PacketType::EXEC_COMMAND, text.as_bytes()))
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                // The stream position is unknown after a failed exchange
                self.disconnect().await;
                return Err(e);
            }
        };

        if reply.request_id != id {
            debug!(sent = id, received = reply.request_id, "Reply id does not match request");
        }
        Ok(reply.body_text())
    }

    /// Close the socket. Safe to call in any state.
    pub async fn disconnect(&mut self) {
        if let Some(mut framed) = self.framed.take() {
            if let Err(e) = framed.get_mut().shutdown().await {
                debug!(error = %e, "Error while closing RCON socket");
            }
            debug!("RCON session closed");
        }
        self.state = SessionState::Disconnected;
    }
}
