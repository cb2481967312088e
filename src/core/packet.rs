//! # RCON Packet
//!
//! ```text
//! [Length(4)] [RequestId(4)] [Type(4)] [Body(N)] [0x00 0x00]
//! ```
//!
//! All integers are signed 32-bit little-endian. `Length` counts every byte
//! after itself, so a well-formed packet always has `Length == 8 + N + 2`.

use crate::config::MAX_PACKET_SIZE;
use crate::error::{Result, SyncError};

/// Bytes taken by the request id and type fields
pub const HEADER_LEN: usize = 8;

/// Two NUL bytes close every body
pub const TERMINATOR: [u8; 2] = [0x00, 0x00];

/// Smallest legal value of the length prefix (empty body)
pub const MIN_PACKET_LEN: usize = HEADER_LEN + TERMINATOR.len();

/// RCON packet type.
///
/// The protocol reuses the value `2` for both the auth response and the
/// exec-command request, so this is a newtype over the raw integer rather
/// than a closed enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketType(pub i32);

impl PacketType {
    /// Client → server login request
    pub const AUTH: PacketType = PacketType(3);
    /// Server → client login result
    pub const AUTH_RESPONSE: PacketType = PacketType(2);
    /// Client → server command
    pub const EXEC_COMMAND: PacketType = PacketType(2);
    /// Server → client command output
    pub const RESPONSE_VALUE: PacketType = PacketType(0);
}

/// Request id the server sends back when authentication fails
pub const AUTH_FAILED_ID: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub request_id: i32,
    pub packet_type: PacketType,
    pub body: Vec<u8>,
}

impl Packet {
    pub fn new(request_id: i32, packet_type: PacketType, body: impl Into<Vec<u8>>) -> Self {
        Self {
            request_id,
            packet_type,
            body: body.into(),
        }
    }

    /// Value of the length prefix for this packet
    #[inline]
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.body.len() + TERMINATOR.len()
    }

    /// Body as text, replacing invalid UTF-8 sequences
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Serialize to wire format, length prefix included
    pub fn to_bytes(&self) -> Vec<u8> {
        let len = self.wire_len();
        let mut out = Vec::with_capacity(4 + len);
        out.extend_from_slice(&(len as i32).to_le_bytes());
        self.write_frame(&mut out);
        out
    }

    /// Append everything after the length prefix
    pub(crate) fn write_frame(&self, out: &mut impl Extend<u8>) {
        out.extend(self.request_id.to_le_bytes());
        out.extend(self.packet_type.0.to_le_bytes());
        out.extend(self.body.iter().copied());
        out.extend(TERMINATOR);
    }

    /// Parse one complete packet from the front of `buf`.
    ///
    /// Fails with `ConnectionClosed` when the length prefix itself is incomplete
    /// and with `TruncatedPacket` when fewer bytes than declared follow it.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < 4 {
            return Err(SyncError::ConnectionClosed);
        }
        let declared = read_i32(&buf[..4]);
        let len = check_declared_len(declared)?;

        let frame = &buf[4..];
        if frame.len() < len {
            return Err(SyncError::TruncatedPacket {
                expected: len,
                received: frame.len(),
            });
        }
        Ok(Self::from_frame(&frame[..len]))
    }

    /// Build a packet from the `len` bytes that follow the length prefix.
    ///
    /// Callers must have validated `frame.len() >= MIN_PACKET_LEN`.
    pub(crate) fn from_frame(frame: &[u8]) -> Self {
        let request_id = read_i32(&frame[0..4]);
        let packet_type = PacketType(read_i32(&frame[4..8]));
        // strip the terminator, not just the header
        let body = frame[HEADER_LEN..frame.len() - TERMINATOR.len()].to_vec();
        Self {
            request_id,
            packet_type,
            body,
        }
    }
}

/// Validate a length prefix and convert it to a byte count
pub(crate) fn check_declared_len(declared: i32) -> Result<usize> {
    if declared < MIN_PACKET_LEN as i32 {
        return Err(SyncError::MalformedPacket(declared));
    }
    let len = declared as usize;
    if len > MAX_PACKET_SIZE {
        return Err(SyncError::OversizedPacket(len));
    }
    Ok(len)
}

#[inline]
pub(crate) fn read_i32(bytes: &[u8]) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    i32::from_le_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_packet_layout() {
        let bytes = Packet::new(1, PacketType::AUTH, "pw").to_bytes();
        assert_eq!(
            bytes,
            vec![
                12, 0, 0, 0, // length = 8 + 2 + 2
                1, 0, 0, 0, // request id
                3, 0, 0, 0, // SERVERDATA_AUTH
                b'p', b'w', 0, 0,
            ]
        );
    }

    #[test]
    fn test_body_excludes_terminator() {
        let bytes = Packet::new(7, PacketType::RESPONSE_VALUE, "ok").to_bytes();
        let decoded = Packet::from_bytes(&bytes).expect("decode");
        assert_eq!(decoded.body, b"ok");
        assert_eq!(decoded.request_id, 7);
        assert_eq!(decoded.packet_type, PacketType::RESPONSE_VALUE);
    }

    #[test]
    fn test_negative_request_id_survives() {
        let bytes = Packet::new(AUTH_FAILED_ID, PacketType::AUTH_RESPONSE, "").to_bytes();
        let decoded = Packet::from_bytes(&bytes).expect("decode");
        assert_eq!(decoded.request_id, -1);
    }

    #[test]
    fn test_short_length_prefix_is_connection_closed() {
        assert!(matches!(
            Packet::from_bytes(&[10, 0]),
            Err(SyncError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_truncated_frame() {
        let mut bytes = Packet::new(1, PacketType::EXEC_COMMAND, "list").to_bytes();
        bytes.truncate(bytes.len() - 3);
        match Packet::from_bytes(&bytes) {
            Err(SyncError::TruncatedPacket { expected, received }) => {
                assert_eq!(expected, 14);
                assert_eq!(received, 11);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_length_below_header_rejected() {
        let bytes = [4, 0, 0, 0, 1, 0, 0, 0];
        assert!(matches!(
            Packet::from_bytes(&bytes),
            Err(SyncError::MalformedPacket(4))
        ));
    }
}
