use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::packet::{check_declared_len, read_i32, Packet};
use crate::error::{Result, SyncError};

/// Tokio codec for RCON framing over a byte stream
#[derive(Debug, Default, Clone, Copy)]
pub struct RconCodec;

impl Decoder for RconCodec {
    type Item = Packet;
    type Error = SyncError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < 4 {
            return Ok(None);
        }

        let len = check_declared_len(read_i32(&src[..4]))?;
        if src.len() < 4 + len {
            src.reserve(4 + len - src.len());
            return Ok(None);
        }

        src.advance(4);
        let frame = src.split_to(len);
        Ok(Some(Packet::from_frame(&frame)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(packet) = self.decode(src)? {
            return Ok(Some(packet));
        }
        match src.len() {
            0 => Ok(None),
            1..=3 => Err(SyncError::ConnectionClosed),
            n => {
                let expected = check_declared_len(read_i32(&src[..4]))?;
                Err(SyncError::TruncatedPacket {
                    expected,
                    received: n - 4,
                })
            }
        }
    }
}

impl Encoder<Packet> for RconCodec {
    type Error = SyncError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<()> {
        let len = item.wire_len();
        dst.reserve(4 + len);
        dst.put_i32_le(len as i32);
        item.write_frame(dst);
        Ok(())
    }
}

/// Read exactly one packet from `reader` without any read-ahead.
///
/// EOF before the 4-byte length is `ConnectionClosed`; EOF inside the
/// declared frame is `TruncatedPacket`. Partial data is never returned.
pub async fn read_packet<R>(reader: &mut R) -> Result<Packet>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    if let Err(e) = reader.read_exact(&mut prefix).await {
        return Err(match e.kind() {
            std::io::ErrorKind::UnexpectedEof => SyncError::ConnectionClosed,
            _ => SyncError::Io(e),
        });
    }

    let len = check_declared_len(i32::from_le_bytes(prefix))?;
    let mut frame = Vec::with_capacity(len);
    reader.take(len as u64).read_to_end(&mut frame).await?;
    if frame.len() < len {
        return Err(SyncError::TruncatedPacket {
            expected: len,
            received: frame.len(),
        });
    }

    Ok(Packet::from_frame(&frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::PacketType;

    #[test]
    fn test_decode_waits_for_full_frame() {
        let bytes = Packet::new(2, PacketType::RESPONSE_VALUE, "There are 0 players").to_bytes();
        let mut codec = RconCodec;
        let mut buf = BytesMut::from(&bytes[..10]);
        assert!(codec.decode(&mut buf).expect("partial").is_none());

        buf.extend_from_slice(&bytes[10..]);
        let packet = codec.decode(&mut buf).expect("decode").expect("full");
        assert_eq!(packet.body_text(), "There are 0 players");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_eof_reports_truncation() {
        let bytes = Packet::new(2, PacketType::RESPONSE_VALUE, "abc").to_bytes();
        let mut buf = BytesMut::from(&bytes[..8]);
        assert!(matches!(
            RconCodec.decode_eof(&mut buf),
            Err(SyncError::TruncatedPacket { expected: 13, received: 4 })
        ));
    }

    #[test]
    fn test_decode_eof_on_partial_prefix() {
        let mut buf = BytesMut::from(&[1u8, 0][..]);
        assert!(matches!(
            RconCodec.decode_eof(&mut buf),
            Err(SyncError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_encoder_matches_to_bytes() {
        let packet = Packet::new(9, PacketType::EXEC_COMMAND, "save-all flush");
        let mut buf = BytesMut::new();
        RconCodec.encode(packet.clone(), &mut buf).expect("encode");
        assert_eq!(&buf[..], &packet.to_bytes()[..]);
    }

    #[tokio::test]
    async fn test_read_packet_leaves_following_bytes() {
        let mut wire = Packet::new(1, PacketType::AUTH_RESPONSE, "").to_bytes();
        wire.extend(Packet::new(2, PacketType::RESPONSE_VALUE, "next").to_bytes());
        let mut reader = &wire[..];

        let first = read_packet(&mut reader).await.expect("first");
        assert_eq!(first.request_id, 1);
        let second = read_packet(&mut reader).await.expect("second");
        assert_eq!(second.body_text(), "next");
        assert!(matches!(
            read_packet(&mut reader).await,
            Err(SyncError::ConnectionClosed)
        ));
    }
}
