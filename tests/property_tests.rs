//! Property-based tests using proptest
//!
//! These check framing and parsing invariants over randomly generated input.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::BytesMut;
use proptest::prelude::*;
use tokio_util::codec::Decoder;

use world_sync::core::codec::RconCodec;
use world_sync::core::packet::{Packet, PacketType, HEADER_LEN, TERMINATOR};
use world_sync::protocol::commands::parse_player_count;
use world_sync::service::watch::{parse_event, PlayerEvent};

fn body_bytes() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..4096)
}

// Property: the length prefix always equals header + body + terminator
proptest! {
    #[test]
    fn prop_length_prefix_matches_contents(id in any::<i32>(), kind in any::<i32>(), body in body_bytes()) {
        let bytes = Packet::new(id, PacketType(kind), body.clone()).to_bytes();
        let declared = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;

        prop_assert_eq!(declared, HEADER_LEN + body.len() + TERMINATOR.len());
        prop_assert_eq!(bytes.len(), 4 + declared);
        prop_assert_eq!(&bytes[bytes.len() - 2..], &TERMINATOR[..]);
    }
}

// Property: decoding an encoded packet yields the same id, type and body
proptest! {
    #[test]
    fn prop_packet_roundtrip(id in any::<i32>(), kind in any::<i32>(), body in body_bytes()) {
        let packet = Packet::new(id, PacketType(kind), body);
        let decoded = Packet::from_bytes(&packet.to_bytes()).expect("decode");
        prop_assert_eq!(decoded, packet);
    }
}

// Property: any split of the byte stream decodes to the same packet
proptest! {
    #[test]
    fn prop_codec_split_point_irrelevant(body in body_bytes(), split in any::<prop::sample::Index>()) {
        let packet = Packet::new(5, PacketType::RESPONSE_VALUE, body);
        let bytes = packet.to_bytes();
        let at = split.index(bytes.len());

        let mut codec = RconCodec;
        let mut buf = BytesMut::from(&bytes[..at]);
        let early = codec.decode(&mut buf).expect("partial decode");
        prop_assert!(early.is_none() || at == bytes.len());

        buf.extend_from_slice(&bytes[at..]);
        let decoded = match early {
            Some(p) => p,
            None => codec.decode(&mut buf).expect("decode").expect("complete"),
        };
        prop_assert_eq!(decoded, packet);
    }
}

// Property: arbitrary input never panics the decoder
proptest! {
    #[test]
    fn prop_from_bytes_never_panics(data in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = Packet::from_bytes(&data);
    }
}

// Property: the player count is read from any `list` reply
proptest! {
    #[test]
    fn prop_player_count_parsed(count in 0u32..10_000, max in 1u32..10_000) {
        let reply = format!("There are {count} of a max of {max} players online: ");
        prop_assert_eq!(parse_player_count(&reply), Some(count));
    }
}

// Property: join and leave lines name the player
proptest! {
    #[test]
    fn prop_player_events_parsed(name in "[A-Za-z0-9_]{3,16}", joined in any::<bool>()) {
        let verb = if joined { "joined" } else { "left" };
        let line = format!("[10:11:12] [Server thread/INFO]: {name} {verb} the game");
        let expected = if joined {
            PlayerEvent::Joined(name.clone())
        } else {
            PlayerEvent::Left(name.clone())
        };
        prop_assert_eq!(parse_event(&line), Some(expected));
    }
}
