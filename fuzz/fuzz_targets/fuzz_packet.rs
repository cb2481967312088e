#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;
use world_sync::core::codec::RconCodec;
use world_sync::core::packet::Packet;

fuzz_target!(|data: &[u8]| {
    // Neither path may panic, whatever the length prefix claims
    let _ = Packet::from_bytes(data);

    let mut buf = BytesMut::from(data);
    let mut codec = RconCodec;
    while let Ok(Some(_)) = codec.decode(&mut buf) {}
    let _ = codec.decode_eof(&mut buf);
});
