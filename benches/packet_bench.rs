use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use tokio_util::codec::{Decoder, Encoder};
use world_sync::core::codec::RconCodec;
use world_sync::core::packet::{Packet, PacketType};

#[allow(clippy::unwrap_used)]
fn bench_packet_encode_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_encode_decode");
    // Command-sized up to a large `list`/`help` reply
    let body_sizes = [16usize, 256, 4096, 65536];

    for &size in &body_sizes {
        let body = vec![b'a'; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("encode_{size}b"), |b| {
            b.iter_batched(
                || Packet::new(1, PacketType::EXEC_COMMAND, body.clone()),
                |packet| {
                    let mut buf = BytesMut::with_capacity(size + 14);
                    RconCodec.encode(packet, &mut buf).unwrap();
                    buf
                },
                BatchSize::SmallInput,
            )
        });

        let wire = Packet::new(1, PacketType::RESPONSE_VALUE, body.clone()).to_bytes();
        group.bench_function(format!("from_bytes_{size}b"), |b| {
            b.iter(|| {
                let decoded = Packet::from_bytes(&wire);
                assert!(decoded.is_ok());
            })
        });
        group.bench_function(format!("codec_decode_{size}b"), |b| {
            b.iter_batched(
                || BytesMut::from(&wire[..]),
                |mut buf| RconCodec.decode(&mut buf).unwrap(),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_packet_encode_decode);
criterion_main!(benches);
