use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use strata_stream::ring::SendRingBuffer;
use strata_stream::wire::{Message, MAX_PAYLOAD_SIZE};
use strata_stream::{Connection, StreamConfig};

/// Benchmark the message codec: encode and decode of a full DATA message.
fn bench_wire(c: &mut Criterion) {
    let msg = Message::Data {
        seq: 1_000,
        ack: 9_000,
        payload: Bytes::from(vec![0xABu8; MAX_PAYLOAD_SIZE]),
    };
    let encoded = msg.to_bytes();

    let mut group = c.benchmark_group("wire");
    group.throughput(Throughput::Bytes(encoded.len() as u64));

    group.bench_function("encode_data", |b| {
        b.iter(|| black_box(&msg).to_bytes());
    });

    group.bench_function("decode_data", |b| {
        b.iter(|| Message::decode(black_box(&encoded)).unwrap());
    });

    group.bench_function("encode_ack", |b| {
        let ack = Message::Ack { seq: 1, ack: 2 };
        b.iter(|| black_box(&ack).to_bytes());
    });

    group.finish();
}

/// Benchmark the send ring: write, read into a payload, confirm.
fn bench_send_ring(c: &mut Criterion) {
    let chunk = vec![0x5Au8; MAX_PAYLOAD_SIZE];

    let mut group = c.benchmark_group("send_ring");
    group.throughput(Throughput::Bytes(chunk.len() as u64));

    group.bench_function("write_read_confirm", |b| {
        let ring = SendRingBuffer::new(64 * 1024);
        let mut out = vec![0u8; MAX_PAYLOAD_SIZE];
        b.iter(|| {
            ring.write(black_box(&chunk)).unwrap();
            let n = ring.read(&mut out).unwrap();
            ring.confirm_read(n);
        });
    });

    group.finish();
}

/// Benchmark the per-message connection path with no sockets: send, emit
/// DATA, accept at the peer, return the ACK.
fn bench_connection(c: &mut Criterion) {
    let config = StreamConfig::default();
    let payload = vec![0xCDu8; MAX_PAYLOAD_SIZE];

    let mut group = c.benchmark_group("connection");
    group.throughput(Throughput::Bytes(payload.len() as u64));

    group.bench_function("data_then_ack", |b| {
        let client = Connection::with_initial_seq(&config, 1_000);
        let server = Connection::with_initial_seq(&config, 9_000);
        let syn = client.begin_connect().unwrap();
        server.handle_message(&syn);
        while let Some(msg) = server.next_control_message() {
            client.handle_message(&msg);
        }
        while let Some(msg) = client.next_control_message() {
            server.handle_message(&msg);
        }

        let mut sink = vec![0u8; MAX_PAYLOAD_SIZE];
        b.iter(|| {
            client.send(black_box(&payload)).unwrap();
            while let Some(msg) = client.current_data_message() {
                server.handle_message(&msg);
            }
            while let Some(ack) = server.next_control_message() {
                client.handle_message(&ack);
            }
            while server.available() > 0 {
                server.recv(&mut sink).unwrap();
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_wire, bench_send_ring, bench_connection);
criterion_main!(benches);
