//! # Protocol tests: Connection ↔ Connection through an impaired channel
//!
//! Two connections exchange encoded messages with no sockets in between.
//! The channel in the middle drops, duplicates and reorders messages; the
//! byte stream observed by `recv` must still be the original one, in order,
//! with nothing lost or repeated.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use strata_stream::wire::Message;
use strata_stream::{Connection, ConnectionState, StreamConfig};

// ─── Channel ────────────────────────────────────────────────────────────────

/// One direction of the simulated network.
#[derive(Default)]
struct Channel {
    /// Drop every Nth message (0 = never) while `sent <= drop_budget`.
    drop_every: usize,
    drop_budget: usize,
    /// Deliver every Nth message twice (0 = never).
    duplicate_every: usize,
    /// Swap each adjacent pair of messages in a delivery batch.
    swap_pairs: bool,
    /// Random loss probability, applied on top of the above.
    loss: Option<(StdRng, f64)>,
    sent: usize,
    dropped: usize,
    in_transit: Vec<Message>,
}

impl Channel {
    fn clean() -> Self {
        Channel::default()
    }

    fn drop_every(n: usize, budget: usize) -> Self {
        Channel {
            drop_every: n,
            drop_budget: budget,
            ..Channel::default()
        }
    }

    fn push(&mut self, msg: Message) {
        self.sent += 1;
        // Encode and decode so every message crosses the wire format.
        let msg = Message::decode(&msg.to_bytes()).unwrap();

        if self.drop_every > 0 && self.sent <= self.drop_budget && self.sent % self.drop_every == 0
        {
            self.dropped += 1;
            return;
        }
        if let Some((rng, p)) = self.loss.as_mut() {
            if rng.random_bool(*p) {
                self.dropped += 1;
                return;
            }
        }
        if self.duplicate_every > 0 && self.sent % self.duplicate_every == 0 {
            self.in_transit.push(msg.clone());
        }
        self.in_transit.push(msg);
    }

    fn deliver(&mut self) -> Vec<Message> {
        let mut batch = std::mem::take(&mut self.in_transit);
        if self.swap_pairs {
            for pair in batch.chunks_mut(2) {
                pair.reverse();
            }
        }
        batch
    }
}

// ─── Harness ────────────────────────────────────────────────────────────────

struct Pair {
    client: Arc<Connection>,
    server: Arc<Connection>,
    up: Channel,
    down: Channel,
}

fn test_config() -> StreamConfig {
    StreamConfig {
        max_payload_size: 100,
        buffer_capacity: 1024,
        retransmit_timeout: Duration::from_millis(5),
        max_control_retries: 200,
        max_retransmits: 200,
        ..StreamConfig::default()
    }
}

/// Everything a connection wants on the wire: control first, then data.
fn outbound(conn: &Connection) -> Vec<Message> {
    let mut out: Vec<Message> = std::iter::from_fn(|| conn.next_control_message()).collect();
    out.extend(std::iter::from_fn(|| conn.current_data_message()));
    out
}

impl Pair {
    fn new(config: &StreamConfig, up: Channel, down: Channel) -> Self {
        Self::with_isn(config, up, down, 1000, 9000)
    }

    fn with_isn(config: &StreamConfig, up: Channel, down: Channel, c: i32, s: i32) -> Self {
        Pair {
            client: Arc::new(Connection::with_initial_seq(config, c)),
            server: Arc::new(Connection::with_initial_seq(config, s)),
            up,
            down,
        }
    }

    fn step(&mut self) {
        for msg in outbound(&self.client) {
            self.up.push(msg);
        }
        for msg in outbound(&self.server) {
            self.down.push(msg);
        }
        for msg in self.up.deliver() {
            self.server.handle_message(&msg);
        }
        for msg in self.down.deliver() {
            self.client.handle_message(&msg);
        }
        self.client.check_resend();
        self.server.check_resend();
        thread::sleep(Duration::from_millis(1));
    }

    fn handshake(&mut self) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !(self.client.is_connected() && self.server.is_connected()) {
            assert!(Instant::now() < deadline, "handshake did not complete");
            if self.client.state() != ConnectionState::Connected {
                let syn = self.client.begin_connect().unwrap();
                self.up.push(syn);
            }
            // A lost final ACK is repaired by the SYN-ACK retransmission.
            self.step();
        }
        self.settle();
    }

    /// Step until both send rings are empty.
    fn settle(&mut self) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !(self.client.all_sent() && self.server.all_sent()) {
            assert!(Instant::now() < deadline, "transfer did not settle");
            self.step();
            let mut sink = [0u8; 64];
            while self.server.available() > 0 {
                self.server.recv(&mut sink).unwrap();
            }
        }
    }

    /// Push `data` from client to server; return what the server read.
    fn transfer(&mut self, data: &[u8]) -> Vec<u8> {
        let deadline = Instant::now() + Duration::from_secs(20);
        let mut written = 0;
        let mut received = Vec::with_capacity(data.len());

        while received.len() < data.len() {
            assert!(
                Instant::now() < deadline,
                "transfer stalled at {}/{} bytes",
                received.len(),
                data.len()
            );
            if written < data.len() {
                let space = self.client.send_space();
                if space > 0 {
                    let end = (written + space).min(data.len());
                    written += self.client.send(&data[written..end]).unwrap();
                }
            }
            self.step();
            let available = self.server.available();
            if available > 0 {
                let mut buf = vec![0u8; available];
                let n = self.server.recv(&mut buf).unwrap();
                received.extend_from_slice(&buf[..n]);
            }
        }
        received
    }
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

// ─── Clean Channel ──────────────────────────────────────────────────────────

#[test]
fn handshake_over_clean_channel() {
    let mut pair = Pair::new(&test_config(), Channel::clean(), Channel::clean());
    pair.handshake();
    assert_eq!(pair.client.seq_number(), 1001);
    assert_eq!(pair.server.ack_number(), 1001);
    assert_eq!(pair.server.seq_number(), 9001);
    assert_eq!(pair.client.ack_number(), 9001);
}

#[test]
fn transfer_over_clean_channel() {
    let config = StreamConfig {
        retransmit_timeout: Duration::from_millis(250),
        ..test_config()
    };
    let mut pair = Pair::new(&config, Channel::clean(), Channel::clean());
    pair.handshake();
    let data = pattern(10_000);
    assert_eq!(pair.transfer(&data), data);
    pair.settle();
    assert_eq!(pair.client.stats().retransmissions, 0);
    assert_eq!(pair.server.stats().bytes_received, 10_000);
}

#[test]
fn transfer_in_both_directions() {
    let mut pair = Pair::new(&test_config(), Channel::clean(), Channel::clean());
    pair.handshake();

    pair.client.send(b"request").unwrap();
    pair.server.send(b"response").unwrap();
    for _ in 0..5 {
        pair.step();
    }

    let mut buf = [0u8; 16];
    let n = pair.server.recv(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"request");
    let n = pair.client.recv(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"response");
    assert!(pair.client.all_sent());
    assert!(pair.server.all_sent());
}

#[test]
fn transfer_across_sequence_wrap() {
    let mut pair = Pair::with_isn(
        &test_config(),
        Channel::clean(),
        Channel::clean(),
        i32::MAX - 300,
        i32::MAX - 5,
    );
    pair.handshake();
    let data = pattern(5_000);
    assert_eq!(pair.transfer(&data), data);
    pair.settle();
    assert!(pair.client.seq_number() < 0);
}

// ─── Impaired Channel ───────────────────────────────────────────────────────

#[test]
fn every_nth_drop_converges() {
    for n in 2..=5 {
        let mut pair = Pair::new(
            &test_config(),
            Channel::drop_every(n, 300),
            Channel::drop_every(n, 300),
        );
        pair.handshake();
        let data = pattern(8_000);
        assert_eq!(pair.transfer(&data), data, "drop every {n}");
        pair.settle();
        assert!(pair.up.dropped > 0);
        assert!(pair.client.stats().retransmissions > 0, "drop every {n}");
    }
}

#[test]
fn duplicates_are_applied_once() {
    let dup = || Channel {
        duplicate_every: 2,
        ..Channel::default()
    };
    let mut pair = Pair::new(&test_config(), dup(), dup());
    pair.handshake();
    let data = pattern(6_000);
    assert_eq!(pair.transfer(&data), data);
    assert!(pair.server.stats().duplicates > 0);
}

#[test]
fn reordering_stalls_but_never_corrupts() {
    let swap = || Channel {
        swap_pairs: true,
        ..Channel::default()
    };
    let mut pair = Pair::new(&test_config(), swap(), swap());
    pair.handshake();
    let data = pattern(3_000);
    assert_eq!(pair.transfer(&data), data);
    assert!(pair.server.stats().out_of_window > 0);
}

#[test]
fn random_loss_with_duplicates_and_reordering() {
    let lossy = |seed| Channel {
        duplicate_every: 7,
        swap_pairs: true,
        loss: Some((StdRng::seed_from_u64(seed), 0.15)),
        ..Channel::default()
    };
    let mut pair = Pair::new(&test_config(), lossy(7), lossy(11));
    pair.handshake();
    let data = pattern(6_000);
    assert_eq!(pair.transfer(&data), data);
}

#[test]
fn small_receive_buffer_applies_backpressure() {
    let config = StreamConfig {
        buffer_capacity: 150,
        ..test_config()
    };
    let mut pair = Pair::new(&config, Channel::clean(), Channel::clean());
    pair.handshake();
    let data = pattern(2_000);
    assert_eq!(pair.transfer(&data), data);
}

// ─── Teardown ───────────────────────────────────────────────────────────────

fn close_over(mut pair: Pair) -> Pair {
    pair.handshake();
    let data = pattern(2_000);
    assert_eq!(pair.transfer(&data), data);

    let closer = {
        let client = pair.client.clone();
        thread::spawn(move || client.fin().unwrap())
    };

    let deadline = Instant::now() + Duration::from_secs(10);
    while !(pair.client.state().is_terminal() && pair.server.state() == ConnectionState::Closed) {
        assert!(
            Instant::now() < deadline,
            "close stuck: client {} server {}",
            pair.client.state(),
            pair.server.state()
        );
        pair.step();
    }
    assert!(closer.join().unwrap());
    pair
}

#[test]
fn graceful_close_over_clean_channel() {
    let pair = close_over(Pair::new(&test_config(), Channel::clean(), Channel::clean()));
    assert_eq!(pair.client.state(), ConnectionState::TimeAck);
    assert!(pair.server.closed());
    assert_eq!(pair.server.recv(&mut [0u8; 4]).unwrap(), 0);
    assert_eq!(pair.client.recv(&mut [0u8; 4]).unwrap(), 0);

    // Lingers for twice the retransmit timeout, then is reapable.
    thread::sleep(Duration::from_millis(20));
    assert!(pair.client.closed());
}

#[test]
fn graceful_close_over_lossy_channel() {
    let pair = close_over(Pair::new(
        &test_config(),
        Channel::drop_every(3, 400),
        Channel::drop_every(3, 400),
    ));
    assert!(pair.client.state().is_terminal());
    assert!(pair.server.closed());
}

#[test]
fn passive_side_drains_before_its_fin() {
    let mut pair = Pair::new(&test_config(), Channel::clean(), Channel::clean());
    pair.handshake();

    // Server still has bytes queued when the client's FIN lands.
    pair.server.send(&pattern(500)).unwrap();
    let closer = {
        let client = pair.client.clone();
        thread::spawn(move || client.fin().unwrap())
    };

    let mut received = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(10);
    while !pair.client.state().is_terminal() {
        assert!(Instant::now() < deadline, "close stuck at {}", pair.client.state());
        pair.step();
        let available = pair.client.available();
        if available > 0 {
            let mut buf = vec![0u8; available];
            let n = pair.client.recv(&mut buf).unwrap();
            received.extend_from_slice(&buf[..n]);
        }
    }
    assert!(closer.join().unwrap());
    let mut rest = vec![0u8; 600];
    loop {
        let n = pair.client.recv(&mut rest).unwrap();
        if n == 0 {
            break;
        }
        received.extend_from_slice(&rest[..n]);
    }
    assert_eq!(received, pattern(500));
}
