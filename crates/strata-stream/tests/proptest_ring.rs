//! Property-based tests for the flow-controlled ring buffers.
//!
//! Arbitrary sequences of non-blocking operations are applied to a send ring
//! and mirrored on a simple model. After every step the capacity invariant
//! `0 <= in_flight <= available <= capacity` must hold and the bytes handed
//! out must match the model exactly.

use std::collections::VecDeque;

use proptest::prelude::*;
use strata_stream::ring::{RecvRingBuffer, SendRingBuffer};

#[derive(Debug, Clone)]
enum Op {
    Write(Vec<u8>),
    Read(usize),
    Confirm(usize),
    Drop,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 1..40).prop_map(Op::Write),
        (1usize..40).prop_map(Op::Read),
        (0usize..40).prop_map(Op::Confirm),
        Just(Op::Drop),
    ]
}

/// Reference model: confirmed bytes leave the front, `in_flight` counts the
/// sent prefix of what remains.
#[derive(Default)]
struct Model {
    bytes: VecDeque<u8>,
    in_flight: usize,
}

proptest! {
    #[test]
    fn send_ring_matches_model(
        capacity in 1usize..64,
        ops in prop::collection::vec(op_strategy(), 1..200),
    ) {
        let ring = SendRingBuffer::new(capacity);
        let mut model = Model::default();

        for op in ops {
            match op {
                Op::Write(data) => {
                    // Blocking write only when space exists.
                    if model.bytes.len() < capacity {
                        let n = ring.write(&data).unwrap();
                        let expected = data.len().min(capacity - model.bytes.len());
                        prop_assert_eq!(n, expected);
                        model.bytes.extend(&data[..n]);
                    }
                }
                Op::Read(len) => {
                    let mut out = vec![0u8; len];
                    let n = ring.read(&mut out).unwrap();
                    let unsent = model.bytes.len() - model.in_flight;
                    prop_assert_eq!(n, len.min(unsent));
                    let expected: Vec<u8> = model
                        .bytes
                        .iter()
                        .skip(model.in_flight)
                        .take(n)
                        .copied()
                        .collect();
                    prop_assert_eq!(&out[..n], &expected[..]);
                    model.in_flight += n;
                }
                Op::Confirm(n) => {
                    ring.confirm_read(n);
                    let n = n.min(model.in_flight);
                    model.bytes.drain(..n);
                    model.in_flight -= n;
                }
                Op::Drop => {
                    let dropped = ring.drop_offset();
                    prop_assert_eq!(dropped, model.in_flight);
                    model.in_flight = 0;
                }
            }

            let available = ring.available_bytes();
            let in_flight = ring.in_flight();
            prop_assert!(in_flight <= available);
            prop_assert!(available <= capacity);
            prop_assert_eq!(available, model.bytes.len());
            prop_assert_eq!(in_flight, model.in_flight);
            prop_assert_eq!(ring.free_space(), capacity - available);
            prop_assert_eq!(ring.all_sent(), model.bytes.is_empty());
        }
    }

    #[test]
    fn recv_ring_preserves_order(
        capacity in 1usize..64,
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..30), 1..50),
        read_size in 1usize..30,
    ) {
        let ring = RecvRingBuffer::new(capacity);
        let mut accepted = Vec::new();
        let mut delivered = Vec::new();

        for chunk in chunks {
            let n = ring.write(&chunk).unwrap();
            prop_assert!(n <= chunk.len());
            accepted.extend_from_slice(&chunk[..n]);
            prop_assert!(ring.available_bytes() <= capacity);

            if ring.available_bytes() > 0 {
                let mut out = vec![0u8; read_size];
                let got = ring.read(&mut out).unwrap();
                delivered.extend_from_slice(&out[..got]);
            }
        }
        ring.close();
        let mut out = vec![0u8; read_size];
        loop {
            let got = ring.read(&mut out).unwrap();
            if got == 0 {
                break;
            }
            delivered.extend_from_slice(&out[..got]);
        }
        prop_assert_eq!(delivered, accepted);
    }
}
