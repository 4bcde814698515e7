#![no_main]

use libfuzzer_sys::fuzz_target;
use strata_stream::wire::{Message, HEADER_SIZE};
use strata_stream::{Connection, StreamConfig};

/// Fuzz the connection state machine with arbitrary message sequences.
///
/// The input is split into header-sized records; each one that decodes is
/// fed to a connected endpoint. No sequence may panic or break the send
/// ring accounting.
fuzz_target!(|data: &[u8]| {
    let config = StreamConfig {
        buffer_capacity: 256,
        max_payload_size: 32,
        ..StreamConfig::default()
    };
    let client = Connection::with_initial_seq(&config, 100);
    let server = Connection::with_initial_seq(&config, 200);
    if let Ok(syn) = client.begin_connect() {
        server.handle_message(&syn);
    }
    while let Some(msg) = server.next_control_message() {
        client.handle_message(&msg);
    }
    let _ = client.send(b"fuzzing payload bytes");

    for record in data.chunks(HEADER_SIZE + 8) {
        if let Ok(msg) = Message::decode(record) {
            client.handle_message(&msg);
        }
        while client.next_control_message().is_some() {}
        while client.current_data_message().is_some() {}
        client.check_resend();
        assert!(client.in_flight() <= 256);
    }
});
