#![no_main]

use libfuzzer_sys::fuzz_target;
use strata_stream::wire::{Message, MAX_MESSAGE_SIZE};

/// Fuzz the message decoder.
///
/// Arbitrary bytes must decode or fail cleanly. Anything that decodes must
/// re-encode to a message that decodes to the same value.
fuzz_target!(|data: &[u8]| {
    let Ok(msg) = Message::decode(data) else {
        return;
    };

    let encoded = msg.to_bytes();
    assert_eq!(encoded.len(), msg.encoded_len());
    assert!(encoded.len() <= MAX_MESSAGE_SIZE);

    let again = Message::decode(&encoded).expect("re-encoded message must decode");
    assert_eq!(again, msg);
});
