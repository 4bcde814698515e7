//! # Strata Stream Wire Format
//!
//! Every datagram carries exactly one message: a fixed 16-byte header of four
//! big-endian `i32`s followed by the payload.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Type ordinal (32)                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Sequence Number (32)                       |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Ack Number (32)                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Payload Length (32)                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Payload ...                                |
//! ```
//!
//! Type ordinals: `0=SYN`, `1=DATA`, `2=ACK`, `3=FIN`. A SYN whose ack field
//! is `-1` opens a connection; any other ack value makes it a SYN-ACK. The
//! [`Message`] enum keeps the two apart so nothing above this module has to
//! look at the sentinel.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use std::net::SocketAddr;

use crate::error::{Result, StreamError};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Header size: type + seq + ack + payload length.
pub const HEADER_SIZE: usize = 16;

/// Maximum payload carried by a single DATA message.
pub const MAX_PAYLOAD_SIZE: usize = 450;

/// Largest datagram the protocol ever produces.
pub const MAX_MESSAGE_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE;

/// Ack value of a connection-open SYN, and of `ackNumber` before the handshake.
pub const INIT_ACK: i32 = -1;

// ─── Message Type ────────────────────────────────────────────────────────────

/// Wire-level type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum MessageType {
    Syn = 0,
    Data = 1,
    Ack = 2,
    Fin = 3,
}

impl MessageType {
    pub fn from_ordinal(ordinal: i32) -> Option<Self> {
        match ordinal {
            0 => Some(MessageType::Syn),
            1 => Some(MessageType::Data),
            2 => Some(MessageType::Ack),
            3 => Some(MessageType::Fin),
            _ => None,
        }
    }

    pub fn ordinal(self) -> i32 {
        self as i32
    }
}

// ─── Message ─────────────────────────────────────────────────────────────────

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Connection-open request carrying the initiator's sequence number.
    Syn { seq: i32 },
    /// Handshake reply: responder's sequence number, initiator's seq + 1.
    SynAck { seq: i32, ack: i32 },
    Ack { seq: i32, ack: i32 },
    /// Stream bytes. The payload is never empty.
    Data { seq: i32, ack: i32, payload: Bytes },
    Fin { seq: i32, ack: i32 },
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Syn { .. } | Message::SynAck { .. } => MessageType::Syn,
            Message::Data { .. } => MessageType::Data,
            Message::Ack { .. } => MessageType::Ack,
            Message::Fin { .. } => MessageType::Fin,
        }
    }

    pub fn seq(&self) -> i32 {
        match *self {
            Message::Syn { seq }
            | Message::SynAck { seq, .. }
            | Message::Ack { seq, .. }
            | Message::Data { seq, .. }
            | Message::Fin { seq, .. } => seq,
        }
    }

    pub fn ack(&self) -> i32 {
        match *self {
            Message::Syn { .. } => INIT_ACK,
            Message::SynAck { ack, .. }
            | Message::Ack { ack, .. }
            | Message::Data { ack, .. }
            | Message::Fin { ack, .. } => ack,
        }
    }

    pub fn payload(&self) -> &[u8] {
        match self {
            Message::Data { payload, .. } => payload,
            _ => &[],
        }
    }

    pub fn payload_len(&self) -> usize {
        self.payload().len()
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload_len()
    }

    /// Serialize into a buffer.
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_i32(self.message_type().ordinal());
        buf.put_i32(self.seq());
        buf.put_i32(self.ack());
        buf.put_i32(self.payload_len() as i32);
        buf.put_slice(self.payload());
    }

    /// Serialize into a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Deserialize one message.
    ///
    /// A payload shorter than its declared length is truncated to the bytes
    /// present; this never panics.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(StreamError::malformed("size", data.len() as i64));
        }

        let mut buf = data;
        let ordinal = buf.get_i32();
        let message_type =
            MessageType::from_ordinal(ordinal).ok_or(StreamError::malformed("type", ordinal))?;
        let seq = buf.get_i32();
        let ack = buf.get_i32();
        let payload_len = buf.get_i32();

        if payload_len < 0 || payload_len as usize > MAX_PAYLOAD_SIZE {
            return Err(StreamError::malformed("payloadLength", payload_len));
        }

        let message = match message_type {
            MessageType::Syn if ack == INIT_ACK => Message::Syn { seq },
            MessageType::Syn => Message::SynAck { seq, ack },
            MessageType::Ack => Message::Ack { seq, ack },
            MessageType::Fin => Message::Fin { seq, ack },
            MessageType::Data => {
                if payload_len == 0 {
                    return Err(StreamError::malformed("payloadLength", payload_len));
                }
                let take = (payload_len as usize).min(buf.remaining());
                if take == 0 {
                    return Err(StreamError::malformed("payload", 0));
                }
                Message::Data {
                    seq,
                    ack,
                    payload: Bytes::copy_from_slice(&buf[..take]),
                }
            }
        };

        Ok(message)
    }

    /// Bind this message to a destination address.
    pub fn to_packet(&self, addr: SocketAddr) -> Datagram {
        Datagram {
            addr,
            data: self.to_bytes(),
        }
    }

    /// Decode a message received from `addr`.
    pub fn from_packet(packet: &Datagram) -> Result<Self> {
        Self::decode(&packet.data)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Syn { seq } => write!(f, "SYN seq={}", seq),
            Message::SynAck { seq, ack } => write!(f, "SYN-ACK seq={} ack={}", seq, ack),
            Message::Ack { seq, ack } => write!(f, "ACK seq={} ack={}", seq, ack),
            Message::Data { seq, ack, payload } => {
                write!(f, "DATA seq={} ack={} len={}", seq, ack, payload.len())
            }
            Message::Fin { seq, ack } => write!(f, "FIN seq={} ack={}", seq, ack),
        }
    }
}

// ─── Datagram ────────────────────────────────────────────────────────────────

/// Encoded message plus the transport address it travels to or came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub addr: SocketAddr,
    pub data: Bytes,
}

impl Datagram {
    pub fn new(addr: SocketAddr, data: Bytes) -> Self {
        Datagram { addr, data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:3113".parse().unwrap()
    }

    #[test]
    fn header_layout_is_big_endian() {
        let msg = Message::Ack { seq: 1, ack: 0x0102_0304 };
        let bytes = msg.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[..4], &[0, 0, 0, 2]);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 1]);
        assert_eq!(&bytes[8..12], &[1, 2, 3, 4]);
        assert_eq!(&bytes[12..16], &[0, 0, 0, 0]);
    }

    #[test]
    fn syn_and_syn_ack_share_ordinal() {
        let syn = Message::Syn { seq: 10 }.to_bytes();
        let syn_ack = Message::SynAck { seq: 20, ack: 11 }.to_bytes();
        assert_eq!(&syn[..4], &syn_ack[..4]);
        assert_eq!(&syn[8..12], &INIT_ACK.to_be_bytes());

        assert_eq!(Message::decode(&syn).unwrap(), Message::Syn { seq: 10 });
        assert_eq!(
            Message::decode(&syn_ack).unwrap(),
            Message::SynAck { seq: 20, ack: 11 }
        );
    }

    #[test]
    fn data_roundtrip_through_packet() {
        let msg = Message::Data {
            seq: -5,
            ack: 42,
            payload: Bytes::from_static(b"hello world"),
        };
        let packet = msg.to_packet(addr());
        assert_eq!(packet.addr, addr());
        assert_eq!(packet.data.len(), HEADER_SIZE + 11);
        assert_eq!(Message::from_packet(&packet).unwrap(), msg);
    }

    #[test]
    fn decode_rejects_short_datagram() {
        let err = Message::decode(&[0u8; 15]).unwrap_err();
        assert!(matches!(
            err,
            StreamError::MalformedMessage { field: "size", value: 15 }
        ));
    }

    #[test]
    fn decode_rejects_unknown_type() {
        let mut raw = Message::Ack { seq: 0, ack: 0 }.to_bytes().to_vec();
        raw[3] = 4;
        assert!(matches!(
            Message::decode(&raw).unwrap_err(),
            StreamError::MalformedMessage { field: "type", value: 4 }
        ));
        raw[0] = 0xFF;
        assert!(Message::decode(&raw).is_err());
    }

    #[test]
    fn decode_rejects_negative_payload_length() {
        let mut raw = BytesMut::new();
        raw.put_i32(2);
        raw.put_i32(0);
        raw.put_i32(0);
        raw.put_i32(-1);
        assert!(matches!(
            Message::decode(&raw).unwrap_err(),
            StreamError::MalformedMessage { field: "payloadLength", value: -1 }
        ));
    }

    #[test]
    fn decode_rejects_oversized_payload() {
        let mut raw = BytesMut::new();
        raw.put_i32(1);
        raw.put_i32(0);
        raw.put_i32(0);
        raw.put_i32(600);
        raw.put_slice(&[0xAB; 600]);
        assert!(matches!(
            Message::decode(&raw).unwrap_err(),
            StreamError::MalformedMessage { field: "payloadLength", value: 600 }
        ));

        // The largest legal payload still decodes.
        let msg = Message::Data {
            seq: 0,
            ack: 0,
            payload: Bytes::from(vec![1u8; MAX_PAYLOAD_SIZE]),
        };
        assert_eq!(Message::decode(&msg.to_bytes()).unwrap(), msg);
    }

    #[test]
    fn decode_rejects_empty_data() {
        let mut raw = BytesMut::new();
        raw.put_i32(1);
        raw.put_i32(7);
        raw.put_i32(8);
        raw.put_i32(0);
        assert!(Message::decode(&raw).is_err());
    }

    #[test]
    fn decode_truncates_short_payload() {
        let msg = Message::Data {
            seq: 1,
            ack: 2,
            payload: Bytes::from_static(b"abcdef"),
        };
        let raw = msg.to_bytes();
        let decoded = Message::decode(&raw[..HEADER_SIZE + 3]).unwrap();
        assert_eq!(decoded.payload(), b"abc");

        // Declared payload, nothing present.
        assert!(Message::decode(&raw[..HEADER_SIZE]).is_err());
    }

    #[test]
    fn control_messages_ignore_trailing_bytes() {
        let mut raw = Message::Fin { seq: 3, ack: 4 }.to_bytes().to_vec();
        raw.extend_from_slice(b"junk");
        assert_eq!(Message::decode(&raw).unwrap(), Message::Fin { seq: 3, ack: 4 });
    }

    #[test]
    fn display_is_compact() {
        let msg = Message::Data {
            seq: 1,
            ack: 2,
            payload: Bytes::from_static(b"xyz"),
        };
        assert_eq!(msg.to_string(), "DATA seq=1 ack=2 len=3");
        assert_eq!(Message::Syn { seq: 9 }.to_string(), "SYN seq=9");
    }
}
