//! # Errors
//!
//! Every fallible operation in the crate returns [`StreamError`]. Stream end
//! is not an error: `recv` reports it as `Ok(0)`.

use std::io;
use thiserror::Error;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StreamError {
    /// A datagram could not be decoded. The packet is dropped, no reply is sent.
    #[error("failed to parse message on field {field} with value {value}")]
    MalformedMessage { field: &'static str, value: i64 },
    /// The connection is not in the `Connected` state.
    #[error("socket is not connected")]
    NotConnected,
    #[error("socket already connected")]
    AlreadyConnected,
    #[error("server is already listening")]
    AlreadyListening,
    /// The handshake did not complete within the configured bound.
    #[error("time to connect exceeded")]
    ConnectTimeout,
    /// The connection or engine has been torn down.
    #[error("socket closed")]
    SocketClosed,
    /// `connect` was called on a server-side engine.
    #[error("server side socket cannot connect")]
    ServerSide,
    /// A buffer operation was given an empty slice.
    #[error("length should be greater than zero")]
    InvalidLength,
    #[error("invalid config: {0}")]
    Config(String),
    #[error("socket I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, StreamError>;

impl StreamError {
    pub(crate) fn malformed(field: &'static str, value: impl Into<i64>) -> Self {
        StreamError::MalformedMessage {
            field,
            value: value.into(),
        }
    }
}

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> Self {
        let kind = match &err {
            StreamError::Io(e) => return io::Error::new(e.kind(), err.to_string()),
            StreamError::MalformedMessage { .. } | StreamError::InvalidLength => {
                io::ErrorKind::InvalidInput
            }
            StreamError::NotConnected => io::ErrorKind::NotConnected,
            StreamError::AlreadyConnected | StreamError::AlreadyListening => {
                io::ErrorKind::AlreadyExists
            }
            StreamError::ConnectTimeout => io::ErrorKind::TimedOut,
            StreamError::SocketClosed => io::ErrorKind::BrokenPipe,
            StreamError::ServerSide => io::ErrorKind::Unsupported,
            StreamError::Config(_) => io::ErrorKind::InvalidData,
        };
        io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_to_io_error_kind() {
        let err: io::Error = StreamError::NotConnected.into();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        let err: io::Error = StreamError::SocketClosed.into();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn malformed_message_display_names_field() {
        let err = StreamError::malformed("type", 7);
        assert_eq!(
            err.to_string(),
            "failed to parse message on field type with value 7"
        );
    }

    #[test]
    fn io_errors_convert() {
        let err: StreamError = io::Error::new(io::ErrorKind::AddrInUse, "busy").into();
        assert!(matches!(err, StreamError::Io(_)));
    }
}
