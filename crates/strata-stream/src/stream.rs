//! # Byte Stream Adapters
//!
//! [`ByteStream`] is the socket-like surface shared by [`StreamClient`] and
//! [`ServerConnection`]. [`StreamReader`] and [`StreamWriter`] expose any
//! byte stream through `std::io::Read` and `std::io::Write`, so the usual
//! `read_exact`, `write_all`, `BufReader` and friends work on top of it.
//!
//! [`StreamClient`]: crate::client::StreamClient
//! [`ServerConnection`]: crate::server::ServerConnection

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::Result;

/// A reliable, ordered byte stream.
pub trait ByteStream {
    /// Queue bytes for transmission, blocking while the send buffer is full.
    /// `Ok(0)` once the stream is closing.
    fn send(&self, buf: &[u8]) -> Result<usize>;

    /// Read received bytes, blocking while none are buffered. `Ok(0)` at
    /// end of stream.
    fn recv(&self, buf: &mut [u8]) -> Result<usize>;

    /// Bytes readable without blocking.
    fn available(&self) -> usize;

    /// Graceful close. Returns whether this side sent the first FIN.
    fn close(&self) -> Result<bool>;

    fn peer_addr(&self) -> Result<SocketAddr>;
}

impl<S: ByteStream + ?Sized> ByteStream for &S {
    fn send(&self, buf: &[u8]) -> Result<usize> {
        (**self).send(buf)
    }

    fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        (**self).recv(buf)
    }

    fn available(&self) -> usize {
        (**self).available()
    }

    fn close(&self) -> Result<bool> {
        (**self).close()
    }

    fn peer_addr(&self) -> Result<SocketAddr> {
        (**self).peer_addr()
    }
}

impl<S: ByteStream + ?Sized> ByteStream for Arc<S> {
    fn send(&self, buf: &[u8]) -> Result<usize> {
        (**self).send(buf)
    }

    fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        (**self).recv(buf)
    }

    fn available(&self) -> usize {
        (**self).available()
    }

    fn close(&self) -> Result<bool> {
        (**self).close()
    }

    fn peer_addr(&self) -> Result<SocketAddr> {
        (**self).peer_addr()
    }
}

// ─── Reader ─────────────────────────────────────────────────────────────────

/// `io::Read` over a byte stream. End of stream reads as `Ok(0)`.
#[derive(Debug)]
pub struct StreamReader<S> {
    stream: S,
}

impl<S: ByteStream> StreamReader<S> {
    pub fn new(stream: S) -> Self {
        StreamReader { stream }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: ByteStream> io::Read for StreamReader<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        Ok(self.stream.recv(buf)?)
    }
}

// ─── Writer ─────────────────────────────────────────────────────────────────

/// `io::Write` over a byte stream.
///
/// A send that makes no progress (the stream is closing) surfaces as
/// `ErrorKind::WriteZero`.
#[derive(Debug)]
pub struct StreamWriter<S> {
    stream: S,
}

impl<S: ByteStream> StreamWriter<S> {
    pub fn new(stream: S) -> Self {
        StreamWriter { stream }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: ByteStream> io::Write for StreamWriter<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.stream.send(buf)? {
            0 => Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "stream is closing",
            )),
            n => Ok(n),
        }
    }

    /// Bytes are handed to the engine as soon as they are written.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
