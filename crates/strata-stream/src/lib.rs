//! # strata-stream
//!
//! Reliable, ordered byte streams over UDP.
//!
//! A three-way handshake opens a connection, cumulative acknowledgments and
//! timeout-driven rewinds make delivery reliable, fixed-size ring buffers
//! provide flow control, and a FIN exchange closes both directions. One
//! client engine drives a single connection; one server engine multiplexes
//! many peers over a single socket.
//!
//! ## Crate structure
//!
//! - [`wire`] — 16-byte header message codec
//! - [`ring`] — Flow-controlled send/receive ring buffers
//! - [`connection`] — Per-peer state machine and sequence bookkeeping
//! - `engine` — Socket I/O and worker threads shared by both engines
//! - [`client`] — Client engine (`connect`, `send`, `recv`, `close`)
//! - [`server`] — Server engine (`listen`, `accept`, `close_server`)
//! - [`stream`] — `ByteStream` trait and `io::Read`/`io::Write` adapters
//! - [`config`] — Engine tunables and TOML loading
//! - [`stats`] — Per-connection and per-engine counters
//! - [`error`] — Error taxonomy

pub mod client;
pub mod config;
pub mod connection;
pub(crate) mod engine;
pub mod error;
pub mod ring;
pub mod server;
pub mod stats;
pub mod stream;
pub mod wire;

pub use client::StreamClient;
pub use config::StreamConfig;
pub use connection::{Connection, ConnectionState};
pub use error::{Result, StreamError};
pub use server::{ServerConnection, ServerState, StreamServer};
pub use stream::{ByteStream, StreamReader, StreamWriter};
pub use wire::{Datagram, Message, MessageType};
