//! # Routine Engine
//!
//! Plumbing shared by the client and server engines: a UDP socket whose
//! receive timeout doubles as the housekeeping tick, and the pair of named
//! worker threads (receiving loop, sending loop) that every engine runs.
//!
//! The loops themselves live with their engine variant in
//! [`crate::client`] and [`crate::server`]; both drain a connection the same
//! way through [`transmit_pending`].

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::connection::Connection;
use crate::error::Result;
use crate::stats::EngineStats;
use crate::wire::{Datagram, Message};

/// Receive buffer size. Larger than any message the protocol produces so
/// oversized datagrams are seen whole and rejected by the decoder.
pub(crate) const RECV_BUFFER_SIZE: usize = 65536;

/// Pause between attempts when the socket refuses a datagram transiently.
const SEND_RETRY_BACKOFF: Duration = Duration::from_millis(1);

// ─── Socket ─────────────────────────────────────────────────────────────────

/// Datagram socket with a bounded receive wait.
#[derive(Debug)]
pub(crate) struct EngineSocket {
    socket: UdpSocket,
    local_addr: SocketAddr,
    stats: Mutex<EngineStats>,
}

impl EngineSocket {
    pub fn bind(addr: SocketAddr, poll_interval: Duration) -> Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(poll_interval))?;
        let local_addr = socket.local_addr()?;
        debug!(%local_addr, "engine socket bound");
        Ok(EngineSocket {
            socket,
            local_addr,
            stats: Mutex::new(EngineStats::default()),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait up to the poll interval for one datagram.
    ///
    /// `Ok(None)` means the wait elapsed (or was interrupted) with nothing
    /// to read.
    pub fn recv(&self, buf: &mut [u8]) -> Result<Option<Datagram>> {
        match self.socket.recv_from(buf) {
            Ok((n, addr)) => {
                self.record(|s| s.datagrams_received += 1);
                Ok(Some(Datagram::new(
                    addr,
                    bytes::Bytes::copy_from_slice(&buf[..n]),
                )))
            }
            Err(e) if is_idle(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Transmit one datagram, retrying transient refusals while `running`.
    ///
    /// Returns whether the socket accepted the datagram.
    pub fn send(&self, packet: &Datagram, running: &AtomicBool) -> bool {
        loop {
            match self.socket.send_to(&packet.data, packet.addr) {
                Ok(_) => {
                    self.record(|s| s.datagrams_sent += 1);
                    return true;
                }
                Err(e) if is_transient(&e) => {
                    self.record(|s| s.send_retries += 1);
                    if !running.load(Ordering::Relaxed) {
                        return false;
                    }
                    thread::sleep(SEND_RETRY_BACKOFF);
                }
                Err(e) => {
                    warn!(peer = %packet.addr, error = %e, "datagram send failed");
                    return false;
                }
            }
        }
    }

    /// Decode a received datagram, counting and logging failures.
    pub fn decode(&self, packet: &Datagram) -> Option<Message> {
        match Message::from_packet(packet) {
            Ok(msg) => {
                trace!(peer = %packet.addr, %msg, "recv");
                Some(msg)
            }
            Err(e) => {
                self.record(|s| s.malformed += 1);
                debug!(peer = %packet.addr, error = %e, "malformed datagram dropped");
                None
            }
        }
    }

    pub fn record(&self, update: impl FnOnce(&mut EngineStats)) {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        update(&mut stats);
    }

    pub fn stats(&self) -> EngineStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Receive errors that only mean "nothing arrived in time".
fn is_idle(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            // ICMP port unreachable surfaces here on some platforms.
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
    )
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

/// Send every pending control message, then every pending DATA message.
pub(crate) fn transmit_pending(
    connection: &Connection,
    peer: SocketAddr,
    socket: &EngineSocket,
    running: &AtomicBool,
) {
    while let Some(msg) = connection.next_control_message() {
        trace!(%peer, %msg, "send");
        socket.send(&msg.to_packet(peer), running);
    }
    while let Some(msg) = connection.current_data_message() {
        trace!(%peer, %msg, "send");
        socket.send(&msg.to_packet(peer), running);
    }
}

// ─── Workers ────────────────────────────────────────────────────────────────

/// The engine's worker threads and the flag that keeps them looping.
#[derive(Debug, Default)]
pub(crate) struct Workers {
    running: Arc<AtomicBool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Workers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Mark running and spawn the receiving and sending loops.
    pub fn start(
        &self,
        name: &str,
        receiving: impl FnOnce() + Send + 'static,
        sending: impl FnOnce() + Send + 'static,
    ) -> Result<()> {
        self.running.store(true, Ordering::Relaxed);
        let recv_handle = thread::Builder::new()
            .name(format!("{name}-recv"))
            .spawn(receiving);
        let recv_handle = match recv_handle {
            Ok(handle) => handle,
            Err(e) => {
                self.stop();
                return Err(e.into());
            }
        };
        self.push(recv_handle);

        match thread::Builder::new()
            .name(format!("{name}-send"))
            .spawn(sending)
        {
            Ok(handle) => {
                self.push(handle);
                Ok(())
            }
            Err(e) => {
                self.stop();
                Err(e.into())
            }
        }
    }

    fn push(&self, handle: JoinHandle<()>) {
        self.handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Stop and join every worker other than the calling thread.
    pub fn shutdown(&self) {
        self.stop();
        let handles: Vec<_> = self
            .handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
    }
}
