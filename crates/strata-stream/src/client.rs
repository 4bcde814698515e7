//! # Client Engine
//!
//! [`StreamClient`] owns one UDP socket and exactly one [`Connection`].
//! `connect` runs the handshake on the calling thread; once connected the
//! two worker loops take over:
//!
//! - **receiving**: retransmission housekeeping, then one bounded socket
//!   wait; inbound messages from the peer go to the connection.
//! - **sending**: woken through a single-slot channel, drains control
//!   messages then DATA messages onto the socket.
//!
//! Both loops stop once the connection is reaped.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use quanta::Instant;
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::connection::{Connection, ConnectionState};
use crate::engine::{transmit_pending, EngineSocket, Workers, RECV_BUFFER_SIZE};
use crate::error::{Result, StreamError};
use crate::stats::{ConnectionStats, EngineStats};
use crate::stream::ByteStream;
use crate::wire::Message;

struct ClientShared {
    socket: EngineSocket,
    connection: Arc<Connection>,
    peer: OnceLock<SocketAddr>,
}

/// Client side of a stream: one socket, one connection.
pub struct StreamClient {
    config: StreamConfig,
    shared: Arc<ClientShared>,
    workers: Workers,
}

impl StreamClient {
    /// Bind the local socket. `127.0.0.1:0` picks an ephemeral port.
    pub fn bind(addr: SocketAddr, config: StreamConfig) -> Result<Self> {
        let config = config.normalized();
        let socket = EngineSocket::bind(addr, config.retransmit_timeout)?;
        let connection = Arc::new(Connection::new(&config));
        Ok(StreamClient {
            shared: Arc::new(ClientShared {
                socket,
                connection,
                peer: OnceLock::new(),
            }),
            workers: Workers::new(),
            config,
        })
    }

    /// Run the three-way handshake with `remote`, then start the workers.
    ///
    /// The SYN is repeated every retransmit interval until a valid SYN-ACK
    /// arrives or `connect_timeout` elapses. A timed-out client is left
    /// closed and cannot be reused.
    pub fn connect(&self, remote: SocketAddr) -> Result<()> {
        let connection = &self.shared.connection;
        match connection.state() {
            ConnectionState::NotConnected => {}
            ConnectionState::Closed => return Err(StreamError::SocketClosed),
            _ => return Err(StreamError::AlreadyConnected),
        }
        if self.shared.peer.set(remote).is_err() {
            return Err(StreamError::AlreadyConnected);
        }

        let socket = &self.shared.socket;
        let running = AtomicBool::new(true);
        let started = Instant::now();
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        debug!(%remote, "connecting");

        while !connection.is_connected() {
            if started.elapsed() > self.config.connect_timeout {
                warn!(%remote, timeout = ?self.config.connect_timeout, "handshake timed out");
                connection.abort();
                return Err(StreamError::ConnectTimeout);
            }

            let syn = connection.begin_connect()?;
            socket.send(&syn.to_packet(remote), &running);

            let Some(packet) = socket.recv(&mut buf)? else {
                continue;
            };
            if packet.addr != remote {
                socket.record(|s| s.unknown_peer += 1);
                continue;
            }
            if let Some(msg @ Message::SynAck { .. }) = socket.decode(&packet) {
                connection.handle_message(&msg);
            }
        }

        // Final ACK of the handshake.
        transmit_pending(connection, remote, socket, &running);
        info!(%remote, local = %socket.local_addr(), "connected");
        self.start_workers(remote)
    }

    fn start_workers(&self, remote: SocketAddr) -> Result<()> {
        let (wake_tx, wake_rx) = crossbeam_channel::bounded::<()>(1);
        let waker = wake_tx.clone();
        self.shared.connection.set_waker(move || {
            let _ = waker.try_send(());
        });

        let running = self.workers.running();
        let shared = self.shared.clone();
        let receiving = {
            let running = running.clone();
            move || receiving_loop(shared, remote, running, wake_tx)
        };
        let shared = self.shared.clone();
        let poll = self.config.retransmit_timeout;
        let sending = move || sending_loop(shared, remote, running, wake_rx, poll);

        self.workers.start("strata-client", receiving, sending)
    }

    /// Graceful close: wait for every written byte to be acknowledged, then
    /// run the FIN exchange. Returns whether this side sent the first FIN.
    pub fn close(&self) -> Result<bool> {
        self.shared.connection.fin()
    }

    pub fn send(&self, buf: &[u8]) -> Result<usize> {
        self.shared.connection.send(buf)
    }

    /// Returns `0` at end of stream.
    pub fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        self.shared.connection.recv(buf)
    }

    pub fn available(&self) -> usize {
        self.shared.connection.available()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.shared.socket.local_addr()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.shared.peer.get().copied()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.connection.state()
    }

    /// The worker loops are still running.
    pub fn is_running(&self) -> bool {
        self.workers.is_running()
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.shared.connection
    }

    pub fn stats(&self) -> ConnectionStats {
        self.shared.connection.stats()
    }

    pub fn engine_stats(&self) -> EngineStats {
        self.shared.socket.stats()
    }
}

impl ByteStream for StreamClient {
    fn send(&self, buf: &[u8]) -> Result<usize> {
        StreamClient::send(self, buf)
    }

    fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        StreamClient::recv(self, buf)
    }

    fn available(&self) -> usize {
        StreamClient::available(self)
    }

    fn close(&self) -> Result<bool> {
        StreamClient::close(self)
    }

    fn peer_addr(&self) -> Result<SocketAddr> {
        StreamClient::peer_addr(self).ok_or(StreamError::NotConnected)
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.workers.stop();
        self.shared.connection.close_buffers();
        self.workers.shutdown();
    }
}

// ─── Loops ──────────────────────────────────────────────────────────────────

fn receiving_loop(
    shared: Arc<ClientShared>,
    remote: SocketAddr,
    running: Arc<AtomicBool>,
    wake_tx: Sender<()>,
) {
    let connection = &shared.connection;
    let socket = &shared.socket;
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];

    while running.load(Ordering::Relaxed) {
        if connection.check_resend() {
            let _ = wake_tx.try_send(());
        }
        if connection.closed() {
            connection.close_buffers();
            socket.record(|s| s.connections_reaped += 1);
            info!(%remote, state = %connection.state(), "connection reaped");
            running.store(false, Ordering::Relaxed);
            break;
        }

        let packet = match socket.recv(&mut buf) {
            Ok(Some(packet)) => packet,
            Ok(None) => continue,
            Err(e) => {
                warn!(error = %e, "socket receive failed");
                continue;
            }
        };
        if packet.addr != remote {
            socket.record(|s| s.unknown_peer += 1);
            debug!(peer = %packet.addr, "datagram from unknown peer dropped");
            continue;
        }
        let Some(msg) = socket.decode(&packet) else {
            continue;
        };
        if connection.handle_message(&msg) {
            let _ = wake_tx.try_send(());
        }
    }
    debug!(%remote, "client receiving loop stopped");
}

fn sending_loop(
    shared: Arc<ClientShared>,
    remote: SocketAddr,
    running: Arc<AtomicBool>,
    wake_rx: Receiver<()>,
    poll: std::time::Duration,
) {
    while running.load(Ordering::Relaxed) {
        match wake_rx.recv_timeout(poll) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {
                transmit_pending(&shared.connection, remote, &shared.socket, &running);
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!(%remote, "client sending loop stopped");
}
