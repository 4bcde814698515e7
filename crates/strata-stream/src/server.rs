//! # Server Engine
//!
//! [`StreamServer`] multiplexes many peers over one UDP socket. A peer table
//! maps each remote address to its own [`Connection`]; there is no lock
//! spanning connections, so different peers advance independently.
//!
//! - The **receiving loop** runs housekeeping on a fixed tick (resends,
//!   FIN retries, reaping), demultiplexes datagrams by source address and
//!   creates connections for SYNs while listening. A connection that
//!   completes its handshake is published on the accept queue.
//! - The **sending loop** takes peer addresses off the work queue and
//!   drains each one's control and DATA messages.
//!
//! After [`StreamServer::close_server`] no new peers are admitted; the loops
//! stop once the last connection has been reaped.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use dashmap::DashMap;
use quanta::Instant;
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::connection::{Connection, ConnectionState};
use crate::engine::{transmit_pending, EngineSocket, Workers, RECV_BUFFER_SIZE};
use crate::error::{Result, StreamError};
use crate::stats::{ConnectionStats, EngineStats};
use crate::stream::ByteStream;
use crate::wire::Message;

// ─── Server State ───────────────────────────────────────────────────────────

/// Engine-level state, distinct from any single connection's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Bound, not yet listening.
    Idle,
    Listening,
    /// No longer admitting peers.
    Closed,
}

type PeerTable = DashMap<SocketAddr, Arc<Connection>>;

struct ServerShared {
    config: StreamConfig,
    socket: EngineSocket,
    state: Mutex<ServerState>,
    peers: PeerTable,
    work_tx: Sender<SocketAddr>,
    work_rx: Receiver<SocketAddr>,
    accept_tx: Sender<ServerConnection>,
    accept_rx: Receiver<ServerConnection>,
}

impl ServerShared {
    fn state(&self) -> ServerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn peer(&self, addr: &SocketAddr) -> Option<Arc<Connection>> {
        self.peers.get(addr).map(|entry| entry.value().clone())
    }

    fn snapshot(&self) -> Vec<(SocketAddr, Arc<Connection>)> {
        self.peers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    /// Create and register a connection for a peer that opened with SYN.
    fn admit(&self, addr: SocketAddr) -> Arc<Connection> {
        let connection = Arc::new(Connection::new(&self.config));
        let work_tx = self.work_tx.clone();
        connection.set_waker(move || {
            let _ = work_tx.try_send(addr);
        });
        self.peers.insert(addr, connection.clone());
        debug!(peer = %addr, "new peer");
        connection
    }

    /// Queue `addr` for the sending loop. Waits at most one poll interval
    /// while the queue is full.
    fn schedule(&self, addr: SocketAddr) {
        let _ = self
            .work_tx
            .send_timeout(addr, self.config.retransmit_timeout);
    }

    fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    fn publish(&self, addr: SocketAddr, connection: &Arc<Connection>) {
        let accepted = ServerConnection {
            peer: addr,
            connection: connection.clone(),
        };
        match self.accept_tx.try_send(accepted) {
            Ok(()) => info!(peer = %addr, "connection established"),
            Err(TrySendError::Full(_)) => {
                warn!(peer = %addr, "accept queue full, dropping connection");
                connection.abort();
            }
            Err(TrySendError::Disconnected(_)) => connection.abort(),
        }
    }
}

// ─── Server ─────────────────────────────────────────────────────────────────

/// Server side: one socket, many peers.
pub struct StreamServer {
    shared: Arc<ServerShared>,
    workers: Workers,
}

impl StreamServer {
    pub fn bind(addr: SocketAddr, config: StreamConfig) -> Result<Self> {
        let config = config.normalized();
        let socket = EngineSocket::bind(addr, config.retransmit_timeout)?;
        let (work_tx, work_rx) = crossbeam_channel::bounded(config.work_queue_capacity);
        let (accept_tx, accept_rx) = crossbeam_channel::bounded(config.accept_queue_capacity);
        Ok(StreamServer {
            shared: Arc::new(ServerShared {
                config,
                socket,
                state: Mutex::new(ServerState::Idle),
                peers: DashMap::new(),
                work_tx,
                work_rx,
                accept_tx,
                accept_rx,
            }),
            workers: Workers::new(),
        })
    }

    /// Start admitting peers and start the worker loops.
    pub fn listen(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
            match *state {
                ServerState::Idle => *state = ServerState::Listening,
                ServerState::Listening => return Err(StreamError::AlreadyListening),
                ServerState::Closed => return Err(StreamError::SocketClosed),
            }
        }

        let running = self.workers.running();
        let shared = self.shared.clone();
        let receiving = {
            let running = running.clone();
            move || receiving_loop(shared, running)
        };
        let shared = self.shared.clone();
        let sending = move || sending_loop(shared, running);

        self.workers.start("strata-server", receiving, sending)?;
        info!(local = %self.local_addr(), "listening");
        Ok(())
    }

    /// Block until a peer completes its handshake.
    ///
    /// Fails with `SocketClosed` once the server is closed and no
    /// established connection is left to hand out.
    pub fn accept(&self) -> Result<ServerConnection> {
        let poll = self.shared.config.retransmit_timeout;
        loop {
            if let Some(conn) = self.try_accept(poll)? {
                return Ok(conn);
            }
        }
    }

    /// [`accept`](Self::accept) bounded by `timeout`. `Ok(None)` when it
    /// elapses.
    pub fn try_accept(&self, timeout: Duration) -> Result<Option<ServerConnection>> {
        let started = Instant::now();
        let poll = self.shared.config.retransmit_timeout;
        loop {
            match self.shared.state() {
                ServerState::Idle => return Err(StreamError::NotConnected),
                ServerState::Closed if self.shared.accept_rx.is_empty() => {
                    return Err(StreamError::SocketClosed);
                }
                _ => {}
            }
            let wait = timeout.saturating_sub(started.elapsed()).min(poll);
            match self.shared.accept_rx.recv_timeout(wait) {
                Ok(conn) => return Ok(Some(conn)),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Err(StreamError::SocketClosed),
            }
            if started.elapsed() >= timeout {
                return Ok(None);
            }
        }
    }

    /// Stop admitting peers. Worker loops stop once every existing
    /// connection has been reaped.
    pub fn close_server(&self) {
        let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != ServerState::Closed {
            *state = ServerState::Closed;
            info!(local = %self.shared.socket.local_addr(), "server closed");
        }
    }

    /// Servers never initiate connections.
    pub fn connect(&self, _remote: SocketAddr) -> Result<()> {
        Err(StreamError::ServerSide)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.shared.socket.local_addr()
    }

    pub fn state(&self) -> ServerState {
        self.shared.state()
    }

    /// Peers currently tracked, including those still handshaking.
    pub fn connection_count(&self) -> usize {
        self.shared.peers.len()
    }

    /// The worker loops are still running.
    pub fn is_running(&self) -> bool {
        self.workers.is_running()
    }

    pub fn engine_stats(&self) -> EngineStats {
        self.shared.socket.stats()
    }
}

impl Drop for StreamServer {
    fn drop(&mut self) {
        self.workers.stop();
        for (_, connection) in self.shared.snapshot() {
            connection.close_buffers();
        }
        self.workers.shutdown();
    }
}

// ─── Server Connection ──────────────────────────────────────────────────────

/// An established connection handed out by [`StreamServer::accept`].
#[derive(Debug, Clone)]
pub struct ServerConnection {
    peer: SocketAddr,
    connection: Arc<Connection>,
}

impl ServerConnection {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn send(&self, buf: &[u8]) -> Result<usize> {
        self.connection.send(buf)
    }

    /// Returns `0` at end of stream.
    pub fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        self.connection.recv(buf)
    }

    pub fn available(&self) -> usize {
        self.connection.available()
    }

    /// Graceful close. Returns whether this side sent the first FIN.
    pub fn close(&self) -> Result<bool> {
        self.connection.fin()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn stats(&self) -> ConnectionStats {
        self.connection.stats()
    }
}

impl ByteStream for ServerConnection {
    fn send(&self, buf: &[u8]) -> Result<usize> {
        ServerConnection::send(self, buf)
    }

    fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        ServerConnection::recv(self, buf)
    }

    fn available(&self) -> usize {
        ServerConnection::available(self)
    }

    fn close(&self) -> Result<bool> {
        ServerConnection::close(self)
    }

    fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.peer)
    }
}

// ─── Loops ──────────────────────────────────────────────────────────────────

/// Retransmission checks and reaping for every tracked peer.
fn housekeeping(shared: &ServerShared) {
    for (addr, connection) in shared.snapshot() {
        if connection.check_resend() || connection.has_outbound() {
            shared.schedule(addr);
        }
        if connection.closed() {
            shared.peers.remove(&addr);
            connection.close_buffers();
            shared.socket.record(|s| s.connections_reaped += 1);
            info!(peer = %addr, state = %connection.state(), "connection reaped");
        }
    }
}

fn receiving_loop(shared: Arc<ServerShared>, running: Arc<AtomicBool>) {
    let socket = &shared.socket;
    let tick = shared.config.retransmit_timeout / 4;
    let mut last_tick = Instant::now();
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];

    while running.load(Ordering::Relaxed) {
        if last_tick.elapsed() >= tick {
            housekeeping(&shared);
            last_tick = Instant::now();
        }
        if shared.state() == ServerState::Closed && shared.is_empty() {
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
        let Some(msg) = socket.decode(&packet) else {
            continue;
        };

        let addr = packet.addr;
        let connection = match shared.peer(&addr) {
            Some(connection) => connection,
            None if matches!(msg, Message::Syn { .. })
                && shared.state() == ServerState::Listening =>
            {
                shared.admit(addr)
            }
            None => {
                socket.record(|s| s.unknown_peer += 1);
                debug!(peer = %addr, %msg, "message from unknown peer dropped");
                continue;
            }
        };

        let was_opening = connection.state().is_opening();
        if connection.handle_message(&msg) {
            shared.schedule(addr);
        }
        // A FIN may finish the handshake and close the peer's side at once.
        let state = connection.state();
        if was_opening && !state.is_opening() && state != ConnectionState::Closed {
            shared.publish(addr, &connection);
        }
    }
    debug!("server receiving loop stopped");
}

fn sending_loop(shared: Arc<ServerShared>, running: Arc<AtomicBool>) {
    let poll = shared.config.retransmit_timeout;
    while running.load(Ordering::Relaxed) {
        match shared.work_rx.recv_timeout(poll) {
            Ok(addr) => {
                if let Some(connection) = shared.peer(&addr) {
                    transmit_pending(&connection, addr, &shared.socket, &running);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                for (addr, connection) in shared.snapshot() {
                    if connection.has_outbound() {
                        transmit_pending(&connection, addr, &shared.socket, &running);
                    }
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("server sending loop stopped");
}
