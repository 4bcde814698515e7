//! # Connection State Machine
//!
//! One [`Connection`] per remote peer. It owns the send and receive rings,
//! the sequence bookkeeping and a bounded queue of pending control messages
//! (SYN-ACK, ACK, FIN). Engines feed it decoded messages through
//! [`Connection::handle_message`] and drain it through
//! [`Connection::next_control_message`] and
//! [`Connection::current_data_message`].
//!
//! ```text
//!   client:  NotConnected ──SYN──▶ SynSent ──SYN-ACK──▶ Connected
//!   server:  NotConnected ──SYN──▶ SynAckSent ──ACK──▶ Connected
//!
//!   active:  Connected ──fin()──▶ FinWait ──ACK──▶ FinWaitAck ──FIN──▶ TimeAck
//!                                    └──────────FIN──────────────────▶ TimeAck
//!   passive: Connected ──FIN──▶ CloseWait ──all sent──▶ LastAck ──ACK──▶ Closed
//! ```
//!
//! Sequence numbers wrap. SYN and FIN each consume one sequence number, so
//! the acknowledgment of a FIN is `seq + 1`. Every comparison goes through
//! the serial helpers below.
//!
//! Lock order is core state first, ring buffer second. Application calls
//! that block on a ring never hold the core lock while waiting.

use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use quanta::Instant;
use rand::RngExt as _;
use tracing::{debug, trace};

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::ring::{RecvRingBuffer, SendRingBuffer};
use crate::stats::ConnectionStats;
use crate::wire::{Message, INIT_ACK};

// ─── Serial Arithmetic ──────────────────────────────────────────────────────

/// `a` comes strictly before `b` in wrapping sequence space.
#[inline]
pub fn seq_before(a: i32, b: i32) -> bool {
    b.wrapping_sub(a) > 0
}

/// `a` comes before or equals `b` in wrapping sequence space.
#[inline]
pub fn seq_before_eq(a: i32, b: i32) -> bool {
    b.wrapping_sub(a) >= 0
}

// ─── Connection State ───────────────────────────────────────────────────────

/// Per-connection protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    NotConnected,
    /// SYN sent, waiting for the SYN-ACK.
    SynSent,
    /// SYN received and answered, waiting for the final ACK.
    SynAckSent,
    Connected,
    /// Our FIN is out, nothing acknowledged it yet.
    FinWait,
    /// Our FIN is acknowledged, waiting for the peer's FIN.
    FinWaitAck,
    /// The peer finished; we still drain our send buffer.
    CloseWait,
    /// Our FIN is out after the peer's, waiting for its ACK.
    LastAck,
    /// Both FINs exchanged; lingering to re-acknowledge a repeated FIN.
    TimeAck,
    Closed,
}

impl ConnectionState {
    /// States in which DATA messages are produced.
    pub fn sends_data(self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::CloseWait)
    }

    /// States in which in-order DATA from the peer is accepted.
    pub fn accepts_data(self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::FinWait | ConnectionState::FinWaitAck
        )
    }

    /// Before the handshake finished.
    pub fn is_opening(self) -> bool {
        matches!(
            self,
            ConnectionState::NotConnected | ConnectionState::SynSent | ConnectionState::SynAckSent
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::TimeAck | ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::NotConnected => "NOT_CONNECTED",
            ConnectionState::SynSent => "SYN_SENT",
            ConnectionState::SynAckSent => "SYN_ACK_SENT",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::FinWait => "FIN_WAIT",
            ConnectionState::FinWaitAck => "FIN_WAIT_ACK",
            ConnectionState::CloseWait => "CLOSE_WAIT",
            ConnectionState::LastAck => "LAST_ACK",
            ConnectionState::TimeAck => "TIME_ACK",
            ConnectionState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

// ─── Core ───────────────────────────────────────────────────────────────────

/// Outcome of applying an acknowledgment number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AckOutcome {
    /// Did not move past `other_ack`.
    Stale,
    /// Confirmed this many bytes.
    Progress(usize),
    /// Acknowledges past `seq_number`: our FIN was received.
    Beyond,
}

struct Core {
    state: ConnectionState,
    /// Next byte we transmit.
    seq_number: i32,
    /// Next byte we expect from the peer.
    ack_number: i32,
    /// Highest sequence number the peer confirmed.
    other_ack: i32,
    /// Last data progress, drives retransmission.
    ack_timestamp: Instant,
    /// Last FIN or SYN-ACK (re)transmission.
    control_timestamp: Instant,
    /// When `TimeAck` was entered or last refreshed.
    linger_since: Option<Instant>,
    control_retries: u32,
    /// Rewinds since the last acknowledged progress.
    rewinds: u32,
    stats: ConnectionStats,
}

type Waker = Box<dyn Fn() + Send + Sync>;

// ─── Connection ─────────────────────────────────────────────────────────────

/// Protocol state for a single peer.
pub struct Connection {
    config: StreamConfig,
    core: Mutex<Core>,
    state_changed: Condvar,
    send_buffer: SendRingBuffer,
    recv_buffer: RecvRingBuffer,
    control_tx: Sender<Message>,
    control_rx: Receiver<Message>,
    /// Tells the owning engine that outbound work is pending.
    waker: OnceLock<Waker>,
}

impl Connection {
    /// Create a connection with a random initial sequence number.
    pub fn new(config: &StreamConfig) -> Self {
        let isn = rand::rng().random_range(0..=i32::MAX / 2);
        Self::with_initial_seq(config, isn)
    }

    /// Create a connection with a fixed initial sequence number.
    pub fn with_initial_seq(config: &StreamConfig, isn: i32) -> Self {
        let config = config.clone().normalized();
        let now = Instant::now();
        let (control_tx, control_rx) = crossbeam_channel::bounded(config.control_queue_capacity);
        Connection {
            send_buffer: SendRingBuffer::new(config.buffer_capacity),
            recv_buffer: RecvRingBuffer::new(config.buffer_capacity),
            core: Mutex::new(Core {
                state: ConnectionState::NotConnected,
                seq_number: isn,
                ack_number: INIT_ACK,
                other_ack: INIT_ACK,
                ack_timestamp: now,
                control_timestamp: now,
                linger_since: None,
                control_retries: 0,
                rewinds: 0,
                stats: ConnectionStats::new(),
            }),
            state_changed: Condvar::new(),
            control_tx,
            control_rx,
            waker: OnceLock::new(),
            config,
        }
    }

    /// Register the callback run when application calls queue outbound work.
    /// Only the first registration takes effect.
    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        let _ = self.waker.set(Box::new(waker));
    }

    fn wake(&self) {
        if let Some(waker) = self.waker.get() {
            waker();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wait_while<'a>(
        &self,
        guard: MutexGuard<'a, Core>,
        condition: impl FnMut(&mut Core) -> bool,
    ) -> MutexGuard<'a, Core> {
        self.state_changed
            .wait_while(guard, condition)
            .unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, core: &mut Core, next: ConnectionState) {
        if core.state != next {
            debug!(from = %core.state, to = %next, seq = core.seq_number, ack = core.ack_number, "connection state change");
            core.state = next;
            if next == ConnectionState::TimeAck {
                core.linger_since = Some(Instant::now());
            }
            self.state_changed.notify_all();
        }
    }

    fn enqueue_control(&self, core: &mut Core, msg: Message) -> bool {
        match self.control_tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(msg)) => {
                core.stats.control_overflows += 1;
                debug!(%msg, "control queue full, message dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    fn enqueue_ack(&self, core: &mut Core) -> bool {
        let ack = Message::Ack {
            seq: core.seq_number,
            ack: core.ack_number,
        };
        self.enqueue_control(core, ack)
    }

    // ─── Inbound ────────────────────────────────────────────────────────

    /// Apply one message from the peer.
    ///
    /// Returns `true` when a reply was queued and the connection needs a
    /// trip through the sending loop.
    pub fn handle_message(&self, msg: &Message) -> bool {
        let mut core = self.lock();
        trace!(%msg, state = %core.state, "handle message");

        if core.state == ConnectionState::FinWaitAck {
            // Any traffic proves the peer is alive.
            core.control_timestamp = Instant::now();
            core.control_retries = 0;
        }

        match msg {
            Message::Syn { seq } => self.on_syn(&mut core, *seq),
            Message::SynAck { seq, ack } => self.on_syn_ack(&mut core, *seq, *ack),
            Message::Ack { ack, .. } => self.on_ack(&mut core, *ack),
            Message::Data { seq, ack, payload } => self.on_data(&mut core, *seq, *ack, payload),
            Message::Fin { seq, ack } => self.on_fin(&mut core, *seq, *ack),
        }
    }

    fn on_syn(&self, core: &mut Core, seq: i32) -> bool {
        match core.state {
            ConnectionState::NotConnected => {
                core.ack_number = seq.wrapping_add(1);
                self.set_state(core, ConnectionState::SynAckSent);
                core.control_timestamp = Instant::now();
                core.control_retries = 0;
                let reply = Message::SynAck {
                    seq: core.seq_number,
                    ack: core.ack_number,
                };
                self.enqueue_control(core, reply)
            }
            ConnectionState::SynSent => false,
            _ => self.enqueue_ack(core),
        }
    }

    fn on_syn_ack(&self, core: &mut Core, seq: i32, ack: i32) -> bool {
        match core.state {
            ConnectionState::SynSent => {
                if ack != core.seq_number.wrapping_add(1) {
                    debug!(expected = core.seq_number.wrapping_add(1), ack, "invalid SYN-ACK ignored");
                    return false;
                }
                core.seq_number = ack;
                core.ack_number = seq.wrapping_add(1);
                core.other_ack = ack;
                core.ack_timestamp = Instant::now();
                self.set_state(core, ConnectionState::Connected);
                self.enqueue_ack(core)
            }
            ConnectionState::NotConnected => false,
            // Our final ACK was lost.
            _ => self.enqueue_ack(core),
        }
    }

    /// Complete the passive handshake when `ack` confirms our SYN.
    fn finalize_handshake(&self, core: &mut Core, ack: i32) -> bool {
        if core.state != ConnectionState::SynAckSent || ack != core.seq_number.wrapping_add(1) {
            return false;
        }
        core.seq_number = ack;
        core.other_ack = ack;
        core.ack_timestamp = Instant::now();
        core.control_retries = 0;
        self.set_state(core, ConnectionState::Connected);
        true
    }

    fn apply_ack(&self, core: &mut Core, ack: i32) -> AckOutcome {
        if seq_before_eq(ack, core.other_ack) {
            return AckOutcome::Stale;
        }
        if seq_before(core.seq_number, ack) {
            match core.state {
                ConnectionState::LastAck => {
                    core.other_ack = ack;
                    self.set_state(core, ConnectionState::Closed);
                    self.close_buffers();
                }
                ConnectionState::FinWait => {
                    core.other_ack = ack;
                    core.control_timestamp = Instant::now();
                    core.control_retries = 0;
                    self.set_state(core, ConnectionState::FinWaitAck);
                }
                _ => {
                    trace!(ack, seq = core.seq_number, state = %core.state, "ACK beyond sent data ignored");
                }
            }
            return AckOutcome::Beyond;
        }

        let confirmed = ack.wrapping_sub(core.other_ack) as usize;
        self.send_buffer.confirm_read(confirmed);
        core.other_ack = ack;
        core.ack_timestamp = Instant::now();
        core.rewinds = 0;
        core.stats.bytes_acked += confirmed as u64;
        self.state_changed.notify_all();
        AckOutcome::Progress(confirmed)
    }

    fn on_ack(&self, core: &mut Core, ack: i32) -> bool {
        if core.state == ConnectionState::SynAckSent {
            self.finalize_handshake(core, ack);
            return false;
        }
        if core.state.is_opening() {
            return false;
        }
        if self.apply_ack(core, ack) == AckOutcome::Stale {
            core.stats.stale_acks += 1;
        }
        false
    }

    fn on_data(&self, core: &mut Core, seq: i32, ack: i32, payload: &Bytes) -> bool {
        if core.state == ConnectionState::SynAckSent && !self.finalize_handshake(core, ack) {
            return false;
        }
        if core.state.is_opening() {
            return false;
        }
        self.apply_ack(core, ack);

        if seq_before(seq, core.ack_number) {
            core.stats.duplicates += 1;
            trace!(seq, expected = core.ack_number, "duplicate DATA, re-acknowledging");
            return self.enqueue_ack(core);
        }
        if seq != core.ack_number {
            core.stats.out_of_window += 1;
            trace!(seq, expected = core.ack_number, "out-of-window DATA dropped");
            return false;
        }
        if !core.state.accepts_data() {
            return false;
        }

        let accepted = self.recv_buffer.write(payload).unwrap_or(0);
        if accepted < payload.len() {
            debug!(accepted, len = payload.len(), "receive buffer full, partial accept");
        }
        core.ack_number = core.ack_number.wrapping_add(accepted as i32);
        core.stats.bytes_received += accepted as u64;
        self.enqueue_ack(core)
    }

    fn on_fin(&self, core: &mut Core, seq: i32, ack: i32) -> bool {
        if core.state == ConnectionState::SynAckSent && !self.finalize_handshake(core, ack) {
            return false;
        }
        if core.state.is_opening() {
            return false;
        }
        self.apply_ack(core, ack);

        if seq_before(seq, core.ack_number) {
            // Repeated FIN: our ACK was lost.
            if core.state == ConnectionState::TimeAck {
                core.linger_since = Some(Instant::now());
            }
            return self.enqueue_ack(core);
        }
        if seq != core.ack_number {
            // Data before this FIN is still missing.
            return self.enqueue_ack(core);
        }

        let next = match core.state {
            ConnectionState::Connected => Some(ConnectionState::CloseWait),
            ConnectionState::FinWait | ConnectionState::FinWaitAck => Some(ConnectionState::TimeAck),
            _ => None,
        };
        if let Some(next) = next {
            core.ack_number = core.ack_number.wrapping_add(1);
            self.recv_buffer.close();
            self.set_state(core, next);
        }
        self.enqueue_ack(core)
    }

    // ─── Outbound ───────────────────────────────────────────────────────

    /// Start an active open. Returns the SYN to transmit.
    ///
    /// Calling again while the SYN is unanswered returns the same SYN.
    pub fn begin_connect(&self) -> Result<Message> {
        let mut core = self.lock();
        match core.state {
            ConnectionState::NotConnected => {
                self.set_state(&mut core, ConnectionState::SynSent);
            }
            ConnectionState::SynSent => {}
            _ => return Err(StreamError::AlreadyConnected),
        }
        Ok(Message::Syn {
            seq: core.seq_number,
        })
    }

    /// Pop the next pending control message.
    pub fn next_control_message(&self) -> Option<Message> {
        self.control_rx.try_recv().ok()
    }

    /// Drain up to one payload of unsent bytes into a DATA message.
    pub fn current_data_message(&self) -> Option<Message> {
        let mut core = self.lock();
        if !core.state.sends_data() {
            return None;
        }
        let was_idle = self.send_buffer.in_flight() == 0;
        let mut payload = BytesMut::zeroed(self.config.max_payload_size);
        let n = self.send_buffer.read(&mut payload).unwrap_or(0);
        if n == 0 {
            return None;
        }
        payload.truncate(n);
        if was_idle {
            core.ack_timestamp = Instant::now();
        }

        let msg = Message::Data {
            seq: core.seq_number,
            ack: core.ack_number,
            payload: payload.freeze(),
        };
        core.seq_number = core.seq_number.wrapping_add(n as i32);
        core.stats.data_messages_sent += 1;
        core.stats.bytes_sent += n as u64;
        Some(msg)
    }

    /// Control messages are queued, or unsent bytes wait in a sending state.
    pub fn has_outbound(&self) -> bool {
        if !self.control_rx.is_empty() {
            return true;
        }
        let core = self.lock();
        core.state.sends_data() && self.send_buffer.pending_bytes() > 0
    }

    // ─── Housekeeping ───────────────────────────────────────────────────

    /// Rewind unacknowledged bytes after a silent retransmission interval,
    /// then run FIN housekeeping.
    ///
    /// Returns `true` when there is something new to transmit.
    pub fn check_resend(&self) -> bool {
        let mut core = self.lock();
        let now = Instant::now();
        let mut pending = false;

        if core.state.sends_data()
            && now.duration_since(core.ack_timestamp) > self.config.retransmit_timeout
        {
            core.ack_timestamp = now;
            let dropped = self.send_buffer.drop_offset();
            if dropped > 0 {
                core.seq_number = core.seq_number.wrapping_sub(dropped as i32);
                core.rewinds += 1;
                core.stats.retransmissions += 1;
                core.stats.bytes_retransmitted += dropped as u64;
                debug!(dropped, seq = core.seq_number, rewinds = core.rewinds, "retransmission timeout");
                if core.rewinds > self.config.max_retransmits {
                    debug!("peer unresponsive, aborting connection");
                    self.abort_locked(&mut core);
                    return false;
                }
                pending = true;
            }
        }

        pending | self.check_fin_locked(&mut core, now)
    }

    /// FIN and SYN-ACK housekeeping alone.
    pub fn check_fin(&self) -> bool {
        let mut core = self.lock();
        self.check_fin_locked(&mut core, Instant::now())
    }

    fn check_fin_locked(&self, core: &mut Core, now: Instant) -> bool {
        let timeout = self.config.retransmit_timeout;
        let expired = now.duration_since(core.control_timestamp) > timeout;

        match core.state {
            ConnectionState::CloseWait if self.send_buffer.all_sent() => {
                core.control_timestamp = now;
                core.control_retries = 0;
                self.set_state(core, ConnectionState::LastAck);
                let fin = self.fin_message(core);
                self.enqueue_control(core, fin)
            }
            ConnectionState::FinWait | ConnectionState::LastAck | ConnectionState::SynAckSent
                if expired =>
            {
                core.control_timestamp = now;
                core.control_retries += 1;
                if core.control_retries > self.config.max_control_retries {
                    self.force_close(core);
                    return false;
                }
                let msg = if core.state == ConnectionState::SynAckSent {
                    Message::SynAck {
                        seq: core.seq_number,
                        ack: core.ack_number,
                    }
                } else {
                    self.fin_message(core)
                };
                trace!(%msg, retries = core.control_retries, "control retransmission");
                self.enqueue_control(core, msg)
            }
            ConnectionState::FinWaitAck if expired => {
                core.control_timestamp = now;
                core.control_retries += 1;
                if core.control_retries > self.config.max_control_retries {
                    self.force_close(core);
                }
                false
            }
            _ => false,
        }
    }

    fn force_close(&self, core: &mut Core) {
        debug!(state = %core.state, retries = core.control_retries, "no answer from peer, forcing close");
        match core.state {
            ConnectionState::FinWait | ConnectionState::FinWaitAck => {
                self.set_state(core, ConnectionState::TimeAck);
            }
            _ => self.abort_locked(core),
        }
    }

    fn fin_message(&self, core: &Core) -> Message {
        Message::Fin {
            seq: core.seq_number,
            ack: core.ack_number,
        }
    }

    // ─── Teardown ───────────────────────────────────────────────────────

    /// Active close.
    ///
    /// Blocks until every written byte is acknowledged, sends FIN, then
    /// blocks until a terminal state is reached. Returns whether this call
    /// started the FIN handshake; `false` when the peer finished first or
    /// the connection never opened.
    pub fn fin(&self) -> Result<bool> {
        let mut core = self.lock();
        if core.state.is_opening() {
            return Ok(false);
        }
        core = self.wait_while(core, |c| {
            c.state == ConnectionState::Connected && !self.send_buffer.all_sent()
        });

        let mut initiated = false;
        if core.state == ConnectionState::Connected {
            core.control_timestamp = Instant::now();
            core.control_retries = 0;
            self.set_state(&mut core, ConnectionState::FinWait);
            let fin = self.fin_message(&core);
            self.enqueue_control(&mut core, fin);
            initiated = true;
            drop(core);
            self.wake();
            core = self.lock();
        }

        let core = self.wait_while(core, |c| !c.state.is_terminal());
        debug!(state = %core.state, initiated, "close finished");
        Ok(initiated)
    }

    /// The connection reached its end and may be reaped.
    pub fn closed(&self) -> bool {
        let core = self.lock();
        match core.state {
            ConnectionState::Closed => true,
            ConnectionState::TimeAck => core
                .linger_since
                .is_none_or(|since| since.elapsed() > self.config.linger_timeout()),
            _ => false,
        }
    }

    /// Close both rings, releasing any application thread blocked on them.
    pub fn close_buffers(&self) {
        self.send_buffer.close();
        self.recv_buffer.close();
        self.state_changed.notify_all();
    }

    /// Drop straight to `Closed` without a FIN exchange.
    pub fn abort(&self) {
        let mut core = self.lock();
        self.abort_locked(&mut core);
    }

    fn abort_locked(&self, core: &mut Core) {
        self.set_state(core, ConnectionState::Closed);
        self.close_buffers();
    }

    // ─── Application Side ───────────────────────────────────────────────

    /// Queue bytes for transmission, blocking while the send ring is full.
    ///
    /// Returns `0` once the connection has left `Connected`.
    pub fn send(&self, buf: &[u8]) -> Result<usize> {
        {
            let core = self.lock();
            if core.state.is_opening() {
                return Err(StreamError::NotConnected);
            }
            if core.state != ConnectionState::Connected {
                return Ok(0);
            }
        }
        let n = self.send_buffer.write(buf)?;
        if n > 0 {
            self.wake();
        }
        Ok(n)
    }

    /// Read received bytes, blocking while none are buffered.
    ///
    /// Returns `0` at end of stream.
    pub fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        if self.lock().state.is_opening() {
            return Err(StreamError::NotConnected);
        }
        self.recv_buffer.read(buf)
    }

    /// Bytes ready for `recv` without blocking.
    pub fn available(&self) -> usize {
        self.recv_buffer.available_bytes()
    }

    /// Block until the connection leaves the opening states or `timeout`
    /// elapses. Returns the state observed last.
    pub fn wait_established(&self, timeout: Duration) -> ConnectionState {
        let core = self.lock();
        let (core, _) = self
            .state_changed
            .wait_timeout_while(core, timeout, |c| c.state.is_opening())
            .unwrap_or_else(|e| e.into_inner());
        core.state
    }

    // ─── Introspection ──────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn seq_number(&self) -> i32 {
        self.lock().seq_number
    }

    pub fn ack_number(&self) -> i32 {
        self.lock().ack_number
    }

    pub fn other_ack(&self) -> i32 {
        self.lock().other_ack
    }

    /// Every written byte has been transmitted and acknowledged.
    pub fn all_sent(&self) -> bool {
        self.send_buffer.all_sent()
    }

    /// Bytes transmitted and not yet acknowledged.
    pub fn in_flight(&self) -> usize {
        self.send_buffer.in_flight()
    }

    /// Bytes `send` can take right now without blocking.
    pub fn send_space(&self) -> usize {
        self.send_buffer.free_space()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn stats(&self) -> ConnectionStats {
        self.lock().stats.clone()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.lock();
        f.debug_struct("Connection")
            .field("state", &core.state)
            .field("seq_number", &core.seq_number)
            .field("ack_number", &core.ack_number)
            .field("other_ack", &core.other_ack)
            .finish_non_exhaustive()
    }
}
