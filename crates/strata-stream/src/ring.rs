//! # Flow-Controlled Ring Buffers
//!
//! Fixed-capacity circular byte buffers guarded by a mutex and a condition
//! variable. Two specialisations share one core:
//!
//! - [`RecvRingBuffer`]: written by the engine (never blocks, short writes
//!   when full), read by the application (blocks while empty).
//! - [`SendRingBuffer`]: written by the application (blocks while full),
//!   read by the engine (never blocks). Bytes that were read out for
//!   transmission stay in the ring as the in-flight region until the peer
//!   confirms them, and can be rewound for retransmission.
//!
//! ```text
//!            in flight        unsent               free
//!        |<------------>|<------------->|<------------------------>|
//!   ... [ begin-inflight , begin        , begin+unsent             ] ...
//! ```
//!
//! Closing a buffer wakes every waiter; from then on blocking predicates are
//! bypassed and calls that cannot make progress return `0`.

use std::sync::{Condvar, Mutex, MutexGuard};

use crate::error::{Result, StreamError};

// ─── Core ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct RingState {
    buf: Box<[u8]>,
    /// Read cursor.
    begin: usize,
    /// Bytes written and not yet read.
    unread: usize,
    /// Bytes read out but not yet confirmed (send side only).
    in_flight: usize,
    closing: bool,
}

impl RingState {
    fn capacity(&self) -> usize {
        self.buf.len()
    }

    fn free_space(&self) -> usize {
        self.capacity() - self.unread - self.in_flight
    }

    fn copy_in(&mut self, src: &[u8]) -> usize {
        let cap = self.capacity();
        let n = src.len().min(self.free_space());
        let start = (self.begin + self.unread) % cap;
        let first = n.min(cap - start);
        self.buf[start..start + first].copy_from_slice(&src[..first]);
        self.buf[..n - first].copy_from_slice(&src[first..n]);
        self.unread += n;
        n
    }

    fn copy_out(&mut self, dst: &mut [u8]) -> usize {
        let cap = self.capacity();
        let n = dst.len().min(self.unread);
        let first = n.min(cap - self.begin);
        dst[..first].copy_from_slice(&self.buf[self.begin..self.begin + first]);
        dst[first..n].copy_from_slice(&self.buf[..n - first]);
        self.begin = (self.begin + n) % cap;
        self.unread -= n;
        n
    }
}

#[derive(Debug)]
struct Ring {
    state: Mutex<RingState>,
    cond: Condvar,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        Ring {
            state: Mutex::new(RingState {
                buf: vec![0u8; capacity.max(1)].into_boxed_slice(),
                begin: 0,
                unread: 0,
                in_flight: 0,
                closing: false,
            }),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RingState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wait_while<'a>(
        &self,
        guard: MutexGuard<'a, RingState>,
        condition: impl FnMut(&mut RingState) -> bool,
    ) -> MutexGuard<'a, RingState> {
        self.cond
            .wait_while(guard, condition)
            .unwrap_or_else(|e| e.into_inner())
    }

    fn close(&self) {
        self.lock().closing = true;
        self.cond.notify_all();
    }
}

fn validate(len: usize) -> Result<()> {
    if len < 1 {
        return Err(StreamError::InvalidLength);
    }
    Ok(())
}

// ─── Receive Buffer ──────────────────────────────────────────────────────────

/// Receive-side ring: the engine writes decoded payload, the application reads.
#[derive(Debug)]
pub struct RecvRingBuffer {
    ring: Ring,
}

impl RecvRingBuffer {
    pub fn new(capacity: usize) -> Self {
        RecvRingBuffer {
            ring: Ring::new(capacity),
        }
    }

    /// Copy in as much of `src` as fits. Never blocks.
    pub fn write(&self, src: &[u8]) -> Result<usize> {
        validate(src.len())?;
        let mut state = self.ring.lock();
        if state.closing {
            return Ok(0);
        }
        let n = state.copy_in(src);
        drop(state);
        if n > 0 {
            self.ring.cond.notify_all();
        }
        Ok(n)
    }

    /// Block until bytes are available or the buffer is closed.
    ///
    /// Returns `0` only once the buffer is closed and drained.
    pub fn read(&self, dst: &mut [u8]) -> Result<usize> {
        validate(dst.len())?;
        let state = self.ring.lock();
        let mut state = self
            .ring
            .wait_while(state, |s| s.unread == 0 && !s.closing);
        Ok(state.copy_out(dst))
    }

    pub fn close(&self) {
        self.ring.close();
    }

    pub fn is_closed(&self) -> bool {
        self.ring.lock().closing
    }

    pub fn available_bytes(&self) -> usize {
        self.ring.lock().unread
    }

    pub fn free_space(&self) -> usize {
        self.ring.lock().free_space()
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().capacity()
    }
}

// ─── Send Buffer ─────────────────────────────────────────────────────────────

/// Send-side ring with an in-flight (sent, unacknowledged) region.
#[derive(Debug)]
pub struct SendRingBuffer {
    ring: Ring,
}

impl SendRingBuffer {
    pub fn new(capacity: usize) -> Self {
        SendRingBuffer {
            ring: Ring::new(capacity),
        }
    }

    /// Block until there is free space, then copy in as much of `src` as fits.
    ///
    /// In-flight bytes count against capacity. Returns `0` without copying
    /// once the buffer is closed.
    pub fn write(&self, src: &[u8]) -> Result<usize> {
        validate(src.len())?;
        let state = self.ring.lock();
        let mut state = self
            .ring
            .wait_while(state, |s| s.free_space() == 0 && !s.closing);
        if state.closing {
            return Ok(0);
        }
        let n = state.copy_in(src);
        drop(state);
        self.ring.cond.notify_all();
        Ok(n)
    }

    /// Drain unsent bytes for transmission. Never blocks.
    ///
    /// Bytes read here move into the in-flight region.
    pub fn read(&self, dst: &mut [u8]) -> Result<usize> {
        validate(dst.len())?;
        let mut state = self.ring.lock();
        if state.closing {
            return Ok(0);
        }
        let n = state.copy_out(dst);
        state.in_flight += n;
        Ok(n)
    }

    /// Release `n` in-flight bytes confirmed by the peer.
    pub fn confirm_read(&self, n: usize) {
        let mut state = self.ring.lock();
        state.in_flight = state.in_flight.saturating_sub(n);
        drop(state);
        self.ring.cond.notify_all();
    }

    /// Rewind the read cursor over the in-flight region so it is sent again.
    ///
    /// Returns the number of bytes rewound.
    pub fn drop_offset(&self) -> usize {
        let mut state = self.ring.lock();
        let dropped = state.in_flight;
        let cap = state.capacity();
        state.begin = (state.begin + cap - dropped) % cap;
        state.unread += dropped;
        state.in_flight = 0;
        drop(state);
        self.ring.cond.notify_all();
        dropped
    }

    /// Nothing left to send and nothing awaiting confirmation.
    pub fn all_sent(&self) -> bool {
        let state = self.ring.lock();
        state.unread == 0 && state.in_flight == 0
    }

    pub fn close(&self) {
        self.ring.close();
    }

    pub fn is_closed(&self) -> bool {
        self.ring.lock().closing
    }

    /// Every byte the ring holds: unsent plus in flight.
    pub fn available_bytes(&self) -> usize {
        let state = self.ring.lock();
        state.unread + state.in_flight
    }

    /// Bytes written by the application and not yet transmitted.
    pub fn pending_bytes(&self) -> usize {
        self.ring.lock().unread
    }

    /// Bytes transmitted but not yet confirmed.
    pub fn in_flight(&self) -> usize {
        self.ring.lock().in_flight
    }

    pub fn free_space(&self) -> usize {
        self.ring.lock().free_space()
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().capacity()
    }
}
