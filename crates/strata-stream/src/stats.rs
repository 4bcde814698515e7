//! # Stream Statistics
//!
//! Per-connection and per-engine counters. Snapshots serialize to JSON for
//! logging and diagnostics.

use serde::Serialize;

// ─── Connection Stats ───────────────────────────────────────────────────────

/// Counters kept by a single connection's state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    /// DATA messages produced for transmission (including resends).
    pub data_messages_sent: u64,
    /// Payload bytes produced for transmission (including resends).
    pub bytes_sent: u64,
    /// Payload bytes confirmed by the peer.
    pub bytes_acked: u64,
    /// Payload bytes accepted into the receive buffer.
    pub bytes_received: u64,
    /// Retransmission timeouts that rewound in-flight bytes.
    pub retransmissions: u64,
    /// Bytes rewound for retransmission.
    pub bytes_retransmitted: u64,
    /// DATA messages already applied (answered with a fresh ACK).
    pub duplicates: u64,
    /// DATA messages ahead of the expected sequence number (dropped).
    pub out_of_window: u64,
    /// ACKs that did not move past the highest confirmed byte.
    pub stale_acks: u64,
    /// Control messages dropped because the control queue was full.
    pub control_overflows: u64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share of transmitted bytes that were resends.
    pub fn retransmit_ratio(&self) -> f64 {
        if self.bytes_sent == 0 {
            0.0
        } else {
            self.bytes_retransmitted as f64 / self.bytes_sent as f64
        }
    }
}

// ─── Engine Stats ───────────────────────────────────────────────────────────

/// Counters kept by an engine's worker threads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub datagrams_sent: u64,
    pub datagrams_received: u64,
    /// Datagrams that failed to decode.
    pub malformed: u64,
    /// Datagrams from addresses with no connection (and not an accepted SYN).
    pub unknown_peer: u64,
    /// Transient socket send failures that were retried.
    pub send_retries: u64,
    /// Connections removed after reaching their terminal state.
    pub connections_reaped: u64,
}
