//! # Engine Configuration
//!
//! Tunables shared by the client and server engines. [`StreamConfig`] holds
//! resolved values; [`StreamConfigInput`] is the permissive TOML shape that
//! resolves onto the defaults.
//!
//! ```toml
//! version = 1
//! max_payload_size = 450
//! buffer_capacity = 65536
//! retransmit_timeout_ms = 200
//! connect_timeout_ms = 10000
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, StreamError};
use crate::wire::MAX_PAYLOAD_SIZE;

pub const CONFIG_VERSION: u32 = 1;

/// Resolved engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Bytes carried by a single DATA message (1..=`MAX_PAYLOAD_SIZE`).
    pub max_payload_size: usize,
    /// Capacity of each connection's send and receive ring.
    pub buffer_capacity: usize,
    /// Silence after which unacknowledged bytes are rewound and resent.
    /// Also the socket poll interval and housekeeping tick.
    pub retransmit_timeout: Duration,
    /// Bound on the client handshake loop.
    pub connect_timeout: Duration,
    /// Pending control messages (ACK, SYN-ACK, FIN) per connection.
    pub control_queue_capacity: usize,
    /// Server work queue of peers that need their outbound side drained.
    pub work_queue_capacity: usize,
    /// Server queue of established, not yet accepted connections.
    pub accept_queue_capacity: usize,
    /// Unanswered FIN or SYN-ACK retransmissions before the connection is
    /// forced to its terminal state.
    pub max_control_retries: u32,
    /// Consecutive data rewinds without forward progress before the
    /// connection is aborted.
    pub max_retransmits: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            max_payload_size: MAX_PAYLOAD_SIZE,
            buffer_capacity: 64 * 1024,
            retransmit_timeout: Duration::from_millis(200),
            connect_timeout: Duration::from_secs(10),
            control_queue_capacity: 50,
            work_queue_capacity: 64,
            accept_queue_capacity: 16,
            max_control_retries: 10,
            max_retransmits: 50,
        }
    }
}

impl StreamConfig {
    /// Parse a TOML document. An empty document yields the defaults.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        if input.trim().is_empty() {
            return Ok(StreamConfig::default());
        }
        let parsed: StreamConfigInput = toml::from_str(input)
            .map_err(|e| StreamError::Config(format!("Invalid config TOML: {}", e)))?;
        parsed.resolve()
    }

    /// Clamp every field into its usable range.
    pub fn normalized(mut self) -> Self {
        self.max_payload_size = self.max_payload_size.clamp(1, MAX_PAYLOAD_SIZE);
        self.buffer_capacity = self.buffer_capacity.max(1);
        self.retransmit_timeout = self.retransmit_timeout.max(Duration::from_millis(1));
        self.control_queue_capacity = self.control_queue_capacity.max(4);
        self.work_queue_capacity = self.work_queue_capacity.max(1);
        self.accept_queue_capacity = self.accept_queue_capacity.max(1);
        self.max_control_retries = self.max_control_retries.max(1);
        self.max_retransmits = self.max_retransmits.max(1);
        self
    }

    /// How long a connection lingers in `TimeAck` before it is reaped.
    pub fn linger_timeout(&self) -> Duration {
        self.retransmit_timeout * 2
    }
}

/// TOML input shape. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StreamConfigInput {
    pub version: u32,
    pub max_payload_size: Option<usize>,
    pub buffer_capacity: Option<usize>,
    pub retransmit_timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub control_queue_capacity: Option<usize>,
    pub work_queue_capacity: Option<usize>,
    pub accept_queue_capacity: Option<usize>,
    pub max_control_retries: Option<u32>,
    pub max_retransmits: Option<u32>,
}

impl StreamConfigInput {
    pub fn resolve(self) -> Result<StreamConfig> {
        let version = if self.version == 0 {
            CONFIG_VERSION
        } else {
            self.version
        };
        if version != CONFIG_VERSION {
            return Err(StreamError::Config(format!(
                "Unsupported config version {}",
                version
            )));
        }

        let defaults = StreamConfig::default();
        let config = StreamConfig {
            max_payload_size: self.max_payload_size.unwrap_or(defaults.max_payload_size),
            buffer_capacity: self.buffer_capacity.unwrap_or(defaults.buffer_capacity),
            retransmit_timeout: self
                .retransmit_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.retransmit_timeout),
            connect_timeout: self
                .connect_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.connect_timeout),
            control_queue_capacity: self
                .control_queue_capacity
                .unwrap_or(defaults.control_queue_capacity),
            work_queue_capacity: self
                .work_queue_capacity
                .unwrap_or(defaults.work_queue_capacity),
            accept_queue_capacity: self
                .accept_queue_capacity
                .unwrap_or(defaults.accept_queue_capacity),
            max_control_retries: self
                .max_control_retries
                .unwrap_or(defaults.max_control_retries),
            max_retransmits: self.max_retransmits.unwrap_or(defaults.max_retransmits),
        };

        Ok(config.normalized())
    }
}
