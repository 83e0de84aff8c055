use crate::common::constants::{
    DEFAULT_BACKLOG, DEFAULT_DISPATCH_TIMEOUT_MS, DEFAULT_LOG_LEVEL, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_QUEUE_CAPACITY,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Listener configuration, usually loaded from a TOML file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ListenerConfig {
    /// Address to listen on, in `host:port` form
    pub address: String,

    /// Pending-connection queue length passed to listen(2)
    #[serde(default = "default_backlog")]
    pub backlog: u32,

    /// Upper bound on how long one accept wait may block
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Capacity of the hand-off queue when connections go through a channel
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// How long a full hand-off queue may stall the accept loop
    #[serde(default = "default_dispatch_timeout_ms")]
    pub dispatch_timeout_ms: u64,

    /// Maximum tracing level (`error`, `warn`, `info`, `debug`, `trace`)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_backlog() -> u32 {
    DEFAULT_BACKLOG
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_dispatch_timeout_ms() -> u64 {
    DEFAULT_DISPATCH_TIMEOUT_MS
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl ListenerConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            backlog: DEFAULT_BACKLOG,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            dispatch_timeout_ms: DEFAULT_DISPATCH_TIMEOUT_MS,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }
}
