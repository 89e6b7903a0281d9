//! Configuration types for the rendezvous layer.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the rendezvous transport and service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RendezvousConfig {
    /// Delay between polls while the relay reports "not modified".
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl RendezvousConfig {
    /// Set the poll interval.
    pub fn with_poll_interval_ms(mut self, millis: u64) -> Self {
        self.poll_interval_ms = millis;
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
