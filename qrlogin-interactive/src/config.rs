//! Configuration for the login orchestrator.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Login orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginConfig {
    /// Give up on a silent partner after this many seconds. `None` waits as
    /// long as the transport does.
    #[serde(default)]
    pub receive_timeout_secs: Option<u64>,

    /// Display name registered for the new device during token login.
    #[serde(default)]
    pub device_display_name: Option<String>,

    /// Buffered events per subscriber before slow subscribers start lagging.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_event_capacity() -> usize {
    64
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            receive_timeout_secs: None,
            device_display_name: None,
            event_capacity: default_event_capacity(),
        }
    }
}

impl LoginConfig {
    pub fn with_receive_timeout(mut self, secs: u64) -> Self {
        self.receive_timeout_secs = Some(secs);
        self
    }

    pub fn with_device_display_name(mut self, name: impl Into<String>) -> Self {
        self.device_display_name = Some(name.into());
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn receive_timeout(&self) -> Option<Duration> {
        self.receive_timeout_secs.map(Duration::from_secs)
    }
}
