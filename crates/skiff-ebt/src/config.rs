//! Session engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for EBT sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EbtConfig {
    /// Verify failures tolerated from one peer before the session is
    /// closed. Single bad messages are dropped and counted.
    pub verify_failure_limit: u32,

    /// Capacity of the outbound frame channel. Feed tasks block on a
    /// full channel, so this bounds per-session buffering.
    pub outbound_buffer: usize,

    /// How long teardown waits for the writer to flush before giving up.
    pub drain_timeout: Duration,
}

impl Default for EbtConfig {
    fn default() -> Self {
        Self {
            verify_failure_limit: 10,
            outbound_buffer: 32,
            drain_timeout: Duration::from_secs(5),
        }
    }
}
