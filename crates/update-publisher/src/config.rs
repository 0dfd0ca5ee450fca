//! Publisher configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use update_protocol::DEFAULT_TOPIC_PREFIX;

/// Attempts and linear backoff for one carrier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts per carrier, at least one.
    pub max_attempts: u32,
    /// Base delay; attempt `n` waits `backoff_ms * (n + 1)`.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 120,
        }
    }
}

impl RetryPolicy {
    /// Attempts to make.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay after the failed attempt `attempt` (zero based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt) + 1))
    }
}

/// Publisher configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Publishing allowed on this node.
    pub enabled: bool,
    /// Wire topic prefix.
    pub topic_prefix: String,
    /// Default manifest envelope lifetime.
    pub manifest_expiry_ms: u64,
    /// Default revocation / kill-switch envelope lifetime.
    pub control_expiry_ms: u64,
    /// Shortest lifetime an envelope may be given.
    pub min_expiry_ms: u64,
    /// Publisher id used when the network has no local peer id.
    pub fallback_peer_id: String,
    /// Per-carrier retries.
    pub retry: RetryPolicy,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            manifest_expiry_ms: 300_000,
            control_expiry_ms: 120_000,
            min_expiry_ms: 30_000,
            fallback_peer_id: "local-node".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl PublisherConfig {
    /// Enabled, with millisecond backoff.
    pub fn for_testing() -> Self {
        Self {
            enabled: true,
            retry: RetryPolicy {
                max_attempts: 3,
                backoff_ms: 1,
            },
            ..Self::default()
        }
    }

    /// Envelope lifetime for a request, floored at `min_expiry_ms`.
    pub fn expiry_ms(&self, requested: Option<u64>, default_ms: u64) -> u64 {
        requested.unwrap_or(default_ms).max(self.min_expiry_ms)
    }
}
