//! Transport configuration.

use serde::{Deserialize, Serialize};
use update_protocol::{DEFAULT_CHANNEL, DEFAULT_PLATFORM, DEFAULT_TOPIC_PREFIX};

/// Transport configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Topic prefix.
    pub topic_prefix: String,
    /// Release channel.
    pub channel: String,
    /// Target platform.
    pub platform: String,
    /// Poll interval while in the foreground.
    pub foreground_poll_ms: u64,
    /// Poll interval while in the background.
    pub background_poll_ms: u64,
    /// Lower bound on any poll interval.
    pub min_poll_ms: u64,
    /// Rendezvous registration TTL.
    pub rendezvous_ttl_ms: u64,
    /// Peers requested per rendezvous discovery.
    pub rendezvous_discover_limit: usize,
    /// Rendezvous namespace of update authorities. Empty means
    /// `updates/v2/{channel}/{platform}`.
    pub authority_namespace: String,
    /// Extra namespaces searched for peers.
    pub fallback_namespaces: Vec<String>,
    /// Peers joined through random bootstrap on a strict check.
    pub bootstrap_join_limit: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            channel: DEFAULT_CHANNEL.to_string(),
            platform: DEFAULT_PLATFORM.to_string(),
            foreground_poll_ms: 60_000,
            background_poll_ms: 300_000,
            min_poll_ms: 1_000,
            rendezvous_ttl_ms: 300_000,
            rendezvous_discover_limit: 64,
            authority_namespace: String::new(),
            fallback_namespaces: vec!["nodes/v1".to_string()],
            bootstrap_join_limit: 3,
        }
    }
}

impl TransportConfig {
    /// Short intervals for tests.
    pub fn for_testing() -> Self {
        Self {
            foreground_poll_ms: 1_000,
            background_poll_ms: 2_000,
            ..Self::default()
        }
    }

    /// Config for a scope, other fields default.
    pub fn for_scope(channel: &str, platform: &str) -> Self {
        Self {
            channel: channel.to_string(),
            platform: platform.to_string(),
            ..Self::default()
        }
    }

    /// Trimmed channel, default when blank.
    pub fn resolved_channel(&self) -> String {
        let channel = self.channel.trim();
        if channel.is_empty() {
            DEFAULT_CHANNEL.to_string()
        } else {
            channel.to_string()
        }
    }

    /// Trimmed platform, default when blank.
    pub fn resolved_platform(&self) -> String {
        let platform = self.platform.trim();
        if platform.is_empty() {
            DEFAULT_PLATFORM.to_string()
        } else {
            platform.to_string()
        }
    }

    /// Authority namespace with the scope default applied.
    pub fn resolved_authority_namespace(&self) -> String {
        let configured = self.authority_namespace.trim();
        if configured.is_empty() {
            format!("updates/v2/{}/{}", self.resolved_channel(), self.resolved_platform())
        } else {
            configured.to_string()
        }
    }

    /// Poll delay for the current visibility.
    pub fn poll_delay_ms(&self, foreground: bool) -> u64 {
        let base = if foreground {
            self.foreground_poll_ms
        } else {
            self.background_poll_ms
        };
        base.max(self.min_poll_ms)
    }
}
