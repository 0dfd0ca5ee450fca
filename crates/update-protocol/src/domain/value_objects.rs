//! # Value Objects
//!
//! Small immutable types shared by every update crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Channel used when a message omits one.
pub const DEFAULT_CHANNEL: &str = "stable";

/// Platform used when a message omits one.
pub const DEFAULT_PLATFORM: &str = "android";

/// Hash and output of an empty chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Largest sequence a chain entry may carry. Every value up to it survives a
/// round trip through a JSON number.
pub const MAX_SEQUENCE: u64 = 9_007_199_254_740_991;

/// Milliseconds since the Unix epoch.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A `(channel, platform)` pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    /// Release channel.
    pub channel: String,
    /// Target platform.
    pub platform: String,
}

impl Scope {
    /// Create a scope; blank parts fall back to the defaults.
    pub fn new(channel: &str, platform: &str) -> Self {
        let pick = |value: &str, fallback: &str| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                fallback.to_string()
            } else {
                trimmed.to_string()
            }
        };
        Self {
            channel: pick(channel, DEFAULT_CHANNEL),
            platform: pick(platform, DEFAULT_PLATFORM),
        }
    }

    /// Map key: `lower(channel)|lower(platform)`.
    pub fn key(&self) -> String {
        scope_key(&self.channel, &self.platform)
    }

    /// Case-insensitive match.
    pub fn matches(&self, channel: &str, platform: &str) -> bool {
        self.key() == scope_key(channel, platform)
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL, DEFAULT_PLATFORM)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.channel, self.platform)
    }
}

/// Map key for a scope.
pub fn scope_key(channel: &str, platform: &str) -> String {
    format!(
        "{}|{}",
        channel.trim().to_lowercase(),
        platform.trim().to_lowercase()
    )
}

/// Delivery path of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Carrier {
    /// Pushed pubsub message.
    Gossip,
    /// Pulled feed entry.
    Feed,
}

impl Carrier {
    /// Wire label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Carrier::Gossip => "gossip",
            Carrier::Feed => "feed",
        }
    }

    /// Parse a label.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "gossip" | "gossipsub" => Some(Carrier::Gossip),
            "feed" => Some(Carrier::Feed),
            _ => None,
        }
    }
}

impl fmt::Display for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_key_is_case_insensitive() {
        let scope = Scope::new(" Stable ", "ANDROID");
        assert_eq!(scope.key(), "stable|android");
        assert!(scope.matches("STABLE", "android"));
        assert_eq!(Scope::new("", "").key(), Scope::default().key());
    }

    #[test]
    fn test_carrier_labels() {
        assert_eq!(Carrier::parse("gossipsub"), Some(Carrier::Gossip));
        assert_eq!(Carrier::parse("Feed"), Some(Carrier::Feed));
        assert_eq!(Carrier::parse("mail"), None);
        assert_eq!(serde_json::to_string(&Carrier::Feed).unwrap(), "\"feed\"");
    }

    #[test]
    fn test_genesis_hash_shape() {
        assert!(update_crypto::is_sha256_hex(GENESIS_HASH));
    }
}
