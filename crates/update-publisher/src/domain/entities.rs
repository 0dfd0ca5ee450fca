//! Publisher entities.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use update_crypto::Ed25519KeyPair;
use update_protocol::{Envelope, SealedEntry, TopicKind};

/// Outcome of one publish.
///
/// `ok` follows gossip alone. A feed failure is reported in `feed_ok` and
/// `error` but does not fail the publish.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResult {
    /// Gossip accepted the message.
    pub ok: bool,
    /// Gossip carrier result.
    pub pubsub_ok: bool,
    /// Feed carrier result.
    pub feed_ok: bool,
    /// Topic published on.
    pub topic: String,
    /// Normalized failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PublishResult {
    /// Nothing left the node.
    pub fn not_sent(topic: &str, error: String) -> Self {
        Self {
            ok: false,
            pubsub_ok: false,
            feed_ok: false,
            topic: topic.to_string(),
            error: Some(error),
        }
    }
}

/// Publisher key as persisted by a key store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredKey {
    /// Ed25519 public key, hex.
    pub public_key_hex: String,
    /// Ed25519 seed (or seed + public key), hex.
    pub private_key_hex: String,
}

impl StoredKey {
    /// Key material of `keypair`.
    pub fn from_keypair(keypair: &Ed25519KeyPair) -> Self {
        Self {
            public_key_hex: keypair.public_key().to_hex(),
            private_key_hex: keypair.to_secret_hex(),
        }
    }

    /// Both halves present.
    pub fn is_complete(&self) -> bool {
        !self.public_key_hex.trim().is_empty() && !self.private_key_hex.trim().is_empty()
    }
}

impl fmt::Debug for StoredKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredKey")
            .field("public_key_hex", &self.public_key_hex)
            .field("private_key_hex", &"<redacted>")
            .finish()
    }
}

/// Per-call overrides.
#[derive(Clone, Debug, Default)]
pub struct PublishOptions {
    /// Target channel, else the message's own.
    pub channel: Option<String>,
    /// Target platform, else the message's own.
    pub platform: Option<String>,
    /// Envelope lifetime, else the configured default.
    pub expires_in_ms: Option<u64>,
}

impl PublishOptions {
    /// Options targeting a scope.
    pub fn for_scope(channel: &str, platform: &str) -> Self {
        Self {
            channel: Some(channel.to_string()),
            platform: Some(platform.to_string()),
            expires_in_ms: None,
        }
    }
}

/// A sealed chain entry ready for both carriers.
///
/// Each carrier gets its own envelope so the two copies never share a nonce.
#[derive(Clone, Debug)]
pub struct PreparedMessage {
    /// Message kind.
    pub kind: TopicKind,
    /// Scope channel.
    pub channel: String,
    /// Scope platform.
    pub platform: String,
    /// Wire topic.
    pub topic: String,
    /// Sealed payload.
    pub payload: Map<String, Value>,
    /// Chain position consumed.
    pub sealed: SealedEntry,
    /// Envelope for gossip.
    pub gossip: Envelope,
    /// Envelope for the feed.
    pub feed: Envelope,
}

/// Result of retrying one carrier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CarrierOutcome {
    /// Carrier accepted the message.
    pub ok: bool,
    /// Last meaningful error when it did not.
    pub last_error: Option<String>,
}

impl CarrierOutcome {
    /// Accepted.
    pub fn delivered() -> Self {
        Self {
            ok: true,
            last_error: None,
        }
    }

    /// Rejected with `error`.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            last_error: Some(error.into()),
        }
    }
}
