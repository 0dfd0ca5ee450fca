//! Transport entities.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use update_protocol::{fields, topic_for, Carrier, TopicKind};

/// Bridge event topic carrying pubsub deliveries.
pub const PUBSUB_MESSAGE_EVENT: &str = "pubsub.message";
/// Bridge event topic carrying peer feed deliveries.
pub const NETWORK_EVENT: &str = "network_event";

/// Where a message came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSource {
    /// Pubsub push.
    Gossipsub,
    /// Polled feed snapshot.
    FeedSnapshot,
    /// Subscribed peer feed.
    FeedPeer,
}

impl MessageSource {
    /// Carrier this source counts as.
    pub fn carrier(&self) -> Carrier {
        match self {
            MessageSource::Gossipsub => Carrier::Gossip,
            MessageSource::FeedSnapshot | MessageSource::FeedPeer => Carrier::Feed,
        }
    }
}

/// A normalized update message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransportMessage {
    /// Kind from the topic.
    pub kind: TopicKind,
    /// Payload, JSON text already parsed.
    pub raw: Value,
    /// Topic it arrived on or was inferred for.
    pub topic: String,
    /// Local receive time.
    pub received_at_ms: u64,
    /// Delivery source.
    pub source: MessageSource,
    /// Delivery carrier.
    pub carrier: Carrier,
}

/// Raw event from the networking runtime.
#[derive(Clone, Debug, PartialEq)]
pub struct NetworkEvent {
    /// Event topic, e.g. [`PUBSUB_MESSAGE_EVENT`].
    pub topic: String,
    /// Event body.
    pub payload: Value,
}

impl NetworkEvent {
    /// New event.
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }
}

/// Health as reported by the networking runtime.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeHealth {
    /// Native layer loaded.
    pub native_ready: bool,
    /// Node started.
    pub started: bool,
    /// Local peer id, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<String>,
    /// Last runtime error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Why connectivity is considered down.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityReason {
    /// Networking runtime unavailable.
    NativeNotReady,
    /// Runtime up, nothing reachable.
    NetworkUnreachable,
    /// Runtime up and started, no remote peers.
    NoRemotePeers,
}

impl ConnectivityReason {
    /// Wire label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectivityReason::NativeNotReady => "native_not_ready",
            ConnectivityReason::NetworkUnreachable => "network_unreachable",
            ConnectivityReason::NoRemotePeers => "no_remote_peers",
        }
    }
}

impl fmt::Display for ConnectivityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one authority poll.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollResult {
    /// Some path to the network works.
    pub connectivity_ok: bool,
    /// Connected peer count.
    pub connected_peers: usize,
    /// Feed snapshot or peer feeds produced something.
    pub authority_sync_ok: bool,
    /// Set when connectivity is down.
    pub reason: Option<ConnectivityReason>,
}

impl PollResult {
    /// Result used when no networking runtime is present.
    pub fn detached() -> Self {
        Self {
            connectivity_ok: true,
            connected_peers: 0,
            authority_sync_ok: true,
            reason: None,
        }
    }
}

/// Outcome of a manual check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualCheckResult {
    /// Some path to the network works.
    pub connectivity_ok: bool,
    /// Connected peer count.
    pub connected_peers: usize,
    /// Messages dispatched while the check ran.
    pub observed_messages: u64,
    /// Feed snapshot or peer feeds produced something.
    pub authority_sync_ok: bool,
    /// Set when connectivity is down.
    pub reason: Option<ConnectivityReason>,
}

/// Topics of one scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTopics {
    /// Manifest topic.
    pub manifest: String,
    /// Attestation topic.
    pub attestation: String,
    /// Revocation topic.
    pub revoke: String,
    /// Kill-switch topic.
    pub killswitch: String,
}

impl UpdateTopics {
    /// Topics under `prefix` for a scope.
    pub fn new(prefix: &str, channel: &str, platform: &str) -> Self {
        Self {
            manifest: topic_for(prefix, channel, platform, TopicKind::Manifest),
            attestation: topic_for(prefix, channel, platform, TopicKind::Attestation),
            revoke: topic_for(prefix, channel, platform, TopicKind::Revoke),
            killswitch: topic_for(prefix, channel, platform, TopicKind::KillSwitch),
        }
    }

    /// Topic for `kind`.
    pub fn get(&self, kind: TopicKind) -> &str {
        match kind {
            TopicKind::Manifest => &self.manifest,
            TopicKind::Attestation => &self.attestation,
            TopicKind::Revoke => &self.revoke,
            TopicKind::KillSwitch => &self.killswitch,
        }
    }

    /// All four topics.
    pub fn all(&self) -> [&str; 4] {
        [&self.manifest, &self.attestation, &self.revoke, &self.killswitch]
    }
}

/// A peer returned by discovery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveredPeer {
    /// Peer id.
    pub peer_id: String,
    /// Dial hints.
    pub addresses: Vec<String>,
}

impl DiscoveredPeer {
    /// Read `{peerId|peer_id, multiaddrs|addresses}`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let row = value.as_object()?;
        let peer_id = fields::text_strict(row, &["peerId", "peer_id"])?;
        let addresses = fields::string_list(fields::first(row, &["multiaddrs", "addresses"]));
        Some(Self { peer_id, addresses })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_carrier() {
        assert_eq!(MessageSource::Gossipsub.carrier(), Carrier::Gossip);
        assert_eq!(MessageSource::FeedSnapshot.carrier(), Carrier::Feed);
        assert_eq!(MessageSource::FeedPeer.carrier(), Carrier::Feed);
    }

    #[test]
    fn test_topics() {
        let topics = UpdateTopics::new("/updates/v2", "stable", "android");
        assert_eq!(topics.manifest, "/updates/v2/stable/android/manifest");
        assert_eq!(topics.get(TopicKind::KillSwitch), "/updates/v2/stable/android/killswitch");
        assert_eq!(topics.all().len(), 4);
    }

    #[test]
    fn test_discovered_peer() {
        let peer = DiscoveredPeer::from_value(&json!({"peer_id": " 12D3 ", "multiaddrs": ["/ip4/1.2.3.4/tcp/1", ""]}))
            .unwrap();
        assert_eq!(peer.peer_id, "12D3");
        assert_eq!(peer.addresses, vec!["/ip4/1.2.3.4/tcp/1".to_string()]);
        assert!(DiscoveredPeer::from_value(&json!({"addresses": []})).is_none());
    }

    #[test]
    fn test_reason_labels() {
        assert_eq!(ConnectivityReason::NoRemotePeers.to_string(), "no_remote_peers");
        assert_eq!(
            serde_json::to_value(ConnectivityReason::NativeNotReady).unwrap(),
            json!("native_not_ready")
        );
    }
}
