//! # Outbound Port
//!
//! The P2P networking runtime: pubsub, rendezvous discovery, peer feeds and
//! the raw event stream. Every call is best effort; callers treat errors as
//! "not this time".

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::domain::{NetworkEvent, RuntimeHealth, TransportError, TransportResult, PUBSUB_MESSAGE_EVENT};

/// P2P networking runtime.
#[async_trait]
pub trait P2pNetwork: Send + Sync {
    /// A networking runtime exists on this host at all.
    fn is_available(&self) -> bool;

    /// Raw event stream.
    fn events(&self) -> broadcast::Receiver<NetworkEvent>;

    /// Start the node if needed. `true` once running.
    async fn ensure_started(&self) -> TransportResult<bool>;

    /// Nudge local discovery (mDNS and similar).
    async fn warm_discovery(&self) -> TransportResult<()>;

    /// Currently connected peers.
    async fn connected_peers(&self) -> TransportResult<Vec<String>>;

    /// Dial up to `limit` random bootstrap peers.
    async fn join_via_random_bootstrap(&self, limit: usize) -> TransportResult<()>;

    /// Local peer id.
    async fn local_peer_id(&self) -> TransportResult<String>;

    /// Runtime health.
    async fn runtime_health(&self) -> TransportResult<RuntimeHealth>;

    /// Bootstrap status document.
    async fn bootstrap_status(&self) -> TransportResult<Value>;

    /// Last runtime error text.
    async fn last_error(&self) -> TransportResult<String>;

    /// Join a pubsub topic.
    async fn pubsub_subscribe(&self, topic: &str) -> TransportResult<bool>;

    /// Leave a pubsub topic.
    async fn pubsub_unsubscribe(&self, topic: &str) -> TransportResult<bool>;

    /// Publish wire text on a topic.
    async fn pubsub_publish(&self, topic: &str, payload: &str) -> TransportResult<bool>;

    /// Register under a rendezvous namespace.
    async fn rendezvous_advertise(&self, namespace: &str, ttl_ms: u64) -> TransportResult<bool>;

    /// Peers registered under a namespace, as raw rows.
    async fn rendezvous_discover(&self, namespace: &str, limit: usize) -> TransportResult<Vec<Value>>;

    /// Peers found by live discovery, as raw rows.
    async fn list_discovered_peers(&self, limit: usize) -> TransportResult<Vec<Value>>;

    /// Remember dial hints for a peer.
    async fn register_peer_hints(&self, peer_id: &str, addresses: &[String]) -> TransportResult<bool>;

    /// Dial a peer, optionally at a specific address.
    async fn connect_peer(&self, peer_id: &str, address: Option<&str>) -> TransportResult<bool>;

    /// Current feed snapshot, `{items: [...]}`.
    async fn fetch_feed_snapshot(&self) -> TransportResult<Value>;

    /// Follow a peer's feed.
    async fn feed_subscribe_peer(&self, peer_id: &str) -> TransportResult<bool>;

    /// Stop following a peer's feed.
    async fn feed_unsubscribe_peer(&self, peer_id: &str) -> TransportResult<bool>;

    /// Append an entry to the local feed.
    async fn feed_publish_entry(&self, entry: &Value) -> TransportResult<bool>;
}

// =============================================================================
// Mock Implementation for Testing
// =============================================================================

/// Observable state of [`MockP2pNetwork`].
#[derive(Clone, Debug)]
pub struct MockNetworkState {
    /// Runtime present.
    pub available: bool,
    /// Reported health.
    pub health: RuntimeHealth,
    /// Local peer id.
    pub local_peer_id: String,
    /// Connected peers.
    pub connected_peers: Vec<String>,
    /// Peers that become connected after a bootstrap join.
    pub bootstrap_peers: Vec<String>,
    /// Bootstrap status document.
    pub bootstrap_status: Value,
    /// Feed snapshot served to pollers.
    pub feed_snapshot: Value,
    /// Rendezvous registrations by namespace.
    pub rendezvous: HashMap<String, Vec<Value>>,
    /// Live discovery rows.
    pub discovered_peers: Vec<Value>,
    /// Joined topics.
    pub subscribed_topics: BTreeSet<String>,
    /// Advertised namespaces, in call order.
    pub advertised: Vec<String>,
    /// Followed peer feeds.
    pub feed_peers: BTreeSet<String>,
    /// Dialed peers, in call order.
    pub dialed: Vec<String>,
    /// Pubsub publishes `(topic, wire)`.
    pub published: Vec<(String, String)>,
    /// Feed entries published locally.
    pub feed_entries: Vec<Value>,
    /// Upcoming pubsub publishes that fail.
    pub pubsub_failures: u32,
    /// Upcoming feed publishes that fail.
    pub feed_failures: u32,
    /// Reported last error.
    pub last_error: String,
    /// Publishes are delivered back as events / snapshot items.
    pub loopback: bool,
    /// Every async call errors.
    pub should_fail: bool,
    /// Bootstrap joins requested.
    pub bootstrap_joins: usize,
    /// Discovery warmups requested.
    pub warmups: usize,
}

impl Default for MockNetworkState {
    fn default() -> Self {
        Self {
            available: true,
            health: RuntimeHealth {
                native_ready: true,
                started: true,
                peer_id: Some("local-peer".to_string()),
                last_error: None,
            },
            local_peer_id: "local-peer".to_string(),
            connected_peers: vec!["remote-peer".to_string()],
            bootstrap_peers: Vec::new(),
            bootstrap_status: json!({}),
            feed_snapshot: json!({ "items": [] }),
            rendezvous: HashMap::new(),
            discovered_peers: Vec::new(),
            subscribed_topics: BTreeSet::new(),
            advertised: Vec::new(),
            feed_peers: BTreeSet::new(),
            dialed: Vec::new(),
            published: Vec::new(),
            feed_entries: Vec::new(),
            pubsub_failures: 0,
            feed_failures: 0,
            last_error: String::new(),
            loopback: false,
            should_fail: false,
            bootstrap_joins: 0,
            warmups: 0,
        }
    }
}

/// In-memory network for tests.
pub struct MockP2pNetwork {
    state: Mutex<MockNetworkState>,
    events: broadcast::Sender<NetworkEvent>,
}

impl Default for MockP2pNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MockP2pNetwork {
    /// Started node with one connected peer.
    pub fn new() -> Self {
        Self::with_state(MockNetworkState::default())
    }

    /// Network with the given state.
    pub fn with_state(state: MockNetworkState) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            state: Mutex::new(state),
            events,
        }
    }

    /// Host without a networking runtime.
    pub fn unavailable() -> Self {
        Self::with_state(MockNetworkState {
            available: false,
            ..MockNetworkState::default()
        })
    }

    /// Runtime present but its native layer never loaded.
    pub fn not_ready() -> Self {
        Self::with_state(MockNetworkState {
            health: RuntimeHealth::default(),
            local_peer_id: String::new(),
            connected_peers: Vec::new(),
            ..MockNetworkState::default()
        })
    }

    /// Started node with no peers at all.
    pub fn isolated() -> Self {
        Self::with_state(MockNetworkState {
            connected_peers: Vec::new(),
            ..MockNetworkState::default()
        })
    }

    /// Modify the state.
    pub fn update(&self, f: impl FnOnce(&mut MockNetworkState)) {
        f(&mut self.state.lock());
    }

    /// Copy of the state.
    pub fn state(&self) -> MockNetworkState {
        self.state.lock().clone()
    }

    /// Push an event to subscribers, returning how many received it.
    pub fn emit(&self, event: NetworkEvent) -> usize {
        self.events.send(event).unwrap_or(0)
    }

    /// Push a pubsub delivery of `wire` on `topic`.
    pub fn emit_gossip(&self, topic: &str, wire: &str) -> usize {
        self.emit(NetworkEvent::new(
            PUBSUB_MESSAGE_EVENT,
            json!({ "topic": topic, "payload": wire }),
        ))
    }

    /// Append a row to the served feed snapshot.
    pub fn push_feed_item(&self, item: Value) {
        let mut state = self.state.lock();
        push_snapshot_item(&mut state.feed_snapshot, item);
    }

    fn guard(&self) -> TransportResult<()> {
        if self.state.lock().should_fail {
            return Err(TransportError::Network("mock failure".to_string()));
        }
        Ok(())
    }
}

fn push_snapshot_item(snapshot: &mut Value, item: Value) {
    if !snapshot.is_object() {
        *snapshot = json!({ "items": [] });
    }
    if let Some(obj) = snapshot.as_object_mut() {
        let items = obj.entry("items").or_insert_with(|| json!([]));
        if !items.is_array() {
            *items = json!([]);
        }
        if let Some(list) = items.as_array_mut() {
            list.push(item);
        }
    }
}

#[async_trait]
impl P2pNetwork for MockP2pNetwork {
    fn is_available(&self) -> bool {
        self.state.lock().available
    }

    fn events(&self) -> broadcast::Receiver<NetworkEvent> {
        self.events.subscribe()
    }

    async fn ensure_started(&self) -> TransportResult<bool> {
        self.guard()?;
        let state = self.state.lock();
        Ok(state.health.native_ready && state.health.started)
    }

    async fn warm_discovery(&self) -> TransportResult<()> {
        self.guard()?;
        self.state.lock().warmups += 1;
        Ok(())
    }

    async fn connected_peers(&self) -> TransportResult<Vec<String>> {
        self.guard()?;
        Ok(self.state.lock().connected_peers.clone())
    }

    async fn join_via_random_bootstrap(&self, limit: usize) -> TransportResult<()> {
        self.guard()?;
        let mut state = self.state.lock();
        state.bootstrap_joins += 1;
        let joined: Vec<String> = state.bootstrap_peers.iter().take(limit).cloned().collect();
        for peer in joined {
            if !state.connected_peers.contains(&peer) {
                state.connected_peers.push(peer);
            }
        }
        Ok(())
    }

    async fn local_peer_id(&self) -> TransportResult<String> {
        self.guard()?;
        Ok(self.state.lock().local_peer_id.clone())
    }

    async fn runtime_health(&self) -> TransportResult<RuntimeHealth> {
        self.guard()?;
        Ok(self.state.lock().health.clone())
    }

    async fn bootstrap_status(&self) -> TransportResult<Value> {
        self.guard()?;
        Ok(self.state.lock().bootstrap_status.clone())
    }

    async fn last_error(&self) -> TransportResult<String> {
        self.guard()?;
        Ok(self.state.lock().last_error.clone())
    }

    async fn pubsub_subscribe(&self, topic: &str) -> TransportResult<bool> {
        self.guard()?;
        self.state.lock().subscribed_topics.insert(topic.to_string());
        Ok(true)
    }

    async fn pubsub_unsubscribe(&self, topic: &str) -> TransportResult<bool> {
        self.guard()?;
        Ok(self.state.lock().subscribed_topics.remove(topic))
    }

    async fn pubsub_publish(&self, topic: &str, payload: &str) -> TransportResult<bool> {
        self.guard()?;
        let loopback = {
            let mut state = self.state.lock();
            if state.pubsub_failures > 0 {
                state.pubsub_failures -= 1;
                return Ok(false);
            }
            state.published.push((topic.to_string(), payload.to_string()));
            state.loopback
        };
        if loopback {
            self.emit_gossip(topic, payload);
        }
        Ok(true)
    }

    async fn rendezvous_advertise(&self, namespace: &str, _ttl_ms: u64) -> TransportResult<bool> {
        self.guard()?;
        self.state.lock().advertised.push(namespace.to_string());
        Ok(true)
    }

    async fn rendezvous_discover(&self, namespace: &str, limit: usize) -> TransportResult<Vec<Value>> {
        self.guard()?;
        let state = self.state.lock();
        Ok(state
            .rendezvous
            .get(namespace)
            .map(|rows| rows.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn list_discovered_peers(&self, limit: usize) -> TransportResult<Vec<Value>> {
        self.guard()?;
        Ok(self.state.lock().discovered_peers.iter().take(limit).cloned().collect())
    }

    async fn register_peer_hints(&self, _peer_id: &str, addresses: &[String]) -> TransportResult<bool> {
        self.guard()?;
        Ok(!addresses.is_empty())
    }

    async fn connect_peer(&self, peer_id: &str, _address: Option<&str>) -> TransportResult<bool> {
        self.guard()?;
        self.state.lock().dialed.push(peer_id.to_string());
        Ok(true)
    }

    async fn fetch_feed_snapshot(&self) -> TransportResult<Value> {
        self.guard()?;
        Ok(self.state.lock().feed_snapshot.clone())
    }

    async fn feed_subscribe_peer(&self, peer_id: &str) -> TransportResult<bool> {
        self.guard()?;
        self.state.lock().feed_peers.insert(peer_id.to_string());
        Ok(true)
    }

    async fn feed_unsubscribe_peer(&self, peer_id: &str) -> TransportResult<bool> {
        self.guard()?;
        Ok(self.state.lock().feed_peers.remove(peer_id))
    }

    async fn feed_publish_entry(&self, entry: &Value) -> TransportResult<bool> {
        self.guard()?;
        let mut state = self.state.lock();
        if state.feed_failures > 0 {
            state.feed_failures -= 1;
            return Ok(false);
        }
        state.feed_entries.push(entry.clone());
        if state.loopback {
            push_snapshot_item(&mut state.feed_snapshot, entry.clone());
        }
        Ok(true)
    }
}
