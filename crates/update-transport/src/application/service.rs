//! # Update Transport Service
//!
//! Turns the four delivery paths into one [`TransportMessage`] stream:
//!
//! - pubsub pushes on the scope topics (gossip carrier)
//! - periodic feed snapshot polls (feed carrier)
//! - feeds of peers found through rendezvous or live discovery (feed carrier)
//! - manual strict polls
//!
//! Messages fan out over a broadcast channel; dropping every receiver is
//! harmless.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use update_protocol::{current_timestamp_ms, fields, is_update_topic, parse_topic_kind, Scope};

use crate::config::TransportConfig;
use crate::domain::normalize::{
    extract_feed_candidates, flatten_event_payload, has_bootstrap_connectivity_signal, infer_message_topic,
    is_content_feed_item, is_envelope, looks_like_update_payload, namespace_variants, normalize_payload,
    parse_bridge_payload,
};
use crate::domain::{
    ConnectivityReason, DiscoveredPeer, ManualCheckResult, MessageSource, NetworkEvent, PollResult, RuntimeHealth,
    TransportMessage, TransportResult, UpdateTopics, NETWORK_EVENT, PUBSUB_MESSAGE_EVENT,
};
use crate::ports::{P2pNetwork, UpdateTransportApi};

const MESSAGE_CHANNEL_CAPACITY: usize = 256;

/// Log and swallow a best-effort network call.
fn soft<T: Default>(result: TransportResult<T>, call: &str) -> T {
    result.unwrap_or_else(|e| {
        debug!("[update-transport] {} failed: {}", call, e);
        T::default()
    })
}

struct TransportInner {
    config: TransportConfig,
    scope: Scope,
    authority_namespace: String,
    topics: UpdateTopics,
    network: Arc<dyn P2pNetwork>,
    messages: broadcast::Sender<TransportMessage>,
    feed_peers: Mutex<HashSet<String>>,
    observed_total: AtomicU64,
    foreground: AtomicBool,
    reschedule: Notify,
}

/// Dual-carrier update transport.
pub struct UpdateTransport {
    inner: Arc<TransportInner>,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl UpdateTransport {
    /// Transport for the configured scope over `network`.
    pub fn new(config: TransportConfig, network: Arc<dyn P2pNetwork>) -> Self {
        let scope = Scope::new(&config.resolved_channel(), &config.resolved_platform());
        let topics = UpdateTopics::new(&config.topic_prefix, &scope.channel, &scope.platform);
        let authority_namespace = config.resolved_authority_namespace();
        let (messages, _) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(TransportInner {
                config,
                scope,
                authority_namespace,
                topics,
                network,
                messages,
                feed_peers: Mutex::new(HashSet::new()),
                observed_total: AtomicU64::new(0),
                foreground: AtomicBool::new(true),
                reschedule: Notify::new(),
            }),
            started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }

    /// Messages dispatched since creation.
    pub fn observed_messages(&self) -> u64 {
        self.inner.observed_total.load(Ordering::SeqCst)
    }

    /// Peers whose feeds are followed.
    pub fn followed_feed_peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.inner.feed_peers.lock().iter().cloned().collect();
        peers.sort();
        peers
    }

    /// Feed one raw network event through normalization. Returns whether
    /// anything was dispatched.
    pub fn ingest(&self, event: &NetworkEvent) -> bool {
        self.inner.handle_network_event(event)
    }

    /// One non-strict authority poll.
    pub async fn poll_once(&self) -> PollResult {
        self.inner.poll_from_authority(false).await
    }
}

impl Drop for UpdateTransport {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

#[async_trait]
impl UpdateTransportApi for UpdateTransport {
    fn topics(&self) -> UpdateTopics {
        self.inner.topics.clone()
    }

    fn scope(&self) -> Scope {
        self.inner.scope.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportMessage> {
        self.inner.messages.subscribe()
    }

    async fn start(&self) -> TransportResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let inner = &self.inner;
        if inner.network.is_available() {
            inner.warmup_connectivity(false).await;
            inner.join_topics().await;
            if !inner.authority_namespace.is_empty() {
                soft(
                    inner
                        .network
                        .rendezvous_advertise(&inner.authority_namespace, inner.config.rendezvous_ttl_ms)
                        .await,
                    "rendezvous_advertise",
                );
            }
        }

        let events = inner.network.events();
        let pump = tokio::spawn(Arc::clone(inner).run_event_pump(events));
        let poller = tokio::spawn(Arc::clone(inner).run_poll_loop());
        self.tasks.lock().extend([pump, poller]);

        info!(
            "[update-transport] started for {} ({} topics)",
            inner.scope,
            inner.topics.all().len()
        );
        inner.poll_from_authority(false).await;
        Ok(())
    }

    async fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        let inner = &self.inner;
        if inner.network.is_available() {
            for topic in inner.topics.all() {
                soft(inner.network.pubsub_unsubscribe(topic).await, "pubsub_unsubscribe");
            }
            let peers: Vec<String> = inner.feed_peers.lock().drain().collect();
            for peer in peers {
                soft(inner.network.feed_unsubscribe_peer(&peer).await, "feed_unsubscribe_peer");
            }
        }
        info!("[update-transport] stopped for {}", inner.scope);
    }

    async fn manual_check(&self) -> ManualCheckResult {
        let inner = &self.inner;
        let observed_before = inner.observed_total.load(Ordering::SeqCst);
        if inner.network.is_available() {
            inner.warmup_connectivity(true).await;
            inner.join_topics().await;
        }
        let poll = inner.poll_from_authority(true).await;
        inner.reschedule.notify_one();
        ManualCheckResult {
            connectivity_ok: poll.connectivity_ok,
            connected_peers: poll.connected_peers,
            observed_messages: inner
                .observed_total
                .load(Ordering::SeqCst)
                .saturating_sub(observed_before),
            authority_sync_ok: poll.authority_sync_ok,
            reason: poll.reason,
        }
    }

    fn set_foreground(&self, foreground: bool) {
        self.inner.foreground.store(foreground, Ordering::SeqCst);
        self.inner.reschedule.notify_one();
    }
}

impl TransportInner {
    fn prefix(&self) -> &str {
        &self.config.topic_prefix
    }

    async fn run_event_pump(self: Arc<Self>, mut events: broadcast::Receiver<NetworkEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    self.handle_network_event(&event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("[update-transport] event pump lagged, {} events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn run_poll_loop(self: Arc<Self>) {
        loop {
            let foreground = self.foreground.load(Ordering::SeqCst);
            let delay = Duration::from_millis(self.config.poll_delay_ms(foreground));
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    self.poll_from_authority(false).await;
                }
                _ = self.reschedule.notified() => {}
            }
        }
    }

    async fn join_topics(&self) {
        for topic in self.topics.all() {
            soft(self.network.pubsub_subscribe(topic).await, "pubsub_subscribe");
        }
    }

    fn discovery_namespaces(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let sources = std::iter::once(self.authority_namespace.as_str())
            .chain(self.config.fallback_namespaces.iter().map(String::as_str));
        for namespace in sources {
            for variant in namespace_variants(namespace) {
                if !out.contains(&variant) {
                    out.push(variant);
                }
            }
        }
        out
    }

    async fn warmup_connectivity(&self, ensure_bootstrap: bool) {
        if !self.network.is_available() {
            return;
        }
        if !soft(self.network.ensure_started().await, "ensure_started") {
            return;
        }
        soft(self.network.warm_discovery().await, "warm_discovery");
        let mut connected = soft(self.network.connected_peers().await, "connected_peers");
        if connected.is_empty() && ensure_bootstrap {
            soft(
                self.network
                    .join_via_random_bootstrap(self.config.bootstrap_join_limit)
                    .await,
                "join_via_random_bootstrap",
            );
            connected = soft(self.network.connected_peers().await, "connected_peers");
        }
        if connected.is_empty() {
            for namespace in self.discovery_namespaces() {
                soft(
                    self.network
                        .rendezvous_advertise(&namespace, self.config.rendezvous_ttl_ms)
                        .await,
                    "rendezvous_advertise",
                );
            }
        }
    }

    async fn poll_from_authority(&self, strict: bool) -> PollResult {
        if !self.network.is_available() {
            return PollResult::detached();
        }
        self.warmup_connectivity(strict).await;
        let (snapshot_hit, peer_hit) = tokio::join!(self.refresh_feed_snapshot(), self.refresh_rendezvous_peers());
        let (connected, local_peer_id, health, bootstrap) = tokio::join!(
            self.network.connected_peers(),
            self.network.local_peer_id(),
            self.network.runtime_health(),
            self.network.bootstrap_status(),
        );
        let connected = soft(connected, "connected_peers");
        let local_peer_id = soft(local_peer_id, "local_peer_id");
        let health: RuntimeHealth = soft(health, "runtime_health");
        let bootstrap: Value = soft(bootstrap, "bootstrap_status");

        let authority_sync_ok = snapshot_hit || peer_hit;
        let runtime_ready = health.native_ready
            && (health.started
                || health.peer_id.as_deref().map_or(false, |p| !p.trim().is_empty())
                || !local_peer_id.trim().is_empty());
        let connectivity_ok = !connected.is_empty()
            || authority_sync_ok
            || (runtime_ready && has_bootstrap_connectivity_signal(&bootstrap));
        let reason = if connectivity_ok {
            None
        } else if !health.native_ready {
            Some(ConnectivityReason::NativeNotReady)
        } else if runtime_ready {
            Some(ConnectivityReason::NoRemotePeers)
        } else {
            Some(ConnectivityReason::NetworkUnreachable)
        };
        if let (true, Some(reason)) = (strict, reason) {
            warn!("[update-transport] strict connectivity check failed: {}", reason);
        }
        PollResult {
            connectivity_ok,
            connected_peers: connected.len(),
            authority_sync_ok,
            reason,
        }
    }

    async fn refresh_feed_snapshot(&self) -> bool {
        let snapshot = match self.network.fetch_feed_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!("[update-transport] feed snapshot unavailable: {}", e);
                return false;
            }
        };
        let Some(items) = snapshot.get("items").and_then(Value::as_array) else {
            return false;
        };
        let mut dispatched = false;
        for item in items.iter().filter(|item| item.is_object()) {
            dispatched |= self.dispatch_feed_candidates(item, MessageSource::FeedSnapshot);
        }
        dispatched
    }

    async fn refresh_rendezvous_peers(&self) -> bool {
        if self.authority_namespace.is_empty() {
            return false;
        }
        let local_peer_id = soft(self.network.local_peer_id().await, "local_peer_id");
        let local_peer_id = local_peer_id.trim();
        let limit = self.config.rendezvous_discover_limit;

        let mut discovered: Vec<DiscoveredPeer> = Vec::new();
        let merge = |discovered: &mut Vec<DiscoveredPeer>, rows: Vec<Value>| {
            for peer in rows.iter().filter_map(DiscoveredPeer::from_value) {
                match discovered.iter_mut().find(|p| p.peer_id == peer.peer_id) {
                    Some(existing) if !peer.addresses.is_empty() => existing.addresses = peer.addresses,
                    Some(_) => {}
                    None => discovered.push(peer),
                }
            }
        };
        for namespace in self.discovery_namespaces() {
            merge(
                &mut discovered,
                soft(
                    self.network.rendezvous_discover(&namespace, limit).await,
                    "rendezvous_discover",
                ),
            );
        }
        if discovered.is_empty() {
            merge(
                &mut discovered,
                soft(self.network.list_discovered_peers(limit).await, "list_discovered_peers"),
            );
        }
        if discovered.is_empty() {
            discovered = soft(self.network.connected_peers().await, "connected_peers")
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .map(|peer_id| DiscoveredPeer {
                    peer_id,
                    addresses: Vec::new(),
                })
                .collect();
        }

        for peer in &discovered {
            if peer.peer_id == local_peer_id || self.feed_peers.lock().contains(&peer.peer_id) {
                continue;
            }
            match peer.addresses.first() {
                Some(dial) => {
                    soft(
                        self.network.register_peer_hints(&peer.peer_id, &peer.addresses).await,
                        "register_peer_hints",
                    );
                    soft(self.network.connect_peer(&peer.peer_id, Some(dial)).await, "connect_peer");
                }
                None => {
                    soft(self.network.connect_peer(&peer.peer_id, None).await, "connect_peer");
                }
            }
            if soft(self.network.feed_subscribe_peer(&peer.peer_id).await, "feed_subscribe_peer") {
                debug!("[update-transport] following feed of {}", peer.peer_id);
                self.feed_peers.lock().insert(peer.peer_id.clone());
            }
        }
        !discovered.is_empty() || !self.feed_peers.lock().is_empty()
    }

    fn handle_network_event(&self, event: &NetworkEvent) -> bool {
        let direct_topic = event.topic.trim();
        if event.topic == PUBSUB_MESSAGE_EVENT || is_update_topic(self.prefix(), direct_topic) {
            let empty = Map::new();
            let body = event.payload.as_object().unwrap_or(&empty);
            let topic = fields::text(body, &["topic"]).unwrap_or_else(|| direct_topic.to_string());
            if !is_update_topic(self.prefix(), &topic) {
                return false;
            }
            let payload = if is_envelope(&event.payload) {
                event.payload.clone()
            } else {
                let base = parse_bridge_payload(body.get("payload"), &event.payload);
                parse_bridge_payload(body.get("payloadBase64"), &base)
            };
            return self.dispatch_payload(&topic, &payload, MessageSource::Gossipsub);
        }

        if event.topic == NETWORK_EVENT {
            let mut dispatched = false;
            for entry in flatten_event_payload(&event.payload) {
                if looks_like_update_payload(&entry, self.prefix()) {
                    dispatched |= self.dispatch_feed_candidates(&entry, MessageSource::FeedPeer);
                }
            }
            return dispatched;
        }
        false
    }

    /// Try each candidate of a feed row; the first that yields an update
    /// message wins.
    fn dispatch_feed_candidates(&self, row: &Value, source: MessageSource) -> bool {
        extract_feed_candidates(row)
            .iter()
            .filter(|candidate| is_content_feed_item(candidate))
            .any(|candidate| self.dispatch_feed_entry(candidate, source))
    }

    fn dispatch_feed_entry(&self, entry: &Value, source: MessageSource) -> bool {
        let normalized = normalize_payload(entry);
        let Some(row) = normalized.as_object() else {
            return false;
        };
        let payload = if is_envelope(&normalized) {
            normalized.clone()
        } else {
            match row.get("payload") {
                Some(inner) if !inner.is_null() => normalize_payload(inner),
                _ => normalized.clone(),
            }
        };
        let wrapper_topic = fields::text(row, &["topic"]).filter(|t| is_update_topic(self.prefix(), t));
        let topic = wrapper_topic.or_else(|| {
            infer_message_topic(&payload, self.prefix(), &self.scope.channel, &self.scope.platform)
        });
        match topic {
            Some(topic) => self.dispatch_payload(&topic, &payload, source),
            None => false,
        }
    }

    fn dispatch_payload(&self, topic: &str, payload: &Value, source: MessageSource) -> bool {
        if !is_update_topic(self.prefix(), topic) {
            return false;
        }
        let Some(kind) = parse_topic_kind(topic) else {
            return false;
        };
        self.observed_total.fetch_add(1, Ordering::SeqCst);
        let message = TransportMessage {
            kind,
            raw: normalize_payload(payload),
            topic: topic.to_string(),
            received_at_ms: current_timestamp_ms(),
            source,
            carrier: source.carrier(),
        };
        debug!("[update-transport] {} message on {} via {:?}", kind, topic, source);
        // No receivers is fine.
        let _ = self.messages.send(message);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MockP2pNetwork;
    use serde_json::json;
    use update_crypto::encode_base64;
    use update_protocol::{Carrier, TopicKind};

    fn envelope() -> Value {
        json!({
            "kind": "update_envelope_v2",
            "schema_version": 2,
            "nonce": "n-1",
            "expires_at_ms": 0,
            "payload": {
                "kind": "manifest_v2",
                "manifest_id": "m-1",
                "channel": "stable",
                "platform": "android",
                "sequence": 1,
                "version": "1.0.0",
                "artifacts": []
            }
        })
    }

    fn transport(network: Arc<MockP2pNetwork>) -> UpdateTransport {
        UpdateTransport::new(TransportConfig::for_testing(), network)
    }

    #[tokio::test]
    async fn test_gossip_message_dispatch() {
        let transport = transport(Arc::new(MockP2pNetwork::new()));
        let mut rx = transport.subscribe();
        let topic = transport.topics().manifest;
        let event = NetworkEvent::new(
            PUBSUB_MESSAGE_EVENT,
            json!({"topic": topic, "payload": envelope().to_string()}),
        );
        assert!(transport.ingest(&event));

        let message = rx.recv().await.unwrap();
        assert_eq!(message.kind, TopicKind::Manifest);
        assert_eq!(message.carrier, Carrier::Gossip);
        assert_eq!(message.source, MessageSource::Gossipsub);
        assert_eq!(message.raw, envelope());
        assert_eq!(transport.observed_messages(), 1);
    }

    #[tokio::test]
    async fn test_gossip_base64_payload() {
        let transport = transport(Arc::new(MockP2pNetwork::new()));
        let mut rx = transport.subscribe();
        let event = NetworkEvent::new(
            PUBSUB_MESSAGE_EVENT,
            json!({
                "topic": "/updates/v2/stable/android/manifest",
                "payloadBase64": encode_base64(envelope().to_string())
            }),
        );
        assert!(transport.ingest(&event));
        assert_eq!(rx.recv().await.unwrap().raw, envelope());
    }

    #[test]
    fn test_non_update_gossip_ignored() {
        let transport = transport(Arc::new(MockP2pNetwork::new()));
        let event = NetworkEvent::new(PUBSUB_MESSAGE_EVENT, json!({"topic": "/chat/room", "payload": "{}"}));
        assert!(!transport.ingest(&event));
        assert!(!transport.ingest(&NetworkEvent::new("peer_connected", json!({}))));
        assert_eq!(transport.observed_messages(), 0);
    }

    #[tokio::test]
    async fn test_network_event_feed_rows() {
        let transport = transport(Arc::new(MockP2pNetwork::new()));
        let mut rx = transport.subscribe();
        let rows = json!([
            {
                "type": "content_feed_item",
                "topic": "/updates/v2/stable/android/manifest",
                "payload": envelope().to_string()
            },
            {"type": "chat", "text": "hello"}
        ]);
        assert!(transport.ingest(&NetworkEvent::new(NETWORK_EVENT, rows)));
        let message = rx.recv().await.unwrap();
        assert_eq!(message.raw, envelope());
        assert_eq!(message.carrier, Carrier::Feed);
        assert_eq!(message.source, MessageSource::FeedPeer);
        assert_eq!(transport.observed_messages(), 1);
    }

    #[tokio::test]
    async fn test_feed_snapshot_poll_infers_topic() {
        let network = Arc::new(MockP2pNetwork::new());
        network.push_feed_item(json!({"type": "content_feed_item", "payload": envelope().to_string()}));
        network.push_feed_item(json!({"type": "content_feed_item", "payload": "hello"}));
        let transport = transport(network);
        let mut rx = transport.subscribe();

        let poll = transport.poll_once().await;
        assert!(poll.connectivity_ok);
        assert!(poll.authority_sync_ok);

        let message = rx.recv().await.unwrap();
        assert_eq!(message.topic, "/updates/v2/stable/android/manifest");
        assert_eq!(message.source, MessageSource::FeedSnapshot);
        assert_eq!(message.raw, envelope());
        assert_eq!(transport.observed_messages(), 1);
    }

    #[tokio::test]
    async fn test_rendezvous_peers_followed_once() {
        let network = Arc::new(MockP2pNetwork::new());
        network.update(|s| {
            s.rendezvous.insert(
                "updates/v2/stable/android".into(),
                vec![
                    json!({"peerId": "peer-b", "multiaddrs": ["/ip4/10.0.0.2/tcp/4001"]}),
                    json!({"peerId": "local-peer"}),
                ],
            );
        });
        let transport = transport(network.clone());
        transport.poll_once().await;
        transport.poll_once().await;

        assert_eq!(transport.followed_feed_peers(), vec!["peer-b".to_string()]);
        assert_eq!(network.state().dialed, vec!["peer-b".to_string()]);
    }

    #[tokio::test]
    async fn test_connected_peers_used_when_discovery_empty() {
        let network = Arc::new(MockP2pNetwork::new());
        let transport = transport(network.clone());
        transport.poll_once().await;
        assert_eq!(transport.followed_feed_peers(), vec!["remote-peer".to_string()]);
    }

    #[tokio::test]
    async fn test_manual_check_reasons() {
        let not_ready = transport(Arc::new(MockP2pNetwork::not_ready()));
        let result = not_ready.manual_check().await;
        assert!(!result.connectivity_ok);
        assert_eq!(result.reason, Some(ConnectivityReason::NativeNotReady));

        let isolated = transport(Arc::new(MockP2pNetwork::isolated()));
        let result = isolated.manual_check().await;
        assert_eq!(result.reason, Some(ConnectivityReason::NoRemotePeers));
        assert_eq!(result.connected_peers, 0);

        let network = MockP2pNetwork::isolated();
        network.update(|s| {
            s.health.started = false;
            s.health.peer_id = None;
            s.local_peer_id = String::new();
        });
        let unreachable = transport(Arc::new(network));
        assert_eq!(
            unreachable.manual_check().await.reason,
            Some(ConnectivityReason::NetworkUnreachable)
        );
    }

    #[tokio::test]
    async fn test_manual_check_bootstrap_join_and_observed_count() {
        let network = MockP2pNetwork::isolated();
        network.update(|s| s.bootstrap_peers = vec!["boot-1".into()]);
        network.push_feed_item(json!({"payload": envelope()}));
        let network = Arc::new(network);
        let transport = transport(network.clone());

        let result = transport.manual_check().await;
        assert!(result.connectivity_ok);
        assert_eq!(result.reason, None);
        assert_eq!(result.observed_messages, 1);
        assert_eq!(network.state().bootstrap_joins, 1);
        assert_eq!(network.state().subscribed_topics.len(), 4);
    }

    #[tokio::test]
    async fn test_isolated_warmup_advertises_namespaces() {
        let network = Arc::new(MockP2pNetwork::isolated());
        let transport = transport(network.clone());
        transport.poll_once().await;
        let advertised = network.state().advertised;
        assert!(advertised.contains(&"updates/v2/stable/android".to_string()));
        assert!(advertised.contains(&"/nodes/v1".to_string()));
    }

    #[tokio::test]
    async fn test_unavailable_network_is_detached() {
        let transport = transport(Arc::new(MockP2pNetwork::unavailable()));
        let result = transport.manual_check().await;
        assert!(result.connectivity_ok);
        assert!(result.authority_sync_ok);
        assert_eq!(result.reason, None);
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let network = Arc::new(MockP2pNetwork::new());
        let transport = transport(network.clone());
        let mut rx = transport.subscribe();
        transport.start().await.unwrap();
        assert_eq!(network.state().subscribed_topics.len(), 4);
        assert!(network.state().advertised.contains(&"updates/v2/stable/android".to_string()));

        network.emit_gossip(&transport.topics().manifest, &envelope().to_string());
        let message = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(message.kind, TopicKind::Manifest);

        transport.stop().await;
        let state = network.state();
        assert!(state.subscribed_topics.is_empty());
        assert!(state.feed_peers.is_empty());
        assert!(transport.followed_feed_peers().is_empty());
    }
}
