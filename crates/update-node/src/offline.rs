//! Networking runtime stand-in for a node built without one.
//!
//! Reports itself unavailable and refuses every call, so the publisher only
//! ever seals entries here and the operator carries them to the network.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use update_transport::{NetworkEvent, P2pNetwork, RuntimeHealth, TransportError, TransportResult};

/// A P2P runtime that is not there.
pub struct OfflineNetwork {
    events: broadcast::Sender<NetworkEvent>,
}

impl Default for OfflineNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineNetwork {
    /// Offline runtime.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1);
        Self { events }
    }
}

#[async_trait]
impl P2pNetwork for OfflineNetwork {
    fn is_available(&self) -> bool {
        false
    }

    fn events(&self) -> broadcast::Receiver<NetworkEvent> {
        self.events.subscribe()
    }

    async fn ensure_started(&self) -> TransportResult<bool> {
        Err(TransportError::NotReady)
    }

    async fn warm_discovery(&self) -> TransportResult<()> {
        Err(TransportError::NotReady)
    }

    async fn connected_peers(&self) -> TransportResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn join_via_random_bootstrap(&self, _limit: usize) -> TransportResult<()> {
        Err(TransportError::NotReady)
    }

    async fn local_peer_id(&self) -> TransportResult<String> {
        Err(TransportError::NotReady)
    }

    async fn runtime_health(&self) -> TransportResult<RuntimeHealth> {
        Ok(RuntimeHealth::default())
    }

    async fn bootstrap_status(&self) -> TransportResult<Value> {
        Err(TransportError::NotReady)
    }

    async fn last_error(&self) -> TransportResult<String> {
        Ok(TransportError::NotReady.to_string())
    }

    async fn pubsub_subscribe(&self, _topic: &str) -> TransportResult<bool> {
        Err(TransportError::NotReady)
    }

    async fn pubsub_unsubscribe(&self, _topic: &str) -> TransportResult<bool> {
        Err(TransportError::NotReady)
    }

    async fn pubsub_publish(&self, _topic: &str, _payload: &str) -> TransportResult<bool> {
        Err(TransportError::NotReady)
    }

    async fn rendezvous_advertise(&self, _namespace: &str, _ttl_ms: u64) -> TransportResult<bool> {
        Err(TransportError::NotReady)
    }

    async fn rendezvous_discover(&self, _namespace: &str, _limit: usize) -> TransportResult<Vec<Value>> {
        Err(TransportError::NotReady)
    }

    async fn list_discovered_peers(&self, _limit: usize) -> TransportResult<Vec<Value>> {
        Err(TransportError::NotReady)
    }

    async fn register_peer_hints(&self, _peer_id: &str, _addresses: &[String]) -> TransportResult<bool> {
        Err(TransportError::NotReady)
    }

    async fn connect_peer(&self, _peer_id: &str, _address: Option<&str>) -> TransportResult<bool> {
        Err(TransportError::NotReady)
    }

    async fn fetch_feed_snapshot(&self) -> TransportResult<Value> {
        Err(TransportError::NotReady)
    }

    async fn feed_subscribe_peer(&self, _peer_id: &str) -> TransportResult<bool> {
        Err(TransportError::NotReady)
    }

    async fn feed_unsubscribe_peer(&self, _peer_id: &str) -> TransportResult<bool> {
        Err(TransportError::NotReady)
    }

    async fn feed_publish_entry(&self, _entry: &Value) -> TransportResult<bool> {
        Err(TransportError::NotReady)
    }
}
