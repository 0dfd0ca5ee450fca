//! # Scenario Harness
//!
//! Two nodes that never share state. The publisher writes to its own mock
//! network; [`UpdateNetwork::deliver`] plays the part of the mesh and hands
//! each publication to the device's transport as a raw network event, one
//! carrier at a time.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use update_crypto::{sha256_hex, Ed25519KeyPair};
use update_protocol::{parse_manifest, Carrier, Manifest};
use update_publisher::{InMemoryKeyStore, PublisherConfig, StoredKey, UpdatePublisher};
use update_store::{StoreConfig, UpdateSnapshot, VersionStore};
use update_sync::{MockUpdateApplier, SyncConfig, UpdateSyncApi, UpdateSyncService};
use update_transport::{
    MockP2pNetwork, NetworkEvent, TransportConfig, TransportMessage, UpdateTransport, UpdateTransportApi,
    NETWORK_EVENT, PUBSUB_MESSAGE_EVENT,
};
use update_verifier::UpdateVerifier;

/// Seed of the publisher key.
pub const PUBLISHER_SEED: [u8; 32] = [42; 32];

/// Gateway URL the device resolves `ipfs://bafy-{sequence}` to.
pub fn gateway_url(sequence: u64) -> String {
    format!("https://ipfs.io/ipfs/bafy-{}", sequence)
}

/// Artifact body for a release.
pub fn artifact_bytes(sequence: u64) -> Vec<u8> {
    format!("release-{}", sequence).into_bytes()
}

/// Publisher node, device node and the relay between them.
pub struct UpdateNetwork {
    /// Admin publisher.
    pub publisher: UpdatePublisher,
    /// Publisher's network; every send lands in its state.
    pub publisher_network: Arc<MockP2pNetwork>,
    /// Publisher's chain heads.
    pub publisher_store: Arc<VersionStore>,
    /// Device transport.
    pub transport: Arc<UpdateTransport>,
    /// Device orchestrator.
    pub sync: UpdateSyncService,
    /// Device platform plugin.
    pub applier: Arc<MockUpdateApplier>,
    messages: Mutex<broadcast::Receiver<TransportMessage>>,
    delivered: Mutex<usize>,
}

impl Default for UpdateNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateNetwork {
    /// Device requiring both carriers.
    pub fn new() -> Self {
        Self::with_sync_config(SyncConfig::for_testing())
    }

    /// Device with its own sync configuration.
    pub fn with_sync_config(config: SyncConfig) -> Self {
        let publisher_network = Arc::new(MockP2pNetwork::new());
        let publisher_store = Arc::new(VersionStore::in_memory(StoreConfig::for_testing()));
        let keys = Arc::new(InMemoryKeyStore::with_key(StoredKey::from_keypair(
            &Ed25519KeyPair::from_seed(PUBLISHER_SEED),
        )));
        let publisher = UpdatePublisher::new(
            PublisherConfig::for_testing(),
            publisher_network.clone(),
            publisher_store.clone(),
            keys,
        );

        let transport = Arc::new(UpdateTransport::new(
            TransportConfig::for_testing(),
            Arc::new(MockP2pNetwork::new()),
        ));
        let messages = Mutex::new(transport.subscribe());
        let applier = Arc::new(MockUpdateApplier::new());
        let verifier = Arc::new(UpdateVerifier::in_memory(config.verifier.clone()));
        let store = Arc::new(VersionStore::in_memory(StoreConfig::default()));
        let sync = UpdateSyncService::new(config, store, verifier, transport.clone(), applier.clone());

        Self {
            publisher,
            publisher_network,
            publisher_store,
            transport,
            sync,
            applier,
            messages,
            delivered: Mutex::new(0),
        }
    }

    /// Release manifest whose artifact the device can download.
    pub fn manifest(&self, sequence: u64) -> Manifest {
        let bytes = artifact_bytes(sequence);
        self.applier.serve_https(&gateway_url(sequence), &bytes);
        parse_manifest(&json!({
            "schema_version": 2,
            "manifest_id": format!("m-{}", sequence),
            "channel": "stable",
            "platform": "android",
            "sequence": sequence,
            "version": format!("2.0.{}", sequence),
            "version_code": 200 + sequence,
            "artifacts": [{
                "platform": "android",
                "kind": "resource",
                "uri": format!("ipfs://bafy-{}", sequence),
                "sha256": sha256_hex(&bytes)
            }],
            "metadata": {"release_notes": {"summary": "release", "details": "stability fixes", "published_at_ms": 1}}
        }))
        .expect("fixture manifest")
    }

    /// Number of publications sent so far.
    pub fn publications(&self) -> usize {
        self.publisher_network.state().published.len()
    }

    /// Relay publication `index` over `carriers`, in that order, and let the
    /// device process what its transport emitted. Returns the number of
    /// messages the device handled.
    pub async fn deliver(&self, index: usize, carriers: &[Carrier]) -> usize {
        let state = self.publisher_network.state();
        for carrier in carriers {
            match carrier {
                Carrier::Gossip => {
                    let (topic, wire) = &state.published[index];
                    self.ingest_gossip(topic, wire);
                }
                Carrier::Feed => {
                    self.transport
                        .ingest(&NetworkEvent::new(NETWORK_EVENT, json!([state.feed_entries[index]])));
                }
            }
        }
        self.process().await
    }

    /// Relay every publication not yet relayed, over both carriers.
    pub async fn deliver_pending(&self) -> usize {
        let total = self.publications();
        let start = std::mem::replace(&mut *self.delivered.lock(), total);
        let mut handled = 0;
        for index in start..total {
            handled += self.deliver(index, &[Carrier::Gossip, Carrier::Feed]).await;
        }
        handled
    }

    /// Push a gossip wire straight into the device transport.
    pub fn ingest_gossip(&self, topic: &str, wire: &str) -> bool {
        self.transport.ingest(&NetworkEvent::new(
            PUBSUB_MESSAGE_EVENT,
            json!({ "topic": topic, "payload": wire }),
        ))
    }

    /// Gossip wire of publication `index`, parsed.
    pub fn gossip_wire(&self, index: usize) -> (String, Value) {
        let (topic, wire) = self.publisher_network.state().published[index].clone();
        (topic, serde_json::from_str(&wire).expect("publisher wire is json"))
    }

    /// Let the device handle everything its transport dispatched.
    pub async fn process(&self) -> usize {
        let pending: Vec<TransportMessage> = {
            let mut messages = self.messages.lock();
            std::iter::from_fn(|| messages.try_recv().ok()).collect()
        };
        for message in &pending {
            self.sync.handle_message(message).await;
        }
        pending.len()
    }

    /// Device snapshot.
    pub fn snapshot(&self) -> UpdateSnapshot {
        self.sync.snapshot()
    }

    /// Device counter.
    pub fn metric(&self, name: &str) -> u64 {
        self.sync.store().metric(name)
    }
}
