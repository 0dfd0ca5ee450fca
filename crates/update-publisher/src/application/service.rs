//! # Update Publisher
//!
//! Extends a scope chain from the local head and pushes each entry over
//! gossip and the content feed in parallel. Gossip decides success; the
//! local head only moves once gossip has accepted the entry.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use update_crypto::Ed25519KeyPair;
use update_protocol::fields;
use update_protocol::{
    current_timestamp_ms, seal_control, seal_manifest, ChainHead, Envelope, KillSwitch, Manifest, ProtocolError,
    Revocation, TopicKind, DEFAULT_CHANNEL, DEFAULT_PLATFORM, KILL_SWITCH_KIND, MAX_SEQUENCE, REVOCATION_KIND,
};
use update_store::VersionStore;
use update_transport::{P2pNetwork, UpdateTopics};
use uuid::Uuid;

use crate::algorithms::{classify_gossip_failure, is_not_ready_text, require_release_notes};
use crate::config::PublisherConfig;
use crate::domain::{
    CarrierOutcome, PreparedMessage, PublishError, PublishOptions, PublishResult, PublisherResult, StoredKey,
};
use crate::ports::{KeyStorePort, UpdatePublisherApi};

const FEED_ITEM_TYPE: &str = "content_feed_item";

/// Publisher for one node.
pub struct UpdatePublisher {
    config: PublisherConfig,
    network: Arc<dyn P2pNetwork>,
    store: Arc<VersionStore>,
    keys: Arc<dyn KeyStorePort>,
}

impl UpdatePublisher {
    /// Publisher over `network`, extending the chain heads held in `store`.
    pub fn new(
        config: PublisherConfig,
        network: Arc<dyn P2pNetwork>,
        store: Arc<VersionStore>,
        keys: Arc<dyn KeyStorePort>,
    ) -> Self {
        Self {
            config,
            network,
            store,
            keys,
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    // =========================================================================
    // Key management
    // =========================================================================

    /// Stored publisher key, if any.
    pub fn load_keypair(&self) -> PublisherResult<Option<Ed25519KeyPair>> {
        match self.keys.load()? {
            Some(stored) => keypair_from_stored(&stored).map(Some),
            None => Ok(None),
        }
    }

    /// Stored publisher key, generating and saving one on first use.
    pub fn load_or_create_keypair(&self) -> PublisherResult<Ed25519KeyPair> {
        if let Some(keypair) = self.load_keypair()? {
            return Ok(keypair);
        }
        let keypair = Ed25519KeyPair::generate();
        self.keys.save(&StoredKey::from_keypair(&keypair))?;
        info!(
            "[update-publisher] generated publisher key {}",
            keypair.public_key().to_hex()
        );
        Ok(keypair)
    }

    /// Replace the stored key with `key` after checking it. The public half
    /// may be left empty; it is derived from the secret.
    pub fn import_key(&self, key: &StoredKey) -> PublisherResult<Ed25519KeyPair> {
        if key.private_key_hex.trim().is_empty() {
            return Err(PublishError::SignerInvalid);
        }
        let keypair = keypair_from_stored(key)?;
        self.keys.save(&StoredKey::from_keypair(&keypair))?;
        Ok(keypair)
    }

    /// Forget the stored key.
    pub fn clear_key(&self) -> PublisherResult<()> {
        self.keys.clear()
    }

    /// Peer id written into proofs.
    pub async fn publisher_peer_id(&self) -> String {
        match self.network.local_peer_id().await {
            Ok(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => self.config.fallback_peer_id.clone(),
        }
    }

    // =========================================================================
    // Sealing
    // =========================================================================

    /// Seal `manifest` onto its scope chain without sending it.
    ///
    /// A sequence at or below the local head is moved to the next free one.
    pub async fn prepare_manifest(
        &self,
        mut manifest: Manifest,
        options: &PublishOptions,
    ) -> PublisherResult<PreparedMessage> {
        require_release_notes(&mut manifest)?;
        let channel = resolve_label(options.channel.as_deref(), Some(manifest.channel.as_str()), DEFAULT_CHANNEL);
        let platform = resolve_label(options.platform.as_deref(), Some(manifest.platform.as_str()), DEFAULT_PLATFORM);
        manifest.channel = channel.clone();
        manifest.platform = platform.clone();

        let head = self.store.vrf_chain_state(&channel, &platform);
        if manifest.sequence > MAX_SEQUENCE {
            return Err(ProtocolError::InvalidSequence.into());
        }
        if manifest.sequence <= head.last_sequence {
            let next = head.next_sequence().ok_or(ProtocolError::InvalidSequence)?;
            debug!(
                "[update-publisher] sequence {} already used in {}/{}, taking {}",
                manifest.sequence, channel, platform, next
            );
            manifest.sequence = next;
        }

        let keypair = self.load_or_create_keypair()?;
        let peer_id = self.publisher_peer_id().await;
        let sealed = seal_manifest(
            &mut manifest,
            &keypair,
            &peer_id,
            &head.last_manifest_hash,
            &head.last_vrf_output_hex,
        )?;
        let payload = into_object(manifest.to_value()?)?;
        let expiry = self.config.expiry_ms(options.expires_in_ms, self.config.manifest_expiry_ms);
        Ok(self.prepared(TopicKind::Manifest, channel, platform, payload, sealed, &keypair, expiry))
    }

    /// Seal a revocation without sending it.
    pub async fn prepare_revoke(
        &self,
        mut revocation: Revocation,
        options: &PublishOptions,
    ) -> PublisherResult<PreparedMessage> {
        if revocation.kind.trim().is_empty() {
            revocation.kind = REVOCATION_KIND.to_string();
        }
        if revocation.timestamp_ms == 0 {
            revocation.timestamp_ms = current_timestamp_ms();
        }
        let payload = into_object(serde_json::to_value(&revocation).map_err(ProtocolError::from)?)?;
        self.prepare_control(TopicKind::Revoke, payload, options).await
    }

    /// Seal a kill-switch without sending it.
    pub async fn prepare_kill_switch(
        &self,
        mut kill_switch: KillSwitch,
        options: &PublishOptions,
    ) -> PublisherResult<PreparedMessage> {
        if kill_switch.kind.trim().is_empty() {
            kill_switch.kind = KILL_SWITCH_KIND.to_string();
        }
        if kill_switch.issued_at_ms == 0 {
            kill_switch.issued_at_ms = current_timestamp_ms();
        }
        let payload = into_object(serde_json::to_value(&kill_switch).map_err(ProtocolError::from)?)?;
        self.prepare_control(TopicKind::KillSwitch, payload, options).await
    }

    async fn prepare_control(
        &self,
        kind: TopicKind,
        mut payload: Map<String, Value>,
        options: &PublishOptions,
    ) -> PublisherResult<PreparedMessage> {
        let channel = resolve_label(
            options.channel.as_deref(),
            fields::text(&payload, &["channel"]).as_deref(),
            DEFAULT_CHANNEL,
        );
        let platform = resolve_label(
            options.platform.as_deref(),
            fields::text(&payload, &["platform"]).as_deref(),
            DEFAULT_PLATFORM,
        );
        let head = self.store.vrf_chain_state(&channel, &platform);
        let next = head.next_sequence().ok_or(ProtocolError::InvalidSequence)?;
        let sequence = fields::sequence(&payload, &["sequence"])?.unwrap_or(0).max(next);
        payload.remove("vrf");

        let keypair = self.load_or_create_keypair()?;
        let peer_id = self.publisher_peer_id().await;
        let sealed = seal_control(
            &mut payload,
            &channel,
            &platform,
            sequence,
            &keypair,
            &peer_id,
            &head.last_manifest_hash,
            &head.last_vrf_output_hex,
        )?;
        let expiry = self.config.expiry_ms(options.expires_in_ms, self.config.control_expiry_ms);
        Ok(self.prepared(kind, channel, platform, payload, sealed, &keypair, expiry))
    }

    #[allow(clippy::too_many_arguments)]
    fn prepared(
        &self,
        kind: TopicKind,
        channel: String,
        platform: String,
        payload: Map<String, Value>,
        sealed: update_protocol::SealedEntry,
        keypair: &Ed25519KeyPair,
        expiry_ms: u64,
    ) -> PreparedMessage {
        let topic = UpdateTopics::new(&self.config.topic_prefix, &channel, &platform)
            .get(kind)
            .to_string();
        let expires_at_ms = current_timestamp_ms().saturating_add(expiry_ms);
        let envelope = |payload: &Map<String, Value>| {
            let mut envelope = Envelope::seal(payload.clone(), Uuid::new_v4().to_string(), expires_at_ms);
            envelope.sign(keypair);
            envelope
        };
        PreparedMessage {
            kind,
            gossip: envelope(&payload),
            feed: envelope(&payload),
            channel,
            platform,
            topic,
            payload,
            sealed,
        }
    }

    /// Move the local head of the message's scope onto it.
    pub fn commit(&self, prepared: &PreparedMessage) {
        let head = ChainHead::at(
            prepared.sealed.sequence,
            &prepared.sealed.entry_hash,
            &prepared.sealed.vrf_output_hex,
            current_timestamp_ms(),
        );
        self.store
            .set_vrf_chain_state(&prepared.channel, &prepared.platform, &head);
    }

    // =========================================================================
    // Dissemination
    // =========================================================================

    /// Push both envelopes of `prepared`. Does not touch the chain head.
    pub async fn send(&self, prepared: &PreparedMessage) -> PublisherResult<PublishResult> {
        let topic = prepared.topic.as_str();
        if self.network.is_available() {
            match self.network.ensure_started().await {
                Ok(true) => {
                    let _ = self.network.warm_discovery().await;
                }
                Ok(false) => {
                    return Ok(PublishResult::not_sent(
                        topic,
                        PublishError::NativeNotReady(String::new()).to_string(),
                    ))
                }
                Err(e) => {
                    return Ok(PublishResult::not_sent(
                        topic,
                        PublishError::NativeNotReady(format!(" ({})", e)).to_string(),
                    ))
                }
            }
        }

        let gossip_wire = serde_json::to_string(&prepared.gossip.to_value()?).map_err(ProtocolError::from)?;
        let feed_entry = json!({
            "type": FEED_ITEM_TYPE,
            "topic": topic,
            "payload": serde_json::to_string(&prepared.feed.to_value()?).map_err(ProtocolError::from)?,
            "ts": current_timestamp_ms(),
        });

        let (gossip, feed) = tokio::join!(
            self.publish_gossip(topic, &gossip_wire),
            self.publish_feed(&feed_entry)
        );

        let error = if gossip.ok {
            None
        } else {
            let peers = self.network.connected_peers().await.map(|p| p.len()).unwrap_or(0);
            Some(classify_gossip_failure(&gossip, &feed, peers).to_string())
        };
        if !feed.ok {
            warn!(
                "[update-publisher] feed carrier failed on {}: {}",
                topic,
                feed.last_error.as_deref().unwrap_or("unknown")
            );
        }
        Ok(PublishResult {
            ok: gossip.ok,
            pubsub_ok: gossip.ok,
            feed_ok: feed.ok,
            topic: topic.to_string(),
            error,
        })
    }

    async fn publish_gossip(&self, topic: &str, wire: &str) -> CarrierOutcome {
        let policy = &self.config.retry;
        let mut last_error: Option<String> = None;
        for attempt in 0..policy.attempts() {
            let _ = self.network.pubsub_subscribe(topic).await;
            match self.network.pubsub_publish(topic, wire).await {
                Ok(true) => return CarrierOutcome::delivered(),
                Ok(false) => {}
                Err(e) => last_error = Some(e.to_string()),
            }
            if let Some(reported) = self.reported_error().await {
                if reported.to_lowercase().contains("topic_not_joined") {
                    let _ = self.network.pubsub_subscribe(topic).await;
                }
                last_error = Some(reported);
            }
            debug!("[update-publisher] gossip attempt {} on {} failed", attempt + 1, topic);
            if attempt + 1 < policy.attempts() {
                self.warm_up().await;
                tokio::time::sleep(policy.delay_for(attempt)).await;
            }
        }
        CarrierOutcome::failed(last_error.unwrap_or_else(|| "pubsub_publish_failed".to_string()))
    }

    async fn publish_feed(&self, entry: &Value) -> CarrierOutcome {
        let policy = &self.config.retry;
        let mut last_error: Option<String> = None;
        for attempt in 0..policy.attempts() {
            match self.network.feed_publish_entry(entry).await {
                Ok(true) => return CarrierOutcome::delivered(),
                Ok(false) => {}
                Err(e) => last_error = Some(e.to_string()),
            }
            if let Some(reported) = self.reported_error().await {
                last_error = Some(reported);
            }
            if attempt + 1 < policy.attempts() {
                self.warm_up().await;
                tokio::time::sleep(policy.delay_for(attempt)).await;
            }
        }
        CarrierOutcome::failed(last_error.unwrap_or_else(|| "feed_publish_failed".to_string()))
    }

    /// Runtime's last error, unless it only says the node is not up.
    async fn reported_error(&self) -> Option<String> {
        let text = self.network.last_error().await.ok()?;
        let text = text.trim();
        if text.is_empty() || is_not_ready_text(text) {
            return None;
        }
        Some(text.to_string())
    }

    async fn warm_up(&self) {
        if self.network.is_available() {
            let _ = self.network.ensure_started().await;
            let _ = self.network.warm_discovery().await;
        }
    }

    async fn publish(&self, prepared: PreparedMessage) -> PublisherResult<PublishResult> {
        let result = self.send(&prepared).await?;
        if result.ok {
            self.commit(&prepared);
            info!(
                "[update-publisher] published {} seq {} on {}",
                prepared.kind.as_str(),
                prepared.sealed.sequence,
                prepared.topic
            );
        } else {
            warn!(
                "[update-publisher] publish of {} seq {} failed: {}",
                prepared.kind.as_str(),
                prepared.sealed.sequence,
                result.error.as_deref().unwrap_or("unknown")
            );
        }
        Ok(result)
    }

    fn ensure_enabled(&self) -> PublisherResult<()> {
        if !self.config.enabled {
            return Err(PublishError::Disabled);
        }
        Ok(())
    }
}

#[async_trait]
impl UpdatePublisherApi for UpdatePublisher {
    async fn publish_manifest(&self, manifest: Manifest, options: PublishOptions) -> PublisherResult<PublishResult> {
        self.ensure_enabled()?;
        let prepared = self.prepare_manifest(manifest, &options).await?;
        self.publish(prepared).await
    }

    async fn publish_revoke(&self, revocation: Revocation, options: PublishOptions) -> PublisherResult<PublishResult> {
        self.ensure_enabled()?;
        let prepared = self.prepare_revoke(revocation, &options).await?;
        self.publish(prepared).await
    }

    async fn publish_kill_switch(&self, kill_switch: KillSwitch, options: PublishOptions) -> PublisherResult<PublishResult> {
        self.ensure_enabled()?;
        let prepared = self.prepare_kill_switch(kill_switch, &options).await?;
        self.publish(prepared).await
    }
}

fn keypair_from_stored(stored: &StoredKey) -> PublisherResult<Ed25519KeyPair> {
    let keypair = Ed25519KeyPair::from_secret_hex(&stored.private_key_hex).map_err(|_| PublishError::SignerInvalid)?;
    let declared = stored.public_key_hex.trim();
    if !declared.is_empty() && !declared.eq_ignore_ascii_case(&keypair.public_key().to_hex()) {
        return Err(PublishError::SignerInvalid);
    }
    Ok(keypair)
}

fn resolve_label(requested: Option<&str>, own: Option<&str>, fallback: &str) -> String {
    [requested, own]
        .into_iter()
        .flatten()
        .map(|label| label.trim().to_lowercase())
        .find(|label| !label.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

fn into_object(value: Value) -> PublisherResult<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ProtocolError::NotAnObject.into()),
    }
}
