//! Command handlers. Each returns the JSON document the binary prints.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use tracing::info;
use update_protocol::fields;
use update_protocol::{
    current_timestamp_ms, parse_manifest, parse_vrf_proof, ChainHead, Envelope, KillSwitch, Revocation,
    UpdatePayload, VrfProof, DEFAULT_CHANNEL, DEFAULT_PLATFORM, KILL_SWITCH_KIND, REVOCATION_KIND,
};
use update_publisher::{JsonFileKeyStore, PreparedMessage, PublishOptions, StoredKey, UpdatePublisher};
use update_store::{JsonFileStateStorage, VersionStore};
use update_verifier::{UpdateVerificationApi, UpdateVerifier, VerifyError};

use crate::cli::{Command, TargetArgs};
use crate::config::NodeConfig;
use crate::offline::OfflineNetwork;

/// Store, key file and publisher opened on a data directory.
pub struct NodeContext {
    config: NodeConfig,
    store: Arc<VersionStore>,
    keys: Arc<JsonFileKeyStore>,
    publisher: UpdatePublisher,
}

impl NodeContext {
    /// Open everything under `config.data_dir`.
    pub fn open(config: NodeConfig) -> Result<Self> {
        let storage = JsonFileStateStorage::open(&config.data_dir)
            .with_context(|| format!("opening store in {}", config.data_dir.display()))?;
        let store = Arc::new(VersionStore::new(config.store.clone(), Some(Arc::new(storage))));
        let keys = Arc::new(
            JsonFileKeyStore::open(&config.data_dir)
                .with_context(|| format!("opening key store in {}", config.data_dir.display()))?,
        );
        let publisher = UpdatePublisher::new(
            config.publisher.clone(),
            Arc::new(OfflineNetwork::new()),
            store.clone(),
            keys.clone(),
        );
        Ok(Self {
            config,
            store,
            keys,
            publisher,
        })
    }

    /// Version store.
    pub fn store(&self) -> &Arc<VersionStore> {
        &self.store
    }

    /// Run one command.
    pub async fn run(&self, command: Command) -> Result<Value> {
        match command {
            Command::Keygen { import_secret, rotate } => self.keygen(import_secret.as_deref(), rotate),
            Command::SignManifest { file, target } => self.sign_manifest(&file, &target).await,
            Command::SignRevoke {
                manifest_id,
                max_sequence,
                targets,
                reason,
                target,
            } => {
                if manifest_id.is_none() && max_sequence.is_none() && targets.is_empty() {
                    bail!("a revocation needs --manifest-id, --max-sequence or --target");
                }
                let revocation = Revocation {
                    kind: REVOCATION_KIND.to_string(),
                    schema_version: 2,
                    sequence: None,
                    manifest_id,
                    channel: None,
                    platform: None,
                    max_sequence,
                    reason,
                    timestamp_ms: 0,
                    signer: None,
                    signature: None,
                    targets,
                    vrf: None,
                };
                let prepared = self.publisher.prepare_revoke(revocation, &options(&target)).await?;
                self.commit(prepared)
            }
            Command::SignKillswitch {
                reason,
                disable,
                expires_at_ms,
                target,
            } => {
                let kill_switch = KillSwitch {
                    kind: KILL_SWITCH_KIND.to_string(),
                    schema_version: 2,
                    sequence: None,
                    channel: None,
                    platform: None,
                    enabled: !disable,
                    reason,
                    issued_at_ms: 0,
                    expires_at_ms,
                    signer: None,
                    signature: None,
                    vrf: None,
                };
                let prepared = self
                    .publisher
                    .prepare_kill_switch(kill_switch, &options(&target))
                    .await?;
                self.commit(prepared)
            }
            Command::Verify {
                file,
                require_signature,
            } => self.verify(&file, require_signature),
            Command::InspectState { full } => self.inspect_state(full),
        }
    }

    fn keygen(&self, import_secret: Option<&str>, rotate: bool) -> Result<Value> {
        let keypair = match import_secret {
            Some(secret) => self.publisher.import_key(&StoredKey {
                public_key_hex: String::new(),
                private_key_hex: secret.trim().to_string(),
            })?,
            None => {
                if rotate {
                    self.publisher.clear_key()?;
                }
                self.publisher.load_or_create_keypair()?
            }
        };
        Ok(json!({
            "public_key_hex": keypair.public_key().to_hex(),
            "key_file": self.keys.path().display().to_string(),
        }))
    }

    async fn sign_manifest(&self, file: &Path, target: &TargetArgs) -> Result<Value> {
        let document = read_json(file)?;
        let manifest = parse_manifest(&document).with_context(|| format!("{} is not a manifest", file.display()))?;
        let prepared = self.publisher.prepare_manifest(manifest, &options(target)).await?;
        self.commit(prepared)
    }

    /// Signing consumes the chain position even though nothing is sent.
    fn commit(&self, prepared: PreparedMessage) -> Result<Value> {
        self.publisher.commit(&prepared);
        info!(
            "[update-node] sealed {} seq {} for {}/{}",
            prepared.kind.as_str(),
            prepared.sealed.sequence,
            prepared.channel,
            prepared.platform
        );
        Ok(json!({
            "kind": prepared.kind.as_str(),
            "topic": prepared.topic,
            "channel": prepared.channel,
            "platform": prepared.platform,
            "sequence": prepared.sealed.sequence,
            "entry_hash": prepared.sealed.entry_hash,
            "vrf_output_hex": prepared.sealed.vrf_output_hex,
            "envelope": prepared.gossip.to_value()?,
            "feed_envelope": prepared.feed.to_value()?,
        }))
    }

    fn verify(&self, file: &Path, require_signature: bool) -> Result<Value> {
        let document = read_json(file)?;
        let envelope =
            Envelope::parse(&document).with_context(|| format!("{} is not an update envelope", file.display()))?;
        let verifier = UpdateVerifier::in_memory(self.config.sync.verifier.clone());
        let envelope_check = verifier.verify_envelope_security(&envelope, current_timestamp_ms(), require_signature);

        let payload = UpdatePayload::parse(&envelope.payload_value()).context("unrecognized payload")?;
        let (proof, local) = match &payload {
            UpdatePayload::Manifest(manifest) => {
                let local = self.store.vrf_chain_state(&manifest.channel, &manifest.platform);
                let own = proof_head(manifest.sequence, manifest.security.vrf.as_ref(), &local);
                (
                    Some(verifier.verify_vrf_chain_candidate(manifest, &own).map(|_| ())),
                    Some(verifier.verify_vrf_chain_candidate(manifest, &local).map(|_| ())),
                )
            }
            UpdatePayload::Revocation(_) | UpdatePayload::KillSwitch(_) => {
                let obj = &envelope.payload;
                let channel = fields::text(obj, &["channel"]).unwrap_or_else(|| DEFAULT_CHANNEL.to_string());
                let platform = fields::text(obj, &["platform"]).unwrap_or_else(|| DEFAULT_PLATFORM.to_string());
                let sequence = fields::uint(obj, &["sequence"]).unwrap_or(0);
                let vrf = obj.get("vrf").and_then(|v| parse_vrf_proof(v).ok());
                let local = self.store.vrf_chain_state(&channel, &platform);
                let own = proof_head(sequence, vrf.as_ref(), &local);
                (
                    Some(verifier.verify_control_vrf(obj, &channel, &platform, &own).map(|_| ())),
                    Some(verifier.verify_control_vrf(obj, &channel, &platform, &local).map(|_| ())),
                )
            }
            UpdatePayload::Attestation(_) => (None, None),
        };

        let valid = envelope_check.is_ok() && proof.as_ref().map_or(true, |p| p.is_ok());
        Ok(json!({
            "kind": payload.topic_kind().as_str(),
            "valid": valid,
            "envelope": outcome(&envelope_check),
            "proof": proof.as_ref().map(outcome),
            "extends_local_head": local.map(|l| l.is_ok()),
        }))
    }

    fn inspect_state(&self, full: bool) -> Result<Value> {
        let value = if full {
            serde_json::to_value(self.store.state())?
        } else {
            serde_json::to_value(self.store.snapshot())?
        };
        Ok(value)
    }
}

fn options(target: &TargetArgs) -> PublishOptions {
    PublishOptions {
        channel: target.channel.clone(),
        platform: target.platform.clone(),
        expires_in_ms: target.expires_in_ms,
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Head the entry claims to extend. Entries without a proof are checked
/// against `fallback` so the verifier reports what is missing.
fn proof_head(sequence: u64, vrf: Option<&VrfProof>, fallback: &ChainHead) -> ChainHead {
    match vrf {
        Some(vrf) => ChainHead::at(
            sequence.saturating_sub(1),
            &vrf.prev_manifest_hash,
            &vrf.prev_vrf_output_hex,
            0,
        ),
        None => fallback.clone(),
    }
}

fn outcome(result: &Result<(), VerifyError>) -> String {
    match result {
        Ok(()) => "ok".to_string(),
        Err(e) => e.reason(),
    }
}
