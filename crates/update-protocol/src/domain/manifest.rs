//! # Update Manifest
//!
//! A manifest names one candidate update for a `(channel, platform)` scope.
//! [`parse_manifest`] accepts the current schema and maps the older flat
//! descriptor (`url`, `versionCode`, `sha256`, ...) onto it. Legacy manifests
//! always carry `committee_threshold` security and are never chain-valid.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::{ProtocolError, ProtocolResult};
use super::fields::{self, Object};
use super::value_objects::{current_timestamp_ms, Scope, DEFAULT_CHANNEL, DEFAULT_PLATFORM, MAX_SEQUENCE};

/// Default manifest kind.
pub const MANIFEST_KIND: &str = "manifest_v2";

/// Only supported VRF scheme.
pub const VRF_SCHEME: &str = "ed25519_sig_vrf_v1";

/// Rollout stages used when none are given.
pub const DEFAULT_STAGES: [u8; 4] = [1, 10, 50, 100];

/// Committee threshold used when a manifest does not set one.
pub const DEFAULT_COMMITTEE_THRESHOLD: u32 = 3;

/// Artifact kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Complete package.
    #[default]
    Full,
    /// Binary diff against `diff_base`.
    Delta,
    /// Resource bundle applied in place.
    Resource,
}

impl ArtifactKind {
    /// Parse a kind label. Unknown labels fall back to `Full`.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "delta" | "diff" | "patch" => ArtifactKind::Delta,
            "resource" | "resources" => ArtifactKind::Resource,
            _ => ArtifactKind::Full,
        }
    }
}

/// Downloadable artifact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Target platform.
    pub platform: String,
    /// Artifact kind.
    pub kind: ArtifactKind,
    /// Location (`ipfs://`, `https://`, CID path).
    pub uri: String,
    /// Expected SHA-256 of the bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// Size in bytes, 0 when unknown.
    #[serde(default)]
    pub size_bytes: u64,
    /// Base version for delta artifacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_base: Option<String>,
    /// Needs a native install step after staging.
    #[serde(default)]
    pub shell_required: bool,
}

/// Staged rollout settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rollout {
    /// Percent of devices that take the update (0-100).
    pub percent: u8,
    /// Emergency updates bypass rollout gating and apply immediately.
    pub emergency: bool,
    /// Sorted unique stage percentages.
    pub stages: Vec<u8>,
}

impl Default for Rollout {
    fn default() -> Self {
        Self {
            percent: 100,
            emergency: false,
            stages: DEFAULT_STAGES.to_vec(),
        }
    }
}

/// Install policy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Update is mandatory.
    pub mandatory: bool,
    /// Minimum installed version code allowed to take this update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_app_version_code: Option<u64>,
    /// Start of install window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_start_epoch_ms: Option<u64>,
    /// End of install window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_end_epoch_ms: Option<u64>,
}

/// Security mode of a manifest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SecurityMode {
    /// Hash-chained manifests with a VRF-style proof.
    #[serde(rename = "vrf_chain_v1")]
    #[default]
    VrfChainV1,
    /// Single publisher signature.
    #[serde(rename = "single_publisher_chain")]
    SinglePublisherChain,
    /// Committee signatures over a threshold.
    #[serde(rename = "committee_threshold")]
    CommitteeThreshold,
}

impl SecurityMode {
    /// Wire label.
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityMode::VrfChainV1 => "vrf_chain_v1",
            SecurityMode::SinglePublisherChain => "single_publisher_chain",
            SecurityMode::CommitteeThreshold => "committee_threshold",
        }
    }
}

/// Signature entry of a committee or single-publisher manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSignature {
    /// Signer public key (hex).
    pub signer: String,
    /// Signature (base64).
    pub signature: String,
}

/// VRF chain proof block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VrfProof {
    /// Always [`VRF_SCHEME`].
    pub scheme: String,
    /// Publishing peer.
    pub publisher_peer_id: String,
    /// Ed25519 public key, lowercase hex.
    pub vrf_public_key_hex: String,
    /// Hash of the previous manifest in the scope chain.
    pub prev_manifest_hash: String,
    /// VRF output of the previous manifest.
    pub prev_vrf_output_hex: String,
    /// Chain-linked input.
    pub vrf_input_hex: String,
    /// Signature over the input bytes, base64.
    pub vrf_proof_base64: String,
    /// SHA-256 of the proof bytes.
    pub vrf_output_hex: String,
}

/// Manifest security block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Security {
    /// Mode.
    pub mode: SecurityMode,
    /// Committee threshold.
    pub threshold: u32,
    /// Committee public keys.
    #[serde(default)]
    pub committee_keys: Vec<String>,
    /// Collected signatures.
    #[serde(default)]
    pub signatures: Vec<ManifestSignature>,
    /// Publisher key for single-publisher mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher_pubkey: Option<String>,
    /// Commitment to the next publisher key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_publisher_pubkey_sha256: Option<String>,
    /// Positive attestations required before download.
    #[serde(default)]
    pub attestation_threshold: u32,
    /// VRF proof block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vrf: Option<VrfProof>,
}

impl Default for Security {
    fn default() -> Self {
        Self {
            mode: SecurityMode::CommitteeThreshold,
            threshold: 0,
            committee_keys: Vec::new(),
            signatures: Vec::new(),
            publisher_pubkey: None,
            next_publisher_pubkey_sha256: None,
            attestation_threshold: 0,
            vrf: None,
        }
    }
}

/// External anchoring of a manifest hash.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    /// Anchor chain name.
    pub chain: String,
    /// Anchoring transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Anchored manifest hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_hash: Option<String>,
}

/// Release notes carried in `metadata.release_notes`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseNotes {
    /// One-line summary.
    pub summary: String,
    /// Full notes.
    pub details: String,
    /// Publication time.
    pub published_at_ms: u64,
}

impl ReleaseNotes {
    /// Parse a release-notes object. Summary and details must be non-empty.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let summary = fields::text_strict(obj, &["summary"])?;
        let details = fields::text_strict(obj, &["details"])?;
        let published_at_ms = fields::uint(obj, &["published_at_ms", "publishedAtMs"])
            .unwrap_or_else(current_timestamp_ms);
        Some(Self {
            summary,
            details,
            published_at_ms,
        })
    }
}

/// An update manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Message kind.
    pub kind: String,
    /// Schema version (>= 2).
    pub schema_version: u32,
    /// Manifest identifier.
    pub manifest_id: String,
    /// Release channel.
    pub channel: String,
    /// Target platform.
    pub platform: String,
    /// Position in the scope chain.
    pub sequence: u64,
    /// Human readable version.
    pub version: String,
    /// Monotonic version code.
    pub version_code: u64,
    /// Artifacts (at least one).
    pub artifacts: Vec<Artifact>,
    /// Rollout settings.
    pub rollout: Rollout,
    /// Install policy.
    pub policy: Policy,
    /// Security block.
    pub security: Security,
    /// Optional external anchor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<Anchor>,
    /// Free-form metadata, with normalized `release_notes`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl Manifest {
    /// Scope of this manifest.
    pub fn scope(&self) -> Scope {
        Scope::new(&self.channel, &self.platform)
    }

    /// True for `vrf_chain_v1` manifests carrying a complete VRF block.
    pub fn is_chain_valid_shape(&self) -> bool {
        self.security.mode == SecurityMode::VrfChainV1 && self.security.vrf.is_some()
    }

    /// Artifact for `preferred_platform`, then for the manifest platform, then the first.
    pub fn select_artifact(&self, preferred_platform: &str) -> Option<&Artifact> {
        let preferred = preferred_platform.trim().to_lowercase();
        if !preferred.is_empty() {
            if let Some(found) = self
                .artifacts
                .iter()
                .find(|a| a.platform.to_lowercase() == preferred)
            {
                return Some(found);
            }
        }
        let own = self.platform.to_lowercase();
        self.artifacts
            .iter()
            .find(|a| a.platform.to_lowercase() == own)
            .or_else(|| self.artifacts.first())
    }

    /// Any artifact needs a native install step.
    pub fn shell_required(&self) -> bool {
        self.artifacts.iter().any(|a| a.shell_required)
    }

    /// Release notes from metadata, if valid.
    pub fn release_notes(&self) -> Option<ReleaseNotes> {
        let metadata = self.metadata.as_ref()?;
        fields::first(metadata, &["release_notes", "releaseNotes"]).and_then(ReleaseNotes::from_value)
    }

    /// Serialize to a JSON value.
    pub fn to_value(&self) -> ProtocolResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Default manifest id for a scope position.
pub fn default_manifest_id(channel: &str, platform: &str, sequence: u64, version_code: u64) -> String {
    let n = if sequence > 0 { sequence } else { version_code };
    format!("mf_{}_{}_{}", channel, platform, n)
}

/// Whether an object looks like a current-schema manifest.
pub fn is_likely_manifest_v2(obj: &Object) -> bool {
    if fields::number(obj, &["schema_version"]) == Some(2.0) {
        return true;
    }
    let kind = fields::text(obj, &["kind"]).unwrap_or_default().to_lowercase();
    if kind.contains(MANIFEST_KIND) {
        return true;
    }
    ["sequence", "artifacts", "platform", "channel"]
        .iter()
        .all(|key| obj.contains_key(*key))
}

/// Parse a manifest, mapping the legacy descriptor when the input is not
/// current-schema.
pub fn parse_manifest(value: &Value) -> ProtocolResult<Manifest> {
    let obj = fields::as_object(value).ok_or(ProtocolError::NotAnObject)?;
    if is_likely_manifest_v2(obj) {
        parse_manifest_v2(obj)
    } else {
        map_legacy_manifest(obj)
    }
}

/// Parse a VRF proof block. Every field must be present and the scheme supported.
pub fn parse_vrf_proof(value: &Value) -> ProtocolResult<VrfProof> {
    let obj = fields::as_object(value).ok_or(ProtocolError::NotAnObject)?;
    let scheme = fields::text_strict(obj, &["scheme"])
        .unwrap_or_else(|| VRF_SCHEME.to_string())
        .to_lowercase();
    if scheme != VRF_SCHEME {
        return Err(ProtocolError::UnsupportedScheme(scheme));
    }
    let lower = |keys: &[&str], name: &'static str| -> ProtocolResult<String> {
        fields::text_strict(obj, keys)
            .map(|s| s.to_lowercase())
            .ok_or(ProtocolError::MissingField(name))
    };
    Ok(VrfProof {
        scheme,
        publisher_peer_id: fields::text_strict(obj, &["publisher_peer_id", "publisherPeerId"])
            .ok_or(ProtocolError::MissingField("publisher_peer_id"))?,
        vrf_public_key_hex: lower(&["vrf_public_key_hex", "vrfPublicKeyHex"], "vrf_public_key_hex")?,
        prev_manifest_hash: lower(&["prev_manifest_hash", "prevManifestHash"], "prev_manifest_hash")?,
        prev_vrf_output_hex: lower(&["prev_vrf_output_hex", "prevVrfOutputHex"], "prev_vrf_output_hex")?,
        vrf_input_hex: lower(&["vrf_input_hex", "vrfInputHex"], "vrf_input_hex")?,
        vrf_proof_base64: fields::text_strict(obj, &["vrf_proof_base64", "vrfProofBase64"])
            .ok_or(ProtocolError::MissingField("vrf_proof_base64"))?,
        vrf_output_hex: lower(&["vrf_output_hex", "vrfOutputHex"], "vrf_output_hex")?,
    })
}

fn parse_optional_vrf(value: Option<&Value>) -> Option<VrfProof> {
    value.and_then(|v| parse_vrf_proof(v).ok())
}

fn parse_artifact(item: &Object, default_platform: &str) -> Option<Artifact> {
    let uri = fields::text(item, &["uri", "url", "apk_cid"])?;
    Some(Artifact {
        platform: fields::text_strict(item, &["platform"]).unwrap_or_else(|| default_platform.to_string()),
        kind: fields::text(item, &["kind", "mode"])
            .map(|k| ArtifactKind::parse(&k))
            .unwrap_or_default(),
        uri,
        sha256: fields::text_strict(item, &["sha256"]).map(|s| s.to_lowercase()),
        size_bytes: fields::uint(item, &["size_bytes", "size", "sizeBytes"]).unwrap_or(0),
        diff_base: fields::text(item, &["diff_base", "base"]),
        shell_required: fields::flag(item, &["shell_required"]).unwrap_or(false),
    })
}

fn parse_artifacts(raw: Option<&Value>, platform: &str) -> Vec<Artifact> {
    match raw {
        Some(Value::Array(rows)) => rows
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|item| parse_artifact(item, platform))
            .collect(),
        Some(Value::Object(by_platform)) => by_platform
            .iter()
            .filter_map(|(key, node)| {
                let item = node.as_object()?;
                let default_platform = if key.trim().is_empty() { platform } else { key.as_str() };
                parse_artifact(item, default_platform)
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_signatures(raw: Option<&Value>) -> Vec<ManifestSignature> {
    let Some(Value::Array(rows)) = raw else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(Value::as_object)
        .filter_map(|item| {
            Some(ManifestSignature {
                signer: fields::text(item, &["signer", "key_id"])?,
                signature: fields::text(item, &["signature", "sig"])?,
            })
        })
        .collect()
}

fn parse_stages(raw: Option<&Value>) -> Vec<u8> {
    let mut stages: Vec<u8> = match raw {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(fields::as_number)
            .map(|n| fields::truncate_u64(n).min(100) as u8)
            .collect(),
        _ => Vec::new(),
    };
    stages.sort_unstable();
    stages.dedup();
    if stages.is_empty() {
        DEFAULT_STAGES.to_vec()
    } else {
        stages
    }
}

fn normalize_metadata(raw: Option<&Value>) -> Option<Map<String, Value>> {
    let obj = raw?.as_object()?;
    let mut normalized = obj.clone();
    if let Some(notes) =
        fields::first(obj, &["release_notes", "releaseNotes"]).and_then(ReleaseNotes::from_value)
    {
        if let Ok(value) = serde_json::to_value(notes) {
            normalized.insert("release_notes".to_string(), value);
        }
    }
    Some(normalized)
}

fn percent(value: Option<u64>) -> u8 {
    value.unwrap_or(100).min(100) as u8
}

fn parse_manifest_v2(obj: &Object) -> ProtocolResult<Manifest> {
    let channel = fields::text_strict(obj, &["channel"]).unwrap_or_else(|| DEFAULT_CHANNEL.to_string());
    let platform = fields::text_strict(obj, &["platform"]).unwrap_or_else(|| DEFAULT_PLATFORM.to_string());
    let sequence = fields::sequence(obj, &["sequence"])?.unwrap_or(0);
    let version = fields::text(obj, &["version", "version_name", "versionName"])
        .unwrap_or_else(|| "0.0.0".to_string());
    let version_code = fields::uint(obj, &["version_code", "versionCode"]).unwrap_or(sequence);

    let artifacts = parse_artifacts(obj.get("artifacts"), &platform);
    if artifacts.is_empty() {
        return Err(ProtocolError::NoArtifacts);
    }

    let empty = Object::new();
    let rollout_obj = obj.get("rollout").and_then(Value::as_object).unwrap_or(&empty);
    let policy_obj = obj.get("policy").and_then(Value::as_object).unwrap_or(&empty);
    let security_obj = obj.get("security").and_then(Value::as_object).unwrap_or(&empty);

    let vrf = parse_optional_vrf(fields::first(security_obj, &["vrf"]).or_else(|| fields::first(obj, &["vrf"])));
    let publisher_pubkey = fields::text_strict(security_obj, &["publisher_pubkey", "publisherPubkey"])
        .or_else(|| fields::text_strict(obj, &["publisher_pubkey"]));
    let mode = match fields::text(security_obj, &["mode"]).unwrap_or_default().to_lowercase().as_str() {
        "vrf_chain_v1" | "vrf" => SecurityMode::VrfChainV1,
        "single_publisher_chain" | "single" => SecurityMode::SinglePublisherChain,
        "committee_threshold" => SecurityMode::CommitteeThreshold,
        _ if vrf.is_some() => SecurityMode::VrfChainV1,
        _ if publisher_pubkey.is_some() => SecurityMode::SinglePublisherChain,
        _ => SecurityMode::CommitteeThreshold,
    };

    let committee_keys = fields::string_list(
        fields::first(security_obj, &["committee_keys", "committee"])
            .or_else(|| fields::first(obj, &["committee_keys"])),
    );
    let signatures = parse_signatures(
        fields::first(security_obj, &["signatures"]).or_else(|| fields::first(obj, &["signatures"])),
    );
    let threshold = fields::uint(security_obj, &["threshold"])
        .or_else(|| fields::uint(obj, &["min_signatures"]))
        .unwrap_or(DEFAULT_COMMITTEE_THRESHOLD as u64) as u32;

    let anchor_obj = obj.get("anchor").and_then(Value::as_object);
    let anchor = if anchor_obj.is_some()
        || fields::text(obj, &["anchor_chain"]).is_some()
        || fields::text(obj, &["anchor_tx_hash"]).is_some()
    {
        let a = anchor_obj.unwrap_or(&empty);
        Some(Anchor {
            chain: fields::text_strict(a, &["chain"])
                .or_else(|| fields::text_strict(obj, &["anchor_chain"]))
                .unwrap_or_default(),
            tx_hash: fields::text_strict(a, &["tx_hash"]).or_else(|| fields::text_strict(obj, &["anchor_tx_hash"])),
            manifest_hash: fields::text_strict(a, &["manifest_hash"])
                .or_else(|| fields::text_strict(obj, &["manifest_hash"])),
        })
    } else {
        None
    };

    Ok(Manifest {
        kind: fields::text_strict(obj, &["kind"]).unwrap_or_else(|| MANIFEST_KIND.to_string()),
        schema_version: fields::uint(obj, &["schema_version"]).unwrap_or(2).max(2) as u32,
        manifest_id: fields::text_strict(obj, &["manifest_id"])
            .unwrap_or_else(|| default_manifest_id(&channel, &platform, sequence, version_code)),
        sequence,
        version,
        version_code,
        artifacts,
        rollout: Rollout {
            percent: percent(fields::uint(rollout_obj, &["percent"]).or_else(|| fields::uint(obj, &["percent"]))),
            emergency: fields::flag(rollout_obj, &["emergency"]).unwrap_or(false),
            stages: parse_stages(rollout_obj.get("stages")),
        },
        policy: Policy {
            mandatory: fields::flag(policy_obj, &["mandatory"])
                .or_else(|| fields::flag(obj, &["mandatory"]))
                .unwrap_or(false),
            min_app_version_code: fields::uint(policy_obj, &["minAppVersionCode", "min_app_version_code"]),
            window_start_epoch_ms: fields::uint(policy_obj, &["windowStartEpochMs", "window_start_epoch_ms"]),
            window_end_epoch_ms: fields::uint(policy_obj, &["windowEndEpochMs", "window_end_epoch_ms"]),
        },
        security: Security {
            mode,
            threshold,
            committee_keys,
            signatures,
            publisher_pubkey,
            next_publisher_pubkey_sha256: fields::text_strict(
                security_obj,
                &["next_publisher_pubkey_sha256", "nextPublisherPubkeySha256"],
            )
            .or_else(|| fields::text_strict(obj, &["next_publisher_pubkey_sha256"])),
            attestation_threshold: fields::uint(security_obj, &["attestation_threshold"]).unwrap_or(0) as u32,
            vrf,
        },
        anchor,
        metadata: normalize_metadata(obj.get("metadata")),
        channel,
        platform,
    })
}

/// Map the legacy flat descriptor onto a manifest with legacy trust.
pub fn map_legacy_manifest(obj: &Object) -> ProtocolResult<Manifest> {
    let uri = fields::text(obj, &["url", "apk_cid"]).ok_or(ProtocolError::MissingField("url"))?;
    let version_code = fields::uint(obj, &["versionCode", "version_code"]).unwrap_or(0);
    let version = fields::text(obj, &["version", "versionName"]).unwrap_or_else(|| version_code.to_string());
    let channel = fields::text_strict(obj, &["channel"]).unwrap_or_else(|| DEFAULT_CHANNEL.to_string());
    let platform = fields::text_strict(obj, &["platform"]).unwrap_or_else(|| DEFAULT_PLATFORM.to_string());
    let sequence = match fields::sequence(obj, &["sequence"])? {
        Some(sequence) => sequence,
        None if version_code <= MAX_SEQUENCE => version_code,
        None => return Err(ProtocolError::InvalidSequence),
    };

    let mut metadata = Map::new();
    metadata.insert("legacy_v1_mapped".to_string(), Value::Bool(true));

    Ok(Manifest {
        kind: MANIFEST_KIND.to_string(),
        schema_version: 2,
        manifest_id: fields::text_strict(obj, &["manifest_id"])
            .unwrap_or_else(|| default_manifest_id(&channel, &platform, sequence, version_code)),
        sequence,
        version,
        version_code,
        artifacts: vec![Artifact {
            platform: platform.clone(),
            kind: fields::text(obj, &["mode"])
                .map(|k| ArtifactKind::parse(&k))
                .unwrap_or_default(),
            uri,
            sha256: fields::text_strict(obj, &["sha256"]).map(|s| s.to_lowercase()),
            size_bytes: fields::uint(obj, &["size", "sizeBytes"]).unwrap_or(0),
            diff_base: fields::text(obj, &["base"]),
            shell_required: false,
        }],
        rollout: Rollout {
            percent: percent(fields::uint(obj, &["percent"])),
            ..Rollout::default()
        },
        policy: Policy {
            mandatory: fields::flag(obj, &["mandatory"]).unwrap_or(false),
            min_app_version_code: fields::uint(obj, &["minAppVersionCode"]),
            window_start_epoch_ms: fields::uint(obj, &["windowStartEpochMs"]),
            window_end_epoch_ms: fields::uint(obj, &["windowEndEpochMs"]),
        },
        security: Security::default(),
        anchor: None,
        metadata: Some(metadata),
        channel,
        platform,
    })
}
