//! # Control Messages
//!
//! Revocations and kill-switches ride the same VRF chain as manifests and
//! consume a sequence number. Attestations are peer verdicts on a manifest
//! and are not chained.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{ProtocolError, ProtocolResult};
use super::fields::{self, Object};
use super::manifest::{parse_vrf_proof, Manifest, VrfProof};
use super::value_objects::current_timestamp_ms;

/// Default revocation kind.
pub const REVOCATION_KIND: &str = "revocation_v2";
/// Default kill-switch kind.
pub const KILL_SWITCH_KIND: &str = "killswitch_v2";
/// Default attestation kind.
pub const ATTESTATION_KIND: &str = "attestation_v2";

fn kind_of(obj: &Object) -> String {
    fields::text(obj, &["kind"]).unwrap_or_default().to_lowercase()
}

fn schema_version(obj: &Object) -> u32 {
    fields::uint(obj, &["schema_version"]).unwrap_or(2).max(2) as u32
}

fn optional_vrf(obj: &Object) -> Option<VrfProof> {
    obj.get("vrf").and_then(|v| parse_vrf_proof(v).ok())
}

fn same_label(expected: Option<&str>, actual: &str) -> bool {
    expected.map_or(true, |e| e.to_lowercase() == actual.to_lowercase())
}

/// Revocation of one or more manifests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revocation {
    /// Message kind.
    pub kind: String,
    /// Schema version.
    pub schema_version: u32,
    /// Chain sequence consumed by this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// Revoked manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_id: Option<String>,
    /// Channel filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Platform filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Manifests at or below this sequence are revoked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sequence: Option<u64>,
    /// Reason text.
    pub reason: String,
    /// Issue time.
    pub timestamp_ms: u64,
    /// Legacy signer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<String>,
    /// Legacy signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Additional revoked manifest ids.
    #[serde(default)]
    pub targets: Vec<String>,
    /// VRF chain proof.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vrf: Option<VrfProof>,
}

impl Revocation {
    /// Whether an object looks like a revocation.
    pub fn is_likely(obj: &Object) -> bool {
        let kind = kind_of(obj);
        kind.contains("revoke")
            || kind.contains("revocation")
            || obj.contains_key("manifest_id")
            || obj.contains_key("max_sequence")
    }

    /// Parse a revocation.
    pub fn parse(value: &Value) -> ProtocolResult<Self> {
        let obj = fields::as_object(value).ok_or(ProtocolError::NotAnObject)?;
        if !Self::is_likely(obj) {
            return Err(ProtocolError::NotRecognized("revocation"));
        }
        let targets = match obj.get("targets") {
            Some(Value::String(list)) => list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            other => fields::string_list(other),
        };
        Ok(Self {
            kind: fields::text(obj, &["kind"]).unwrap_or_else(|| REVOCATION_KIND.to_string()),
            schema_version: schema_version(obj),
            sequence: fields::uint(obj, &["sequence"]),
            manifest_id: fields::text(obj, &["manifest_id", "manifestId"]),
            channel: fields::text(obj, &["channel"]),
            platform: fields::text(obj, &["platform"]),
            max_sequence: fields::uint(obj, &["max_sequence", "sequence"]),
            reason: fields::text(obj, &["reason"]).unwrap_or_else(|| "revoked".to_string()),
            timestamp_ms: fields::uint(obj, &["timestamp_ms"]).unwrap_or_else(current_timestamp_ms),
            signer: fields::text(obj, &["signer"]),
            signature: fields::text(obj, &["signature"]),
            targets,
            vrf: optional_vrf(obj),
        })
    }

    /// Whether this revocation covers `manifest`.
    pub fn applies_to(&self, manifest: &Manifest) -> bool {
        same_label(self.channel.as_deref(), &manifest.channel)
            && same_label(self.platform.as_deref(), &manifest.platform)
            && self
                .manifest_id
                .as_deref()
                .map_or(true, |id| id == manifest.manifest_id)
            && self.max_sequence.map_or(true, |max| manifest.sequence <= max)
    }

    /// Every manifest id named by this revocation.
    pub fn revoked_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.manifest_id.iter().cloned().collect();
        for target in &self.targets {
            if !ids.contains(target) {
                ids.push(target.clone());
            }
        }
        ids
    }
}

/// Emergency stop for a scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillSwitch {
    /// Message kind.
    pub kind: String,
    /// Schema version.
    pub schema_version: u32,
    /// Chain sequence consumed by this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// Channel filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Platform filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Switch state.
    pub enabled: bool,
    /// Reason text.
    pub reason: String,
    /// Issue time.
    pub issued_at_ms: u64,
    /// Expiry, none for indefinite.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<u64>,
    /// Legacy signer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<String>,
    /// Legacy signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// VRF chain proof.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vrf: Option<VrfProof>,
}

impl KillSwitch {
    /// Whether an object looks like a kill-switch.
    pub fn is_likely(obj: &Object) -> bool {
        let kind = kind_of(obj);
        kind.contains("killswitch")
            || kind.contains("kill_switch")
            || (obj.contains_key("enabled") && obj.contains_key("platform"))
    }

    /// Parse a kill-switch.
    pub fn parse(value: &Value) -> ProtocolResult<Self> {
        let obj = fields::as_object(value).ok_or(ProtocolError::NotAnObject)?;
        if !Self::is_likely(obj) {
            return Err(ProtocolError::NotRecognized("killswitch"));
        }
        Ok(Self {
            kind: fields::text(obj, &["kind"]).unwrap_or_else(|| KILL_SWITCH_KIND.to_string()),
            schema_version: schema_version(obj),
            sequence: fields::uint(obj, &["sequence"]),
            channel: fields::text(obj, &["channel"]),
            platform: fields::text(obj, &["platform"]),
            enabled: fields::flag(obj, &["enabled"]).unwrap_or(true),
            reason: fields::text(obj, &["reason"]).unwrap_or_else(|| "killswitch".to_string()),
            issued_at_ms: fields::uint(obj, &["issued_at_ms", "timestamp_ms"])
                .unwrap_or_else(current_timestamp_ms),
            expires_at_ms: fields::uint(obj, &["expires_at_ms"]),
            signer: fields::text(obj, &["signer"]),
            signature: fields::text(obj, &["signature"]),
            vrf: optional_vrf(obj),
        })
    }

    /// Enabled and not expired at `now_ms`.
    pub fn is_active(&self, now_ms: u64) -> bool {
        self.enabled && self.expires_at_ms.map_or(true, |expiry| now_ms <= expiry)
    }

    /// Whether the switch covers a scope.
    pub fn applies_to(&self, channel: &str, platform: &str) -> bool {
        same_label(self.channel.as_deref(), channel) && same_label(self.platform.as_deref(), platform)
    }
}

/// Peer verdict on a manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    /// Message kind.
    pub kind: String,
    /// Schema version.
    pub schema_version: u32,
    /// Attested manifest.
    pub manifest_id: String,
    /// Attesting peer.
    pub attestor_peer_id: String,
    /// `ok` for a positive verdict.
    pub verdict: String,
    /// Issue time.
    pub timestamp_ms: u64,
    /// Signer, the attestor by default.
    pub signer: String,
    /// Signature, possibly empty.
    #[serde(default)]
    pub signature: String,
}

impl Attestation {
    /// Whether an object looks like an attestation.
    pub fn is_likely(obj: &Object) -> bool {
        kind_of(obj).contains(ATTESTATION_KIND)
            || (obj.contains_key("manifest_id") && obj.contains_key("attestor_peer_id"))
    }

    /// Parse an attestation.
    pub fn parse(value: &Value) -> ProtocolResult<Self> {
        let obj = fields::as_object(value).ok_or(ProtocolError::NotAnObject)?;
        if !Self::is_likely(obj) {
            return Err(ProtocolError::NotRecognized("attestation"));
        }
        let manifest_id = fields::text(obj, &["manifest_id", "manifestId"])
            .ok_or(ProtocolError::MissingField("manifest_id"))?;
        let attestor_peer_id = fields::text(obj, &["attestor_peer_id", "attestor"])
            .ok_or(ProtocolError::MissingField("attestor_peer_id"))?;
        Ok(Self {
            kind: fields::text(obj, &["kind"]).unwrap_or_else(|| ATTESTATION_KIND.to_string()),
            schema_version: schema_version(obj),
            verdict: fields::text(obj, &["verdict"]).unwrap_or_else(|| "ok".to_string()),
            timestamp_ms: fields::uint(obj, &["timestamp_ms"]).unwrap_or_else(current_timestamp_ms),
            signer: fields::text(obj, &["signer"]).unwrap_or_else(|| attestor_peer_id.clone()),
            signature: fields::text(obj, &["signature"]).unwrap_or_default(),
            manifest_id,
            attestor_peer_id,
        })
    }

    /// Verdict is `ok`.
    pub fn is_positive(&self) -> bool {
        self.verdict.trim().eq_ignore_ascii_case("ok")
    }
}
