//! # Sync Entities
//!
//! Values exchanged with the platform update plugin, and the metric names
//! the orchestrator counts under.

use serde::{Deserialize, Serialize};

/// Counter names.
pub mod metrics {
    /// Manifest messages received on any carrier.
    pub const MANIFEST_RECEIVED: &str = "update_manifest_received_total";
    /// Envelopes dropped as expired, tampered or replayed.
    pub const ANTIREPLAY_DROP: &str = "update_antireplay_drop_total";
    /// Chain or control verification failures.
    pub const VRF_VERIFY_FAIL: &str = "update_vrf_verify_fail_total";
    /// Messages waiting for a second carrier.
    pub const VRF_CARRIER_WAIT: &str = "update_vrf_carrier_wait_total";
    /// Promotions blocked by a missing earlier sequence.
    pub const VRF_GAP_BLOCK: &str = "update_vrf_gap_block_total";
    /// Fork losers discarded.
    pub const VRF_CONFLICT_RESOLVED: &str = "update_vrf_conflict_resolved_total";
    /// Candidates not ahead of the applied version.
    pub const SEQUENCE_REGRESS: &str = "update_sequence_regress_total";
    /// Manifests that advanced the chain.
    pub const VRF_MANIFEST_ACCEPTED: &str = "update_vrf_manifest_accepted_total";
    /// Successful installs.
    pub const APPLY_SUCCESS: &str = "update_apply_success_total";
    /// Positive attestations recorded.
    pub const ATTESTATION_VERIFIED: &str = "update_attestation_verified_total";
    /// Control messages that changed the current manifest.
    pub const VRF_CONTROL_APPLIED: &str = "update_vrf_control_applied_total";
    /// Revocations or kill-switches that revoked the current manifest.
    pub const REVOKE_APPLIED: &str = "update_revoke_applied_total";
    /// P2P downloads that fell back to HTTPS.
    pub const DOWNLOAD_FALLBACK: &str = "update_download_fallback_total";
    /// Candidates or controls turned away by, or evicted from, a pending pool.
    pub const PENDING_DROPPED: &str = "update_pending_dropped_total";
}

/// Outcome of a native install the plugin ran out of band.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStatus {
    /// Nothing to report.
    #[default]
    None,
    /// Install finished.
    Success,
    /// Install failed.
    Failed,
    /// Install still running.
    Pending,
}

/// Install result consumed from the plugin.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallResult {
    /// Status.
    pub status: InstallStatus,
    /// Manifest the install belonged to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_id: Option<String>,
    /// Failure text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl InstallResult {
    /// Nothing to report.
    pub fn none() -> Self {
        Self::default()
    }

    /// Successful install of `manifest_id`.
    pub fn success(manifest_id: &str) -> Self {
        Self {
            status: InstallStatus::Success,
            manifest_id: Some(manifest_id.to_string()),
            message: None,
        }
    }

    /// Failed install of `manifest_id`.
    pub fn failed(manifest_id: &str, message: Option<&str>) -> Self {
        Self {
            status: InstallStatus::Failed,
            manifest_id: Some(manifest_id.to_string()),
            message: message.map(str::to_string),
        }
    }
}

/// Installed package version reported by the platform.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledVersion {
    /// Version text.
    pub version: String,
    /// Version code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_code: Option<u64>,
    /// Version replaced by the last install.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,
    /// Version code replaced by the last install.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version_code: Option<u64>,
}

/// Result of a native apply call that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// Applied now.
    Applied,
    /// Installer running; the result arrives through an install result.
    PendingInstall,
    /// The user must confirm the install.
    RequiresUserAction,
}

/// Chunk request sent to an artifact provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRequest {
    /// Always `artifact`.
    pub kind: String,
    /// Manifest the artifact belongs to.
    pub manifest_id: String,
    /// Artifact URI.
    pub uri: String,
    /// Expected artifact hash.
    pub sha256: String,
}

impl ChunkRequest {
    /// Request for one artifact.
    pub fn artifact(manifest_id: &str, uri: &str, sha256: &str) -> Self {
        Self {
            kind: "artifact".to_string(),
            manifest_id: manifest_id.to_string(),
            uri: uri.to_string(),
            sha256: sha256.to_string(),
        }
    }
}

/// Where downloaded bytes came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadSource {
    /// A peer provider.
    P2p,
    /// The HTTPS gateway.
    Https,
}

/// Downloaded artifact bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadedArtifact {
    /// Bytes.
    pub bytes: Vec<u8>,
    /// Source.
    pub source: DownloadSource,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_install_result_wire_shape() {
        let parsed: InstallResult =
            serde_json::from_value(json!({"status": "failed", "manifest_id": "m-1", "message": "oom"})).unwrap();
        assert_eq!(parsed, InstallResult::failed("m-1", Some("oom")));
        let empty: InstallResult = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty.status, InstallStatus::None);
    }

    #[test]
    fn test_chunk_request_shape() {
        let request = ChunkRequest::artifact("m-1", "ipfs://bafy", "ab");
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"kind": "artifact", "manifest_id": "m-1", "uri": "ipfs://bafy", "sha256": "ab"})
        );
    }
}
