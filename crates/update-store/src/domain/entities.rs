//! # Store Entities
//!
//! Everything the version store persists. Field names are the persisted
//! JSON keys.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use update_protocol::{Carrier, ChainHead, ConflictCandidate, Manifest, DEFAULT_CHANNEL, DEFAULT_PLATFORM};

/// Update lifecycle.
///
/// `DETECTED → VERIFIED → ATTESTED → DOWNLOADED → STAGED → APPLYING → APPLIED`,
/// with `FAILED` and `REVOKED` reachable from any non-terminal state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// Manifest seen.
    #[default]
    Detected,
    /// Chain and security checks passed.
    Verified,
    /// Attestation threshold met.
    Attested,
    /// Artifact downloaded and hash-checked.
    Downloaded,
    /// Artifact handed to the applier.
    Staged,
    /// Apply in progress.
    Applying,
    /// Applied.
    Applied,
    /// Pipeline failure, see `last_error`.
    Failed,
    /// Revoked or killed.
    Revoked,
}

impl LifecycleState {
    /// Wire label.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Detected => "DETECTED",
            LifecycleState::Verified => "VERIFIED",
            LifecycleState::Attested => "ATTESTED",
            LifecycleState::Downloaded => "DOWNLOADED",
            LifecycleState::Staged => "STAGED",
            LifecycleState::Applying => "APPLYING",
            LifecycleState::Applied => "APPLIED",
            LifecycleState::Failed => "FAILED",
            LifecycleState::Revoked => "REVOKED",
        }
    }

    /// Parse a label, case-insensitively.
    pub fn parse(label: &str) -> Option<Self> {
        let state = match label.trim().to_uppercase().as_str() {
            "DETECTED" => LifecycleState::Detected,
            "VERIFIED" => LifecycleState::Verified,
            "ATTESTED" => LifecycleState::Attested,
            "DOWNLOADED" => LifecycleState::Downloaded,
            "STAGED" => LifecycleState::Staged,
            "APPLYING" => LifecycleState::Applying,
            "APPLIED" => LifecycleState::Applied,
            "FAILED" => LifecycleState::Failed,
            "REVOKED" => LifecycleState::Revoked,
            _ => return None,
        };
        Some(state)
    }

    /// `APPLIED`, `FAILED` and `REVOKED` end a pipeline run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Applied | LifecycleState::Failed | LifecycleState::Revoked)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Promotion status of the newest candidate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    /// Nothing pending.
    #[default]
    None,
    /// Carrier quorum not met.
    WaitingCarrier,
    /// An earlier sequence is missing.
    WaitingHistory,
    /// Promoted.
    Confirmed,
}

impl CandidateStatus {
    /// Parse a label. Unknown labels are `None`.
    pub fn parse(label: &str) -> Self {
        match label.trim() {
            "waiting_carrier" => CandidateStatus::WaitingCarrier,
            "waiting_history" => CandidateStatus::WaitingHistory,
            "confirmed" => CandidateStatus::Confirmed,
            _ => CandidateStatus::None,
        }
    }
}

/// Where the verified-latest version came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatestSource {
    /// Installed package reported by the platform.
    InstalledPackage,
    /// Network manifest that passed verification.
    NetworkManifest,
}

impl LatestSource {
    /// Parse a label. Anything but `installed_package` is a network manifest.
    pub fn parse(label: &str) -> Self {
        if label.trim() == "installed_package" {
            LatestSource::InstalledPackage
        } else {
            LatestSource::NetworkManifest
        }
    }
}

/// UI-facing view of the active scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSnapshot {
    /// Lifecycle state.
    pub state: LifecycleState,
    /// Manifest in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_id: Option<String>,
    /// Active channel.
    pub channel: String,
    /// Active platform.
    pub platform: String,
    /// Sequence of the manifest in flight.
    pub sequence: u64,
    /// Version of the manifest in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Applied version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_version: Option<String>,
    /// Applied version code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_version_code: Option<u64>,
    /// Version before the applied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,
    /// Version code before the applied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version_code: Option<u64>,
    /// Best known latest version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<String>,
    /// Best known latest version code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_version_code: Option<u64>,
    /// A verified-latest record exists for the scope.
    pub latest_manifest_verified: bool,
    /// Sequence of the verified-latest record.
    pub latest_manifest_verified_sequence: u64,
    /// Source of the verified-latest record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_manifest_source: Option<LatestSource>,
    /// Release notes summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_summary: Option<String>,
    /// Release notes body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_details: Option<String>,
    /// Release notes publication time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_published_at_ms: Option<u64>,
    /// Prompt the user about the latest version.
    pub show_update_prompt: bool,
    /// Promotion status.
    pub vrf_candidate_status: CandidateStatus,
    /// Carriers that delivered the newest candidate.
    pub vrf_candidate_carriers: BTreeSet<Carrier>,
    /// Outcome of the last manual check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_manual_check_reason: Option<String>,
    /// Machine-readable failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Start of the last manual check.
    pub last_checked_at_ms: u64,
    /// Last mutation.
    pub updated_at_ms: u64,
    /// Distinct positive attestors.
    pub attestor_count: u32,
    /// Attestors required before download.
    pub attestation_threshold: u32,
    /// Any artifact needs a native shell install.
    pub shell_required: bool,
    /// Manifest is an emergency rollout.
    pub emergency: bool,
    /// Manual check running.
    pub manual_check_inflight: bool,
}

impl Default for UpdateSnapshot {
    fn default() -> Self {
        Self {
            state: LifecycleState::Detected,
            manifest_id: None,
            channel: DEFAULT_CHANNEL.to_string(),
            platform: DEFAULT_PLATFORM.to_string(),
            sequence: 0,
            version: None,
            current_version: None,
            current_version_code: None,
            previous_version: None,
            previous_version_code: None,
            latest_version: None,
            latest_version_code: None,
            latest_manifest_verified: false,
            latest_manifest_verified_sequence: 0,
            latest_manifest_source: None,
            update_summary: None,
            update_details: None,
            update_published_at_ms: None,
            show_update_prompt: false,
            vrf_candidate_status: CandidateStatus::None,
            vrf_candidate_carriers: BTreeSet::new(),
            last_manual_check_reason: None,
            last_error: None,
            last_checked_at_ms: 0,
            updated_at_ms: 0,
            attestor_count: 0,
            attestation_threshold: 0,
            shell_required: false,
            emergency: false,
            manual_check_inflight: false,
        }
    }
}

/// Applied version of a scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedVersionState {
    /// Applied sequence, 0 for an installed package.
    pub sequence: u64,
    /// Applied manifest.
    pub manifest_id: String,
    /// Applied version.
    pub current_version: String,
    /// Applied version code.
    pub current_version_code: u64,
    /// Version before.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,
    /// Version code before.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version_code: Option<u64>,
    /// Last change.
    pub updated_at_ms: u64,
}

/// Best known latest version of a scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedLatestState {
    /// Sequence, 0 for an installed package.
    pub sequence: u64,
    /// Manifest id.
    pub manifest_id: String,
    /// Version.
    pub version: String,
    /// Version code.
    pub version_code: u64,
    /// Origin.
    pub source: LatestSource,
    /// Release notes summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_summary: Option<String>,
    /// Release notes body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_details: Option<String>,
    /// Release notes publication time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_published_at_ms: Option<u64>,
    /// Last change.
    pub updated_at_ms: u64,
}

/// A manifest waiting for carrier quorum and promotion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCandidate {
    /// `channel|platform|sequence|manifest_id|vrf_output`.
    pub candidate_id: String,
    /// Channel, lowercase.
    pub channel: String,
    /// Platform, lowercase.
    pub platform: String,
    /// Claimed sequence.
    pub sequence: u64,
    /// Manifest id.
    pub manifest_id: String,
    /// Manifest chain hash.
    pub manifest_hash: String,
    /// Manifest VRF output.
    pub vrf_output_hex: String,
    /// Carriers that delivered it.
    pub carriers: BTreeSet<Carrier>,
    /// Last seen.
    pub seen_at_ms: u64,
    /// Full manifest.
    pub manifest: Manifest,
}

impl PendingCandidate {
    /// Candidate id for a chain position.
    pub fn make_id(channel: &str, platform: &str, sequence: u64, manifest_id: &str, vrf_output_hex: &str) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            channel.trim().to_lowercase(),
            platform.trim().to_lowercase(),
            sequence,
            manifest_id.trim(),
            vrf_output_hex.trim().to_lowercase()
        )
    }
}

impl ConflictCandidate for PendingCandidate {
    fn sequence(&self) -> u64 {
        self.sequence
    }

    fn vrf_output_hex(&self) -> &str {
        &self.vrf_output_hex
    }
}

/// Kill-switch entry. `None` scope parts are wildcards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillSwitchEntry {
    /// Channel, `None` for all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Platform, `None` for all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Switch engaged.
    pub enabled: bool,
    /// Expiry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<u64>,
    /// Operator reason.
    #[serde(default)]
    pub reason: String,
}

impl KillSwitchEntry {
    /// `channel|platform` with `*` for wildcards.
    pub fn key(&self) -> String {
        format!(
            "{}|{}",
            self.channel.as_deref().unwrap_or("*").to_lowercase(),
            self.platform.as_deref().unwrap_or("*").to_lowercase()
        )
    }

    /// Engaged, unexpired and covering the scope.
    pub fn is_active_for(&self, channel: &str, platform: &str, now_ms: u64) -> bool {
        if !self.enabled {
            return false;
        }
        if self.expires_at_ms.map_or(false, |expiry| now_ms > expiry) {
            return false;
        }
        let covers = |part: &Option<String>, value: &str| {
            part.as_deref().map_or(true, |p| p.eq_ignore_ascii_case(value))
        };
        covers(&self.channel, channel) && covers(&self.platform, platform)
    }
}

/// Entire persisted store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStoreState {
    /// Active-scope view.
    pub snapshot: UpdateSnapshot,
    /// Manifest in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Manifest>,
    /// Artifact staged with the applier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staged_file_path: Option<String>,
    /// Pinned single-publisher key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trusted_publisher_pubkey: Option<String>,
    /// Hash of the next single-publisher key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trusted_next_pubkey_sha256: Option<String>,
    /// Highest manifest sequence seen.
    pub last_manifest_sequence_seen: u64,
    /// Positive attestors of the manifest in flight.
    pub attestors: Vec<String>,
    /// Revoked manifest ids.
    pub revoked_manifests: Vec<String>,
    /// Kill-switches, one per key.
    pub killswitches: Vec<KillSwitchEntry>,
    /// Highest applied sequence per scope.
    pub max_sequence_applied: BTreeMap<String, u64>,
    /// Named counters.
    pub metrics: BTreeMap<String, u64>,
    /// Applied version per scope.
    pub applied_version_by_scope: BTreeMap<String, ScopedVersionState>,
    /// Verified-latest version per scope.
    pub verified_latest_by_scope: BTreeMap<String, VerifiedLatestState>,
    /// Highest prompted sequence per scope.
    pub last_prompted_sequence_by_scope: BTreeMap<String, u64>,
    /// Highest prompted version code per scope.
    pub last_prompted_version_code_by_scope: BTreeMap<String, u64>,
    /// Chain head per scope.
    pub vrf_chain_by_scope: BTreeMap<String, ChainHead>,
    /// Pending candidates per scope, keyed by candidate id.
    pub pending_candidates_by_scope: BTreeMap<String, BTreeMap<String, PendingCandidate>>,
}

/// Synthetic manifest id for an installed package.
pub fn installed_manifest_id(channel: &str, platform: &str, version: &str, version_code: Option<u64>) -> String {
    let version = version.trim();
    let suffix = match version_code.filter(|c| *c > 0) {
        Some(code) => code.to_string(),
        None if version.is_empty() => "unknown".to_string(),
        None => version.to_string(),
    };
    format!("installed-{}-{}-{}", channel.to_lowercase(), platform.to_lowercase(), suffix)
}
