//! Sync configuration.

use serde::{Deserialize, Serialize};
use update_protocol::Carrier;
use update_verifier::VerifierConfig;

/// Sync orchestrator configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Carriers that count towards quorum.
    pub required_carriers: Vec<Carrier>,
    /// Distinct required carriers a message needs. Clamped to `1..=len`.
    pub carrier_quorum: usize,
    /// Hard limit on a manual transport check.
    pub manual_check_timeout_ms: u64,
    /// Providers asked for an artifact.
    pub provider_limit: usize,
    /// Budget for the whole P2P download attempt.
    pub provider_timeout_ms: u64,
    /// Max bytes requested from one provider.
    pub provider_chunk_bytes: usize,
    /// HTTPS gateway for `ipfs://` and `ipns://` URIs.
    pub ipfs_gateway: String,
    /// Accept bare attestations that are not wrapped in an envelope.
    pub allow_raw_unsigned_attestation: bool,
    /// Manifest candidates kept per scope.
    pub max_pending_candidates: usize,
    /// Control messages buffered per scope.
    pub max_pending_controls: usize,
    /// How far past the chain head a pending entry may sit. Unbounded at genesis.
    pub pending_window: u64,
    /// Pending entries not seen again within this long are dropped. 0 keeps them.
    pub pending_ttl_ms: u64,
    /// Verifier settings.
    pub verifier: VerifierConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            required_carriers: vec![Carrier::Gossip, Carrier::Feed],
            carrier_quorum: 2,
            manual_check_timeout_ms: 8_000,
            provider_limit: 8,
            provider_timeout_ms: 15_000,
            provider_chunk_bytes: 1024 * 1024,
            ipfs_gateway: "https://ipfs.io".to_string(),
            allow_raw_unsigned_attestation: false,
            max_pending_candidates: 64,
            max_pending_controls: 64,
            pending_window: 32,
            pending_ttl_ms: 6 * 60 * 60 * 1000,
            verifier: VerifierConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Short timeouts for tests.
    pub fn for_testing() -> Self {
        Self {
            manual_check_timeout_ms: 500,
            provider_timeout_ms: 500,
            verifier: VerifierConfig::for_testing(),
            ..Self::default()
        }
    }

    /// Replace the carrier quorum.
    pub fn with_quorum(mut self, required_carriers: Vec<Carrier>, carrier_quorum: usize) -> Self {
        self.required_carriers = required_carriers;
        self.carrier_quorum = carrier_quorum;
        self
    }

    /// Replace the pending pool limits.
    pub fn with_pending_limits(mut self, max_candidates: usize, max_controls: usize, window: u64) -> Self {
        self.max_pending_candidates = max_candidates;
        self.max_pending_controls = max_controls;
        self.pending_window = window;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.required_carriers, vec![Carrier::Gossip, Carrier::Feed]);
        assert_eq!(config.carrier_quorum, 2);
        assert_eq!(config.manual_check_timeout_ms, 8_000);
        assert_eq!(config.provider_chunk_bytes, 1_048_576);
        assert!(!config.allow_raw_unsigned_attestation);
        assert_eq!(config.max_pending_candidates, 64);
        assert_eq!(config.pending_window, 32);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: SyncConfig = serde_json::from_str(r#"{"carrier_quorum": 1}"#).unwrap();
        assert_eq!(config.carrier_quorum, 1);
        assert_eq!(config.ipfs_gateway, "https://ipfs.io");
    }
}
