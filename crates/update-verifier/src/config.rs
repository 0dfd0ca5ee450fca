//! Verifier configuration.

use serde::{Deserialize, Serialize};
use update_protocol::{ChainHead, GENESIS_HASH};

use crate::algorithms::{DEFAULT_NONCE_CAPACITY, DEFAULT_NONCE_TTL_MS};

/// Verifier configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Maximum tracked nonces.
    pub nonce_capacity: usize,
    /// Nonce lifetime.
    pub nonce_ttl_ms: u64,
    /// Genesis manifest hash.
    pub genesis_manifest_hash: String,
    /// Genesis VRF output.
    pub genesis_vrf_output_hex: String,
    /// Require candidate sequence == head + 1.
    pub strict_contiguous: bool,
    /// Accept committee / single-publisher manifests.
    pub legacy_signature_accept: bool,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            nonce_capacity: DEFAULT_NONCE_CAPACITY,
            nonce_ttl_ms: DEFAULT_NONCE_TTL_MS,
            genesis_manifest_hash: GENESIS_HASH.to_string(),
            genesis_vrf_output_hex: GENESIS_HASH.to_string(),
            strict_contiguous: true,
            legacy_signature_accept: false,
        }
    }
}

impl VerifierConfig {
    /// Small history, short TTL.
    pub fn for_testing() -> Self {
        Self {
            nonce_capacity: 64,
            nonce_ttl_ms: 60_000,
            ..Default::default()
        }
    }

    /// Genesis head from the configured anchors.
    pub fn genesis_head(&self) -> ChainHead {
        ChainHead::genesis(&self.genesis_manifest_hash, &self.genesis_vrf_output_hex)
    }
}
