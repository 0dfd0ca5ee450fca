//! Per-scope chain head.

use serde::{Deserialize, Serialize};
use update_crypto::is_sha256_hex;

use super::value_objects::{GENESIS_HASH, MAX_SEQUENCE};

/// Last accepted `(sequence, hash, output)` of a scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    /// Last accepted sequence, 0 at genesis.
    pub last_sequence: u64,
    /// Hash of the last accepted entry.
    pub last_manifest_hash: String,
    /// Output of the last accepted entry.
    pub last_vrf_output_hex: String,
    /// Last change.
    #[serde(default)]
    pub updated_at_ms: u64,
}

impl ChainHead {
    /// Genesis head with the given anchors.
    pub fn genesis(manifest_hash: &str, vrf_output_hex: &str) -> Self {
        Self {
            last_sequence: 0,
            last_manifest_hash: normalize_chain_hash(manifest_hash, GENESIS_HASH),
            last_vrf_output_hex: normalize_chain_hash(vrf_output_hex, GENESIS_HASH),
            updated_at_ms: 0,
        }
    }

    /// Head that has accepted `sequence`.
    pub fn at(sequence: u64, manifest_hash: &str, vrf_output_hex: &str, updated_at_ms: u64) -> Self {
        Self {
            last_sequence: sequence,
            last_manifest_hash: manifest_hash.trim().to_lowercase(),
            last_vrf_output_hex: vrf_output_hex.trim().to_lowercase(),
            updated_at_ms,
        }
    }

    /// No entry accepted yet.
    pub fn is_genesis(&self) -> bool {
        self.last_sequence == 0
    }

    /// Sequence the next entry must carry. At genesis any positive sequence
    /// may bootstrap, so this is only a lower bound there. `None` once the
    /// head sits at [`MAX_SEQUENCE`]: such a chain cannot grow.
    pub fn next_sequence(&self) -> Option<u64> {
        self.last_sequence.checked_add(1).filter(|next| *next <= MAX_SEQUENCE)
    }

    /// Repair a loaded head: a head at sequence 0 becomes the configured
    /// genesis, malformed hashes fall back to the genesis anchors.
    pub fn normalized(&self, genesis: &ChainHead) -> ChainHead {
        if self.last_sequence == 0 {
            return genesis.clone();
        }
        ChainHead {
            last_sequence: self.last_sequence,
            last_manifest_hash: normalize_chain_hash(&self.last_manifest_hash, &genesis.last_manifest_hash),
            last_vrf_output_hex: normalize_chain_hash(&self.last_vrf_output_hex, &genesis.last_vrf_output_hex),
            updated_at_ms: self.updated_at_ms,
        }
    }
}

impl Default for ChainHead {
    fn default() -> Self {
        Self::genesis(GENESIS_HASH, GENESIS_HASH)
    }
}

/// Anything that competes for a chain position.
pub trait ConflictCandidate {
    /// Sequence claimed.
    fn sequence(&self) -> u64;
    /// Output used as tie-break.
    fn vrf_output_hex(&self) -> &str;
}

/// Lowercased hash if it is 64 hex characters, else `fallback`.
pub fn normalize_chain_hash(value: &str, fallback: &str) -> String {
    let normalized = value.trim().to_lowercase();
    if is_sha256_hex(&normalized) {
        normalized
    } else {
        fallback.to_string()
    }
}
