//! Verifier entities.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use update_protocol::{compare_version_vector, Manifest, VersionVector};

/// A seen envelope nonce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceRecord {
    /// Nonce.
    pub nonce: String,
    /// First seen.
    pub seen_at_ms: u64,
    /// Envelope expiry, 0 for none.
    #[serde(default)]
    pub expires_at_ms: u64,
}

/// Applied version a candidate must exceed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VersionBaseline {
    /// Applied version text.
    pub version: Option<String>,
    /// Applied version code.
    pub version_code: Option<u64>,
    /// Highest applied sequence.
    pub sequence: u64,
}

impl VersionBaseline {
    /// Anything has been applied in this scope.
    pub fn is_present(&self) -> bool {
        self.version_code.map_or(false, |c| c > 0)
            || self.version.as_deref().map_or(false, |v| !v.trim().is_empty())
            || self.sequence > 0
    }

    /// Baseline as a version vector.
    pub fn as_vector(&self) -> VersionVector<'_> {
        VersionVector {
            version: self.version.as_deref(),
            version_code: self.version_code,
            sequence: Some(self.sequence),
        }
    }

    /// `manifest` is strictly ahead of this baseline.
    pub fn is_exceeded_by(&self, manifest: &Manifest) -> bool {
        let candidate = VersionVector::new(&manifest.version, manifest.version_code, manifest.sequence);
        compare_version_vector(&candidate, &self.as_vector()) == Ordering::Greater
    }
}

/// Chain advance produced by a verified entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainAdvance {
    /// Accepted sequence.
    pub sequence: u64,
    /// Entry hash for the new head.
    pub manifest_hash: String,
    /// Output for the new head.
    pub vrf_output_hex: String,
}

/// Outcome of a committee / single-publisher threshold check.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThresholdResult {
    /// Threshold reached.
    pub ok: bool,
    /// Signatures required.
    pub required: u32,
    /// Signers counted.
    pub matched_signers: Vec<String>,
}
