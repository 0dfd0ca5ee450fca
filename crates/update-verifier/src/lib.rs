//! # Update Verifier
//!
//! Checks every received update message must pass before it can change
//! local state.
//!
//! ## Module Structure
//!
//! ```text
//! update-verifier/
//! ├── domain/
//! │   ├── entities.rs      - NonceRecord, VersionBaseline, ChainAdvance
//! │   └── errors.rs        - VerifyError reason codes
//! ├── algorithms/
//! │   ├── nonce_history.rs - Bounded TTL'd replay set
//! │   ├── chain.rs         - Contiguity, linkage, proofs, fork choice
//! │   ├── rollout.rs       - Deterministic rollout buckets
//! │   └── threshold.rs     - Legacy signature thresholds
//! ├── ports/
//! │   ├── inbound.rs       - UpdateVerificationApi
//! │   └── outbound.rs      - VerifierStorage
//! ├── adapters/
//! │   └── json_file.rs     - fs2-locked JSON document
//! ├── application/
//! │   └── service.rs       - UpdateVerifier
//! └── config.rs
//! ```
//!
//! ## Check Order
//!
//! | Stage    | Reasons (first failure wins)                                        |
//! |----------|---------------------------------------------------------------------|
//! | Envelope | expired, payload_hash_missing, payload_hash_mismatch, envelope_signature_invalid, replayed_nonce |
//! | Manifest | legacy_mode_rejected, threshold_not_met, rollback_rejected          |
//! | Chain    | mode_not_vrf_chain ... vrf_output_mismatch                           |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use adapters::JsonFileVerifierStorage;
pub use algorithms::{
    can_advance, check_vrf_proof, resolve_sequence_conflict, rollout_bucket, should_enter_rollout, verify_manifest_threshold,
    NonceHistory,
};
pub use application::service::EPHEMERAL_DEVICE_ID;
pub use application::UpdateVerifier;
pub use config::VerifierConfig;
pub use domain::{ChainAdvance, NonceRecord, StorageError, ThresholdResult, VerifyError, VersionBaseline};
pub use ports::{InMemoryVerifierStorage, UpdateVerificationApi, VerifierStorage};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
