//! Pure verification algorithms.

pub mod chain;
pub mod nonce_history;
pub mod rollout;
pub mod threshold;

pub use chain::{can_advance, check_vrf_proof, resolve_sequence_conflict, verify_control_vrf, verify_vrf_chain_candidate};
pub use nonce_history::{NonceHistory, DEFAULT_NONCE_CAPACITY, DEFAULT_NONCE_TTL_MS};
pub use rollout::{rollout_bucket, should_enter_rollout};
pub use threshold::verify_manifest_threshold;
