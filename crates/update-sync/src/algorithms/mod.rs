//! Pure helpers used by the orchestrator.

pub mod artifact;
pub mod quorum;

pub use artifact::{control_key, to_gateway_url, verify_artifact_hash};
pub use quorum::CarrierQuorum;
