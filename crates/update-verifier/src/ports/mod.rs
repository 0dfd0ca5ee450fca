//! Verifier ports.

pub mod inbound;
pub mod outbound;

pub use inbound::UpdateVerificationApi;
pub use outbound::{InMemoryVerifierStorage, VerifierStorage};
