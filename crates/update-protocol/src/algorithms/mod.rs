//! # Algorithms
//!
//! - `canonical`: deterministic JSON and hashing
//! - `vrf`: chain-linked proofs
//! - `signing`: committee signatures
//! - `version`: version-vector ordering

pub mod canonical;
pub mod signing;
pub mod version;
pub mod vrf;

pub use canonical::*;
pub use signing::*;
pub use version::*;
pub use vrf::*;
