//! # Update Protocol
//!
//! Wire model of peer-to-peer software updates.
//!
//! ## Module Structure
//!
//! ```text
//! update-protocol/
//! ├── domain/
//! │   ├── value_objects.rs - Scope, Carrier, genesis constants
//! │   ├── manifest.rs      - Manifest model + legacy mapping
//! │   ├── chain.rs         - Per-scope chain head
//! │   ├── control.rs       - Revocation, KillSwitch, Attestation
//! │   ├── envelope.rs      - Anti-replay envelope
//! │   ├── payload.rs       - Tagged payload parsing
//! │   ├── topics.rs        - Wire topics
//! │   └── errors.rs        - ProtocolError
//! └── algorithms/
//!     ├── canonical.rs     - Canonical JSON + SHA-256
//!     ├── signing.rs       - Committee signatures
//!     ├── vrf.rs           - VRF chain engine
//!     └── version.rs       - Version-vector comparison
//! ```
//!
//! ## Hashing Contract
//!
//! Every hash and signature is computed over [`canonicalize`] output, so two
//! payloads differing only in key order hash identically.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algorithms;
pub mod domain;

pub use algorithms::*;
pub use domain::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
