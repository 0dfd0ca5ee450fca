//! # Update Crypto - Primitives for Update Authentication
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `hashing` | SHA-256 | Canonical payload and manifest hashes |
//! | `signatures` | Ed25519 | Envelope signatures, VRF chain proofs |
//! | `encoding` | hex, base64 | Wire representation of keys and proofs |
//!
//! ## Security Properties
//!
//! - **Ed25519**: deterministic signatures, so a proof over a fixed input is reproducible
//! - **SHA-256**: lowercase hex output everywhere hashes are compared

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod encoding;
pub mod errors;
pub mod hashing;
pub mod signatures;

// Re-exports
pub use encoding::{decode_base64, decode_hex, encode_base64, is_sha256_hex};
pub use errors::CryptoError;
pub use hashing::{sha256, sha256_hex};
pub use signatures::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
