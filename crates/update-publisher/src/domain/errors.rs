//! Publisher errors.
//!
//! Carrier failures keep the wire reason first (`native_not_ready`,
//! `network_unreachable`, `missing_carrier:gossip`) followed by a
//! `" (gossip:..; feed:..)"` detail suffix, so hosts can match on the prefix.

use thiserror::Error;
use update_crypto::CryptoError;
use update_protocol::ProtocolError;

/// Publisher errors.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Manifest lacks summary or details in `metadata.release_notes`.
    #[error("release_notes_required")]
    ReleaseNotesRequired,

    /// Publishing is switched off in the configuration.
    #[error("publisher_disabled")]
    Disabled,

    /// Stored or supplied publisher key is unusable.
    #[error("publisher_signer_invalid")]
    SignerInvalid,

    /// The networking runtime never came up.
    #[error("native_not_ready{0}")]
    NativeNotReady(String),

    /// No peers, or the runtime reported a dial / bootstrap failure.
    #[error("network_unreachable{0}")]
    NetworkUnreachable(String),

    /// Gossip was not accepted for another reason.
    #[error("missing_carrier:gossip{0}")]
    MissingGossip(String),

    /// Key file could not be read or written.
    #[error("publisher_key_store:{0}")]
    KeyStore(String),

    /// Message construction failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Key material failed to parse.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl From<std::io::Error> for PublishError {
    fn from(err: std::io::Error) -> Self {
        PublishError::KeyStore(err.to_string())
    }
}

impl From<serde_json::Error> for PublishError {
    fn from(err: serde_json::Error) -> Self {
        PublishError::KeyStore(err.to_string())
    }
}

/// Result alias for publisher operations.
pub type PublisherResult<T> = Result<T, PublishError>;
