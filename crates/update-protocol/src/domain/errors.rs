//! # Error Types
//!
//! Parsing never panics on adversarial input. Anything that is not a
//! well-formed message of the requested kind comes back as a
//! [`ProtocolError`].

use thiserror::Error;

/// Protocol parsing and construction errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Input is not a JSON object.
    #[error("payload is not an object")]
    NotAnObject,

    /// Input is an object but does not look like the requested message kind.
    #[error("not a {0} message")]
    NotRecognized(&'static str),

    /// A required field is missing or empty.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// Sequence is negative, fractional, not a number or out of range.
    #[error("invalid sequence")]
    InvalidSequence,

    /// A manifest carried no usable artifact.
    #[error("manifest has no artifacts")]
    NoArtifacts,

    /// VRF scheme is not supported.
    #[error("unsupported vrf scheme: {0}")]
    UnsupportedScheme(String),

    /// Release notes are required to publish.
    #[error("release_notes_required")]
    ReleaseNotesRequired,

    /// Value could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Cryptographic failure while building a message.
    #[error("crypto error: {0}")]
    Crypto(#[from] update_crypto::CryptoError),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::Serialization(err.to_string())
    }
}

/// Result alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ProtocolError::ReleaseNotesRequired.to_string(),
            "release_notes_required"
        );
        assert!(ProtocolError::NotRecognized("revocation")
            .to_string()
            .contains("revocation"));
        assert!(ProtocolError::MissingField("nonce").to_string().contains("nonce"));
    }
}
