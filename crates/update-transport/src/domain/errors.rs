//! Transport errors.

use thiserror::Error;

/// Failure reported by the P2P network.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Native networking runtime is not running.
    #[error("native_not_ready")]
    NotReady,
    /// Publish on a topic that was never joined.
    #[error("topic_not_joined: {0}")]
    TopicNotJoined(String),
    /// Any other network failure.
    #[error("network error: {0}")]
    Network(String),
}

/// Transport result.
pub type TransportResult<T> = Result<T, TransportError>;
