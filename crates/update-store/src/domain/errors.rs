//! Store errors.

use thiserror::Error;

/// Version store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    /// State could not be encoded or decoded.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend refused the operation.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Store result.
pub type StoreResult<T> = Result<T, StoreError>;
