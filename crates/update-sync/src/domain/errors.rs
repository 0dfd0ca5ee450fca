//! Sync and applier errors.

use thiserror::Error;
use update_transport::TransportError;

/// Failures reported by the platform update plugin.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApplierError {
    /// No update plugin on this host.
    #[error("applier_unavailable")]
    Unavailable,
    /// HTTPS fetch failed.
    #[error("http_error:{0}")]
    Http(String),
    /// The plugin rejected the call; the text is the plugin's reason.
    #[error("{0}")]
    Rejected(String),
}

/// Applier result.
pub type ApplierResult<T> = Result<T, ApplierError>;

/// Sync service errors.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The transport did not answer a manual check in time.
    #[error("manual_check_timeout")]
    ManualCheckTimeout,
    /// Transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_texts() {
        assert_eq!(SyncError::ManualCheckTimeout.to_string(), "manual_check_timeout");
        assert_eq!(ApplierError::Rejected("disk full".into()).to_string(), "disk full");
        assert_eq!(
            SyncError::from(TransportError::NotReady).to_string(),
            TransportError::NotReady.to_string()
        );
    }
}
