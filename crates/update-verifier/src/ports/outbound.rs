//! # Outbound Ports
//!
//! Persistence the verifier needs: the nonce history and the device id.

use parking_lot::RwLock;

use crate::domain::{NonceRecord, StorageError};

/// Durable verifier state.
pub trait VerifierStorage: Send + Sync {
    /// Load persisted nonces. Missing state is an empty list.
    fn load_nonces(&self) -> Result<Vec<NonceRecord>, StorageError>;

    /// Replace persisted nonces.
    fn save_nonces(&self, records: &[NonceRecord]) -> Result<(), StorageError>;

    /// Load the device id, if one was created.
    fn load_device_id(&self) -> Result<Option<String>, StorageError>;

    /// Persist the device id.
    fn save_device_id(&self, device_id: &str) -> Result<(), StorageError>;
}

/// In-memory storage for tests.
#[derive(Default)]
pub struct InMemoryVerifierStorage {
    nonces: RwLock<Vec<NonceRecord>>,
    device_id: RwLock<Option<String>>,
    /// When true, every save fails.
    pub should_fail: bool,
}

impl InMemoryVerifierStorage {
    /// Empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage whose saves fail.
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    fn fail(&self) -> Result<(), StorageError> {
        if self.should_fail {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "mock storage failure",
            )));
        }
        Ok(())
    }
}

impl VerifierStorage for InMemoryVerifierStorage {
    fn load_nonces(&self) -> Result<Vec<NonceRecord>, StorageError> {
        Ok(self.nonces.read().clone())
    }

    fn save_nonces(&self, records: &[NonceRecord]) -> Result<(), StorageError> {
        self.fail()?;
        *self.nonces.write() = records.to_vec();
        Ok(())
    }

    fn load_device_id(&self) -> Result<Option<String>, StorageError> {
        Ok(self.device_id.read().clone())
    }

    fn save_device_id(&self, device_id: &str) -> Result<(), StorageError> {
        self.fail()?;
        *self.device_id.write() = Some(device_id.to_string());
        Ok(())
    }
}
