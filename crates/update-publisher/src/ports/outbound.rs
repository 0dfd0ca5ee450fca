//! # Outbound Port
//!
//! Where the publisher key lives between runs.

use parking_lot::Mutex;

use crate::domain::{PublishError, PublisherResult, StoredKey};

/// Publisher key persistence.
pub trait KeyStorePort: Send + Sync {
    /// Stored key, if any.
    fn load(&self) -> PublisherResult<Option<StoredKey>>;

    /// Replace the stored key.
    fn save(&self, key: &StoredKey) -> PublisherResult<()>;

    /// Forget the stored key.
    fn clear(&self) -> PublisherResult<()>;
}

// =============================================================================
// In-Memory Implementation
// =============================================================================

/// Key store that lives as long as the process.
#[derive(Default)]
pub struct InMemoryKeyStore {
    key: Mutex<Option<StoredKey>>,
    should_fail: Mutex<bool>,
}

impl InMemoryKeyStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding `key`.
    pub fn with_key(key: StoredKey) -> Self {
        Self {
            key: Mutex::new(Some(key)),
            should_fail: Mutex::new(false),
        }
    }

    /// Make every call fail.
    pub fn set_should_fail(&self, fail: bool) {
        *self.should_fail.lock() = fail;
    }

    fn guard(&self) -> PublisherResult<()> {
        if *self.should_fail.lock() {
            return Err(PublishError::KeyStore("mock failure".to_string()));
        }
        Ok(())
    }
}

impl KeyStorePort for InMemoryKeyStore {
    fn load(&self) -> PublisherResult<Option<StoredKey>> {
        self.guard()?;
        Ok(self.key.lock().clone())
    }

    fn save(&self, key: &StoredKey) -> PublisherResult<()> {
        self.guard()?;
        *self.key.lock() = Some(key.clone());
        Ok(())
    }

    fn clear(&self) -> PublisherResult<()> {
        self.guard()?;
        *self.key.lock() = None;
        Ok(())
    }
}
