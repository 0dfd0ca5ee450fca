//! # Outbound Ports
//!
//! Where the store document lives.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use serde_json::Value;

use crate::domain::{StoreError, StoreResult};

/// Persistence of the whole store document.
pub trait StateStoragePort: Send + Sync {
    /// Load the persisted document, `None` if nothing was saved.
    fn load(&self) -> StoreResult<Option<Value>>;

    /// Replace the persisted document.
    fn save(&self, document: &Value) -> StoreResult<()>;

    /// Delete the persisted document.
    fn clear(&self) -> StoreResult<()>;
}

/// In-memory storage for tests.
#[derive(Default)]
pub struct InMemoryStateStorage {
    document: RwLock<Option<Value>>,
    saves: AtomicUsize,
    /// When true, saves fail.
    pub should_fail: bool,
}

impl InMemoryStateStorage {
    /// Empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage preloaded with a document.
    pub fn with_document(document: Value) -> Self {
        Self {
            document: RwLock::new(Some(document)),
            ..Default::default()
        }
    }

    /// Storage whose saves fail.
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Current document.
    pub fn document(&self) -> Option<Value> {
        self.document.read().clone()
    }
}

impl StateStoragePort for InMemoryStateStorage {
    fn load(&self) -> StoreResult<Option<Value>> {
        Ok(self.document.read().clone())
    }

    fn save(&self, document: &Value) -> StoreResult<()> {
        if self.should_fail {
            return Err(StoreError::Backend("mock storage failure".to_string()));
        }
        *self.document.write() = Some(document.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        *self.document.write() = None;
        Ok(())
    }
}
