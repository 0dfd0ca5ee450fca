//! # JSON File Storage
//!
//! The store document as one JSON file. Writers hold an exclusive `fs2`
//! lock on a sibling lock file and replace the document with a rename.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde_json::Value;
use tracing::warn;

use crate::domain::StoreResult;
use crate::ports::StateStoragePort;

/// File-backed store document.
pub struct JsonFileStateStorage {
    path: PathBuf,
}

impl JsonFileStateStorage {
    /// Document file name inside the data directory.
    pub const FILE_NAME: &'static str = "update_store_v2.json";

    /// Storage under `data_dir`, created if missing.
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        fs::create_dir_all(data_dir)?;
        Ok(Self {
            path: data_dir.join(Self::FILE_NAME),
        })
    }

    /// Document path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> StoreResult<File> {
        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.path.with_extension("lock"))?;
        lock.lock_exclusive()?;
        Ok(lock)
    }
}

impl StateStoragePort for JsonFileStateStorage {
    fn load(&self) -> StoreResult<Option<Value>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("[update-store] discarding unreadable document {}: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    fn save(&self, document: &Value) -> StoreResult<()> {
        let lock = self.lock()?;
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&serde_json::to_vec(document)?)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        drop(lock);
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        let _lock = self.lock()?;
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_missing_document_is_none() {
        let dir = TempDir::new().unwrap();
        let storage = JsonFileStateStorage::open(dir.path()).unwrap();
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn test_save_load_clear() {
        let dir = TempDir::new().unwrap();
        let storage = JsonFileStateStorage::open(&dir.path().join("nested")).unwrap();
        storage.save(&json!({"metrics": {"a": 1}})).unwrap();
        assert_eq!(storage.load().unwrap(), Some(json!({"metrics": {"a": 1}})));
        storage.clear().unwrap();
        assert!(storage.load().unwrap().is_none());
        storage.clear().unwrap();
    }

    #[test]
    fn test_corrupt_document_is_none() {
        let dir = TempDir::new().unwrap();
        let storage = JsonFileStateStorage::open(dir.path()).unwrap();
        fs::write(storage.path(), b"{{{").unwrap();
        assert!(storage.load().unwrap().is_none());
    }
}
