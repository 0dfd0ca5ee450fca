//! # JSON File Storage
//!
//! Verifier state in a single JSON document. Writes take an exclusive
//! `fs2` lock on a sibling lock file and replace the document atomically.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::domain::{NonceRecord, StorageError};
use crate::ports::VerifierStorage;

#[derive(Debug, Default, Serialize, Deserialize)]
struct VerifierDocument {
    #[serde(default)]
    nonces: Vec<NonceRecord>,
    #[serde(default)]
    device_id: Option<String>,
}

/// File-backed verifier state.
pub struct JsonFileVerifierStorage {
    path: PathBuf,
}

impl JsonFileVerifierStorage {
    /// Document file name inside the data directory.
    pub const FILE_NAME: &'static str = "verifier.json";

    /// Storage under `data_dir`, created if missing.
    pub fn open(data_dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(data_dir)?;
        Ok(Self {
            path: data_dir.join(Self::FILE_NAME),
        })
    }

    /// Document path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<File, StorageError> {
        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.path.with_extension("lock"))?;
        lock.lock_exclusive()?;
        Ok(lock)
    }

    fn read(&self) -> Result<VerifierDocument, StorageError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(VerifierDocument::default()),
            // A corrupt document is treated as empty state.
            Ok(bytes) => Ok(serde_json::from_slice(&bytes).unwrap_or_default()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(VerifierDocument::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut VerifierDocument)) -> Result<(), StorageError> {
        let lock = self.lock()?;
        let mut doc = self.read()?;
        apply(&mut doc);
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&serde_json::to_vec_pretty(&doc)?)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        lock.unlock()?;
        Ok(())
    }
}

impl VerifierStorage for JsonFileVerifierStorage {
    fn load_nonces(&self) -> Result<Vec<NonceRecord>, StorageError> {
        Ok(self.read()?.nonces)
    }

    fn save_nonces(&self, records: &[NonceRecord]) -> Result<(), StorageError> {
        self.update(|doc| doc.nonces = records.to_vec())
    }

    fn load_device_id(&self) -> Result<Option<String>, StorageError> {
        Ok(self.read()?.device_id.filter(|id| !id.trim().is_empty()))
    }

    fn save_device_id(&self, device_id: &str) -> Result<(), StorageError> {
        let device_id = device_id.to_string();
        self.update(|doc| doc.device_id = Some(device_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_directory_loads_empty_state() {
        let dir = TempDir::new().unwrap();
        let storage = JsonFileVerifierStorage::open(dir.path()).unwrap();
        assert!(storage.load_nonces().unwrap().is_empty());
        assert!(storage.load_device_id().unwrap().is_none());
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let storage = JsonFileVerifierStorage::open(dir.path()).unwrap();
            storage
                .save_nonces(&[NonceRecord {
                    nonce: "n".into(),
                    seen_at_ms: 1,
                    expires_at_ms: 2,
                }])
                .unwrap();
            storage.save_device_id("dev-1").unwrap();
        }
        let storage = JsonFileVerifierStorage::open(dir.path()).unwrap();
        assert_eq!(storage.load_nonces().unwrap()[0].nonce, "n");
        assert_eq!(storage.load_device_id().unwrap().as_deref(), Some("dev-1"));
    }

    #[test]
    fn test_corrupt_document_is_empty_state() {
        let dir = TempDir::new().unwrap();
        let storage = JsonFileVerifierStorage::open(dir.path()).unwrap();
        fs::write(storage.path(), b"{not json").unwrap();
        assert!(storage.load_nonces().unwrap().is_empty());
        storage.save_device_id("d").unwrap();
        assert_eq!(storage.load_device_id().unwrap().as_deref(), Some("d"));
    }
}
