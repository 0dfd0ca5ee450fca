//! # JSON File Key Store
//!
//! The publisher key as one JSON file, written under an exclusive `fs2`
//! lock and replaced with a rename. On unix the file is owner-only.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::domain::{PublishError, PublisherResult, StoredKey};
use crate::ports::KeyStorePort;

/// File-backed publisher key.
pub struct JsonFileKeyStore {
    path: PathBuf,
}

impl JsonFileKeyStore {
    /// Key file name inside the data directory.
    pub const FILE_NAME: &'static str = "publisher_key.json";

    /// Key store under `data_dir`, created if missing.
    pub fn open(data_dir: &Path) -> PublisherResult<Self> {
        fs::create_dir_all(data_dir)?;
        Ok(Self {
            path: data_dir.join(Self::FILE_NAME),
        })
    }

    /// Key file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> PublisherResult<File> {
        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.path.with_extension("lock"))?;
        lock.lock_exclusive()?;
        Ok(lock)
    }
}

#[cfg(unix)]
fn restrict(file: &File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict(_file: &File) -> std::io::Result<()> {
    Ok(())
}

impl KeyStorePort for JsonFileKeyStore {
    fn load(&self) -> PublisherResult<Option<StoredKey>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let key: StoredKey = serde_json::from_slice(&bytes)?;
        Ok(Some(key))
    }

    fn save(&self, key: &StoredKey) -> PublisherResult<()> {
        if !key.is_complete() {
            return Err(PublishError::SignerInvalid);
        }
        let lock = self.lock()?;
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp)?;
            restrict(&file)?;
            file.write_all(&serde_json::to_vec_pretty(key)?)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        drop(lock);
        Ok(())
    }

    fn clear(&self) -> PublisherResult<()> {
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
    use tempfile::TempDir;
    use update_crypto::Ed25519KeyPair;

    #[test]
    fn test_save_load_clear() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileKeyStore::open(&dir.path().join("keys")).unwrap();
        assert!(store.load().unwrap().is_none());

        let key = StoredKey::from_keypair(&Ed25519KeyPair::from_seed([1; 32]));
        store.save(&key).unwrap();
        assert_eq!(store.load().unwrap(), Some(key));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        store.clear().unwrap();
    }

    #[test]
    fn test_incomplete_key_rejected() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileKeyStore::open(dir.path()).unwrap();
        let key = StoredKey {
            public_key_hex: "ab".into(),
            private_key_hex: String::new(),
        };
        assert!(matches!(store.save(&key), Err(PublishError::SignerInvalid)));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileKeyStore::open(dir.path()).unwrap();
        fs::write(store.path(), b"not json").unwrap();
        assert!(matches!(store.load(), Err(PublishError::KeyStore(_))));
    }
}
