//! Keyed string storage for session credentials.
//!
//! Every backend implements [`CredentialStore`]. Reads never fail: a backend
//! that cannot be reached simply has no value. Writes report a [`StoreError`]
//! which the session layer logs and swallows.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use keyring::Entry;
use thiserror::Error;
use tracing::{debug, warn};

/// Keychain service name
const SERVICE_NAME: &str = "mess-manager";

/// Persisted storage keys.
pub struct StorageKey;

impl StorageKey {
    pub const ACCESS_TOKEN: &'static str = "MM_AT";
    pub const RENEWAL_TOKEN: &'static str = "MM_RT";
    pub const API_URL: &'static str = "MM_API_URL";
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),
}

pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

// ============================================================================
// In-memory
// ============================================================================

/// Process-lifetime storage. Used when no platform storage is reachable.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.remove(key);
        Ok(())
    }
}

// ============================================================================
// JSON file
// ============================================================================

/// Storage file name in the config directory
const STORAGE_FILE: &str = "storage.json";

/// A flat JSON object on disk. Re-read on every `get` so a second process
/// (or a restart) sees the latest values.
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// `storage.json` inside the given directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(STORAGE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_all(&self, values: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }

    fn modify(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        // A corrupt document is replaced rather than blocking every write.
        let mut values = self.read_all().unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "Discarding unreadable storage file");
            BTreeMap::new()
        });
        f(&mut values);
        self.write_all(&values)
    }
}

impl CredentialStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.read_all() {
            Ok(mut values) => values.remove(key),
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "Storage file unreadable");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.modify(|values| {
            values.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        if !self.path.exists() {
            return Ok(());
        }
        self.modify(|values| {
            values.remove(key);
        })
    }
}

// ============================================================================
// OS keychain
// ============================================================================

/// One keychain entry per storage key.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, StoreError> {
        Ok(Entry::new(&self.service, key)?)
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringStore {
    fn get(&self, key: &str) -> Option<String> {
        let entry = self.entry(key).ok()?;
        match entry.get_password() {
            Ok(value) => Some(value),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                debug!(key = key, error = %e, "Keychain read failed");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entry(key)?.set_password(value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// Mirrored
// ============================================================================

/// Writes go to every backend, reads come from the first backend that has
/// the key. A write succeeds if any backend accepted it.
pub struct MirroredStore {
    backends: Vec<Arc<dyn CredentialStore>>,
}

impl MirroredStore {
    pub fn new(backends: Vec<Arc<dyn CredentialStore>>) -> Self {
        Self { backends }
    }

    fn each(
        &self,
        op: &str,
        key: &str,
        f: impl Fn(&dyn CredentialStore) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let mut last_err = None;
        let mut any_ok = false;
        for (index, backend) in self.backends.iter().enumerate() {
            match f(backend.as_ref()) {
                Ok(()) => any_ok = true,
                Err(e) => {
                    debug!(op = op, key = key, backend = index, error = %e, "Storage backend failed");
                    last_err = Some(e);
                }
            }
        }
        match (any_ok, last_err) {
            (true, _) => Ok(()),
            (false, Some(e)) => Err(e),
            (false, None) => Err(StoreError::Unavailable("no storage backends".into())),
        }
    }
}

impl CredentialStore for MirroredStore {
    fn get(&self, key: &str) -> Option<String> {
        self.backends.iter().find_map(|b| b.get(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.each("set", key, |b| b.set(key, value))
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.each("remove", key, |b| b.remove(key))
    }
}

/// File storage under `dir` mirrored into the OS keychain, or memory-only
/// storage when there is no usable directory.
pub fn platform_store(dir: Option<&Path>) -> Arc<dyn CredentialStore> {
    match dir {
        Some(dir) => {
            let backends: Vec<Arc<dyn CredentialStore>> = vec![
                Arc::new(FileStore::in_dir(dir)),
                Arc::new(KeyringStore::new()),
            ];
            Arc::new(MirroredStore::new(backends))
        }
        None => {
            warn!("No config directory available; credentials will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A backend that is always unavailable.
    pub(crate) struct BrokenStore;

    impl CredentialStore for BrokenStore {
        fn get(&self, _key: &str) -> Option<String> {
            None
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("quota exceeded".into()))
        }

        fn remove(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("quota exceeded".into()))
        }
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert_eq!(store.get(StorageKey::ACCESS_TOKEN), None);
        store.set(StorageKey::ACCESS_TOKEN, "at-1").unwrap();
        assert_eq!(store.get(StorageKey::ACCESS_TOKEN).as_deref(), Some("at-1"));
        store.remove(StorageKey::ACCESS_TOKEN).unwrap();
        assert_eq!(store.get(StorageKey::ACCESS_TOKEN), None);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::in_dir(dir.path());
        store.set(StorageKey::RENEWAL_TOKEN, "rt-1").unwrap();
        store.set(StorageKey::API_URL, "https://mess.example").unwrap();

        let reopened = FileStore::in_dir(dir.path());
        assert_eq!(reopened.get(StorageKey::RENEWAL_TOKEN).as_deref(), Some("rt-1"));

        reopened.remove(StorageKey::RENEWAL_TOKEN).unwrap();
        assert_eq!(store.get(StorageKey::RENEWAL_TOKEN), None);
        assert_eq!(store.get(StorageKey::API_URL).as_deref(), Some("https://mess.example"));
    }

    #[test]
    fn test_file_store_corrupt_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::in_dir(dir.path());
        std::fs::write(store.path(), "{not json").unwrap();

        assert_eq!(store.get(StorageKey::ACCESS_TOKEN), None);
        store.set(StorageKey::ACCESS_TOKEN, "at-2").unwrap();
        assert_eq!(store.get(StorageKey::ACCESS_TOKEN).as_deref(), Some("at-2"));
    }

    #[test]
    fn test_file_store_remove_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::in_dir(&dir.path().join("nested"));
        assert!(store.remove(StorageKey::ACCESS_TOKEN).is_ok());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_mirrored_store_writes_everywhere() {
        let first = Arc::new(MemoryStore::new());
        let second = Arc::new(MemoryStore::new());
        let backends: Vec<Arc<dyn CredentialStore>> = vec![first.clone(), second.clone()];
        let store = MirroredStore::new(backends);

        store.set(StorageKey::ACCESS_TOKEN, "at").unwrap();
        assert_eq!(first.get(StorageKey::ACCESS_TOKEN).as_deref(), Some("at"));
        assert_eq!(second.get(StorageKey::ACCESS_TOKEN).as_deref(), Some("at"));

        // Read falls through to a later backend
        first.remove(StorageKey::ACCESS_TOKEN).unwrap();
        assert_eq!(store.get(StorageKey::ACCESS_TOKEN).as_deref(), Some("at"));

        store.remove(StorageKey::ACCESS_TOKEN).unwrap();
        assert_eq!(second.get(StorageKey::ACCESS_TOKEN), None);
    }

    #[test]
    fn test_mirrored_store_tolerates_one_broken_backend() {
        let working = Arc::new(MemoryStore::new());
        let backends: Vec<Arc<dyn CredentialStore>> = vec![Arc::new(BrokenStore), working.clone()];
        let store = MirroredStore::new(backends);
        assert!(store.set(StorageKey::ACCESS_TOKEN, "at").is_ok());
        assert_eq!(store.get(StorageKey::ACCESS_TOKEN).as_deref(), Some("at"));

        let all_broken = MirroredStore::new(vec![Arc::new(BrokenStore) as Arc<dyn CredentialStore>]);
        assert!(all_broken.set(StorageKey::ACCESS_TOKEN, "at").is_err());
        assert!(MirroredStore::new(vec![]).set("k", "v").is_err());
    }
}
