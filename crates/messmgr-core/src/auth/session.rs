use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use super::credentials::{CredentialStore, StorageKey};

/// The access and renewal credentials currently in force, mirrored into a
/// [`CredentialStore`] so they survive a restart.
///
/// Each setter replaces the in-memory value and its persisted copy under the
/// same write lock, so readers never observe one without the other.
pub struct SessionCredentials {
    access: RwLock<Option<String>>,
    renewal: RwLock<Option<String>>,
    store: Arc<dyn CredentialStore>,
}

impl SessionCredentials {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            access: RwLock::new(None),
            renewal: RwLock::new(None),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn set_access(&self, token: Option<&str>) {
        Self::replace(&self.access, self.store.as_ref(), StorageKey::ACCESS_TOKEN, token);
    }

    pub fn set_renewal(&self, token: Option<&str>) {
        Self::replace(&self.renewal, self.store.as_ref(), StorageKey::RENEWAL_TOKEN, token);
    }

    pub fn persisted_access(&self) -> Option<String> {
        self.store.get(StorageKey::ACCESS_TOKEN)
    }

    pub fn persisted_renewal(&self) -> Option<String> {
        self.store.get(StorageKey::RENEWAL_TOKEN)
    }

    /// Current access credential, hydrated from storage if memory is empty.
    pub fn access(&self) -> Option<String> {
        Self::hydrate(&self.access, self.store.as_ref(), StorageKey::ACCESS_TOKEN)
    }

    /// Current renewal credential, hydrated from storage if memory is empty.
    pub fn renewal(&self) -> Option<String> {
        Self::hydrate(&self.renewal, self.store.as_ref(), StorageKey::RENEWAL_TOKEN)
    }

    pub fn clear(&self) {
        self.set_access(None);
        self.set_renewal(None);
    }

    fn replace(
        slot: &RwLock<Option<String>>,
        store: &dyn CredentialStore,
        key: &str,
        token: Option<&str>,
    ) {
        let mut current = slot.write().unwrap_or_else(PoisonError::into_inner);
        *current = token.map(str::to_string);

        let persisted = match token {
            Some(token) => store.set(key, token),
            None => store.remove(key),
        };
        if let Err(e) = persisted {
            warn!(key = key, error = %e, "Failed to persist credential; keeping it in memory only");
        }
    }

    fn hydrate(
        slot: &RwLock<Option<String>>,
        store: &dyn CredentialStore,
        key: &str,
    ) -> Option<String> {
        if let Some(token) = slot.read().unwrap_or_else(PoisonError::into_inner).clone() {
            return Some(token);
        }

        let mut current = slot.write().unwrap_or_else(PoisonError::into_inner);
        if current.is_none() {
            if let Some(saved) = store.get(key) {
                debug!(key = key, "Hydrated credential from storage");
                *current = Some(saved);
            }
        }
        current.clone()
    }
}
