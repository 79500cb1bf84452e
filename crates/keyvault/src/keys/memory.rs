//! In-process key store. Keys vanish when the process exits.

use std::collections::{hash_map::Entry, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;

use super::store::{KeyBytes, KeyStore, KeyStoreError};

/// Key store backed by a `HashMap` behind an async `RwLock`.
#[derive(Clone, Debug, Default)]
pub struct MemoryKeyStore {
    inner: Arc<RwLock<HashMap<String, KeyBytes>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted keys.
    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

impl KeyStore for MemoryKeyStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn try_read_key(&self, key_id: &str) -> Result<Option<KeyBytes>, KeyStoreError> {
        Ok(self.inner.read().await.get(key_id).cloned())
    }

    async fn save_key(&self, key_id: &str, key: &KeyBytes) -> Result<(), KeyStoreError> {
        match self.inner.write().await.entry(key_id.to_owned()) {
            Entry::Occupied(_) => Err(KeyStoreError::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(key.clone());
                Ok(())
            }
        }
    }

    async fn health_check(&self) -> Result<(), KeyStoreError> {
        Ok(())
    }
}
