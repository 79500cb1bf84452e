//! [`KeyStore`]: the persistence seam behind the key ring, and [`KeyBytes`].

use std::future::Future;

use thiserror::Error;
use zeroize::Zeroizing;

use super::file::FileKeyStore;
use super::memory::MemoryKeyStore;
use crate::crypto::KEY_LEN;

/// Errors produced by key store backends.
#[derive(Debug, Error)]
pub enum KeyStoreError {
    /// The backing store could not be read or written.
    #[error("key store unavailable: {0}")]
    Unavailable(String),

    /// `save_key` found a key already persisted under the identifier.
    #[error("a key already exists for this identifier")]
    AlreadyExists,

    /// A persisted entry could not be parsed or is not [`KEY_LEN`] bytes.
    #[error("stored key is corrupt: {0}")]
    Corrupt(String),
}

/// Fixed-size key buffer that holds exactly [`KEY_LEN`] bytes.
///
/// The heap buffer is wiped by [`Zeroizing`] when the value is dropped.
#[derive(Clone)]
pub struct KeyBytes(Box<Zeroizing<[u8; KEY_LEN]>>);

impl KeyBytes {
    /// Copy `bytes` into a new key buffer.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::Corrupt`] if `bytes` is not [`KEY_LEN`] long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyStoreError> {
        if bytes.len() != KEY_LEN {
            return Err(KeyStoreError::Corrupt(format!(
                "expected {KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut buf = Box::new(Zeroizing::new([0u8; KEY_LEN]));
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl From<Zeroizing<[u8; KEY_LEN]>> for KeyBytes {
    fn from(bytes: Zeroizing<[u8; KEY_LEN]>) -> Self {
        Self(Box::new(bytes))
    }
}

#[cfg(test)]
impl From<[u8; KEY_LEN]> for KeyBytes {
    fn from(bytes: [u8; KEY_LEN]) -> Self {
        Self(Box::new(Zeroizing::new(bytes)))
    }
}

impl std::fmt::Debug for KeyBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material — not even in debug builds.
        f.write_str("KeyBytes([REDACTED])")
    }
}

/// Durable mapping from key identifier to key bytes.
///
/// Implementations must make [`KeyStore::save_key`] an atomic insert-if-absent:
/// once a key is persisted for an identifier it is never replaced.
pub trait KeyStore: Send + Sync {
    /// Short backend name reported by the health endpoint.
    fn kind(&self) -> &'static str;

    /// Look up the key for `key_id`, returning `None` if none was ever saved.
    fn try_read_key(
        &self,
        key_id: &str,
    ) -> impl Future<Output = Result<Option<KeyBytes>, KeyStoreError>> + Send;

    /// Persist `key` under `key_id`.
    ///
    /// Fails with [`KeyStoreError::AlreadyExists`] instead of overwriting.
    fn save_key(
        &self,
        key_id: &str,
        key: &KeyBytes,
    ) -> impl Future<Output = Result<(), KeyStoreError>> + Send;

    /// Cheap reachability check used by `/health`.
    fn health_check(&self) -> impl Future<Output = Result<(), KeyStoreError>> + Send;
}

/// The backend selected by configuration.
#[derive(Debug, Clone)]
pub enum KeyBackend {
    File(FileKeyStore),
    Memory(MemoryKeyStore),
}

impl KeyStore for KeyBackend {
    fn kind(&self) -> &'static str {
        match self {
            KeyBackend::File(s) => s.kind(),
            KeyBackend::Memory(s) => s.kind(),
        }
    }

    async fn try_read_key(&self, key_id: &str) -> Result<Option<KeyBytes>, KeyStoreError> {
        match self {
            KeyBackend::File(s) => s.try_read_key(key_id).await,
            KeyBackend::Memory(s) => s.try_read_key(key_id).await,
        }
    }

    async fn save_key(&self, key_id: &str, key: &KeyBytes) -> Result<(), KeyStoreError> {
        match self {
            KeyBackend::File(s) => s.save_key(key_id, key).await,
            KeyBackend::Memory(s) => s.save_key(key_id, key).await,
        }
    }

    async fn health_check(&self) -> Result<(), KeyStoreError> {
        match self {
            KeyBackend::File(s) => s.health_check().await,
            KeyBackend::Memory(s) => s.health_check().await,
        }
    }
}
