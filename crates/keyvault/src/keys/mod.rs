//! Per-identifier key provisioning, caching, and envelope operations.
//!
//! # Lifecycle
//!
//! 1. [`KeyRing::encrypt`] resolves its key with get-or-create: a key that does
//!    not exist yet is generated from the OS CSPRNG and persisted.
//! 2. [`KeyRing::decrypt`] resolves its key with a strict lookup and fails with
//!    [`KeyRingError::UnknownKey`] rather than inventing a key.
//! 3. Keys are cached in memory after the first read. A persisted key never
//!    changes, so the cache is never invalidated.
//!
//! # Concurrency
//!
//! First-use creation is serialised per identifier by an async mutex, and the
//! store's insert-if-absent `save_key` covers writers in other processes. Any
//! number of concurrent first encryptions under one identifier converge on a
//! single persisted key.
//!
//! # Security invariants
//!
//! - Key material is never logged; identifiers are logged as [`key_fingerprint`].

pub mod file;
pub mod memory;
pub mod store;

pub use file::FileKeyStore;
pub use memory::MemoryKeyStore;
pub use store::{KeyBackend, KeyBytes, KeyStore, KeyStoreError};

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use aes_gcm::aead::{rand_core::RngCore, OsRng};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::crypto::{self, CipherError, Envelope, KEY_LEN};

/// Errors produced by the key ring.
#[derive(Debug, Error)]
pub enum KeyRingError {
    #[error("key identifier must not be empty")]
    EmptyKeyId,

    /// Strict lookup found no key for the identifier.
    #[error("unknown key identifier")]
    UnknownKey,

    #[error(transparent)]
    Store(#[from] KeyStoreError),

    #[error(transparent)]
    Cipher(#[from] CipherError),
}

/// Stable, non-reversible name for a key identifier: URL-safe base64 of its SHA-256.
pub fn key_file_stem(key_id: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(key_id.as_bytes()))
}

/// Short form of [`key_file_stem`] for log fields.
pub fn key_fingerprint(key_id: &str) -> String {
    let mut stem = key_file_stem(key_id);
    stem.truncate(12);
    stem
}

/// Key provisioning service over a [`KeyStore`].
#[derive(Debug)]
pub struct KeyRing<S> {
    store: S,
    cache: RwLock<HashMap<String, KeyBytes>>,
    creation_locks: CreationLocks,
}

type CreationLocks = StdMutex<HashMap<String, Arc<Mutex<()>>>>;

impl<S: KeyStore> KeyRing<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
            creation_locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Number of keys held in the in-memory cache.
    pub async fn cached_len(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Encrypt `plaintext` under the key named `key_id`, creating the key if needed.
    ///
    /// # Errors
    ///
    /// Fails if `key_id` is empty, the store cannot be reached, or secure
    /// randomness is unavailable.
    pub async fn encrypt(&self, plaintext: &str, key_id: &str) -> Result<Envelope, KeyRingError> {
        let key = self.get_or_create(key_id).await?;
        Ok(crypto::encrypt_str(plaintext, key.as_bytes())?)
    }

    /// Decrypt `envelope` with the existing key named `key_id`.
    ///
    /// Never creates a key.
    ///
    /// # Errors
    ///
    /// [`KeyRingError::UnknownKey`] if no key was ever provisioned for `key_id`;
    /// [`CipherError::AuthenticationFailure`] / [`CipherError::DecodeFailure`]
    /// from the cipher otherwise.
    pub async fn decrypt(&self, envelope: &Envelope, key_id: &str) -> Result<String, KeyRingError> {
        let key = self.lookup(key_id).await?;
        Ok(crypto::decrypt_str(envelope, key.as_bytes())?)
    }

    /// Strict lookup: the key for `key_id`, or [`KeyRingError::UnknownKey`].
    pub async fn lookup(&self, key_id: &str) -> Result<KeyBytes, KeyRingError> {
        ensure_key_id(key_id)?;
        self.load(key_id).await?.ok_or(KeyRingError::UnknownKey)
    }

    /// Get-or-create: the key for `key_id`, provisioning one on first use.
    pub async fn get_or_create(&self, key_id: &str) -> Result<KeyBytes, KeyRingError> {
        ensure_key_id(key_id)?;
        if let Some(key) = self.load(key_id).await? {
            return Ok(key);
        }

        // The slot is released on drop, including when this future is cancelled.
        let slot = CreationSlot::acquire(&self.creation_locks, key_id);
        let _guard = slot.lock.lock().await;
        self.create_locked(key_id).await
    }

    /// Body of get-or-create once this task holds the identifier's creation lock.
    async fn create_locked(&self, key_id: &str) -> Result<KeyBytes, KeyRingError> {
        // Another task may have finished creating it while we waited.
        if let Some(key) = self.load(key_id).await? {
            return Ok(key);
        }

        let key = generate_key()?;
        match self.store.save_key(key_id, &key).await {
            Ok(()) => {
                info!(key = %key_fingerprint(key_id), "provisioned new key");
                self.remember(key_id, &key).await;
                Ok(key)
            }
            Err(KeyStoreError::AlreadyExists) => {
                // Lost the race to a writer outside this ring; adopt its key.
                warn!(key = %key_fingerprint(key_id), "key created concurrently elsewhere; adopting it");
                let key = self.store.try_read_key(key_id).await?.ok_or_else(|| {
                    KeyStoreError::Unavailable("key vanished after concurrent create".into())
                })?;
                self.remember(key_id, &key).await;
                Ok(key)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Cache first, then the store.
    async fn load(&self, key_id: &str) -> Result<Option<KeyBytes>, KeyRingError> {
        if let Some(key) = self.cache.read().await.get(key_id) {
            return Ok(Some(key.clone()));
        }
        match self.store.try_read_key(key_id).await? {
            Some(key) => {
                debug!(key = %key_fingerprint(key_id), "key loaded from store");
                self.remember(key_id, &key).await;
                Ok(Some(key))
            }
            None => Ok(None),
        }
    }

    async fn remember(&self, key_id: &str, key: &KeyBytes) {
        self.cache
            .write()
            .await
            .entry(key_id.to_owned())
            .or_insert_with(|| key.clone());
    }
}

/// A task's claim on an identifier's creation lock.
///
/// Dropping the last claim removes the identifier's entry from the lock map.
struct CreationSlot<'a> {
    locks: &'a CreationLocks,
    key_id: &'a str,
    lock: Arc<Mutex<()>>,
}

impl<'a> CreationSlot<'a> {
    fn acquire(locks: &'a CreationLocks, key_id: &'a str) -> Self {
        let lock = locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key_id.to_owned())
            .or_default()
            .clone();
        Self { locks, key_id, lock }
    }
}

impl Drop for CreationSlot<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one held here.
        let ours = locks
            .get(self.key_id)
            .is_some_and(|l| Arc::ptr_eq(l, &self.lock));
        if ours && Arc::strong_count(&self.lock) <= 2 {
            locks.remove(self.key_id);
        }
    }
}

fn ensure_key_id(key_id: &str) -> Result<(), KeyRingError> {
    if key_id.is_empty() {
        return Err(KeyRingError::EmptyKeyId);
    }
    Ok(())
}

fn generate_key() -> Result<KeyBytes, KeyRingError> {
    let mut raw = Zeroizing::new([0u8; KEY_LEN]);
    OsRng
        .try_fill_bytes(raw.as_mut_slice())
        .map_err(|_| CipherError::RandomnessUnavailable)?;
    Ok(KeyBytes::from(raw))
}
