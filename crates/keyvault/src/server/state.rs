//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::keys::{KeyBackend, KeyRing, MemoryKeyStore};

/// Application state shared across all request handlers.
///
/// Cloning is an `Arc` bump; every request sees the same key ring.
#[derive(Clone)]
pub struct AppState {
    /// Key provisioning service over the configured backend.
    pub key_ring: Arc<KeyRing<KeyBackend>>,
}

impl AppState {
    /// Create a new [`AppState`] over the given key store backend.
    pub fn new(backend: KeyBackend) -> Self {
        Self {
            key_ring: Arc::new(KeyRing::new(backend)),
        }
    }
}

impl Default for AppState {
    /// Creates an [`AppState`] over an empty in-memory store, suitable for tests.
    fn default() -> Self {
        Self::new(KeyBackend::Memory(MemoryKeyStore::new()))
    }
}
