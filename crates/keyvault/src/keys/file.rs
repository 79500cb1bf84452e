//! File-per-identifier key store.
//!
//! Each key lives in `<dir>/<stem>.json` where `<stem>` is the URL-safe base64
//! SHA-256 digest of the identifier. The body is a JSON-wrapped byte buffer:
//!
//! ```text
//! {"type":"Buffer","data":[12,200,...]}
//! ```
//!
//! Saves are published with a hard link from a private temp file, so a reader
//! never observes a half-written key and two writers cannot both win.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::key_file_stem;
use super::store::{KeyBytes, KeyStore, KeyStoreError};

const BUFFER_TAG: &str = "Buffer";

/// On-disk form of a key.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct StoredKey {
    #[serde(rename = "type")]
    kind: String,
    data: Vec<u8>,
}

/// Key store backed by one JSON file per identifier in a directory.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the store directory if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::Unavailable`] if the directory cannot be created.
    pub async fn ensure_dir(&self) -> Result<(), KeyStoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| unavailable("create key directory", &self.dir, e))
    }

    fn path_for(&self, key_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key_file_stem(key_id)))
    }
}

impl KeyStore for FileKeyStore {
    fn kind(&self) -> &'static str {
        "file"
    }

    async fn try_read_key(&self, key_id: &str) -> Result<Option<KeyBytes>, KeyStoreError> {
        let path = self.path_for(key_id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => Zeroizing::new(raw),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(unavailable("read key file", &path, e)),
        };

        let stored: StoredKey = serde_json::from_slice(&raw)
            .map_err(|e| KeyStoreError::Corrupt(format!("{}: {e}", path.display())))?;
        if stored.kind != BUFFER_TAG {
            return Err(KeyStoreError::Corrupt(format!(
                "{}: unexpected type {:?}",
                path.display(),
                stored.kind
            )));
        }
        KeyBytes::from_slice(&stored.data).map(Some)
    }

    async fn save_key(&self, key_id: &str, key: &KeyBytes) -> Result<(), KeyStoreError> {
        self.ensure_dir().await?;

        let path = self.path_for(key_id);
        let tmp = self.dir.join(format!(
            ".{}.{}.tmp",
            key_file_stem(key_id),
            uuid::Uuid::new_v4()
        ));

        let body = serde_json::to_vec(&StoredKey {
            kind: BUFFER_TAG.into(),
            data: key.as_bytes().to_vec(),
        })
        .map(Zeroizing::new)
        .map_err(|e| KeyStoreError::Unavailable(format!("serialise key: {e}")))?;

        let written = write_private(&tmp, &body).await;
        let published = match written {
            Ok(()) => tokio::fs::hard_link(&tmp, &path).await,
            Err(e) => Err(e),
        };
        // The temp file is garbage whether or not the link succeeded.
        let _ = tokio::fs::remove_file(&tmp).await;

        match published {
            Ok(()) => {
                debug!(file = %path.display(), "key file written");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(KeyStoreError::AlreadyExists),
            Err(e) => Err(unavailable("write key file", &path, e)),
        }
    }

    async fn health_check(&self) -> Result<(), KeyStoreError> {
        let meta = tokio::fs::metadata(&self.dir)
            .await
            .map_err(|e| unavailable("stat key directory", &self.dir, e))?;
        if !meta.is_dir() {
            return Err(KeyStoreError::Unavailable(format!(
                "{} is not a directory",
                self.dir.display()
            )));
        }
        Ok(())
    }
}

async fn write_private(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut opts = tokio::fs::OpenOptions::new();
    opts.write(true).create_new(true);
    #[cfg(unix)]
    opts.mode(0o600);

    let mut file = opts.open(path).await?;
    file.write_all(body).await?;
    file.sync_all().await
}

fn unavailable(action: &str, path: &Path, e: std::io::Error) -> KeyStoreError {
    KeyStoreError::Unavailable(format!("{action} {}: {e}", path.display()))
}
