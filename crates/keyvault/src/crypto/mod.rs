//! AES-256-GCM envelope encryption primitives.
//!
//! This module is intentionally free of key-storage and HTTP dependencies.
//! It provides the low-level encrypt/decrypt operations used by the key ring.
//!
//! # Envelope format
//!
//! ```text
//! ciphertext  variable   AES-256-GCM output over the UTF-8 plaintext, tag detached
//! iv          16 bytes   fresh from the OS CSPRNG per call
//! tag         16 bytes   GCM authentication tag
//! ```
//!
//! On the wire each field is standard base64.

pub mod cipher;
pub mod envelope;

pub use cipher::{decrypt_str, encrypt_str, CipherError, KEY_LEN};
pub use envelope::Envelope;
