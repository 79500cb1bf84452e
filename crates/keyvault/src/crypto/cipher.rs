//! AES-256-GCM encryption and decryption of UTF-8 strings.
//!
//! The construction uses a 256-bit key, a **128-bit** IV and a 128-bit tag.
//! The 16-byte IV is non-standard for GCM (which prefers 96 bits) but it is
//! what previously stored envelopes were produced with, so it is kept. GCM
//! hashes the longer IV down to its initial counter block.
//!
//! **Never reuse an IV under the same key.** Every call to [`encrypt_str`]
//! draws a fresh IV from the OS CSPRNG; there is no counter and no fallback.

use aes_gcm::{
    aead::{consts::U16, rand_core::RngCore, AeadInPlace, KeyInit, OsRng},
    aes::Aes256,
    AesGcm, Nonce, Tag,
};
use thiserror::Error;

use super::envelope::{Envelope, IV_LEN, TAG_LEN};

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// AES-256-GCM with a 16-byte nonce.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Errors produced by the cipher layer.
#[derive(Debug, Error)]
pub enum CipherError {
    /// The key is the wrong length (must be [`KEY_LEN`] bytes).
    #[error("invalid key length: expected {KEY_LEN} bytes")]
    InvalidKeyLength,

    /// Tag verification failed: corrupted, tampered, or wrong-key envelope.
    #[error("envelope failed authentication")]
    AuthenticationFailure,

    /// The authenticated plaintext is not valid UTF-8.
    #[error("decrypted plaintext is not valid UTF-8")]
    DecodeFailure,

    /// The OS secure random source failed.
    #[error("secure randomness unavailable")]
    RandomnessUnavailable,

    /// The envelope's wire encoding is malformed or has the wrong field sizes.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),
}

/// Seal `plaintext` under `key`, returning a fresh [`Envelope`].
///
/// # Errors
///
/// Returns [`CipherError::InvalidKeyLength`] if `key` is not [`KEY_LEN`] bytes and
/// [`CipherError::RandomnessUnavailable`] if the IV cannot be drawn.
pub fn encrypt_str(plaintext: &str, key: &[u8]) -> Result<Envelope, CipherError> {
    let cipher = build_cipher(key)?;

    let mut iv = [0u8; IV_LEN];
    OsRng
        .try_fill_bytes(&mut iv)
        .map_err(|_| CipherError::RandomnessUnavailable)?;

    let mut buffer = plaintext.as_bytes().to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::<U16>::from_slice(&iv), b"", &mut buffer)
        // Only reachable for plaintexts beyond GCM's 64 GiB limit.
        .map_err(|_| CipherError::InvalidEnvelope("plaintext too long".into()))?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(&tag);

    Ok(Envelope {
        ciphertext: buffer,
        iv,
        tag: tag_bytes,
    })
}

/// Open `envelope` under `key` and return the original plaintext.
///
/// No plaintext, partial or otherwise, is returned unless the tag verifies.
///
/// # Errors
///
/// Returns [`CipherError::AuthenticationFailure`] if the tag does not verify and
/// [`CipherError::DecodeFailure`] if the authenticated bytes are not UTF-8.
pub fn decrypt_str(envelope: &Envelope, key: &[u8]) -> Result<String, CipherError> {
    let cipher = build_cipher(key)?;

    let mut buffer = envelope.ciphertext.clone();
    cipher
        .decrypt_in_place_detached(
            Nonce::<U16>::from_slice(&envelope.iv),
            b"",
            &mut buffer,
            Tag::from_slice(&envelope.tag),
        )
        .map_err(|_| CipherError::AuthenticationFailure)?;

    String::from_utf8(buffer).map_err(|_| CipherError::DecodeFailure)
}

fn build_cipher(key: &[u8]) -> Result<Aes256Gcm16, CipherError> {
    if key.len() != KEY_LEN {
        return Err(CipherError::InvalidKeyLength);
    }
    Aes256Gcm16::new_from_slice(key).map_err(|_| CipherError::InvalidKeyLength)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn random_key() -> Vec<u8> {
        let mut key = vec![0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        key
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let key = random_key();
        for plaintext in ["", "stall 14", "{\"email\":\"a@b.com\"}", "naïve café ☕"] {
            let envelope = encrypt_str(plaintext, &key).unwrap();
            assert_eq!(decrypt_str(&envelope, &key).unwrap(), plaintext);
        }
    }

    #[test]
    fn envelope_field_sizes() {
        let key = random_key();
        let envelope = encrypt_str("hello", &key).unwrap();
        assert_eq!(envelope.iv.len(), 16);
        assert_eq!(envelope.tag.len(), 16);
        assert_eq!(envelope.ciphertext.len(), "hello".len());
    }

    #[test]
    fn wrong_key_fails_decryption() {
        let key1 = random_key();
        let key2 = random_key();
        let envelope = encrypt_str("secret", &key1).unwrap();
        assert!(matches!(
            decrypt_str(&envelope, &key2),
            Err(CipherError::AuthenticationFailure)
        ));
    }

    #[test]
    fn invalid_key_length_rejected() {
        let short_key = vec![0u8; 16];
        assert!(matches!(
            encrypt_str("x", &short_key),
            Err(CipherError::InvalidKeyLength)
        ));
    }

    #[test]
    fn every_single_bit_flip_fails_auth() {
        let key = random_key();
        let original = encrypt_str("tamper me", &key).unwrap();

        for byte in 0..original.ciphertext.len() {
            for bit in 0..8 {
                let mut e = original.clone();
                e.ciphertext[byte] ^= 1 << bit;
                assert!(matches!(
                    decrypt_str(&e, &key),
                    Err(CipherError::AuthenticationFailure)
                ));
            }
        }
        for byte in 0..IV_LEN {
            for bit in 0..8 {
                let mut e = original.clone();
                e.iv[byte] ^= 1 << bit;
                assert!(decrypt_str(&e, &key).is_err());
            }
        }
        for byte in 0..TAG_LEN {
            for bit in 0..8 {
                let mut e = original.clone();
                e.tag[byte] ^= 1 << bit;
                assert!(decrypt_str(&e, &key).is_err());
            }
        }
    }

    #[test]
    fn ivs_and_ciphertexts_are_fresh() {
        let key = random_key();
        let mut ivs = HashSet::new();
        let mut ciphertexts = HashSet::new();
        for _ in 0..1000 {
            let e = encrypt_str("same plaintext", &key).unwrap();
            ivs.insert(e.iv);
            ciphertexts.insert(e.ciphertext);
        }
        assert_eq!(ivs.len(), 1000);
        assert_eq!(ciphertexts.len(), 1000);
    }

    #[test]
    fn non_utf8_plaintext_is_decode_failure() {
        // Seal raw invalid UTF-8 directly with the underlying cipher.
        let key = random_key();
        let cipher = build_cipher(&key).unwrap();
        let iv = [7u8; IV_LEN];
        let mut buffer = vec![0xff, 0xfe, 0xfd];
        let tag = cipher
            .encrypt_in_place_detached(Nonce::<U16>::from_slice(&iv), b"", &mut buffer)
            .unwrap();
        let mut tag_bytes = [0u8; TAG_LEN];
        tag_bytes.copy_from_slice(&tag);
        let envelope = Envelope {
            ciphertext: buffer,
            iv,
            tag: tag_bytes,
        };
        assert!(matches!(
            decrypt_str(&envelope, &key),
            Err(CipherError::DecodeFailure)
        ));
    }
}
