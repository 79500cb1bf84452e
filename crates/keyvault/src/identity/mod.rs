//! Profile re-derivation check.
//!
//! A caller holds a plaintext [`ProfileFields`] and an envelope that was
//! issued by encrypting the profile's canonical serialisation under the key
//! named by the profile's email. [`verify`] re-derives that serialisation and
//! checks it against what the envelope actually decrypts to.
//!
//! # Canonical serialisation
//!
//! Compact JSON, no whitespace, keys in the fixed order
//! `username, email, role, avatar, phone, city, postalCode, region`, absent
//! fields omitted, explicit `null` kept, numbers emitted with their original text.

use common::protocol::ProfileFields;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::crypto::Envelope;
use crate::keys::{key_fingerprint, KeyRing, KeyRingError, KeyStore};

/// Canonical JSON string for `profile`.
pub fn canonical_json(profile: &ProfileFields) -> Result<String, serde_json::Error> {
    serde_json::to_string(profile)
}

/// Why a profile did not verify. Only ever logged, never returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingEmail,
    UnknownKey,
    Decrypt,
    Store,
    Mismatch,
}

/// Returns `true` iff `envelope` decrypts, under the key named by
/// `profile.email`, to exactly [`canonical_json`] of `profile`.
///
/// Every failure, including an unreachable key store, is reported as `false`.
pub async fn verify<S: KeyStore>(
    ring: &KeyRing<S>,
    profile: &ProfileFields,
    envelope: &Envelope,
) -> bool {
    match check(ring, profile, envelope).await {
        Ok(()) => true,
        Err(reason) => {
            let key = profile.email.as_deref().map(key_fingerprint);
            if reason == Rejection::Store {
                warn!(?key, ?reason, "profile verification failed");
            } else {
                debug!(?key, ?reason, "profile verification failed");
            }
            false
        }
    }
}

async fn check<S: KeyStore>(
    ring: &KeyRing<S>,
    profile: &ProfileFields,
    envelope: &Envelope,
) -> Result<(), Rejection> {
    let email = match profile.email.as_deref() {
        Some(e) if !e.is_empty() => e,
        _ => return Err(Rejection::MissingEmail),
    };

    let decrypted = ring.decrypt(envelope, email).await.map_err(|e| match e {
        KeyRingError::UnknownKey | KeyRingError::EmptyKeyId => Rejection::UnknownKey,
        KeyRingError::Cipher(_) => Rejection::Decrypt,
        KeyRingError::Store(_) => Rejection::Store,
    })?;

    let expected = canonical_json(profile).map_err(|_| Rejection::Mismatch)?;
    if bool::from(decrypted.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(Rejection::Mismatch)
    }
}
