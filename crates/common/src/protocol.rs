//! Request and response types exchanged with callers.
//!
//! These types are serialised as JSON over the public HTTP API. Field names are
//! camelCase on the wire.

use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Wire form of an encrypted envelope.
///
/// Every field is standard (padded) base64. `iv` and `tag` must decode to
/// exactly 16 bytes each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeWire {
    /// AES-256-GCM ciphertext, without the tag.
    pub ciphertext: String,
    /// 128-bit initialisation vector.
    pub iv: String,
    /// 128-bit authentication tag.
    pub tag: String,
}

// ---------------------------------------------------------------------------
// Encrypt / decrypt endpoints
// ---------------------------------------------------------------------------

/// Request body for `POST /encrypt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptRequest {
    /// Names the logical key; created on first use.
    pub key_id: String,
    /// UTF-8 text to seal.
    pub plaintext: String,
}

/// Successful response body for `POST /encrypt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptResponse {
    pub envelope: EnvelopeWire,
}

/// Request body for `POST /decrypt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptRequest {
    /// Must name a key that already exists.
    pub key_id: String,
    pub envelope: EnvelopeWire,
}

/// Successful response body for `POST /decrypt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptResponse {
    pub plaintext: String,
}

// ---------------------------------------------------------------------------
// Verify endpoint
// ---------------------------------------------------------------------------

/// A single profile value as it appeared on the wire.
///
/// Numbers keep their original text (`1e2` stays `1e2`) and an explicit
/// `null` stays `null`, so re-serialising reproduces what the producer wrote.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(serde_json::Number),
    Null,
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(s) => Ok(FieldValue::Text(s)),
            serde_json::Value::Number(n) => Ok(FieldValue::Number(n)),
            serde_json::Value::Null => Ok(FieldValue::Null),
            other => Err(serde::de::Error::custom(format!(
                "profile field must be a string, number or null, got {other}"
            ))),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_owned())
    }
}

impl From<u64> for FieldValue {
    fn from(n: u64) -> Self {
        FieldValue::Number(n.into())
    }
}

/// Plaintext user profile supplied alongside an envelope to `POST /verify`.
///
/// Declaration order is the canonical serialisation order; do not reorder
/// fields. Absent fields are omitted from the serialised form; fields sent as
/// `null` are kept as [`FieldValue::Null`] and serialised as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileFields {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub username: Option<FieldValue>,
    /// Doubles as the key identifier for verification. A `null` email is
    /// treated as absent; such a profile can never verify.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub role: Option<FieldValue>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub avatar: Option<FieldValue>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub phone: Option<FieldValue>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub city: Option<FieldValue>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<FieldValue>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub region: Option<FieldValue>,
}

/// A field that is present on the wire is `Some`, even when its value is `null`.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<FieldValue>, D::Error> {
    FieldValue::deserialize(deserializer).map(Some)
}

/// Request body for `POST /verify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub profile: ProfileFields,
    pub envelope: EnvelopeWire,
}

/// Response body for `POST /verify`. Always returned with `200 OK`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub verified: bool,
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"bad_request"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&crate::ServiceError> for ErrorResponse {
    fn from(e: &crate::ServiceError) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Overall service status: `"ok"` or `"degraded"`.
    pub status: String,
    /// Key store backend in use: `"file"` or `"memory"`.
    pub key_store: String,
    /// Number of keys currently held in the in-process cache.
    pub keys_cached: usize,
}
