//! Common error types shared across crates.

use thiserror::Error;

/// Top-level service error type.
///
/// Variants map to HTTP status codes returned to callers:
/// - [`ServiceError::BadRequest`] → 400
/// - [`ServiceError::UnknownKey`] → 404
/// - [`ServiceError::DecryptionFailed`] → 422
/// - [`ServiceError::Unavailable`] → 503
/// - [`ServiceError::Internal`] → 500
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request was malformed: empty key identifier, bad base64, wrong IV or tag size.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Decryption was requested under a key identifier that has never been provisioned.
    #[error("unknown key identifier")]
    UnknownKey,

    /// The envelope failed authentication or did not decrypt to UTF-8.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// The key store could not be reached.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// An unexpected internal error occurred, including secure randomness failures.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::BadRequest(_) => 400,
            ServiceError::UnknownKey => 404,
            ServiceError::DecryptionFailed(_) => 422,
            ServiceError::Unavailable(_) => 503,
            ServiceError::Internal(_) => 500,
        }
    }

    /// Short machine-readable code sent in the `code` field of error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::BadRequest(_) => "bad_request",
            ServiceError::UnknownKey => "unknown_key",
            ServiceError::DecryptionFailed(_) => "decryption_failed",
            ServiceError::Unavailable(_) => "service_unavailable",
            ServiceError::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_codes() {
        assert_eq!(ServiceError::BadRequest("x".into()).http_status(), 400);
        assert_eq!(ServiceError::UnknownKey.http_status(), 404);
        assert_eq!(
            ServiceError::DecryptionFailed("x".into()).http_status(),
            422
        );
        assert_eq!(ServiceError::Unavailable("x".into()).http_status(), 503);
        assert_eq!(ServiceError::Internal("x".into()).http_status(), 500);
    }

    #[test]
    fn codes_are_snake_case() {
        assert_eq!(ServiceError::UnknownKey.code(), "unknown_key");
        assert_eq!(
            ServiceError::DecryptionFailed("x".into()).code(),
            "decryption_failed"
        );
    }

    #[test]
    fn display_includes_message() {
        let e = ServiceError::BadRequest("iv must be 16 bytes".into());
        assert!(e.to_string().contains("iv must be 16 bytes"));
    }
}
