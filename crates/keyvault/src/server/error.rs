//! Conversion of key ring and cipher errors into HTTP responses.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::{protocol::ErrorResponse, ServiceError};
use tracing::warn;

use crate::crypto::CipherError;
use crate::keys::{KeyRingError, KeyStoreError};

/// Handler error: a [`ServiceError`] rendered as `{ "code", "message" }`.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self.0, "request failed");
        }
        (status, Json(ErrorResponse::from(&self.0))).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        Self(e)
    }
}

impl From<CipherError> for ApiError {
    fn from(e: CipherError) -> Self {
        let mapped = match e {
            CipherError::InvalidEnvelope(msg) => ServiceError::BadRequest(msg),
            CipherError::AuthenticationFailure | CipherError::DecodeFailure => {
                ServiceError::DecryptionFailed(e.to_string())
            }
            CipherError::RandomnessUnavailable | CipherError::InvalidKeyLength => {
                ServiceError::Internal(e.to_string())
            }
        };
        Self(mapped)
    }
}

impl From<KeyRingError> for ApiError {
    fn from(e: KeyRingError) -> Self {
        match e {
            KeyRingError::EmptyKeyId => Self(ServiceError::BadRequest(e.to_string())),
            KeyRingError::UnknownKey => Self(ServiceError::UnknownKey),
            KeyRingError::Store(KeyStoreError::Unavailable(msg)) => {
                Self(ServiceError::Unavailable(msg))
            }
            KeyRingError::Store(other) => Self(ServiceError::Internal(other.to_string())),
            KeyRingError::Cipher(c) => c.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self(ServiceError::BadRequest(e.body_text()))
    }
}
