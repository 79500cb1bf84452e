//! Axum request handlers for all service endpoints.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::protocol::{
    DecryptRequest, DecryptResponse, EncryptRequest, EncryptResponse, ErrorResponse,
    HealthResponse, VerifyRequest, VerifyResponse,
};
use tracing::{debug, warn};

use super::{error::ApiError, state::AppState};
use crate::crypto::Envelope;
use crate::identity;
use crate::keys::{key_fingerprint, KeyStore};

/// `POST /encrypt` — seal `plaintext` under `keyId`, provisioning the key on first use.
pub async fn encrypt(
    State(state): State<AppState>,
    body: Result<Json<EncryptRequest>, JsonRejection>,
) -> Result<Json<EncryptResponse>, ApiError> {
    let Json(req) = body?;
    let envelope = state.key_ring.encrypt(&req.plaintext, &req.key_id).await?;
    debug!(key = %key_fingerprint(&req.key_id), "envelope issued");
    Ok(Json(EncryptResponse {
        envelope: envelope.to_wire(),
    }))
}

/// `POST /decrypt` — open an envelope with the existing key named `keyId`.
///
/// Returns 404 for an identifier that was never provisioned and 422 when the
/// envelope fails authentication.
pub async fn decrypt(
    State(state): State<AppState>,
    body: Result<Json<DecryptRequest>, JsonRejection>,
) -> Result<Json<DecryptResponse>, ApiError> {
    let Json(req) = body?;
    let envelope = Envelope::from_wire(&req.envelope)?;
    let plaintext = state.key_ring.decrypt(&envelope, &req.key_id).await?;
    Ok(Json(DecryptResponse { plaintext }))
}

/// `POST /verify` — check a plaintext profile against its issued envelope.
///
/// Always `200 OK` for a well-formed body; any decryption problem is
/// `verified: false`.
pub async fn verify(
    State(state): State<AppState>,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let Json(req) = body?;
    let verified = match Envelope::from_wire(&req.envelope) {
        Ok(envelope) => identity::verify(&state.key_ring, &req.profile, &envelope).await,
        Err(e) => {
            debug!(error = %e, "verify received a malformed envelope");
            false
        }
    };
    Ok(Json(VerifyResponse { verified }))
}

/// `GET /health` — liveness and readiness check.
///
/// Returns `200 OK` when the key store answers a health check, `503` otherwise.
pub async fn health(State(state): State<AppState>) -> Response {
    let store = state.key_ring.store();
    let (status_code, status_str) = match store.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            warn!(error = %e, "key store health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded")
        }
    };

    let body = HealthResponse {
        status: status_str.into(),
        key_store: store.kind().into(),
        keys_cached: state.key_ring.cached_len().await,
    };
    (status_code, Json(body)).into_response()
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}

#[cfg(test)]
mod tests {
    use axum::{routing::post, Router};
    use axum_test::TestServer;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use common::protocol::EnvelopeWire;
    use serde_json::json;

    use super::*;
    use crate::keys::{FileKeyStore, KeyBackend};

    fn server_with(state: AppState) -> TestServer {
        let app = Router::new()
            .route("/encrypt", post(encrypt))
            .route("/decrypt", post(decrypt))
            .route("/verify", post(verify))
            .route("/health", axum::routing::get(health))
            .with_state(state);
        TestServer::new(app).unwrap()
    }

    fn server() -> TestServer {
        server_with(AppState::default())
    }

    async fn issue(server: &TestServer, key_id: &str, plaintext: &str) -> EnvelopeWire {
        let resp = server
            .post("/encrypt")
            .json(&json!({"keyId": key_id, "plaintext": plaintext}))
            .await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        resp.json::<EncryptResponse>().envelope
    }

    fn profile_json() -> serde_json::Value {
        json!({
            "username": "a",
            "email": "a@b.com",
            "role": "user",
            "phone": 5551234,
            "postalCode": "02139",
        })
    }

    #[tokio::test]
    async fn encrypt_then_decrypt() {
        let server = server();
        let envelope = issue(&server, "a@b.com", "stall 7 lease").await;
        assert_eq!(STANDARD.decode(&envelope.iv).unwrap().len(), 16);
        assert_eq!(STANDARD.decode(&envelope.tag).unwrap().len(), 16);

        let resp = server
            .post("/decrypt")
            .json(&json!({"keyId": "a@b.com", "envelope": envelope}))
            .await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert_eq!(resp.json::<DecryptResponse>().plaintext, "stall 7 lease");
    }

    #[tokio::test]
    async fn decrypt_unknown_key_is_404() {
        let server = server();
        let envelope = issue(&server, "a@b.com", "x").await;
        let resp = server
            .post("/decrypt")
            .json(&json!({"keyId": "nobody@b.com", "envelope": envelope}))
            .await;
        assert_eq!(resp.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(resp.json::<ErrorResponse>().code, "unknown_key");
    }

    #[tokio::test]
    async fn decrypt_tampered_envelope_is_422() {
        let server = server();
        let mut envelope = issue(&server, "a@b.com", "x").await;
        let mut tag = STANDARD.decode(&envelope.tag).unwrap();
        tag[3] ^= 0x80;
        envelope.tag = STANDARD.encode(tag);

        let resp = server
            .post("/decrypt")
            .json(&json!({"keyId": "a@b.com", "envelope": envelope}))
            .await;
        assert_eq!(resp.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(resp.json::<ErrorResponse>().code, "decryption_failed");
    }

    #[tokio::test]
    async fn decrypt_short_iv_is_400() {
        let server = server();
        let mut envelope = issue(&server, "a@b.com", "x").await;
        envelope.iv = STANDARD.encode([0u8; 12]);
        let resp = server
            .post("/decrypt")
            .json(&json!({"keyId": "a@b.com", "envelope": envelope}))
            .await;
        assert_eq!(resp.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn encrypt_empty_key_id_is_400() {
        let resp = server()
            .post("/encrypt")
            .json(&json!({"keyId": "", "plaintext": "x"}))
            .await;
        assert_eq!(resp.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(resp.json::<ErrorResponse>().code, "bad_request");
    }

    #[tokio::test]
    async fn malformed_body_is_400_with_error_body() {
        let resp = server()
            .post("/encrypt")
            .json(&json!({"plaintext": "missing key id"}))
            .await;
        assert_eq!(resp.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(resp.json::<ErrorResponse>().code, "bad_request");
    }

    #[tokio::test]
    async fn verify_matching_profile() {
        let server = server();
        let profile: common::protocol::ProfileFields =
            serde_json::from_value(profile_json()).unwrap();
        let canonical = identity::canonical_json(&profile).unwrap();
        let envelope = issue(&server, "a@b.com", &canonical).await;

        let resp = server
            .post("/verify")
            .json(&json!({"profile": profile_json(), "envelope": envelope}))
            .await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert!(resp.json::<VerifyResponse>().verified);
    }

    #[tokio::test]
    async fn verify_mismatch_and_failures_are_false_not_errors() {
        let server = server();
        let profile: common::protocol::ProfileFields =
            serde_json::from_value(profile_json()).unwrap();
        let canonical = identity::canonical_json(&profile).unwrap();
        let envelope = issue(&server, "a@b.com", &canonical).await;

        let mut admin = profile_json();
        admin["role"] = json!("admin");
        let mut stranger = profile_json();
        stranger["email"] = json!("z@b.com");
        let mut bad_iv = envelope.clone();
        bad_iv.iv = "AAAA".into();

        for (profile, envelope) in [
            (admin, envelope.clone()),
            (stranger, envelope.clone()),
            (profile_json(), bad_iv),
        ] {
            let resp = server
                .post("/verify")
                .json(&json!({"profile": profile, "envelope": envelope}))
                .await;
            assert_eq!(resp.status_code(), StatusCode::OK);
            assert!(!resp.json::<VerifyResponse>().verified);
        }
    }

    #[tokio::test]
    async fn health_ok_for_memory_store() {
        let server = server();
        issue(&server, "a@b.com", "x").await;
        let resp = server.get("/health").await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        let body = resp.json::<HealthResponse>();
        assert_eq!(body.status, "ok");
        assert_eq!(body.key_store, "memory");
        assert_eq!(body.keys_cached, 1);
    }

    #[tokio::test]
    async fn health_degraded_when_key_dir_missing() {
        let dir = tempfile::tempdir().unwrap();
        let backend = KeyBackend::File(FileKeyStore::new(dir.path().join("absent")));
        let resp = server_with(AppState::new(backend)).get("/health").await;
        assert_eq!(resp.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(resp.json::<HealthResponse>().status, "degraded");
    }

    #[tokio::test]
    async fn encrypt_with_unwritable_store_is_503() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let backend = KeyBackend::File(FileKeyStore::new(blocker.join("keys")));

        let resp = server_with(AppState::new(backend))
            .post("/encrypt")
            .json(&json!({"keyId": "a@b.com", "plaintext": "x"}))
            .await;
        assert_eq!(resp.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(resp.json::<ErrorResponse>().code, "service_unavailable");
    }
}
