//! Axum middleware layers applied to the router.
//!
//! Includes request-id tagging, request tracing, body size and timeout
//! limits, and response compression.

use std::time::Duration;

use axum::http::HeaderName;

/// Default per-request timeout applied to all routes.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest accepted request body. Envelopes and profiles are a few hundred bytes.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Header carrying the per-request id, generated when the caller omits it.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
