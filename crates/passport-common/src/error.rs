//! HTTP error envelope.
//!
//! # Purpose and responsibility
//! Gives every endpoint of both services the same error body,
//! `{"code": ..., "detail": ...}`, and one mapping from [`AuthzError`] to a
//! status code.
//!
//! # Key invariants and assumptions
//! - Token rejections are `401`, missing grants `403`, bad input `400`.
//! - Upstream failures keep the status the upstream answered with; transport
//!   failures and timeouts become `503`.
//!
//! # Security considerations
//! - Internal failures (key material, unexpected JWT errors) are logged
//!   server-side and returned with a generic detail.
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use passport_authz::AuthzError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub detail: String,
}

/// Status code plus JSON body; returned by every handler on failure.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &str, detail: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                code: code.to_string(),
                detail: detail.into(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::Expired => api_unauthorized("expired_token", &err.to_string()),
            AuthzError::InvalidSignature
            | AuthzError::KeyNotFound { .. }
            | AuthzError::UntrustedIssuer(_)
            | AuthzError::MalformedToken(_) => api_unauthorized("invalid_token", &err.to_string()),
            AuthzError::Unauthorized(ref detail) => api_forbidden(detail),
            AuthzError::MalformedRequest(ref detail) => api_bad_request(detail),
            AuthzError::UpstreamUnavailable { status, .. } => {
                let status = status
                    .and_then(|code| StatusCode::from_u16(code).ok())
                    .filter(|code| !code.is_success())
                    .unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
                tracing::warn!(error = %err, %status, "upstream dependency failed");
                ApiError::new(status, "upstream_unavailable", err.to_string())
            }
            AuthzError::InvalidKey(_)
            | AuthzError::KeyNotInitialized
            | AuthzError::KeyGeneration(_)
            | AuthzError::Jwt(_) => api_internal("internal token error", &err),
        }
    }
}

pub fn api_unauthorized(code: &str, detail: &str) -> ApiError {
    ApiError::new(StatusCode::UNAUTHORIZED, code, detail)
}

pub fn api_forbidden(detail: &str) -> ApiError {
    ApiError::new(StatusCode::FORBIDDEN, "forbidden", detail)
}

pub fn api_bad_request(detail: &str) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "invalid_request", detail)
}

/// Logs `err` and returns a generic 500.
pub fn api_internal(detail: &str, err: &dyn std::fmt::Display) -> ApiError {
    tracing::error!(error = %err, "internal error");
    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", detail)
}
