//! Endpoints every key-holding service exposes: its published key set and a
//! readiness probe. Both read the service's [`KeyManager`] through
//! [`axum::extract::FromRef`], so any state that can hand out an
//! `Arc<KeyManager>` can mount them.
use crate::error::{ApiError, api_internal};
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use passport_authz::{Jwks, KeyManager, KeyUse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JwkResponse {
    pub kty: String,
    pub kid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub use_field: Option<String>,
    pub n: String,
    pub e: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JwksResponse {
    pub keys: Vec<JwkResponse>,
}

impl From<Jwks> for JwksResponse {
    fn from(jwks: Jwks) -> Self {
        Self {
            keys: jwks
                .keys
                .into_iter()
                .map(|key| JwkResponse {
                    kty: key.kty,
                    kid: key.kid,
                    alg: key.alg,
                    use_field: key.use_field.map(|key_use| {
                        match key_use {
                            KeyUse::Sig => "sig",
                            KeyUse::Enc => "enc",
                        }
                        .to_string()
                    }),
                    n: key.n,
                    e: key.e,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthStatus {
    pub status: String,
}

#[utoipa::path(
    get,
    path = "/.well-known/jwks.json",
    tag = "keys",
    responses(
        (status = 200, description = "Public key set used to verify tokens issued here", body = JwksResponse),
        (status = 500, description = "Signing key not initialized", body = crate::error::ErrorResponse)
    )
)]
pub async fn publish_jwks(State(keys): State<Arc<KeyManager>>) -> Result<Json<JwksResponse>, ApiError> {
    let jwks = keys
        .public_key_set()
        .map_err(|err| api_internal("signing key not initialized", &err))?;
    Ok(Json(jwks.into()))
}

#[utoipa::path(
    get,
    path = "/v1/system/health",
    tag = "system",
    responses(
        (status = 200, description = "Keypair ready; accepting traffic", body = HealthStatus),
        (status = 503, description = "Keypair not generated yet", body = crate::error::ErrorResponse)
    )
)]
pub async fn system_health(State(keys): State<Arc<KeyManager>>) -> Result<Json<HealthStatus>, ApiError> {
    if !keys.is_initialized() {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "not_ready",
            "signing key not initialized",
        ));
    }
    Ok(Json(HealthStatus {
        status: "ok".to_string(),
    }))
}
