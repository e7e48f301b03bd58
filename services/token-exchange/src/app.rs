//! Token exchange HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum router and the shared state. The broker and the verifier
//! share one key resolver; the keypair is generated before the state exists.
use crate::api;
use crate::api::openapi::ApiDoc;
use crate::broker::PassportBroker;
use axum::Router;
use axum::extract::FromRef;
use passport_authz::{KeyManager, PassportVerifier};
use passport_common::{observability, wellknown};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use utoipa::OpenApi;

#[derive(Clone)]
pub struct AppState {
    pub keys: Arc<KeyManager>,
    pub broker: Arc<PassportBroker>,
    /// Backs `POST /passports/verify`.
    pub verifier: PassportVerifier,
}

impl FromRef<AppState> for Arc<KeyManager> {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let parent = observability::trace_context_from_headers(request.headers());
            let span = tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version()
            );
            span.set_parent(parent);
            span
        });

    Router::new()
        .route(
            "/.well-known/jwks.json",
            axum::routing::get(wellknown::publish_jwks),
        )
        .route(
            "/token-exchange",
            axum::routing::post(api::exchange::token_exchange),
        )
        .route(
            "/passports/verify",
            axum::routing::post(api::passports::verify_passport),
        )
        .route(
            "/v1/system/health",
            axum::routing::get(wellknown::system_health),
        )
        .route(
            "/openapi.json",
            axum::routing::get(|| async { axum::Json(ApiDoc::openapi()) }),
        )
        .layer(trace_layer)
        .with_state(state)
}
