//! Visa issuer HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum router and defines the shared state injected into
//! handlers. Everything in the state is constructed once at startup and is
//! read-only afterwards.
use crate::api;
use crate::api::openapi::ApiDoc;
use crate::groups::AuthorizedGroupSet;
use crate::issuer::VisaIssuer;
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
    pub issuer: Arc<VisaIssuer>,
    pub groups: Arc<AuthorizedGroupSet>,
    /// Verifies inbound subject tokens through their `jku`/`kid`.
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
        .route("/visas", axum::routing::post(api::visas::issue_visas))
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
