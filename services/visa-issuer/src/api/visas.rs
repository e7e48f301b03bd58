use crate::api::types::{VisaRequest, VisaResponse};
use crate::app::AppState;
use axum::Json;
use axum::extract::State;
use passport_authz::{AuthzError, PassportClaims, TokenType};
use passport_common::ApiError;
use passport_common::error::api_bad_request;

#[utoipa::path(
    post,
    path = "/visas",
    tag = "visas",
    request_body = VisaRequest,
    responses(
        (status = 200, description = "Visas for every tier the subject is authorized for; empty if none", body = VisaResponse),
        (status = 400, description = "Missing or unreadable body", body = passport_common::ErrorResponse),
        (status = 401, description = "Subject token expired, forged, or signed under an untrusted key set", body = passport_common::ErrorResponse),
        (status = 503, description = "Subject token key set unreachable", body = passport_common::ErrorResponse)
    )
)]
/// Verify the caller's subject token, then sign one visa per authorized tier.
///
/// # Errors
/// - 400 when the body is absent or not `{"subject_token": ...}`.
/// - 401 when the subject token fails verification.
/// - The key set endpoint's status (or 503) when its key cannot be fetched.
pub async fn issue_visas(
    State(state): State<AppState>,
    request: Option<Json<VisaRequest>>,
) -> Result<Json<VisaResponse>, ApiError> {
    let result = issue(&state, request).await;
    let outcome = match &result {
        Ok(response) if response.visa_tokens.is_empty() => "empty",
        Ok(_) => "issued",
        Err(_) => "rejected",
    };
    metrics::counter!("visa_issuer_requests_total", "outcome" => outcome).increment(1);
    result.map(Json)
}

async fn issue(state: &AppState, request: Option<Json<VisaRequest>>) -> Result<VisaResponse, ApiError> {
    let Some(Json(request)) = request else {
        return Err(api_bad_request("body must be {\"subject_token\": <token>}"));
    };
    if request.subject_token.trim().is_empty() {
        return Err(AuthzError::MalformedRequest("subject_token is empty".to_string()).into());
    }

    let (_, claims): (_, PassportClaims) = state
        .verifier
        .verify_token(&request.subject_token, TokenType::Passport)
        .await
        .inspect_err(|err| tracing::info!(error = %err, "subject token rejected"))?;

    let visa_tokens = state.issuer.issue_visas(&claims.sub, &state.groups)?;
    tracing::info!(count = visa_tokens.len(), "visas issued");
    Ok(VisaResponse { visa_tokens })
}
