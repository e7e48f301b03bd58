use crate::api::types::{VerifyPassportRequest, VerifyPassportResponse, VisaGrant};
use crate::app::AppState;
use axum::Json;
use axum::extract::State;
use passport_common::ApiError;
use passport_common::error::api_bad_request;

#[utoipa::path(
    post,
    path = "/passports/verify",
    tag = "passports",
    request_body = VerifyPassportRequest,
    responses(
        (status = 200, description = "Passport and every embedded visa verified", body = VerifyPassportResponse),
        (status = 400, description = "Missing or unreadable body", body = passport_common::ErrorResponse),
        (status = 401, description = "Passport or an embedded visa failed verification", body = passport_common::ErrorResponse),
        (status = 403, description = "No verified visa carries the required grant", body = passport_common::ErrorResponse),
        (status = 503, description = "A key set was unreachable", body = passport_common::ErrorResponse)
    )
)]
/// Verify a passport as a relying party would, re-checking each visa.
pub async fn verify_passport(
    State(state): State<AppState>,
    request: Option<Json<VerifyPassportRequest>>,
) -> Result<Json<VerifyPassportResponse>, ApiError> {
    let Some(Json(request)) = request else {
        return Err(api_bad_request(
            "body must be {\"passport_token\": <token>, \"required_grant\"?: <value>}",
        ));
    };
    let verified = state.verifier.verify(&request.passport_token).await?;
    if let Some(grant) = request.required_grant.as_deref() {
        verified.require_grant(grant)?;
    }

    let visas = verified
        .visas
        .iter()
        .map(|visa| VisaGrant {
            issuer: visa.iss.clone(),
            value: visa.payload.ga4gh_visa_v1.value.clone(),
            source: visa.payload.ga4gh_visa_v1.source.clone(),
            asserted: visa.payload.ga4gh_visa_v1.asserted,
            expires_at: visa.exp,
        })
        .collect();
    Ok(Json(VerifyPassportResponse {
        subject: verified.claims.sub,
        issuer: verified.claims.iss,
        audiences: verified.claims.payload.aud,
        visas,
    }))
}
