use crate::api::types::{BEARER, TOKEN_EXCHANGE_GRANT, TokenExchangeForm, TokenExchangeResponse};
use crate::app::AppState;
use crate::broker::{ExchangeError, ExchangeRequest};
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use passport_authz::TokenType;
use passport_common::ApiError;
use passport_common::error::api_bad_request;

impl From<ExchangeError> for ApiError {
    fn from(err: ExchangeError) -> Self {
        ApiError::from(err.source)
    }
}

#[utoipa::path(
    post,
    path = "/token-exchange",
    tag = "exchange",
    request_body(content = TokenExchangeForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Signed passport carrying every verified visa; the visa list may be empty", body = TokenExchangeResponse),
        (status = 400, description = "Missing form field, wrong grant type, or bad resource", body = passport_common::ErrorResponse),
        (status = 401, description = "Subject token expired or failed verification", body = passport_common::ErrorResponse),
        (status = 403, description = "A visa was issued to a different subject", body = passport_common::ErrorResponse),
        (status = 503, description = "Identity directory, visa issuer, or key set unreachable", body = passport_common::ErrorResponse),
        (status = 500, description = "Unexpected signing or verification failure", body = passport_common::ErrorResponse)
    )
)]
/// Exchange an identity-provider token for a passport scoped to the
/// requested resources.
///
/// # Errors
/// - 400 for an unusable form.
/// - 401 when the subject token is rejected.
/// - Upstream status (or 503) when a collaborator fails; nothing is issued.
pub async fn token_exchange(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<TokenExchangeResponse>, ApiError> {
    let form = parse_form(&body);
    let request = validate(form)?;
    let issued = state.broker.exchange(&request).await?;
    Ok(Json(TokenExchangeResponse {
        access_token: issued.access_token,
        issued_token_type: TokenType::Passport.as_str().to_string(),
        token_type: BEARER.to_string(),
    }))
}

fn parse_form(body: &[u8]) -> TokenExchangeForm {
    let mut form = TokenExchangeForm::default();
    for (name, value) in url::form_urlencoded::parse(body) {
        match name.as_ref() {
            "grant_type" => form.grant_type = value.into_owned(),
            "subject_token" => form.subject_token = value.into_owned(),
            "subject_token_type" => form.subject_token_type = value.into_owned(),
            "requested_token_type" => form.requested_token_type = value.into_owned(),
            "resource" => form.resource.push(value.into_owned()),
            _ => {}
        }
    }
    form
}

fn validate(form: TokenExchangeForm) -> Result<ExchangeRequest, ApiError> {
    if form.grant_type != TOKEN_EXCHANGE_GRANT {
        return Err(api_bad_request(&format!(
            "grant_type must be {TOKEN_EXCHANGE_GRANT}"
        )));
    }
    for (field, value) in [
        ("subject_token", &form.subject_token),
        ("subject_token_type", &form.subject_token_type),
        ("requested_token_type", &form.requested_token_type),
    ] {
        if value.trim().is_empty() {
            return Err(api_bad_request(&format!("{field} is required")));
        }
    }
    Ok(ExchangeRequest::new(form.subject_token, form.resource)?)
}
