//! OpenAPI document for the token exchange, served at `/openapi.json`.
use crate::api::types::{
    TokenExchangeForm, TokenExchangeResponse, VerifyPassportRequest, VerifyPassportResponse,
    VisaGrant,
};
use crate::api::{exchange, passports};
use passport_common::ErrorResponse;
use passport_common::wellknown::{self, HealthStatus, JwkResponse, JwksResponse};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "token-exchange",
        version = "v1",
        description = "Exchanges identity-provider tokens for GA4GH passports"
    ),
    paths(
        exchange::token_exchange,
        passports::verify_passport,
        wellknown::publish_jwks,
        wellknown::system_health
    ),
    components(schemas(
        TokenExchangeForm,
        TokenExchangeResponse,
        VerifyPassportRequest,
        VerifyPassportResponse,
        VisaGrant,
        JwksResponse,
        JwkResponse,
        HealthStatus,
        ErrorResponse
    )),
    tags(
        (name = "exchange", description = "Token exchange"),
        (name = "passports", description = "Relying-party passport verification"),
        (name = "keys", description = "Published verification keys"),
        (name = "system", description = "Health")
    )
)]
pub struct ApiDoc;
