//! OpenAPI document for the visa issuer, served at `/openapi.json`.
use crate::api::types::{VisaRequest, VisaResponse};
use crate::api::visas;
use passport_common::ErrorResponse;
use passport_common::wellknown::{self, HealthStatus, JwkResponse, JwksResponse};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "visa-issuer",
        version = "v1",
        description = "Issues GA4GH ControlledAccessGrants visas to authorized identities"
    ),
    paths(visas::issue_visas, wellknown::publish_jwks, wellknown::system_health),
    components(schemas(
        VisaRequest,
        VisaResponse,
        JwksResponse,
        JwkResponse,
        HealthStatus,
        ErrorResponse
    )),
    tags(
        (name = "visas", description = "Visa issuance"),
        (name = "keys", description = "Published verification keys"),
        (name = "system", description = "Health")
    )
)]
pub struct ApiDoc;
