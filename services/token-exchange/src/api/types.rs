use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const TOKEN_EXCHANGE_GRANT: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
pub const BEARER: &str = "Bearer";

/// Form body of `POST /token-exchange`. `resource` may repeat.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct TokenExchangeForm {
    pub grant_type: String,
    pub subject_token: String,
    pub subject_token_type: String,
    pub requested_token_type: String,
    pub resource: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenExchangeResponse {
    /// The signed passport.
    pub access_token: String,
    pub issued_token_type: String,
    pub token_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VerifyPassportRequest {
    pub passport_token: String,
    /// Tier value that at least one verified visa must carry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_grant: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VisaGrant {
    pub issuer: String,
    pub value: String,
    pub source: String,
    pub asserted: i64,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VerifyPassportResponse {
    pub subject: String,
    pub issuer: String,
    pub audiences: Vec<String>,
    pub visas: Vec<VisaGrant>,
}
