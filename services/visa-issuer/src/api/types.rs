use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VisaRequest {
    /// Passport-typed token signed by a broker whose key set is reachable at its `jku`.
    pub subject_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VisaResponse {
    /// One compact visa per authorized tier; empty when the subject holds none.
    pub visa_tokens: Vec<String>,
}
