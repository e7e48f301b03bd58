use async_trait::async_trait;
use passport_authz::{AuthzError, AuthzResult};
use passport_common::observability::inject_trace_context;
use serde::{Deserialize, Serialize};

const VISA_ISSUER_TARGET: &str = "visa issuer";

/// Where the broker obtains visas for a subject.
#[async_trait]
pub trait VisaSource: Send + Sync {
    /// Presents `subject_token` and returns the visa strings exactly as issued.
    async fn request_visas(&self, subject_token: &str) -> AuthzResult<Vec<String>>;
}

#[derive(Serialize)]
struct VisaRequestBody<'a> {
    subject_token: &'a str,
}

#[derive(Deserialize)]
struct VisaResponseBody {
    visa_tokens: Vec<String>,
}

/// `POST {base}/visas` against a remote visa issuer.
#[derive(Clone)]
pub struct HttpVisaIssuerClient {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpVisaIssuerClient {
    pub fn new(base_url: &str, client: reqwest::Client) -> Self {
        Self {
            endpoint: format!("{}/visas", base_url.trim_end_matches('/')),
            client,
        }
    }
}

#[async_trait]
impl VisaSource for HttpVisaIssuerClient {
    async fn request_visas(&self, subject_token: &str) -> AuthzResult<Vec<String>> {
        let response = inject_trace_context(self.client.post(&self.endpoint))
            .json(&VisaRequestBody { subject_token })
            .send()
            .await
            .map_err(|err| AuthzError::upstream(VISA_ISSUER_TARGET, err))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "visa issuer refused request");
            return Err(AuthzError::upstream_status(
                VISA_ISSUER_TARGET,
                status.as_u16(),
                format!("POST {} returned {status}: {detail}", self.endpoint),
            ));
        }
        let body: VisaResponseBody = response
            .json()
            .await
            .map_err(|err| AuthzError::upstream(VISA_ISSUER_TARGET, err))?;
        Ok(body.visa_tokens)
    }
}
