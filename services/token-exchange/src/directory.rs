//! Identity directory client.
//!
//! Subject tokens carry an opaque identity id. The e-mail that visas are
//! issued against lives in the identity directory's admin API, read with
//! `GET {base}/admin/identities/{id}` and taken from `traits.email`.
use async_trait::async_trait;
use passport_authz::{AuthzError, AuthzResult};
use passport_common::observability::inject_trace_context;
use serde::Deserialize;
use url::Url;

const IDENTITY_DIRECTORY_TARGET: &str = "identity directory";

#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Resolves the e-mail address of a verified identity.
    async fn email_for(&self, identity_id: &str) -> AuthzResult<String>;
}

#[derive(Debug, Deserialize)]
struct IdentityRecord {
    #[serde(default)]
    traits: IdentityTraits,
}

#[derive(Debug, Default, Deserialize)]
struct IdentityTraits {
    email: Option<String>,
}

#[derive(Clone)]
pub struct HttpIdentityDirectory {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpIdentityDirectory {
    pub fn new(base_url: &str, client: reqwest::Client) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)?;
        anyhow::ensure!(
            !base_url.cannot_be_a_base(),
            "identity directory url {base_url} cannot be a base"
        );
        Ok(Self { base_url, client })
    }

    fn identity_url(&self, identity_id: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["admin", "identities", identity_id]);
        }
        url
    }
}

#[async_trait]
impl IdentityDirectory for HttpIdentityDirectory {
    async fn email_for(&self, identity_id: &str) -> AuthzResult<String> {
        let url = self.identity_url(identity_id);
        let response = inject_trace_context(self.client.get(url.clone()))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| AuthzError::upstream(IDENTITY_DIRECTORY_TARGET, err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AuthzError::upstream_status(
                IDENTITY_DIRECTORY_TARGET,
                status.as_u16(),
                format!("GET {url} returned {status}"),
            ));
        }
        let record: IdentityRecord = response
            .json()
            .await
            .map_err(|err| AuthzError::upstream(IDENTITY_DIRECTORY_TARGET, err))?;
        record
            .traits
            .email
            .filter(|email| !email.trim().is_empty())
            .ok_or_else(|| {
                AuthzError::upstream(IDENTITY_DIRECTORY_TARGET, "identity has no email trait")
            })
    }
}
