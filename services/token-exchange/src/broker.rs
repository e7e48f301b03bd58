//! Token exchange: identity token in, signed passport out.
//!
//! # Purpose
//! Drives one exchange through a fixed sequence of stages:
//!
//! `ReceivedSubjectToken → IdentityVerified → IdentityResolved →
//! VisasRequested → VisasVerified → PassportSigned → Returned`
//!
//! Any failure moves the exchange to `Error` and nothing is issued.
//!
//! # Key invariants
//! - The subject token is verified against the identity provider's key set
//!   only. Its own `jku`, if present, is ignored.
//! - Failures while verifying or resolving the identity abort before the
//!   visa issuer is contacted.
//! - Every visa is verified before it is embedded. One bad visa fails the
//!   whole exchange; visas are never silently dropped.
//! - Zero visas is success: the passport carries an empty list.
//!
//! # Trust domains
//! The visa issuer does not trust the identity provider. The broker therefore
//! signs an intermediate passport under its own issuer name and presents
//! that; the issuer verifies it against the broker's published key set.
use crate::directory::IdentityDirectory;
use crate::visa_client::VisaSource;
use passport_authz::{
    AuthzError, AuthzResult, KeyManager, KeyResolver, PassportClaims, PassportPayload,
    PassportVerifier, SubjectClaims, TokenCodec, TokenType, new_jti, now_epoch_seconds,
};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeStage {
    ReceivedSubjectToken,
    IdentityVerified,
    IdentityResolved,
    VisasRequested,
    VisasVerified,
    PassportSigned,
    Returned,
    Error,
}

impl ExchangeStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReceivedSubjectToken => "received_subject_token",
            Self::IdentityVerified => "identity_verified",
            Self::IdentityResolved => "identity_resolved",
            Self::VisasRequested => "visas_requested",
            Self::VisasVerified => "visas_verified",
            Self::PassportSigned => "passport_signed",
            Self::Returned => "returned",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ExchangeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An exchange that stopped. `last_completed` is the last stage reached before
/// the failure.
#[derive(Debug, thiserror::Error)]
#[error("token exchange failed after {last_completed}: {source}")]
pub struct ExchangeError {
    pub last_completed: ExchangeStage,
    #[source]
    pub source: AuthzError,
}

/// A validated exchange request.
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    pub subject_token: String,
    pub resources: Vec<Url>,
}

impl ExchangeRequest {
    /// Rejects an empty token, an empty resource list, and any resource that
    /// is not an absolute http(s) URL with a host.
    pub fn new<I, S>(subject_token: impl Into<String>, resources: I) -> AuthzResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let subject_token = subject_token.into();
        if subject_token.trim().is_empty() {
            return Err(AuthzError::MalformedRequest(
                "subject_token is required".to_string(),
            ));
        }
        let resources = resources
            .into_iter()
            .map(|raw| parse_resource(raw.as_ref()))
            .collect::<AuthzResult<Vec<_>>>()?;
        if resources.is_empty() {
            return Err(AuthzError::MalformedRequest(
                "at least one resource is required".to_string(),
            ));
        }
        Ok(Self {
            subject_token,
            resources,
        })
    }
}

fn parse_resource(raw: &str) -> AuthzResult<Url> {
    let url = Url::parse(raw)
        .map_err(|err| AuthzError::MalformedRequest(format!("resource {raw:?}: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(AuthzError::MalformedRequest(format!(
            "resource {raw:?} must be an absolute http(s) URL"
        )));
    }
    Ok(url)
}

/// `scheme://host[:port]` of each resource, deduplicated in request order.
pub fn derive_audiences(resources: &[Url]) -> Vec<String> {
    let mut audiences: Vec<String> = Vec::new();
    for resource in resources {
        let audience = resource.origin().ascii_serialization();
        if !audiences.contains(&audience) {
            audiences.push(audience);
        }
    }
    audiences
}

#[derive(Debug, Clone)]
pub struct IssuedPassport {
    pub access_token: String,
    pub subject: String,
    pub audiences: Vec<String>,
    pub visa_count: usize,
}

#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// Trust anchor for subject tokens.
    pub idp_jwks_url: String,
    /// `iss` of the intermediate passport presented to the visa issuer.
    pub broker_issuer: String,
    /// `iss` of the passport returned to the caller.
    pub passport_issuer: String,
    pub passport_ttl: Duration,
    /// Key sets a visa batch may be signed under.
    pub trusted_visa_jku: Vec<String>,
}

pub struct PassportBroker {
    keys: Arc<KeyManager>,
    resolver: Arc<dyn KeyResolver>,
    directory: Arc<dyn IdentityDirectory>,
    visas: Arc<dyn VisaSource>,
    visa_verifier: PassportVerifier,
    codec: TokenCodec,
    settings: BrokerSettings,
}

impl PassportBroker {
    pub fn new(
        keys: Arc<KeyManager>,
        resolver: Arc<dyn KeyResolver>,
        directory: Arc<dyn IdentityDirectory>,
        visas: Arc<dyn VisaSource>,
        settings: BrokerSettings,
    ) -> Self {
        Self {
            keys,
            visa_verifier: PassportVerifier::new(resolver.clone())
                .with_trusted_visa_jku(settings.trusted_visa_jku.clone()),
            resolver,
            directory,
            visas,
            codec: TokenCodec::new(),
            settings,
        }
    }

    pub async fn exchange(&self, request: &ExchangeRequest) -> Result<IssuedPassport, ExchangeError> {
        let started = Instant::now();
        let mut stage = ExchangeStage::ReceivedSubjectToken;
        let result = self.run(request, &mut stage).await;
        metrics::histogram!("token_exchange_duration_seconds").record(started.elapsed().as_secs_f64());

        match result {
            Ok(issued) => {
                metrics::counter!("token_exchange_requests_total", "outcome" => "issued").increment(1);
                tracing::info!(visas = issued.visa_count, audiences = issued.audiences.len(), "passport issued");
                Ok(issued)
            }
            Err(source) => {
                let outcome = if source.is_token_rejection() {
                    "rejected"
                } else {
                    "failed"
                };
                metrics::counter!("token_exchange_requests_total", "outcome" => outcome).increment(1);
                tracing::warn!(last_completed = %stage, error = %source, "token exchange aborted");
                let last_completed = stage;
                advance(&mut stage, ExchangeStage::Error);
                Err(ExchangeError {
                    last_completed,
                    source,
                })
            }
        }
    }

    async fn run(&self, request: &ExchangeRequest, stage: &mut ExchangeStage) -> AuthzResult<IssuedPassport> {
        let subject = self.verify_subject_token(&request.subject_token).await?;
        advance(stage, ExchangeStage::IdentityVerified);

        let email = self.directory.email_for(&subject.sub).await?;
        advance(stage, ExchangeStage::IdentityResolved);

        let audiences = derive_audiences(&request.resources);
        let inner = self.sign_passport(
            &self.settings.broker_issuer,
            &email,
            &audiences,
            Vec::new(),
        )?;
        let visas = self.visas.request_visas(&inner).await?;
        advance(stage, ExchangeStage::VisasRequested);

        self.visa_verifier.verify_visa_batch(&email, &visas).await?;
        advance(stage, ExchangeStage::VisasVerified);

        let visa_count = visas.len();
        let access_token = self.sign_passport(
            &self.settings.passport_issuer,
            &email,
            &audiences,
            visas,
        )?;
        advance(stage, ExchangeStage::PassportSigned);

        let issued = IssuedPassport {
            access_token,
            subject: email,
            audiences,
            visa_count,
        };
        advance(stage, ExchangeStage::Returned);
        Ok(issued)
    }

    async fn verify_subject_token(&self, token: &str) -> AuthzResult<SubjectClaims> {
        let header = self.codec.decode_header(token)?;
        let kid = header.kid_required()?;
        let key = self.resolver.resolve(&self.settings.idp_jwks_url, kid).await?;
        self.codec.verify(token, &key)
    }

    fn sign_passport(
        &self,
        issuer: &str,
        subject: &str,
        audiences: &[String],
        visas: Vec<String>,
    ) -> AuthzResult<String> {
        let iat = now_epoch_seconds();
        let claims = PassportClaims {
            iss: issuer.to_string(),
            sub: subject.to_string(),
            iat,
            exp: iat + self.settings.passport_ttl.as_secs() as i64,
            jti: new_jti(),
            payload: PassportPayload {
                aud: audiences.to_vec(),
                ga4gh_passport_v1: visas,
            },
        };
        let header = self.keys.header(TokenType::Passport)?;
        self.keys.sign(&header, &claims)
    }
}

fn advance(stage: &mut ExchangeStage, next: ExchangeStage) {
    tracing::debug!(from = %stage, to = %next, "token exchange stage");
    *stage = next;
}
