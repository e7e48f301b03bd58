//! Header-driven verification key discovery.
//!
//! A token's `jku` names the key set document and its `kid` names the entry;
//! together they are the only way a verifier locates a key. There is no static
//! trust store. [`RemoteKeyResolver`] fetches on every call and is correct on
//! its own; [`CachedKeyResolver`] layers a bounded TTL cache on top for
//! callers that want to memoize. Which `jku` values may be dereferenced at all
//! is decided by the allow-lists on [`crate::PassportVerifier`].
//!
//! # Failure mapping
//! - transport error, timeout, non-2xx, or an unparseable document:
//!   [`AuthzError::UpstreamUnavailable`]
//! - document fetched but no entry carries the requested `kid`:
//!   [`AuthzError::KeyNotFound`], even if another entry could verify the token
//! - matching entry is not a usable RSA key: [`AuthzError::InvalidKey`]

use crate::jwks::{Jwk, Jwks};
use crate::{AuthzError, AuthzResult};
use async_trait::async_trait;
use dashmap::DashMap;
use jsonwebtoken::DecodingKey;
use std::sync::Arc;
use std::time::{Duration, Instant};

const KEY_SET_TARGET: &str = "key set";

#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn resolve(&self, key_set_url: &str, kid: &str) -> AuthzResult<DecodingKey>;
}

/// Hook applied to every outbound key set request, e.g. to inject trace
/// context headers.
pub type RequestDecorator = Arc<dyn Fn(reqwest::RequestBuilder) -> reqwest::RequestBuilder + Send + Sync>;

/// Builds the HTTP client used for internal service-to-service calls.
///
/// `accept_invalid_certs` tolerates self-signed certificates on internal
/// endpoints. It is a deployment decision and must stay configurable.
pub fn outbound_client(timeout: Duration, accept_invalid_certs: bool) -> AuthzResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .map_err(|err| AuthzError::upstream("http client", err))
}

#[derive(Clone)]
pub struct RemoteKeyResolver {
    client: reqwest::Client,
    decorator: Option<RequestDecorator>,
}

impl RemoteKeyResolver {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            decorator: None,
        }
    }

    pub fn with_decorator(mut self, decorator: RequestDecorator) -> Self {
        self.decorator = Some(decorator);
        self
    }

    pub async fn fetch_key_set(&self, key_set_url: &str) -> AuthzResult<Jwks> {
        let result = self.fetch_key_set_inner(key_set_url).await;
        let outcome = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!("passport_authz_key_fetch_total", "outcome" => outcome).increment(1);
        result
    }

    async fn fetch_key_set_inner(&self, key_set_url: &str) -> AuthzResult<Jwks> {
        let mut request = self
            .client
            .get(key_set_url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(decorator) = &self.decorator {
            request = decorator(request);
        }
        let response = request.send().await.map_err(|err| {
            tracing::warn!(jku = %key_set_url, error = %err, "key set fetch failed");
            AuthzError::upstream(KEY_SET_TARGET, err)
        })?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(jku = %key_set_url, status = %status, "key set endpoint returned error");
            return Err(AuthzError::upstream_status(
                KEY_SET_TARGET,
                status.as_u16(),
                format!("GET {key_set_url} returned {status}"),
            ));
        }
        response
            .json::<Jwks>()
            .await
            .map_err(|err| AuthzError::upstream(KEY_SET_TARGET, format!("decode {key_set_url}: {err}")))
    }
}

#[async_trait]
impl KeyResolver for RemoteKeyResolver {
    async fn resolve(&self, key_set_url: &str, kid: &str) -> AuthzResult<DecodingKey> {
        let jwks = self.fetch_key_set(key_set_url).await?;
        select_key(&jwks, key_set_url, kid)
    }
}

#[derive(Clone)]
struct CachedJwks {
    jwks: Jwks,
    expires_at: Instant,
}

pub const DEFAULT_MAX_CACHED_KEY_SETS: usize = 64;

/// TTL cache over [`RemoteKeyResolver`], keyed by key set URL.
///
/// A `kid` missing from a fresh cached set triggers one refetch so rotated
/// keys are picked up before the entry expires. The cache holds at most
/// `max_entries` key sets: expired entries are purged on every insert, and
/// when it is still full the entry closest to expiry is evicted.
#[derive(Clone)]
pub struct CachedKeyResolver {
    inner: RemoteKeyResolver,
    cache: Arc<DashMap<String, CachedJwks>>,
    ttl: Duration,
    max_entries: usize,
}

impl CachedKeyResolver {
    pub fn new(inner: RemoteKeyResolver, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Arc::new(DashMap::new()),
            ttl,
            max_entries: DEFAULT_MAX_CACHED_KEY_SETS,
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// Number of key sets currently held, expired or not.
    pub fn cached_key_sets(&self) -> usize {
        self.cache.len()
    }

    pub fn insert_jwks(&self, key_set_url: &str, jwks: Jwks) {
        let now = Instant::now();
        self.cache.retain(|_, entry| entry.expires_at > now);
        while self.cache.len() >= self.max_entries && !self.cache.contains_key(key_set_url) {
            let oldest = self
                .cache
                .iter()
                .min_by_key(|entry| entry.expires_at)
                .map(|entry| entry.key().clone());
            let Some(oldest) = oldest else { break };
            tracing::debug!(jku = %oldest, "evicting cached key set");
            self.cache.remove(&oldest);
        }
        self.cache.insert(
            key_set_url.to_string(),
            CachedJwks {
                jwks,
                expires_at: now + self.ttl,
            },
        );
    }

    fn cached_jwks(&self, key_set_url: &str) -> Option<Jwks> {
        self.cache.get(key_set_url).and_then(|entry| {
            if entry.expires_at > Instant::now() {
                Some(entry.jwks.clone())
            } else {
                None
            }
        })
    }

    async fn refresh(&self, key_set_url: &str) -> AuthzResult<Jwks> {
        let jwks = self.inner.fetch_key_set(key_set_url).await?;
        self.insert_jwks(key_set_url, jwks.clone());
        Ok(jwks)
    }
}

#[async_trait]
impl KeyResolver for CachedKeyResolver {
    async fn resolve(&self, key_set_url: &str, kid: &str) -> AuthzResult<DecodingKey> {
        if let Some(jwks) = self.cached_jwks(key_set_url)
            && jwks.find(kid).is_some()
        {
            return select_key(&jwks, key_set_url, kid);
        }
        let jwks = self.refresh(key_set_url).await?;
        select_key(&jwks, key_set_url, kid)
    }
}

fn select_key(jwks: &Jwks, key_set_url: &str, kid: &str) -> AuthzResult<DecodingKey> {
    let jwk = jwks.find(kid).ok_or_else(|| AuthzError::KeyNotFound {
        kid: kid.to_string(),
        url: key_set_url.to_string(),
    })?;
    decoding_key_from_jwk(jwk)
}

pub fn decoding_key_from_jwk(jwk: &Jwk) -> AuthzResult<DecodingKey> {
    if jwk.kty != "RSA" {
        return Err(AuthzError::InvalidKey(format!(
            "key {} has kty {}, expected RSA",
            jwk.kid, jwk.kty
        )));
    }
    if let Some(alg) = jwk.alg.as_deref()
        && alg != "RS256"
    {
        return Err(AuthzError::InvalidKey(format!(
            "key {} is for {alg}, expected RS256",
            jwk.kid
        )));
    }
    DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
        .map_err(|err| AuthzError::InvalidKey(format!("key {}: {err}", jwk.kid)))
}
