use anyhow::{Context, Result};
use passport_authz::random_kid;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::time::Duration;

// Token exchange configuration sourced from environment variables.
#[derive(Debug, Clone)]
pub struct TokenExchangeConfig {
    pub bind_addr: SocketAddr,
    pub metrics_bind: SocketAddr,
    pub public_url: String,
    pub idp_jwks_url: String,
    pub identity_url: String,
    pub visa_issuer_url: String,
    pub broker_issuer: String,
    pub passport_issuer: String,
    pub passport_ttl: Duration,
    pub key_id: String,
    pub http_timeout: Duration,
    pub accept_invalid_certs: bool,
    /// Zero disables key memoization.
    pub key_cache_ttl: Duration,
    /// Key sets `/passports/verify` accepts passports under. Empty means this
    /// broker's own [`TokenExchangeConfig::jku`].
    pub trusted_passport_jku: Vec<String>,
    /// Key sets visas may be signed under. Empty means the configured visa
    /// issuer's published key set.
    pub trusted_visa_jku: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TokenExchangeConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    public_url: Option<String>,
    idp_jwks_url: Option<String>,
    identity_url: Option<String>,
    visa_issuer_url: Option<String>,
    broker_issuer: Option<String>,
    passport_issuer: Option<String>,
    passport_ttl_secs: Option<u64>,
    key_id: Option<String>,
    http_timeout_ms: Option<u64>,
    accept_invalid_certs: Option<bool>,
    key_cache_ttl_secs: Option<u64>,
    trusted_passport_jku: Option<Vec<String>>,
    trusted_visa_jku: Option<Vec<String>>,
}

impl TokenExchangeConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env_or("TOKEN_EXCHANGE_BIND", "0.0.0.0:8000")
            .parse()
            .with_context(|| "parse TOKEN_EXCHANGE_BIND")?;
        let metrics_bind = env_or("TOKEN_EXCHANGE_METRICS_BIND", "0.0.0.0:9101")
            .parse()
            .with_context(|| "parse TOKEN_EXCHANGE_METRICS_BIND")?;
        let passport_ttl_secs: u64 = env_or("TOKEN_EXCHANGE_PASSPORT_TTL_SECS", "3600")
            .parse()
            .with_context(|| "parse TOKEN_EXCHANGE_PASSPORT_TTL_SECS")?;
        let http_timeout_ms: u64 = env_or("TOKEN_EXCHANGE_HTTP_TIMEOUT_MS", "10000")
            .parse()
            .with_context(|| "parse TOKEN_EXCHANGE_HTTP_TIMEOUT_MS")?;
        let accept_invalid_certs = env_or("TOKEN_EXCHANGE_ACCEPT_INVALID_CERTS", "true")
            .parse()
            .with_context(|| "parse TOKEN_EXCHANGE_ACCEPT_INVALID_CERTS")?;
        let key_cache_ttl_secs: u64 = env_or("TOKEN_EXCHANGE_KEY_CACHE_TTL_SECS", "0")
            .parse()
            .with_context(|| "parse TOKEN_EXCHANGE_KEY_CACHE_TTL_SECS")?;

        Ok(Self {
            bind_addr,
            metrics_bind,
            public_url: env_or("TOKEN_EXCHANGE_PUBLIC_URL", "http://localhost:8000"),
            idp_jwks_url: env_or(
                "TOKEN_EXCHANGE_IDP_JWKS_URL",
                "http://hydra/.well-known/jwks.json",
            ),
            identity_url: env_or("TOKEN_EXCHANGE_IDENTITY_URL", "https://kratos-admin:4434"),
            visa_issuer_url: env_or(
                "TOKEN_EXCHANGE_VISA_ISSUER_URL",
                "http://auth-pilot-amp-pd-visa-issuer.io:7000",
            ),
            broker_issuer: env_or("TOKEN_EXCHANGE_BROKER_ISS", "https://sysbio-fairplex.org/"),
            passport_issuer: env_or("TOKEN_EXCHANGE_PASSPORT_ISS", "https://ga4gh.org/"),
            passport_ttl: Duration::from_secs(passport_ttl_secs),
            key_id: non_empty_env("TOKEN_EXCHANGE_KEY_ID").unwrap_or_else(random_kid),
            http_timeout: Duration::from_millis(http_timeout_ms),
            accept_invalid_certs,
            key_cache_ttl: Duration::from_secs(key_cache_ttl_secs),
            trusted_passport_jku: parse_list(&env_or("TOKEN_EXCHANGE_TRUSTED_PASSPORT_JKU", "")),
            trusted_visa_jku: parse_list(&env_or("TOKEN_EXCHANGE_TRUSTED_VISA_JKU", "")),
        })
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("TOKEN_EXCHANGE_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read TOKEN_EXCHANGE_CONFIG: {path}"))?;
            config.apply_yaml(&contents)?;
        }
        Ok(config)
    }

    fn apply_yaml(&mut self, contents: &str) -> Result<()> {
        let override_cfg: TokenExchangeConfigOverride =
            serde_yaml::from_str(contents).with_context(|| "parse token exchange config yaml")?;
        if let Some(value) = override_cfg.bind_addr {
            self.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = override_cfg.metrics_bind {
            self.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = override_cfg.public_url {
            self.public_url = value;
        }
        if let Some(value) = override_cfg.idp_jwks_url {
            self.idp_jwks_url = value;
        }
        if let Some(value) = override_cfg.identity_url {
            self.identity_url = value;
        }
        if let Some(value) = override_cfg.visa_issuer_url {
            self.visa_issuer_url = value;
        }
        if let Some(value) = override_cfg.broker_issuer {
            self.broker_issuer = value;
        }
        if let Some(value) = override_cfg.passport_issuer {
            self.passport_issuer = value;
        }
        if let Some(value) = override_cfg.passport_ttl_secs {
            self.passport_ttl = Duration::from_secs(value);
        }
        if let Some(value) = override_cfg.key_id {
            self.key_id = value;
        }
        if let Some(value) = override_cfg.http_timeout_ms {
            self.http_timeout = Duration::from_millis(value);
        }
        if let Some(value) = override_cfg.accept_invalid_certs {
            self.accept_invalid_certs = value;
        }
        if let Some(value) = override_cfg.key_cache_ttl_secs {
            self.key_cache_ttl = Duration::from_secs(value);
        }
        if let Some(value) = override_cfg.trusted_passport_jku {
            self.trusted_passport_jku = value;
        }
        if let Some(value) = override_cfg.trusted_visa_jku {
            self.trusted_visa_jku = value;
        }
        Ok(())
    }

    /// URL this broker's key set is published at. Both the intermediate and
    /// the final passport name it as `jku`.
    pub fn jku(&self) -> String {
        format!("{}/.well-known/jwks.json", self.public_url.trim_end_matches('/'))
    }

    pub fn passport_trust(&self) -> Vec<String> {
        if self.trusted_passport_jku.is_empty() {
            vec![self.jku()]
        } else {
            self.trusted_passport_jku.clone()
        }
    }

    pub fn visa_trust(&self) -> Vec<String> {
        if self.trusted_visa_jku.is_empty() {
            vec![format!(
                "{}/.well-known/jwks.json",
                self.visa_issuer_url.trim_end_matches('/')
            )]
        } else {
            self.trusted_visa_jku.clone()
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}
