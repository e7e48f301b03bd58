use crate::issuer::{TierPolicy, default_tiers};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Where the authorized group set is loaded from at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupSource {
    Url(String),
    File(PathBuf),
    None,
}

// Visa issuer configuration sourced from environment variables.
#[derive(Debug, Clone)]
pub struct VisaIssuerConfig {
    pub bind_addr: SocketAddr,
    pub metrics_bind: SocketAddr,
    pub public_url: String,
    pub issuer: String,
    pub source: String,
    pub visa_ttl: Duration,
    pub key_id: String,
    pub groups: GroupSource,
    /// Key sets subject tokens may be signed under. Must not be empty.
    pub trusted_jku: Vec<String>,
    /// Required `iss` of every subject token.
    pub broker_issuer: String,
    pub http_timeout: Duration,
    pub accept_invalid_certs: bool,
    pub tiers: Vec<TierPolicy>,
}

#[derive(Debug, Deserialize)]
struct VisaIssuerConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    public_url: Option<String>,
    issuer: Option<String>,
    source: Option<String>,
    visa_ttl_secs: Option<u64>,
    key_id: Option<String>,
    groups_url: Option<String>,
    groups_file: Option<PathBuf>,
    trusted_jku: Option<Vec<String>>,
    broker_issuer: Option<String>,
    http_timeout_ms: Option<u64>,
    accept_invalid_certs: Option<bool>,
    tiers: Option<Vec<TierPolicy>>,
}

impl VisaIssuerConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env_or("VISA_ISSUER_BIND", "0.0.0.0:7000")
            .parse()
            .with_context(|| "parse VISA_ISSUER_BIND")?;
        let metrics_bind = env_or("VISA_ISSUER_METRICS_BIND", "0.0.0.0:9100")
            .parse()
            .with_context(|| "parse VISA_ISSUER_METRICS_BIND")?;
        let visa_ttl_secs: u64 = env_or("VISA_ISSUER_TTL_SECS", "3600")
            .parse()
            .with_context(|| "parse VISA_ISSUER_TTL_SECS")?;
        let http_timeout_ms: u64 = env_or("VISA_ISSUER_HTTP_TIMEOUT_MS", "10000")
            .parse()
            .with_context(|| "parse VISA_ISSUER_HTTP_TIMEOUT_MS")?;
        let accept_invalid_certs = env_or("VISA_ISSUER_ACCEPT_INVALID_CERTS", "true")
            .parse()
            .with_context(|| "parse VISA_ISSUER_ACCEPT_INVALID_CERTS")?;
        let groups = match (
            non_empty_env("VISA_ISSUER_GROUPS_URL"),
            non_empty_env("VISA_ISSUER_GROUPS_FILE"),
        ) {
            (Some(url), _) => GroupSource::Url(url),
            (None, Some(path)) => GroupSource::File(PathBuf::from(path)),
            (None, None) => GroupSource::None,
        };

        Ok(Self {
            bind_addr,
            metrics_bind,
            public_url: env_or("VISA_ISSUER_PUBLIC_URL", "http://localhost:7000"),
            issuer: env_or("VISA_ISSUER_ISS", "http://amp-pd.org/"),
            source: env_or("VISA_ISSUER_SOURCE", "https://www.amp-pd.org"),
            visa_ttl: Duration::from_secs(visa_ttl_secs),
            key_id: env_or("VISA_ISSUER_KEY_ID", "VISA_KEY"),
            groups,
            trusted_jku: parse_list(&env_or("VISA_ISSUER_TRUSTED_JKU", "")),
            broker_issuer: env_or("VISA_ISSUER_BROKER_ISS", "https://sysbio-fairplex.org/"),
            http_timeout: Duration::from_millis(http_timeout_ms),
            accept_invalid_certs,
            tiers: default_tiers(),
        })
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("VISA_ISSUER_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read VISA_ISSUER_CONFIG: {path}"))?;
            config.apply_yaml(&contents)?;
        }
        Ok(config)
    }

    fn apply_yaml(&mut self, contents: &str) -> Result<()> {
        let override_cfg: VisaIssuerConfigOverride =
            serde_yaml::from_str(contents).with_context(|| "parse visa issuer config yaml")?;
        if let Some(value) = override_cfg.bind_addr {
            self.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = override_cfg.metrics_bind {
            self.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = override_cfg.public_url {
            self.public_url = value;
        }
        if let Some(value) = override_cfg.issuer {
            self.issuer = value;
        }
        if let Some(value) = override_cfg.source {
            self.source = value;
        }
        if let Some(value) = override_cfg.visa_ttl_secs {
            self.visa_ttl = Duration::from_secs(value);
        }
        if let Some(value) = override_cfg.key_id {
            self.key_id = value;
        }
        if let Some(value) = override_cfg.groups_url {
            self.groups = GroupSource::Url(value);
        } else if let Some(value) = override_cfg.groups_file {
            self.groups = GroupSource::File(value);
        }
        if let Some(value) = override_cfg.trusted_jku {
            self.trusted_jku = value;
        }
        if let Some(value) = override_cfg.broker_issuer {
            self.broker_issuer = value;
        }
        if let Some(value) = override_cfg.http_timeout_ms {
            self.http_timeout = Duration::from_millis(value);
        }
        if let Some(value) = override_cfg.accept_invalid_certs {
            self.accept_invalid_certs = value;
        }
        if let Some(value) = override_cfg.tiers {
            anyhow::ensure!(!value.is_empty(), "tiers must not be empty");
            self.tiers = value;
        }
        Ok(())
    }

    /// URL this service's key set is published at; the `jku` of every visa.
    pub fn jku(&self) -> String {
        format!("{}/.well-known/jwks.json", self.public_url.trim_end_matches('/'))
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
