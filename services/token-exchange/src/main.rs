//! Token exchange service entry point.
//!
//! # Purpose
//! Loads configuration, generates the broker keypair, wires the identity
//! directory and visa issuer clients, then serves the exchange API and the
//! metrics endpoint.
use anyhow::Context;
use passport_authz::{
    CachedKeyResolver, KeyManager, KeyManagerConfig, KeyResolver, PassportVerifier,
    RemoteKeyResolver, outbound_client,
};
use passport_common::observability;
use std::future::Future;
use std::sync::Arc;
use token_exchange::app::{AppState, build_router};
use token_exchange::broker::{BrokerSettings, PassportBroker};
use token_exchange::config::TokenExchangeConfig;
use token_exchange::directory::HttpIdentityDirectory;
use token_exchange::visa_client::HttpVisaIssuerClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = TokenExchangeConfig::from_env_or_yaml().context("token exchange config")?;
    run_with_shutdown(config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn run_with_shutdown<F>(config: TokenExchangeConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics_handle = observability::init_observability("token-exchange");
    let state = build_state(&config).await?;
    let metrics_task = tokio::spawn(observability::serve_metrics(
        metrics_handle,
        config.metrics_bind,
    ));

    let app = build_router(state);
    let addr = config.bind_addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!(
        %addr,
        jku = %config.jku(),
        idp_jwks_url = %config.idp_jwks_url,
        visa_issuer_url = %config.visa_issuer_url,
        "token exchange listening"
    );
    tokio::pin!(shutdown);
    tokio::select! {
        result = axum::serve(listener, app.into_make_service()) => {
            result?;
        }
        _ = &mut shutdown => {}
    }

    metrics_task.abort();
    let _ = metrics_task.await;
    Ok(())
}

async fn build_state(config: &TokenExchangeConfig) -> anyhow::Result<AppState> {
    let keys = Arc::new(KeyManager::new(KeyManagerConfig::new(
        config.key_id.clone(),
        config.jku(),
    )));
    let generator = keys.clone();
    tokio::task::spawn_blocking(move || generator.initialize())
        .await
        .context("key generation task")?
        .context("generate signing keypair")?;

    let client = outbound_client(config.http_timeout, config.accept_invalid_certs)?;
    let remote = RemoteKeyResolver::new(client.clone())
        .with_decorator(Arc::new(observability::inject_trace_context));
    let resolver: Arc<dyn KeyResolver> = if config.key_cache_ttl.is_zero() {
        Arc::new(remote)
    } else {
        tracing::info!(ttl_secs = config.key_cache_ttl.as_secs(), "key set caching enabled");
        Arc::new(CachedKeyResolver::new(remote, config.key_cache_ttl))
    };

    let directory = HttpIdentityDirectory::new(&config.identity_url, client.clone())
        .with_context(|| format!("identity directory url {}", config.identity_url))?;
    let visas = HttpVisaIssuerClient::new(&config.visa_issuer_url, client);
    let broker = PassportBroker::new(
        keys.clone(),
        resolver.clone(),
        Arc::new(directory),
        Arc::new(visas),
        BrokerSettings {
            idp_jwks_url: config.idp_jwks_url.clone(),
            broker_issuer: config.broker_issuer.clone(),
            passport_issuer: config.passport_issuer.clone(),
            passport_ttl: config.passport_ttl,
            trusted_visa_jku: config.visa_trust(),
        },
    );
    let verifier = PassportVerifier::new(resolver)
        .with_trusted_jku(config.passport_trust())
        .with_trusted_visa_jku(config.visa_trust())
        .with_issuer(config.passport_issuer.clone());
    tracing::info!(
        passport_jku = ?config.passport_trust(),
        visa_jku = ?config.visa_trust(),
        "trusted key sets"
    );

    Ok(AppState {
        keys,
        broker: Arc::new(broker),
        verifier,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::time::Duration;

    fn test_config() -> TokenExchangeConfig {
        TokenExchangeConfig {
            bind_addr: "127.0.0.1:0".parse().expect("bind"),
            metrics_bind: "127.0.0.1:0".parse().expect("metrics"),
            public_url: "http://127.0.0.1:8000".to_string(),
            idp_jwks_url: "http://127.0.0.1:1/.well-known/jwks.json".to_string(),
            identity_url: "http://127.0.0.1:1".to_string(),
            visa_issuer_url: "http://127.0.0.1:1".to_string(),
            broker_issuer: "https://sysbio-fairplex.org/".to_string(),
            passport_issuer: "https://ga4gh.org/".to_string(),
            passport_ttl: Duration::from_secs(3600),
            key_id: "broker-key".to_string(),
            http_timeout: Duration::from_millis(500),
            accept_invalid_certs: true,
            key_cache_ttl: Duration::from_secs(60),
            trusted_passport_jku: Vec::new(),
            trusted_visa_jku: Vec::new(),
        }
    }

    #[tokio::test]
    async fn build_state_generates_keys() {
        let state = build_state(&test_config()).await.expect("state");
        assert!(state.keys.is_initialized());
        assert_eq!(state.keys.kid(), "broker-key");
        assert_eq!(state.keys.jku(), "http://127.0.0.1:8000/.well-known/jwks.json");
    }

    #[tokio::test]
    async fn build_state_rejects_opaque_identity_url() {
        let mut config = test_config();
        config.identity_url = "mailto:admin@example.org".to_string();
        let err = build_state(&config).await.err().expect("startup should fail");
        assert!(err.to_string().contains("identity directory url"));
    }

    #[tokio::test]
    #[serial]
    async fn run_with_shutdown_starts_and_stops() {
        run_with_shutdown(test_config(), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
        })
        .await
        .expect("run should stop cleanly");
    }
}
