//! Visa issuer service entry point.
//!
//! # Purpose
//! Loads configuration, generates the signing keypair, loads the authorized
//! group set, then serves the visa API and the metrics endpoint.
//!
//! # Notes
//! Key generation and group loading finish before the listener is bound; a
//! failure in either aborts startup, as does an empty subject-token allow-list.
use anyhow::Context;
use passport_authz::{KeyManager, KeyManagerConfig, PassportVerifier, RemoteKeyResolver, outbound_client};
use passport_common::observability;
use std::future::Future;
use std::sync::Arc;
use visa_issuer::app::{AppState, build_router};
use visa_issuer::config::{GroupSource, VisaIssuerConfig};
use visa_issuer::groups::AuthorizedGroupSet;
use visa_issuer::issuer::{VisaIssuer, VisaIssuerSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = VisaIssuerConfig::from_env_or_yaml().context("visa issuer config")?;
    run_with_shutdown(config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn run_with_shutdown<F>(config: VisaIssuerConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics_handle = observability::init_observability("visa-issuer");
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
    tracing::info!(%addr, jku = %config.jku(), "visa issuer listening");
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

async fn build_state(config: &VisaIssuerConfig) -> anyhow::Result<AppState> {
    anyhow::ensure!(
        !config.trusted_jku.is_empty(),
        "VISA_ISSUER_TRUSTED_JKU must name at least one broker key set"
    );
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
    let groups = match &config.groups {
        GroupSource::Url(url) => AuthorizedGroupSet::fetch(&client, url)
            .await
            .with_context(|| format!("load authorized groups from {url}"))?,
        GroupSource::File(path) => AuthorizedGroupSet::from_file(path)?,
        GroupSource::None => {
            tracing::warn!("no group source configured; every identity will receive zero visas");
            AuthorizedGroupSet::default()
        }
    };
    tracing::info!(
        groups = groups.group_names().count(),
        members = groups.member_count(),
        "authorized groups loaded"
    );

    let resolver = RemoteKeyResolver::new(client)
        .with_decorator(Arc::new(observability::inject_trace_context));
    let verifier = PassportVerifier::new(Arc::new(resolver))
        .with_trusted_jku(config.trusted_jku.clone())
        .with_issuer(config.broker_issuer.clone());
    let issuer = VisaIssuer::new(
        keys.clone(),
        VisaIssuerSettings {
            issuer: config.issuer.clone(),
            source: config.source.clone(),
            ttl: config.visa_ttl,
            tiers: config.tiers.clone(),
        },
    );

    Ok(AppState {
        keys,
        issuer: Arc::new(issuer),
        groups: Arc::new(groups),
        verifier,
    })
}
