#![allow(dead_code)]

use axum::Router;
use axum::routing::get;
use passport_authz::{
    KeyManager, KeyManagerConfig, PassportClaims, PassportPayload, PassportVerifier,
    RemoteKeyResolver, TokenType, new_jti, now_epoch_seconds, outbound_client,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use visa_issuer::app::AppState;
use visa_issuer::groups::AuthorizedGroupSet;
use visa_issuer::issuer::{VisaIssuer, VisaIssuerSettings, default_tiers};

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

pub const BROKER_ISSUER: &str = "https://sysbio-fairplex.org/";

/// A signer whose key set is served on a local listener, standing in for the
/// broker that presents subject tokens.
pub struct PublishedSigner {
    pub keys: Arc<KeyManager>,
    pub addr: SocketAddr,
    pub fetches: Arc<AtomicUsize>,
}

impl PublishedSigner {
    pub async fn spawn(kid: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let keys = Arc::new(KeyManager::new(KeyManagerConfig::new(
            kid,
            format!("http://{addr}/.well-known/jwks.json"),
        )));
        keys.initialize().expect("initialize");

        let fetches = Arc::new(AtomicUsize::new(0));
        let jwks = serde_json::to_value(keys.public_key_set().expect("jwks")).expect("json");
        let counter = fetches.clone();
        let app = Router::new().route(
            "/.well-known/jwks.json",
            get(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                let jwks = jwks.clone();
                async move { axum::Json(jwks) }
            }),
        );
        tokio::spawn(async move {
            let _ = axum::serve(listener, app.into_make_service()).await;
        });
        Self {
            keys,
            addr,
            fetches,
        }
    }

    pub fn jku(&self) -> String {
        self.keys.jku().to_string()
    }

    pub fn subject_token(&self, sub: &str, ttl: i64) -> String {
        self.subject_token_from(BROKER_ISSUER, sub, ttl)
    }

    pub fn subject_token_from(&self, iss: &str, sub: &str, ttl: i64) -> String {
        let now = now_epoch_seconds();
        let claims = PassportClaims {
            iss: iss.to_string(),
            sub: sub.to_string(),
            iat: now,
            exp: now + ttl,
            jti: new_jti(),
            payload: PassportPayload::default(),
        };
        let header = self.keys.header(TokenType::Passport).expect("header");
        self.keys.sign(&header, &claims).expect("sign")
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

/// Issuer state with `alice@example.org` in `adminsEmails` and nobody else.
/// Subject tokens must be signed under `trusted_jku` by [`BROKER_ISSUER`].
pub fn issuer_state(trusted_jku: Vec<String>) -> AppState {
    let keys = Arc::new(KeyManager::new(KeyManagerConfig::new(
        "VISA_KEY",
        "http://visa-issuer.test/.well-known/jwks.json",
    )));
    keys.initialize().expect("initialize");
    let groups = AuthorizedGroupSet::from_groups([
        ("adminsEmails", vec!["alice@example.org"]),
        ("membersEmails", Vec::new()),
    ]);
    let issuer = VisaIssuer::new(
        keys.clone(),
        VisaIssuerSettings {
            issuer: "http://amp-pd.org/".to_string(),
            source: "https://www.amp-pd.org".to_string(),
            ttl: Duration::from_secs(3600),
            tiers: default_tiers(),
        },
    );
    let resolver = RemoteKeyResolver::new(
        outbound_client(Duration::from_secs(5), true).expect("client"),
    );
    AppState {
        keys,
        issuer: Arc::new(issuer),
        groups: Arc::new(groups),
        verifier: PassportVerifier::new(Arc::new(resolver))
            .with_trusted_jku(trusted_jku)
            .with_issuer(BROKER_ISSUER),
    }
}
