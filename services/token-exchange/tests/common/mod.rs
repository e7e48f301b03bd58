#![allow(dead_code)]

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use passport_authz::{
    KeyManager, KeyManagerConfig, PassportVerifier, RemoteKeyResolver, outbound_client,
};
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use token_exchange::api::types::TOKEN_EXCHANGE_GRANT;
use token_exchange::app::{AppState, build_router};
use token_exchange::broker::{BrokerSettings, PassportBroker};
use token_exchange::directory::HttpIdentityDirectory;
use token_exchange::visa_client::HttpVisaIssuerClient;
use tokio::net::TcpListener;
use visa_issuer::groups::AuthorizedGroupSet;
use visa_issuer::issuer::{VisaIssuer, VisaIssuerSettings, default_tiers};

pub const SUBJECT_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:jwt";
pub const PASSPORT_TOKEN_TYPE: &str = "urn:ga4gh:params:oauth:token-type:passport";
pub const BROKER_ISSUER: &str = "https://sysbio-fairplex.org/";
pub const PASSPORT_ISSUER: &str = "https://ga4gh.org/";

async fn serve_on(listener: TcpListener, app: Router) {
    tokio::spawn(async move {
        let _ = axum::serve(listener, app.into_make_service()).await;
    });
}

async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    (listener, addr)
}

pub fn jwks_for_key(kid: &str, key: &RsaPrivateKey) -> Value {
    let public = key.to_public_key();
    json!({
        "keys": [{
            "kty": "RSA",
            "kid": kid,
            "alg": "RS256",
            "use": "sig",
            "n": URL_SAFE_NO_PAD.encode(public.n().to_bytes_be()),
            "e": URL_SAFE_NO_PAD.encode(public.e().to_bytes_be()),
        }]
    })
}

/// Identity provider that publishes one RSA key and mints subject tokens.
pub struct FakeIdp {
    pub kid: String,
    pub key: RsaPrivateKey,
    pub jwks_url: String,
}

impl FakeIdp {
    pub async fn spawn() -> Self {
        let kid = "hydra-key".to_string();
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("rsa key");
        let jwks = jwks_for_key(&kid, &key);
        let (listener, addr) = bind().await;
        let app = Router::new().route(
            "/.well-known/jwks.json",
            get(move || {
                let jwks = jwks.clone();
                async move { Json(jwks) }
            }),
        );
        serve_on(listener, app).await;
        Self {
            kid,
            key,
            jwks_url: format!("http://{addr}/.well-known/jwks.json"),
        }
    }

    pub fn subject_token(&self, identity_id: &str, ttl_secs: i64) -> String {
        sign_subject_token(&self.key, &self.kid, identity_id, ttl_secs)
    }
}

/// Mints an identity-provider token with an arbitrary key; used for both the
/// genuine provider and impostors that reuse its `kid`.
pub fn sign_subject_token(key: &RsaPrivateKey, kid: &str, identity_id: &str, ttl_secs: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    header.typ = Some("JWT".to_string());
    let claims = json!({
        "iss": "http://hydra.test/",
        "sub": identity_id,
        "iat": now,
        "exp": now + ttl_secs,
    });
    let pem = key.to_pkcs1_pem(LineEnding::LF).expect("pem");
    let encoding_key = EncodingKey::from_rsa_pem(pem.as_bytes()).expect("encoding key");
    jsonwebtoken::encode(&header, &claims, &encoding_key).expect("token")
}

/// Identity directory admin API serving `traits.email` per identity id.
pub async fn spawn_identity_directory(identities: &[(&str, &str)]) -> String {
    let identities: Arc<HashMap<String, String>> = Arc::new(
        identities
            .iter()
            .map(|(id, email)| (id.to_string(), email.to_string()))
            .collect(),
    );
    let app = Router::new()
        .route(
            "/admin/identities/:id",
            get(
                |State(identities): State<Arc<HashMap<String, String>>>, Path(id): Path<String>| async move {
                    match identities.get(&id) {
                        Some(email) => Ok(Json(json!({ "id": id, "traits": { "email": email } }))),
                        None => Err(StatusCode::NOT_FOUND),
                    }
                },
            ),
        )
        .with_state(identities);
    let (listener, addr) = bind().await;
    serve_on(listener, app).await;
    format!("http://{addr}")
}

/// A real visa issuer, in-process, with `alice@example.org` in
/// `adminsEmails`. Only subject tokens under `trusted_jku` are accepted.
pub async fn spawn_visa_issuer(trusted_jku: Vec<String>) -> (String, Arc<KeyManager>) {
    let (listener, addr) = bind().await;
    let keys = Arc::new(KeyManager::new(KeyManagerConfig::new(
        "VISA_KEY",
        format!("http://{addr}/.well-known/jwks.json"),
    )));
    keys.initialize().expect("initialize");
    let issuer = VisaIssuer::new(
        keys.clone(),
        VisaIssuerSettings {
            issuer: "http://amp-pd.org/".to_string(),
            source: "https://www.amp-pd.org".to_string(),
            ttl: Duration::from_secs(3600),
            tiers: default_tiers(),
        },
    );
    let groups = AuthorizedGroupSet::from_groups([
        ("adminsEmails", vec!["alice@example.org"]),
        ("membersEmails", Vec::new()),
    ]);
    let resolver = RemoteKeyResolver::new(outbound_client(Duration::from_secs(5), true).expect("client"));
    let state = visa_issuer::app::AppState {
        keys: keys.clone(),
        issuer: Arc::new(issuer),
        groups: Arc::new(groups),
        verifier: PassportVerifier::new(Arc::new(resolver))
            .with_trusted_jku(trusted_jku)
            .with_issuer(BROKER_ISSUER),
    };
    serve_on(listener, visa_issuer::app::build_router(state)).await;
    (format!("http://{addr}"), keys)
}

/// A key manager whose key set is served locally, for signers the broker
/// has never been told about.
pub async fn spawn_published_keys(kid: &str) -> Arc<KeyManager> {
    let (listener, addr) = bind().await;
    let keys = Arc::new(KeyManager::new(KeyManagerConfig::new(
        kid,
        format!("http://{addr}/.well-known/jwks.json"),
    )));
    keys.initialize().expect("initialize");
    let jwks = serde_json::to_value(keys.public_key_set().expect("jwks")).expect("json");
    let app = Router::new().route(
        "/.well-known/jwks.json",
        get(move || {
            let jwks = jwks.clone();
            async move { Json(jwks) }
        }),
    );
    serve_on(listener, app).await;
    keys
}

/// Accepts connections and holds them open without ever answering.
pub async fn spawn_silent_upstream() -> String {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{addr}")
}

/// `POST /visas` stub that counts calls and never issues anything.
pub async fn spawn_counting_visa_source() -> (String, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let app = Router::new().route(
        "/visas",
        post(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Json(json!({ "visa_tokens": [] })) }
        }),
    );
    let (listener, addr) = bind().await;
    serve_on(listener, app).await;
    (format!("http://{addr}"), calls)
}

pub struct Upstreams {
    pub idp_jwks_url: String,
    pub identity_url: String,
    pub visa_issuer_url: String,
}

pub struct Broker {
    pub base_url: String,
    pub keys: Arc<KeyManager>,
}

/// Serves the broker on an already bound listener so its `jku` is known
/// before the visa issuer is configured to trust it.
pub async fn serve_broker(listener: TcpListener, upstreams: Upstreams) -> Broker {
    serve_broker_with_timeout(listener, upstreams, Duration::from_secs(5)).await
}

pub async fn serve_broker_with_timeout(
    listener: TcpListener,
    upstreams: Upstreams,
    timeout: Duration,
) -> Broker {
    let addr = listener.local_addr().expect("addr");
    let keys = Arc::new(KeyManager::new(KeyManagerConfig::new(
        "broker-key",
        broker_jku(addr),
    )));
    keys.initialize().expect("initialize");

    let client = outbound_client(timeout, true).expect("client");
    let resolver = Arc::new(RemoteKeyResolver::new(client.clone()));
    let visa_jku = vec![format!(
        "{}/.well-known/jwks.json",
        upstreams.visa_issuer_url.trim_end_matches('/')
    )];
    let directory =
        HttpIdentityDirectory::new(&upstreams.identity_url, client.clone()).expect("directory");
    let broker = PassportBroker::new(
        keys.clone(),
        resolver.clone(),
        Arc::new(directory),
        Arc::new(HttpVisaIssuerClient::new(&upstreams.visa_issuer_url, client)),
        BrokerSettings {
            idp_jwks_url: upstreams.idp_jwks_url,
            broker_issuer: BROKER_ISSUER.to_string(),
            passport_issuer: PASSPORT_ISSUER.to_string(),
            passport_ttl: Duration::from_secs(3600),
            trusted_visa_jku: visa_jku.clone(),
        },
    );
    let state = AppState {
        keys: keys.clone(),
        broker: Arc::new(broker),
        verifier: PassportVerifier::new(resolver)
            .with_trusted_jku(vec![keys.jku().to_string()])
            .with_trusted_visa_jku(visa_jku)
            .with_issuer(PASSPORT_ISSUER),
    };
    serve_on(listener, build_router(state)).await;
    Broker {
        base_url: format!("http://{addr}"),
        keys,
    }
}

pub fn broker_jku(addr: SocketAddr) -> String {
    format!("http://{addr}/.well-known/jwks.json")
}

/// Identity provider, identity directory, visa issuer, and broker, all live.
pub struct Deployment {
    pub idp: FakeIdp,
    pub broker: Broker,
    pub visa_issuer_keys: Arc<KeyManager>,
}

impl Deployment {
    pub async fn start() -> Self {
        let idp = FakeIdp::spawn().await;
        let identity_url = spawn_identity_directory(&[
            ("id-alice", "alice@example.org"),
            ("id-bob", "bob@example.org"),
        ])
        .await;
        let (listener, broker_addr) = bind().await;
        let (visa_issuer_url, visa_issuer_keys) =
            spawn_visa_issuer(vec![broker_jku(broker_addr)]).await;
        let broker = serve_broker(
            listener,
            Upstreams {
                idp_jwks_url: idp.jwks_url.clone(),
                identity_url,
                visa_issuer_url,
            },
        )
        .await;
        Self {
            idp,
            broker,
            visa_issuer_keys,
        }
    }
}

pub async fn bind_broker_listener() -> TcpListener {
    bind().await.0
}

pub fn exchange_form(subject_token: &str, resources: &[&str]) -> String {
    let mut form = url::form_urlencoded::Serializer::new(String::new());
    form.append_pair("grant_type", TOKEN_EXCHANGE_GRANT)
        .append_pair("subject_token", subject_token)
        .append_pair("subject_token_type", SUBJECT_TOKEN_TYPE)
        .append_pair("requested_token_type", PASSPORT_TOKEN_TYPE);
    for resource in resources {
        form.append_pair("resource", resource);
    }
    form.finish()
}

pub async fn post_form(base_url: &str, body: String) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{base_url}/token-exchange"))
        .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(body)
        .send()
        .await
        .expect("token exchange request")
}

pub async fn exchange(base_url: &str, subject_token: &str, resources: &[&str]) -> reqwest::Response {
    post_form(base_url, exchange_form(subject_token, resources)).await
}
