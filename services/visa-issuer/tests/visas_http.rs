mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{PublishedSigner, issuer_state, read_json};
use passport_authz::{TokenCodec, TokenType, VisaClaims};
use serde_json::json;
use std::collections::HashSet;
use tower::ServiceExt;
use visa_issuer::app::build_router;

fn visa_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/visas")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

#[tokio::test]
async fn admin_receives_two_independently_verifiable_visas() {
    let broker = PublishedSigner::spawn("broker-key").await;
    let state = issuer_state(vec![broker.jku()]);
    let issuer_key = state.keys.decoding_key().expect("issuer key");
    let app = build_router(state);

    let token = broker.subject_token("alice@example.org", 300);
    let response = app
        .oneshot(visa_request(json!({ "subject_token": token })))
        .await
        .expect("visas");
    assert_eq!(response.status(), StatusCode::OK);

    let payload = read_json(response).await;
    let visas = payload["visa_tokens"].as_array().expect("visa_tokens");
    assert_eq!(visas.len(), 2);

    let codec = TokenCodec::new();
    let mut jtis = HashSet::new();
    let mut values = Vec::new();
    for visa in visas {
        let visa = visa.as_str().expect("string");
        let header = codec.decode_header(visa).expect("header");
        assert_eq!(header.token_type(), Some(TokenType::Visa));
        assert_eq!(header.kid.as_deref(), Some("VISA_KEY"));
        assert_eq!(
            header.jku.as_deref(),
            Some("http://visa-issuer.test/.well-known/jwks.json")
        );
        let claims: VisaClaims = codec.verify(visa, &issuer_key).expect("verify");
        assert_eq!(claims.sub, "alice@example.org");
        assert_eq!(claims.iss, "http://amp-pd.org/");
        jtis.insert(claims.jti.clone());
        values.push(claims.payload.ga4gh_visa_v1.value);
    }
    assert_eq!(jtis.len(), 2);
    assert_eq!(
        values,
        vec!["https://www.amp-pd.org/tier1", "https://www.amp-pd.org/tier2"]
    );
}

#[tokio::test]
async fn outsider_receives_empty_list() {
    let broker = PublishedSigner::spawn("broker-key").await;
    let app = build_router(issuer_state(vec![broker.jku()]));

    let token = broker.subject_token("bob@example.org", 300);
    let response = app
        .oneshot(visa_request(json!({ "subject_token": token })))
        .await
        .expect("visas");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, json!({ "visa_tokens": [] }));
}

#[tokio::test]
async fn expired_subject_token_is_unauthorized() {
    let broker = PublishedSigner::spawn("broker-key").await;
    let app = build_router(issuer_state(vec![broker.jku()]));

    let token = broker.subject_token("alice@example.org", -60);
    let response = app
        .oneshot(visa_request(json!({ "subject_token": token })))
        .await
        .expect("visas");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let payload = read_json(response).await;
    assert_eq!(payload["code"], "expired_token");
}

#[tokio::test]
async fn untrusted_key_set_is_rejected_without_fetch() {
    let broker = PublishedSigner::spawn("broker-key").await;
    let app = build_router(issuer_state(vec![
        "https://broker.example/.well-known/jwks.json".to_string(),
    ]));

    let token = broker.subject_token("alice@example.org", 300);
    let response = app
        .oneshot(visa_request(json!({ "subject_token": token })))
        .await
        .expect("visas");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(broker.fetch_count(), 0);
}

#[tokio::test]
async fn empty_allow_list_rejects_every_signer() {
    let broker = PublishedSigner::spawn("broker-key").await;
    let app = build_router(issuer_state(Vec::new()));

    let token = broker.subject_token("alice@example.org", 300);
    let response = app
        .oneshot(visa_request(json!({ "subject_token": token })))
        .await
        .expect("visas");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(response).await["code"], "invalid_token");
    assert_eq!(broker.fetch_count(), 0);
}

#[tokio::test]
async fn subject_token_from_another_issuer_is_rejected() {
    let signer = PublishedSigner::spawn("broker-key").await;
    let app = build_router(issuer_state(vec![signer.jku()]));

    let token = signer.subject_token_from("https://ga4gh.org/", "alice@example.org", 300);
    let response = app
        .oneshot(visa_request(json!({ "subject_token": token })))
        .await
        .expect("visas");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(response).await["code"], "invalid_token");
}

#[tokio::test]
async fn trusted_key_set_is_accepted() {
    let broker = PublishedSigner::spawn("broker-key").await;
    let app = build_router(issuer_state(vec![broker.jku()]));

    let token = broker.subject_token("alice@example.org", 300);
    let response = app
        .oneshot(visa_request(json!({ "subject_token": token })))
        .await
        .expect("visas");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(broker.fetch_count(), 1);
}

#[tokio::test]
async fn missing_body_is_bad_request() {
    let app = build_router(issuer_state(Vec::new()));
    let request = Request::builder()
        .method("POST")
        .uri("/visas")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("visas");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["code"], "invalid_request");
}

#[tokio::test]
async fn garbage_token_is_unauthorized() {
    let app = build_router(issuer_state(Vec::new()));
    let response = app
        .oneshot(visa_request(json!({ "subject_token": "not.a.token" })))
        .await
        .expect("visas");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn key_set_is_stable_across_requests() {
    let app = build_router(issuer_state(Vec::new()));
    let mut bodies = Vec::new();
    for _ in 0..2 {
        let request = Request::builder()
            .uri("/.well-known/jwks.json")
            .body(Body::empty())
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("jwks");
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        bodies.push(bytes);
    }
    assert_eq!(bodies[0], bodies[1]);
    let jwks: serde_json::Value = serde_json::from_slice(&bodies[0]).expect("json");
    assert_eq!(jwks["keys"][0]["kid"], "VISA_KEY");
    assert_eq!(jwks["keys"][0]["use"], "sig");
    assert_eq!(jwks["keys"][0]["alg"], "RS256");
}

#[tokio::test]
async fn health_and_openapi_are_served() {
    let app = build_router(issuer_state(Vec::new()));
    let health = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/system/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("health");
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(read_json(health).await, json!({ "status": "ok" }));

    let openapi = app
        .oneshot(
            Request::builder()
                .uri("/openapi.json")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("openapi");
    assert_eq!(openapi.status(), StatusCode::OK);
    assert!(read_json(openapi).await["paths"]["/visas"].is_object());
}
