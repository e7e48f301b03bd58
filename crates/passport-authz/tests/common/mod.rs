#![allow(dead_code)]

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use std::net::SocketAddr;
use tokio::net::TcpListener;

pub async fn spawn_jwks_server(jwks: serde_json::Value) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    spawn_jwks_on(listener, jwks)
}

/// Serves `jwks` on an already bound listener, for keys whose `jku` must
/// name the listener's address before the key set exists.
pub fn spawn_jwks_on(
    listener: TcpListener,
    jwks: serde_json::Value,
) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let app = Router::new().route(
        "/.well-known/jwks.json",
        get(move || {
            let jwks = jwks.clone();
            async move { Json(jwks) }
        }),
    );
    serve_on(listener, app)
}

pub async fn spawn_failing_server(status: StatusCode) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let app = Router::new().route("/.well-known/jwks.json", get(move || async move { status }));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    serve_on(listener, app)
}

/// Accepts connections and holds them open without ever answering.
pub async fn spawn_silent_server() -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let handle = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    (addr, handle)
}

fn serve_on(listener: TcpListener, app: Router) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let addr = listener.local_addr().expect("addr");
    let server = axum::serve(listener, app.into_make_service());
    let handle = tokio::spawn(async move {
        let _ = server.await;
    });
    (addr, handle)
}

pub fn jwks_url(addr: SocketAddr) -> String {
    format!("http://{addr}/.well-known/jwks.json")
}
