#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response};
use serde_json::Value;
use tower::ServiceExt;
use wadesk_config::AppConfig;
use wadesk_gateway::{AppState, SharedState, build_router};

pub const ORG_A: &str = "3f1c2b4a-8d6e-4f7a-9b0c-1d2e3f4a5b6c";
pub const ORG_B: &str = "7a9e2c10-55b1-4c3d-8e2f-0a1b2c3d4e5f";

pub fn state_with(config: AppConfig) -> SharedState {
    Arc::new(AppState::in_memory(config).expect("in-memory state"))
}

pub fn app(state: &SharedState) -> Router {
    build_router(Arc::clone(state))
}

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.expect("router is infallible")
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body")
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).expect("json body")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn get_as(uri: &str, org: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-organization-id", org)
        .body(Body::empty())
        .unwrap()
}

pub fn json_request(method: &str, uri: &str, org: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-organization-id", org)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Local stand-in for the Graph API; returns its base URL.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}
