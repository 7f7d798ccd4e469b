//! Test fixtures for control plane integration tests.

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Method, Request, Response, header};
use http_body_util::BodyExt;
use std::net::SocketAddr;

/// Builds a `POST /api/stores` request with a JSON body.
pub fn create_request(name: &str, store_type: &str) -> Request<Body> {
    let body = serde_json::json!({ "name": name, "type": store_type });
    Request::builder()
        .method(Method::POST)
        .uri("/api/stores")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Builds a body-less request.
pub fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Builds a `GET` request as if it came from `peer`.
pub fn request_from(uri: &str, peer: &str) -> Request<Body> {
    let addr: SocketAddr = peer.parse().unwrap();
    Request::builder()
        .uri(uri)
        .extension(ConnectInfo(addr))
        .body(Body::empty())
        .unwrap()
}

/// Collects a response body as JSON.
pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
