//! Integration tests for request validation, admission and error mapping.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use common::TestControlPlane;
use common::fixtures::{create_request, json_body, request, request_from};
use storeplane_control::StoreRepository;
use tower::ServiceExt;

#[tokio::test]
async fn invalid_names_are_rejected_without_state() {
    let cp = TestControlPlane::new();

    for name in ["", "   ", "shop<script>", &"x".repeat(101)] {
        let response = cp
            .router()
            .oneshot(create_request(name, "woocommerce"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "name {name:?}");
        assert!(json_body(response).await["error"].is_string());
    }

    assert!(cp.repository.list_all().await.unwrap().is_empty());
    assert_eq!(cp.deployer.deploy_calls(), 0);
}

#[tokio::test]
async fn unknown_store_type_is_rejected() {
    let cp = TestControlPlane::new();

    let response = cp
        .router()
        .oneshot(create_request("Test Shop", "shopify"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(cp.repository.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let cp = TestControlPlane::new();

    let response = cp
        .router()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/stores")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{\"name\":"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid request format")
    );
}

#[tokio::test]
async fn unknown_store_returns_404() {
    let cp = TestControlPlane::new();

    for (method, uri) in [
        (Method::GET, "/api/stores/missing"),
        (Method::DELETE, "/api/stores/missing"),
        (Method::GET, "/api/stores/missing/health"),
    ] {
        let response = cp.router().oneshot(request(method, uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn unreachable_store_health_is_503() {
    let cp = TestControlPlane::new();

    let response = cp
        .router()
        .oneshot(create_request("Quiet Shop", "woocommerce"))
        .await
        .unwrap();
    let id = json_body(response).await["id"]
        .as_str()
        .unwrap()
        .to_owned();

    let response = cp
        .router()
        .oneshot(request(Method::GET, &format!("/api/stores/{id}/health")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["healthy"], false);
    assert!(body["error"].is_string());
}

#[tokio::test(start_paused = true)]
async fn admission_denies_after_burst_and_refills() {
    let cp = TestControlPlane::with_admission(60, 3);
    let app = cp.router();

    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(request_from("/health", "10.0.0.1:40000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let denied = app
        .clone()
        .oneshot(request_from("/health", "10.0.0.1:40001"))
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);

    // Other clients have their own budget.
    let other = app
        .clone()
        .oneshot(request_from("/health", "10.0.0.2:40000"))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::OK);

    // 60 per minute refills one token per second.
    tokio::time::advance(std::time::Duration::from_secs(1)).await;
    let refilled = app
        .oneshot(request_from("/health", "10.0.0.1:40002"))
        .await
        .unwrap();
    assert_eq!(refilled.status(), StatusCode::OK);
}
