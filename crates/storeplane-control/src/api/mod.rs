//! HTTP API for the control service.
//!
//! Provides endpoints for:
//! - Store management (create, query, list, delete, probe)
//! - Health and readiness checks
//! - Prometheus metrics
//!
//! Every route sits behind admission control, CORS, a request timeout and
//! security headers, and every request is traced.

mod security;
mod stores;

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router, middleware};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::admission::{AdmissionController, admission_layer};
use crate::config::ServerConfig;
use crate::lifecycle::StoreManager;
use crate::store::StoreRepository;
use crate::types::StoreStatus;

pub use stores::{CreateStoreBody, DeleteResponse, HealthCheckResponse};

/// Shared application state for the control service.
#[derive(Clone)]
pub struct AppState {
    /// Store manager for lifecycle operations.
    pub manager: Arc<StoreManager>,
    /// Store repository for direct queries.
    pub repository: Arc<dyn StoreRepository>,
}

/// Creates the API router.
pub fn router(state: AppState, admission: Arc<AdmissionController>, server: &ServerConfig) -> Router {
    let router = Router::new()
        // Health endpoints
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // Store management
        .route(
            "/api/stores",
            get(stores::list_stores).post(stores::create_store),
        )
        .route(
            "/api/stores/{id}",
            get(stores::get_store).delete(stores::delete_store),
        )
        .route("/api/stores/{id}/health", get(stores::check_store_health))
        // Metrics
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(middleware::from_fn_with_state(admission, admission_layer))
        .layer(cors_layer(&server.allowed_origins))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(server.request_timeout_secs),
        ));

    security::secure(router, server.tls_terminated).layer(TraceLayer::new_for_http())
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origin = if allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        .max_age(Duration::from_secs(86_400))
}

/// Health check endpoint.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness check endpoint.
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    match state.repository.list_all().await {
        Ok(stores) => (
            StatusCode::OK,
            Json(ReadyResponse {
                ready: true,
                stores: stores.len(),
                jobs_in_flight: state.manager.jobs_in_flight(),
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadyResponse {
                    ready: false,
                    stores: 0,
                    jobs_in_flight: 0,
                }),
            )
        }
    }
}

/// Metrics endpoint.
async fn metrics(State(state): State<AppState>) -> Response {
    let stores = match state.repository.list_all().await {
        Ok(stores) => stores,
        Err(e) => {
            tracing::warn!(error = %e, "metrics unavailable");
            return (StatusCode::SERVICE_UNAVAILABLE, "store storage unavailable\n").into_response();
        }
    };

    let mut counts: HashMap<StoreStatus, usize> = HashMap::new();
    for store in &stores {
        *counts.entry(store.status).or_default() += 1;
    }

    let mut output = String::new();
    output.push_str("# HELP storeplane_stores_total Number of stores by status\n");
    output.push_str("# TYPE storeplane_stores_total gauge\n");

    for status in StoreStatus::ALL {
        let count = counts.get(&status).copied().unwrap_or(0);
        let _ = writeln!(
            output,
            "storeplane_stores_total{{status=\"{status}\"}} {count}"
        );
    }

    output.push_str("# HELP storeplane_jobs_in_flight Lifecycle jobs queued or running\n");
    output.push_str("# TYPE storeplane_jobs_in_flight gauge\n");
    let _ = writeln!(
        output,
        "storeplane_jobs_in_flight {}",
        state.manager.jobs_in_flight()
    );

    output.into_response()
}

/// Health response.
#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: chrono::DateTime<chrono::Utc>,
    version: &'static str,
}

/// Readiness response.
#[derive(serde::Serialize)]
struct ReadyResponse {
    ready: bool,
    stores: usize,
    jobs_in_flight: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AdmissionConfig, ProvisioningConfig};
    use crate::deployer::MockDeployer;
    use crate::health::HealthChecker;
    use crate::lifecycle::{DeletionExecutor, ProvisioningExecutor};
    use crate::pool::TaskPool;
    use crate::store::MemoryStore;
    use crate::store::testing::FaultyStore;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn make_app(admission: AdmissionConfig) -> Router {
        make_app_with(Arc::new(MemoryStore::new()), admission)
    }

    fn make_app_with(repository: Arc<dyn StoreRepository>, admission: AdmissionConfig) -> Router {
        let deployer = Arc::new(MockDeployer::new());

        let manager = Arc::new(StoreManager::new(
            Arc::clone(&repository),
            TaskPool::new(2),
            Arc::new(ProvisioningExecutor::new(
                Arc::clone(&repository),
                deployer.clone(),
                ProvisioningConfig::default(),
            )),
            Arc::new(DeletionExecutor::new(
                Arc::clone(&repository),
                deployer,
                Duration::ZERO,
            )),
            HealthChecker::new().unwrap(),
            "localhost".to_owned(),
        ));

        router(
            AppState {
                manager,
                repository,
            },
            Arc::new(AdmissionController::new(&admission)),
            &ServerConfig::default(),
        )
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = make_app(AdmissionConfig::default());

        let response = app.oneshot(get_request("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::X_FRAME_OPTIONS], "DENY");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert!(json["timestamp"].is_string());
        assert!(json["version"].is_string());
    }

    #[tokio::test]
    async fn ready_endpoint() {
        let app = make_app(AdmissionConfig::default());
        let response = app.oneshot(get_request("/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint() {
        let app = make_app(AdmissionConfig::default());

        let response = app.oneshot(get_request("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("storeplane_stores_total{status=\"Provisioning\"} 0"));
        assert!(text.contains("storeplane_stores_total{status=\"DeletionFailed\"} 0"));
    }

    #[tokio::test]
    async fn metrics_report_unavailable_storage() {
        let repository = Arc::new(FaultyStore::new());
        repository.fail_list(true);
        let app = make_app_with(repository, AdmissionConfig::default());

        let response = app.oneshot(get_request("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("storeplane_stores_total"));
    }

    #[tokio::test]
    async fn security_headers_skip_hsts_on_plain_http() {
        let app = make_app(AdmissionConfig::default());
        let response = app.oneshot(get_request("/health")).await.unwrap();
        assert!(!response.headers().contains_key(header::STRICT_TRANSPORT_SECURITY));
        assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    }

    #[tokio::test]
    async fn rate_limited_requests_get_429() {
        let app = make_app(AdmissionConfig {
            burst: 1,
            ..AdmissionConfig::default()
        });

        let first = app.clone().oneshot(get_request("/health")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");

        let body = second.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Rate limit exceeded. Please try again later.");
    }

    #[tokio::test]
    async fn create_requires_json_content_type() {
        let app = make_app(AdmissionConfig::default());

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/stores")
                    .header(header::CONTENT_TYPE, "text/plain")
                    .body(Body::from(r#"{"name":"Test Shop","type":"woocommerce"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn cors_allows_configured_origin() {
        let app = make_app(AdmissionConfig::default());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(header::ORIGIN, "http://localhost:5173")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:5173"
        );
    }
}
