//! Store management endpoints.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult, ErrorBody};
use crate::lifecycle::CreateStoreRequest;
use crate::types::{StoreId, StoreRecord, StoreStatus};

use super::AppState;

/// Body of `POST /api/stores`.
#[derive(Debug, Deserialize)]
pub struct CreateStoreBody {
    /// Display name.
    pub name: String,
    /// Template name, `woocommerce` or `medusa`.
    #[serde(rename = "type")]
    pub store_type: String,
}

/// Response confirming a deletion was accepted.
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    /// Human readable confirmation.
    pub message: &'static str,
}

/// Response of a store health probe.
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    /// Whether the probe succeeded.
    pub healthy: bool,
    /// Persisted status, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StoreStatus>,
    /// Probe failure, on error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn rejection_response(rejection: &JsonRejection) -> Response {
    let (status, error) = match rejection {
        JsonRejection::MissingJsonContentType(_) => (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Content-Type must be application/json".to_owned(),
        ),
        other => (
            StatusCode::BAD_REQUEST,
            format!("Invalid request format: {}", other.body_text()),
        ),
    };
    (status, Json(ErrorBody { error })).into_response()
}

/// Create a new store.
pub async fn create_store(
    State(state): State<AppState>,
    body: Result<Json<CreateStoreBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(&rejection),
    };

    let request = CreateStoreRequest {
        name: body.name,
        store_type: body.store_type,
    };

    match state.manager.create(request).await {
        Ok(record) => (StatusCode::ACCEPTED, Json(record)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// List all stores, newest first.
pub async fn list_stores(State(state): State<AppState>) -> ControlResult<Json<Vec<StoreRecord>>> {
    Ok(Json(state.manager.list().await?))
}

/// Get a store by ID.
pub async fn get_store(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ControlResult<Json<StoreRecord>> {
    Ok(Json(state.manager.get(&StoreId::new(id)).await?))
}

/// Start deleting a store.
pub async fn delete_store(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ControlResult<Json<DeleteResponse>> {
    state.manager.delete(&StoreId::new(id)).await?;
    Ok(Json(DeleteResponse {
        message: "Store deletion started",
    }))
}

/// Probe a store's public endpoint.
pub async fn check_store_health(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ControlError> {
    let health = state.manager.health(&StoreId::new(id)).await?;

    Ok(match health.probe {
        Ok(healthy) => Json(HealthCheckResponse {
            healthy,
            status: Some(health.status),
            error: None,
        })
        .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthCheckResponse {
                healthy: false,
                status: None,
                error: Some(e.to_string()),
            }),
        )
            .into_response(),
    })
}
