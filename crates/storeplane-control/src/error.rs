//! Error types for storeplane-control.

use std::time::Duration;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Result type alias using [`ControlError`].
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors that can occur in the control plane.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Request failed validation; no state was created.
    #[error("{0}")]
    Validation(String),

    /// Client exceeded its admission budget.
    #[error("rate limit exceeded")]
    RateLimited,

    /// Store not found.
    #[error("store not found: {0}")]
    StoreNotFound(String),

    /// Store is already being deleted.
    #[error("store is already being deleted: {0}")]
    AlreadyDeleting(String),

    /// Invalid state transition attempted.
    #[error("invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: &'static str,
        /// Attempted target state.
        to: &'static str,
    },

    /// External deployment call failed.
    #[error("deployment error: {0}")]
    Deployment(String),

    /// External call exceeded its wall-clock limit.
    #[error("{operation} timed out after {}s", limit.as_secs())]
    Timeout {
        /// Operation that timed out.
        operation: &'static str,
        /// Configured limit.
        limit: Duration,
    },

    /// Credential generation failed.
    #[error("credential generation failed: {0}")]
    Credentials(String),

    /// Health or phase probe failed.
    #[error("probe failed: {0}")]
    Probe(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialisation error.
    #[error("serialisation error: {0}")]
    Serialisation(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Create a validation error.
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a deployment error.
    #[must_use]
    pub fn deployment(msg: impl Into<String>) -> Self {
        Self::Deployment(msg.into())
    }

    /// Create a probe error.
    #[must_use]
    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// HTTP status this error maps to at the API edge.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::StoreNotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyDeleting(_) | Self::InvalidStateTransition { .. } => StatusCode::CONFLICT,
            Self::Probe(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Deployment(_)
            | Self::Credentials(_)
            | Self::Database(_)
            | Self::Config(_)
            | Self::Http(_)
            | Self::Io(_)
            | Self::Serialisation(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error body returned by the HTTP API.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Error message.
    pub error: String,
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Sanitise error messages for external responses
        let message = match &self {
            Self::Validation(reason) => reason.clone(),
            Self::RateLimited => "Rate limit exceeded. Please try again later.".to_owned(),
            Self::StoreNotFound(_) => "Store not found".to_owned(),
            Self::AlreadyDeleting(_) => "Store is already being deleted".to_owned(),
            Self::InvalidStateTransition { .. } | Self::Probe(_) | Self::Timeout { .. } => {
                self.to_string()
            }
            Self::Deployment(_)
            | Self::Credentials(_)
            | Self::Database(_)
            | Self::Config(_)
            | Self::Http(_)
            | Self::Io(_)
            | Self::Serialisation(_)
            | Self::Internal(_) => "Internal server error".to_owned(),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
