//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use events::EventError;
use policy::PolicyError;
use saga::SagaError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Caller claims are missing or unreadable.
    Unauthorized(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Participant error.
    Saga(SagaError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Saga(err) => saga_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    let status = match &err {
        SagaError::Policy(PolicyError::InsufficientPermission) => StatusCode::FORBIDDEN,
        SagaError::Policy(e) if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
        SagaError::Validation(_) => StatusCode::BAD_REQUEST,
        SagaError::Conflict(_) => StatusCode::CONFLICT,
        SagaError::NotFound { .. } => StatusCode::NOT_FOUND,
        SagaError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        SagaError::Event(EventError::NoConnection | EventError::Bus(_)) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        SagaError::Policy(_) | SagaError::Event(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %err, %status, "request failed");
    }
    (status, err.to_string())
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}
