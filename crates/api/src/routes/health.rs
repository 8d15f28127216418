//! Health check endpoint.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

/// GET /health: Returns process health and the hosted service.
pub async fn check(State(service): State<&'static str>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service,
    })
}
