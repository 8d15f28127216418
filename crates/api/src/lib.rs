//! HTTP surface of the order saga services.
//!
//! One binary hosts any subset of the five participants (selected through
//! `SERVICE`), each exposing its own routes next to the shared `/health`
//! and `/metrics` endpoints.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod runtime;

use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::{Config, ConfigError, LogFormat};
pub use error::ApiError;
pub use runtime::{Runtime, StartupError};

/// Wraps the service routes with health, metrics and the HTTP layers.
pub fn create_app(
    service_routes: Router,
    metrics_handle: PrometheusHandle,
    process_name: &'static str,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let health_router = Router::new()
        .route("/health", get(routes::health::check))
        .with_state(process_name);

    service_routes
        .merge(health_router)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
