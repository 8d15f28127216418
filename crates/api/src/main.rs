//! Saga service entry point.

use std::sync::Arc;

use api::{Config, LogFormat, Runtime};
use events::{EventBus, InMemoryEventBus, JetStreamBus};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env().expect("invalid configuration");

    // 1. Tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let (json, text) = match config.log_format {
        LogFormat::Json => (Some(tracing_subscriber::fmt::layer().json()), None),
        LogFormat::Text => (None, Some(tracing_subscriber::fmt::layer())),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .init();

    // 2. Prometheus recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Event bus
    let process_name = config.process_name();
    let bus: Arc<dyn EventBus> = match &config.nats_url {
        Some(url) => Arc::new(
            JetStreamBus::connect(url, process_name)
                .await
                .expect("failed to connect to NATS"),
        ),
        None => {
            tracing::warn!("NATS_URL not set, using in-process event bus");
            Arc::new(InMemoryEventBus::new())
        }
    };

    // 4. Services and consumers
    let mut runtime = Runtime::start(&config, bus.clone())
        .await
        .expect("failed to start services");
    let app = api::create_app(runtime.router(), metrics_handle, process_name);

    // 5. Serve
    let addr = config.addr();
    tracing::info!(%addr, service = process_name, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 6. Drain consumers before closing the bus
    runtime.shutdown().await;
    if let Err(e) = bus.close().await {
        tracing::error!(error = %e, "failed to close event bus");
    }

    tracing::info!("server shut down gracefully");
}
