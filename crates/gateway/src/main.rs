//! DocVault API Gateway
//!
//! The entry point of the service:
//! - Loads configuration and registers tenants
//! - Configures embedding and generation providers
//! - Re-indexes stored documents
//! - Serves the HTTP API until Ctrl+C or SIGTERM

use anyhow::Context;
use docvault_common::{
    config::{AppConfig, ObservabilityConfig},
    embeddings::create_embedder,
    llm::create_generator,
    metrics,
    query_log::QueryLog,
};
use docvault_gateway::{create_router, AppState};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{signal, sync::Notify};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    init_tracing(&config.observability);
    info!(
        "Starting {} API Gateway v{}",
        config.observability.service_name,
        docvault_common::VERSION
    );

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        let mut builder = PrometheusBuilder::new().with_http_listener(addr);
        for (name, buckets) in metrics::histogram_buckets() {
            builder = builder
                .set_buckets_for_metric(Matcher::Full(name), buckets)
                .context("invalid histogram buckets")?;
        }
        builder
            .install()
            .context("failed to start the Prometheus exporter")?;
        info!("Metrics exporter listening on {}", addr);
    }
    metrics::register_metrics();

    let embedder = create_embedder(&config.embedding)?;
    let generator = create_generator(&config.generation)?;
    let query_log = QueryLog::open(
        config.storage.query_log_path.as_deref(),
        config.storage.recent_queries,
    )
    .await?;

    let state = AppState::new(config.clone(), embedder, generator, query_log).map_err(|e| {
        error!(error = %e, "Failed to initialize the engine");
        e
    })?;
    if state.registry.tenants().is_empty() {
        warn!("No tenants configured; every authenticated request will be rejected");
    }

    info!(data_dir = %config.storage.data_dir.display(), "Loading stored documents...");
    state.bootstrap().await?;

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}", config.server.host))?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Connections still open once the shutdown timeout elapses are dropped
    let shutdown = Arc::new(Notify::new());
    let server = axum::serve(listener, app).with_graceful_shutdown({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.notify_one();
        }
    });
    let drain_timeout = config.shutdown_timeout();

    tokio::select! {
        result = server.into_future() => result?,
        _ = async {
            shutdown.notified().await;
            tokio::time::sleep(drain_timeout).await;
        } => {
            warn!(
                timeout_secs = drain_timeout.as_secs(),
                "Shutdown timeout elapsed with requests in flight"
            );
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", config.log_level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json_logging {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
