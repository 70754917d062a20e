//! DocVault API Gateway
//!
//! The HTTP surface of the service. Handles:
//! - Tenant authentication through the API key header
//! - Question answering and document upload
//! - Rate limiting
//! - Observability (request ids, tracing, request metrics)
//!
//! The router is built from an [`AppState`] so integration tests can drive
//! it without binding a socket.

pub mod handlers;
pub mod middleware;
pub mod services;

use axum::{
    extract::{DefaultBodyLimit, FromRef, Request},
    http::HeaderName,
    middleware::Next,
    routing::{get, post},
    Router,
};
use docvault_common::{
    config::AppConfig, embeddings::Embedder, errors::Result, llm::Generator,
    query_log::QueryLog, TenantRegistry,
};
use docvault_context::Synthesizer;
use docvault_ingestion::{DocumentStore, IngestionPipeline};
use docvault_search::{IndexCatalog, RetrievalEngine};
use services::QaService;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

/// Headroom on top of the largest accepted file for multipart framing
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<TenantRegistry>,
    pub catalog: Arc<IndexCatalog>,
    pub qa: Arc<QaService>,
    pub pipeline: Arc<IngestionPipeline>,
    pub query_log: Arc<QueryLog>,
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn Generator>,
}

impl FromRef<AppState> for Arc<TenantRegistry> {
    fn from_ref(state: &AppState) -> Self {
        state.registry.clone()
    }
}

impl AppState {
    /// Wire the engine together.
    ///
    /// Every registered tenant gets an empty index; call
    /// [`AppState::bootstrap`] to load stored documents.
    pub fn new(
        config: AppConfig,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        query_log: QueryLog,
    ) -> Result<Self> {
        let registry = Arc::new(TenantRegistry::from_config(
            &config.tenants,
            config.auth.api_key_header.clone(),
        )?);
        let catalog = Arc::new(IndexCatalog::new(registry.tenants()));
        let query_log = Arc::new(query_log);

        let engine = RetrievalEngine::new(embedder.clone(), config.retrieval.clone());
        let synthesizer = Synthesizer::new(
            generator.clone(),
            config.synthesis.clone(),
            &config.generation,
        )?;
        let qa = Arc::new(QaService::new(
            catalog.clone(),
            engine,
            synthesizer,
            query_log.clone(),
        ));

        let pipeline = Arc::new(IngestionPipeline::new(
            catalog.clone(),
            embedder.clone(),
            DocumentStore::new(config.storage.data_dir.clone()),
            config.chunking.clone(),
            config.ingestion.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            registry,
            catalog,
            qa,
            pipeline,
            query_log,
            embedder,
            generator,
        })
    }

    /// Re-index every tenant's stored documents
    pub async fn bootstrap(&self) -> Result<()> {
        for tenant_id in self.registry.tenants() {
            let report = self.pipeline.bootstrap_tenant(tenant_id).await?;
            info!(
                tenant_id = %tenant_id,
                documents = report.documents,
                chunks = report.chunks,
                skipped = report.skipped,
                "Tenant documents loaded"
            );
        }
        Ok(())
    }
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let config = state.config.clone();

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id_header = HeaderName::from_bytes(config.auth.request_id_header.as_bytes())
        .unwrap_or(HeaderName::from_static("x-request-id"));
    let request_id = SetRequestIdLayer::new(request_id_header.clone(), MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::new(request_id_header);

    let mut router = Router::new()
        // Health endpoint (no auth)
        .route("/health", get(handlers::health::health))
        // Tenant endpoints
        .route("/query", post(handlers::query::query))
        .route("/upload", post(handlers::upload::upload))
        .route("/stats/{tenant_id}", get(handlers::stats::stats))
        .layer(DefaultBodyLimit::max(
            config.ingestion.max_file_bytes + MULTIPART_OVERHEAD_BYTES,
        ))
        .layer(axum::middleware::from_fn(middleware::metrics::track_requests));

    if config.rate_limit.enabled {
        let limiter = middleware::rate_limit::create_rate_limiter(
            config.rate_limit.requests_per_second,
            config.rate_limit.burst,
        );
        router = router.layer(axum::middleware::from_fn(move |request: Request, next: Next| {
            middleware::rate_limit::rate_limit_middleware(request, next, limiter.clone())
        }));
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(request_id)
                .layer(propagate_id)
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(TimeoutLayer::new(config.request_timeout())),
        )
        .with_state(state)
}
