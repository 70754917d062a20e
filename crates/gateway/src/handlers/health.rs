//! Health check handler

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub tenants: usize,
    pub providers: Providers,
}

#[derive(Serialize)]
pub struct Providers {
    pub embedding: ProviderInfo,
    pub generation: ProviderInfo,
}

#[derive(Serialize)]
pub struct ProviderInfo {
    pub provider: String,
    pub model: String,
}

/// Liveness probe with a summary of the configured providers.
///
/// Providers are not called: an unreachable provider degrades answers
/// but does not make the service unhealthy. A service without tenants
/// cannot answer anyone and reports an error.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.catalog.is_empty() { "error" } else { "ok" };

    Json(HealthResponse {
        status: status.to_string(),
        version: docvault_common::VERSION.to_string(),
        tenants: state.catalog.len(),
        providers: Providers {
            embedding: ProviderInfo {
                provider: state.config.embedding.provider.clone(),
                model: state.embedder.model_name().to_string(),
            },
            generation: ProviderInfo {
                provider: state.config.generation.provider.clone(),
                model: state.generator.model_name().to_string(),
            },
        },
    })
}
