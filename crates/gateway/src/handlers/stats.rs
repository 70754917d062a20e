//! Usage statistics handler

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AppState;
use docvault_common::{
    errors::{AppError, Result},
    models::RetrievalMode,
    query_log::QueryLogEntry,
    AuthenticatedTenant,
};

/// Recent questions listed per response
const RECENT_LIMIT: usize = 10;

/// Characters of each recent question shown
const QUESTION_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub tenant_id: String,
    pub total_queries: u64,
    pub generated_queries: u64,
    pub extractive_queries: u64,
    pub no_answer_queries: u64,
    pub semantic_queries: u64,
    pub lexical_queries: u64,
    pub degraded_queries: u64,
    pub last_query_at: Option<DateTime<Utc>>,
    pub documents: usize,
    pub chunks: usize,
    pub snapshot_version: u64,
    pub recent_queries: Vec<RecentQuery>,
}

#[derive(Debug, Serialize)]
pub struct RecentQuery {
    pub question: String,
    pub no_answer: bool,
    pub sources_count: usize,
    pub latency_ms: u64,
    pub retrieval_mode: RetrievalMode,
    pub created_at: DateTime<Utc>,
}

impl From<&QueryLogEntry> for RecentQuery {
    fn from(entry: &QueryLogEntry) -> Self {
        Self {
            question: entry.question.chars().take(QUESTION_PREVIEW_CHARS).collect(),
            no_answer: entry.no_answer,
            sources_count: entry.sources.len(),
            latency_ms: entry.latency_ms,
            retrieval_mode: entry.retrieval_mode,
            created_at: entry.created_at,
        }
    }
}

/// Usage analytics of the caller's own tenant
pub async fn stats(
    State(state): State<AppState>,
    auth: AuthenticatedTenant,
    Path(tenant_id): Path<String>,
) -> Result<Json<StatsResponse>> {
    if tenant_id != auth.tenant_id.as_str() {
        return Err(AppError::Forbidden {
            message: "statistics are only available for your own tenant".to_string(),
        });
    }

    let snapshot = state.catalog.get(&auth.tenant_id)?.snapshot();
    let stats = state.query_log.stats(&auth.tenant_id);
    let recent = state.query_log.recent(&auth.tenant_id, RECENT_LIMIT);

    Ok(Json(StatsResponse {
        tenant_id: auth.tenant_id.to_string(),
        total_queries: stats.total_queries,
        generated_queries: stats.generated_queries,
        extractive_queries: stats.extractive_queries,
        no_answer_queries: stats.no_answer_queries,
        semantic_queries: stats.semantic_queries,
        lexical_queries: stats.lexical_queries,
        degraded_queries: stats.degraded_queries,
        last_query_at: stats.last_query_at,
        documents: snapshot.document_count(),
        chunks: snapshot.chunk_count(),
        snapshot_version: snapshot.version(),
        recent_queries: recent.iter().map(RecentQuery::from).collect(),
    }))
}
