//! Question answering
//!
//! One question runs against one acquired snapshot: retrieval and the
//! cited sources always describe the same chunk set, even if an upload
//! publishes a new snapshot mid-flight.

use chrono::Utc;
use docvault_common::errors::{AppError, Result};
use docvault_common::metrics;
use docvault_common::models::{AnswerMode, RetrievalMode, ScoredChunk, TenantId};
use docvault_common::query_log::{LoggedSource, QueryLog, QueryLogEntry};
use docvault_context::Synthesizer;
use docvault_search::{IndexCatalog, RetrievalEngine};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};
use uuid::Uuid;

/// A passage backing an answer
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    pub doc_id: String,
    pub chunk_id: u32,
    pub score: f32,
    /// Full text of the chunk, so the cited evidence is always visible
    pub excerpt: String,
    /// The answer references this passage as `[n]`
    pub cited: bool,
}

/// Answer to one question
#[derive(Debug, Clone, Serialize)]
pub struct QaAnswer {
    pub query_id: Uuid,
    pub tenant_id: String,
    pub answer: String,
    pub sources: Vec<Source>,
    pub no_answer: bool,
    pub retrieval_mode: RetrievalMode,
    pub answer_mode: AnswerMode,
    pub degraded: bool,
    pub latency_ms: u64,
}

/// Retrieval, synthesis and logging for one tenant question
pub struct QaService {
    catalog: Arc<IndexCatalog>,
    engine: RetrievalEngine,
    synthesizer: Synthesizer,
    query_log: Arc<QueryLog>,
}

impl QaService {
    pub fn new(
        catalog: Arc<IndexCatalog>,
        engine: RetrievalEngine,
        synthesizer: Synthesizer,
        query_log: Arc<QueryLog>,
    ) -> Self {
        Self {
            catalog,
            engine,
            synthesizer,
            query_log,
        }
    }

    /// Answer `question` from the tenant's documents only
    #[instrument(skip(self, question), fields(tenant_id = %tenant_id, query_id = tracing::field::Empty))]
    pub async fn answer(&self, tenant_id: &TenantId, question: &str) -> Result<QaAnswer> {
        let start = Instant::now();
        let query_id = Uuid::new_v4();
        tracing::Span::current().record("query_id", tracing::field::display(&query_id));

        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::Validation {
                message: "question must not be blank".to_string(),
                field: Some("question".to_string()),
            });
        }

        let snapshot = self.catalog.get(tenant_id)?.snapshot();
        let retrieval = self.engine.retrieve(&snapshot, question).await?;
        let synthesized = self.synthesizer.synthesize(question, &retrieval.chunks).await;

        let sources = if synthesized.no_answer {
            Vec::new()
        } else {
            build_sources(&retrieval.chunks, &synthesized.citations)
        };
        let latency_ms = start.elapsed().as_millis() as u64;

        info!(
            mode = retrieval.mode.as_str(),
            answer_mode = synthesized.mode.as_str(),
            no_answer = synthesized.no_answer,
            degraded = synthesized.degraded,
            sources = sources.len(),
            snapshot_version = snapshot.version(),
            latency_ms,
            "Question answered"
        );
        metrics::record_query(
            start.elapsed().as_secs_f64(),
            retrieval.mode.as_str(),
            synthesized.mode.as_str(),
            synthesized.degraded,
        );

        self.query_log
            .record(QueryLogEntry {
                tenant_id: tenant_id.clone(),
                question: question.to_string(),
                answer: synthesized.answer.clone(),
                no_answer: synthesized.no_answer,
                sources: retrieval
                    .chunks
                    .iter()
                    .filter(|_| !synthesized.no_answer)
                    .map(|c| LoggedSource {
                        chunk_id: c.chunk.id.clone(),
                        score: c.score,
                    })
                    .collect(),
                retrieval_mode: retrieval.mode,
                answer_mode: synthesized.mode,
                degraded: synthesized.degraded,
                latency_ms,
                created_at: Utc::now(),
            })
            .await;

        Ok(QaAnswer {
            query_id,
            tenant_id: tenant_id.to_string(),
            answer: synthesized.answer,
            sources,
            no_answer: synthesized.no_answer,
            retrieval_mode: retrieval.mode,
            answer_mode: synthesized.mode,
            degraded: synthesized.degraded,
            latency_ms,
        })
    }
}

fn build_sources(chunks: &[ScoredChunk], citations: &[usize]) -> Vec<Source> {
    chunks
        .iter()
        .enumerate()
        .map(|(i, scored)| Source {
            doc_id: scored.chunk.document_id().to_string(),
            chunk_id: scored.chunk.id.seq,
            score: scored.score,
            excerpt: scored.chunk.text.clone(),
            cited: citations.contains(&(i + 1)),
        })
        .collect()
}
