//! Retrieval policy
//!
//! Semantic retrieval answers when every chunk carries a vector and its
//! best match clears the semantic threshold. Otherwise, including when the
//! embedding provider is down or busy, lexical retrieval answers. Whatever answers, results below the
//! score floor are dropped; an empty remainder means no evidence.

use super::{LexicalRetriever, Retriever, SemanticRetriever};
use crate::index::IndexSnapshot;
use docvault_common::config::RetrievalConfig;
use docvault_common::embeddings::Embedder;
use docvault_common::errors::{AppError, Result};
use docvault_common::models::{RetrievalMode, ScoredChunk};
use std::sync::Arc;
use std::time::Instant;

/// Why the semantic answer was not used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// The snapshot holds no vectors
    NoVectors,
    /// Some chunks of the snapshot have no usable vector
    PartialVectors,
    /// The best semantic match was below the semantic threshold
    BelowThreshold,
    /// The embedding provider failed or timed out
    ProviderUnavailable,
    /// No admission slot for the embedding provider
    Busy,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::NoVectors => "no_vectors",
            FallbackReason::PartialVectors => "partial_vectors",
            FallbackReason::BelowThreshold => "below_threshold",
            FallbackReason::ProviderUnavailable => "provider_unavailable",
            FallbackReason::Busy => "busy",
        }
    }
}

/// Outcome of one retrieval
#[derive(Debug, Clone)]
pub struct Retrieval {
    /// Index whose ranking was used, `None` when nothing cleared the floor
    pub mode: RetrievalMode,
    /// At most `top_k` chunks, best first, all at or above the floor
    pub chunks: Vec<ScoredChunk>,
    pub fallback: Option<FallbackReason>,
}

impl Retrieval {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn top_score(&self) -> Option<f32> {
        self.chunks.first().map(|c| c.score)
    }
}

/// Chooses between a primary (semantic) and a fallback (lexical) retriever
pub struct RetrievalEngine {
    primary: Arc<dyn Retriever>,
    fallback: Arc<dyn Retriever>,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    /// Semantic retrieval through `embedder`, lexical as fallback
    pub fn new(embedder: Arc<dyn Embedder>, config: RetrievalConfig) -> Self {
        Self::with_retrievers(
            Arc::new(SemanticRetriever::new(embedder)),
            Arc::new(LexicalRetriever::new()),
            config,
        )
    }

    pub fn with_retrievers(
        primary: Arc<dyn Retriever>,
        fallback: Arc<dyn Retriever>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            primary,
            fallback,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve evidence for `question` from one snapshot.
    ///
    /// Both retrievers read the same snapshot, so a concurrent ingestion
    /// can never mix chunk sets within one answer.
    pub async fn retrieve(&self, snapshot: &IndexSnapshot, question: &str) -> Result<Retrieval> {
        let start = Instant::now();
        let k = self.config.top_k;

        let semantic = snapshot.semantic();
        if !semantic.is_empty() && semantic.len() < snapshot.chunk_count() {
            return self
                .fall_back(snapshot, question, FallbackReason::PartialVectors, start)
                .await;
        }

        let reason = match self.primary.retrieve(snapshot, question, k).await {
            Ok(results) => match results.first() {
                Some(best) if best.score >= self.config.semantic_threshold => {
                    return Ok(self.finish(self.primary.mode(), results, None, start));
                }
                Some(_) => FallbackReason::BelowThreshold,
                None if snapshot.semantic().is_empty() => FallbackReason::NoVectors,
                None => FallbackReason::BelowThreshold,
            },
            Err(AppError::Busy { .. }) => FallbackReason::Busy,
            Err(e) if e.is_provider_failure() => {
                tracing::warn!(error = %e, "Semantic retrieval unavailable, using lexical");
                FallbackReason::ProviderUnavailable
            }
            Err(e) => return Err(e),
        };

        self.fall_back(snapshot, question, reason, start).await
    }

    async fn fall_back(
        &self,
        snapshot: &IndexSnapshot,
        question: &str,
        reason: FallbackReason,
        start: Instant,
    ) -> Result<Retrieval> {
        docvault_common::metrics::record_fallback(reason.as_str());
        let results = self.fallback.retrieve(snapshot, question, self.config.top_k).await?;
        Ok(self.finish(self.fallback.mode(), results, Some(reason), start))
    }

    fn finish(
        &self,
        mode: RetrievalMode,
        mut chunks: Vec<ScoredChunk>,
        fallback: Option<FallbackReason>,
        start: Instant,
    ) -> Retrieval {
        chunks.retain(|c| c.score >= self.config.min_score);
        let mode = if chunks.is_empty() {
            RetrievalMode::None
        } else {
            mode
        };

        tracing::debug!(
            mode = mode.as_str(),
            fallback = fallback.map(|r| r.as_str()),
            results = chunks.len(),
            top_score = chunks.first().map(|c| c.score),
            latency_ms = start.elapsed().as_millis() as u64,
            "Retrieval complete"
        );

        Retrieval {
            mode,
            chunks,
            fallback,
        }
    }
}
