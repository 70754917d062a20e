//! Dense-vector retrieval
//!
//! Embeds the question with the configured provider and scores it against
//! the snapshot's semantic view. An empty view answers immediately without
//! touching the provider.

use super::Retriever;
use crate::index::IndexSnapshot;
use docvault_common::embeddings::Embedder;
use docvault_common::errors::Result;
use docvault_common::models::{RetrievalMode, ScoredChunk};
use std::sync::Arc;

/// Semantic retriever backed by an embedding provider
pub struct SemanticRetriever {
    embedder: Arc<dyn Embedder>,
}

impl SemanticRetriever {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }
}

#[async_trait::async_trait]
impl Retriever for SemanticRetriever {
    async fn retrieve(
        &self,
        snapshot: &IndexSnapshot,
        question: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        if snapshot.semantic().is_empty() {
            return Ok(Vec::new());
        }

        let query = self.embedder.embed(question).await?;
        let scores = snapshot.semantic().score(&query)?;
        Ok(snapshot.rank(scores, k))
    }

    fn mode(&self) -> RetrievalMode {
        RetrievalMode::Semantic
    }
}
