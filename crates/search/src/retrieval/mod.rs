//! Retrieval over a tenant snapshot
//!
//! Two retrievers implement the same trait:
//! - Semantic (cosine similarity of embeddings)
//! - Lexical (TF-IDF keyword match)
//!
//! [`RetrievalEngine`] decides which one answers a question.

mod engine;
mod lexical;
mod semantic;

pub use engine::{FallbackReason, Retrieval, RetrievalEngine};
pub use lexical::LexicalRetriever;
pub use semantic::SemanticRetriever;

use crate::index::IndexSnapshot;
use docvault_common::errors::Result;
use docvault_common::models::{RetrievalMode, ScoredChunk};

/// Common trait for all retrievers
#[async_trait::async_trait]
pub trait Retriever: Send + Sync {
    /// Top `k` chunks of `snapshot` for `question`, best first.
    /// Scores are similarities in `[0, 1]`; chunks scoring zero are omitted.
    async fn retrieve(
        &self,
        snapshot: &IndexSnapshot,
        question: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>>;

    /// Get the retrieval mode
    fn mode(&self) -> RetrievalMode;
}
