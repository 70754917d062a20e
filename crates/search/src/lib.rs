//! DocVault retrieval
//!
//! Provides:
//! - Per-tenant index snapshots holding the lexical and semantic views of
//!   one chunk set, published by a single reference swap
//! - TF-IDF keyword scoring and dense-vector cosine scoring
//! - The retrieval policy choosing between them

pub mod index;
pub mod retrieval;

pub use index::{IndexCatalog, IndexSnapshot, LexicalIndex, SemanticIndex, TenantIndex};
pub use retrieval::{
    FallbackReason, LexicalRetriever, Retrieval, RetrievalEngine, Retriever, SemanticRetriever,
};
