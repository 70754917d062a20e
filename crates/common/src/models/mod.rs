//! Core domain types shared by the indexing and answering crates

use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Maximum length of a tenant identifier
pub const MAX_TENANT_ID_LEN: usize = 64;

/// Identity of an isolated customer.
///
/// Tenant ids name a directory under the data root, so only ASCII letters,
/// digits, `-` and `_` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(Arc<str>);

impl TenantId {
    pub fn parse(raw: &str) -> Result<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_TENANT_ID_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(AppError::Configuration {
                message: format!("invalid tenant id {:?}", raw),
            });
        }
        Ok(Self(Arc::from(raw)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Chunk identifier: owning document plus sequence number.
///
/// The derived ordering (document id, then sequence) is the tie-breaker
/// used by every ranking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId {
    pub document_id: String,
    pub seq: u32,
}

impl ChunkId {
    pub fn new(document_id: impl Into<String>, seq: u32) -> Self {
        Self {
            document_id: document_id.into(),
            seq,
        }
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.document_id, self.seq)
    }
}

/// A bounded, overlapping span of one document, the unit of retrieval and citation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,

    /// Owning tenant
    pub tenant_id: TenantId,

    /// Character offset of the first character (inclusive)
    pub start: usize,

    /// Character offset one past the last character
    pub end: usize,

    /// Text span
    pub text: String,

    /// Dense vector from the embedding provider, if one was available at ingestion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    pub fn document_id(&self) -> &str {
        &self.id.document_id
    }
}

/// A chunk with its similarity score for one query
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Arc<Chunk>,
    pub score: f32,
}

/// Which index produced a ranking
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// Dense-vector similarity search
    Semantic,
    /// TF-IDF keyword search
    Lexical,
    /// No chunk cleared the score floor
    None,
}

impl RetrievalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMode::Semantic => "semantic",
            RetrievalMode::Lexical => "lexical",
            RetrievalMode::None => "none",
        }
    }
}

/// How the answer text was produced
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    /// Language model answer grounded in the supplied context
    Generated,
    /// Verbatim excerpt of the best chunk (generation unavailable)
    Extractive,
    /// No answer was produced
    None,
}

impl AnswerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerMode::Generated => "generated",
            AnswerMode::Extractive => "extractive",
            AnswerMode::None => "none",
        }
    }
}

/// Cosine similarity of two dense vectors; 0 when either has zero norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
