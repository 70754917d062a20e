//! Dense-vector index
//!
//! Holds the embeddings of one chunk set and scores them by cosine
//! similarity against a query vector. Chunks ingested while the embedding
//! provider was down carry no vector and are simply absent here.

use docvault_common::errors::{AppError, Result};
use docvault_common::models::{cosine_similarity, Chunk};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct SemanticIndex {
    dimension: usize,
    /// (row in the owning chunk list, vector)
    rows: Vec<(usize, Vec<f32>)>,
}

impl SemanticIndex {
    /// Collect the embeddings of `chunks`. Row numbers refer to positions in
    /// `chunks`. The first vector fixes the dimension; vectors of any other
    /// dimension are left out.
    pub fn build(chunks: &[Arc<Chunk>]) -> Self {
        let mut dimension = 0;
        let mut rows = Vec::new();

        for (row, chunk) in chunks.iter().enumerate() {
            let Some(embedding) = &chunk.embedding else {
                continue;
            };
            if dimension == 0 {
                dimension = embedding.len();
            }
            if embedding.len() != dimension {
                tracing::warn!(
                    chunk_id = %chunk.id,
                    expected = dimension,
                    actual = embedding.len(),
                    "Skipping embedding with mismatched dimension"
                );
                continue;
            }
            rows.push((row, embedding.clone()));
        }

        Self { dimension, rows }
    }

    /// Number of chunks with a usable vector
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Cosine similarity of every vector to `query` as `(row, score)`.
    ///
    /// A query of the wrong dimension means the provider changed underneath
    /// the index and is reported as the provider being unavailable.
    pub fn score(&self, query: &[f32]) -> Result<Vec<(usize, f32)>> {
        if self.rows.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(AppError::provider(
                "embedding",
                format!(
                    "query vector has dimension {}, index has {}",
                    query.len(),
                    self.dimension
                ),
            ));
        }

        Ok(self
            .rows
            .iter()
            .map(|(row, vector)| (*row, cosine_similarity(query, vector)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docvault_common::models::{ChunkId, TenantId};

    fn chunk(seq: u32, embedding: Option<Vec<f32>>) -> Arc<Chunk> {
        Arc::new(Chunk {
            id: ChunkId::new("doc.txt", seq),
            tenant_id: TenantId::parse("tenantA").unwrap(),
            start: 0,
            end: 1,
            text: "x".into(),
            embedding,
        })
    }

    #[test]
    fn test_missing_and_mismatched_vectors_excluded() {
        let chunks = vec![
            chunk(0, Some(vec![1.0, 0.0])),
            chunk(1, None),
            chunk(2, Some(vec![1.0, 0.0, 0.0])),
            chunk(3, Some(vec![0.0, 1.0])),
        ];
        let index = SemanticIndex::build(&chunks);
        assert_eq!(index.len(), 2);
        assert_eq!(index.dimension(), 2);

        let scores = index.score(&[1.0, 0.0]).unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].0, 0);
        assert!((scores[0].1 - 1.0).abs() < 1e-6);
        assert_eq!(scores[1], (3, 0.0));
    }

    #[test]
    fn test_wrong_query_dimension_is_provider_failure() {
        let index = SemanticIndex::build(&[chunk(0, Some(vec![1.0, 0.0]))]);
        let err = index.score(&[1.0, 0.0, 0.0]).unwrap_err();
        assert!(err.is_provider_failure());
    }

    #[test]
    fn test_empty_index_scores_nothing() {
        let index = SemanticIndex::build(&[chunk(0, None)]);
        assert!(index.is_empty());
        assert!(index.score(&[1.0]).unwrap().is_empty());
    }
}
