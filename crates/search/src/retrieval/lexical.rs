//! Keyword retrieval over the snapshot's TF-IDF view

use super::Retriever;
use crate::index::IndexSnapshot;
use docvault_common::errors::Result;
use docvault_common::models::{RetrievalMode, ScoredChunk};

/// TF-IDF retriever; needs no external provider and cannot fail
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalRetriever;

impl LexicalRetriever {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Retriever for LexicalRetriever {
    async fn retrieve(
        &self,
        snapshot: &IndexSnapshot,
        question: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        Ok(snapshot.rank(snapshot.lexical().score(question), k))
    }

    fn mode(&self) -> RetrievalMode {
        RetrievalMode::Lexical
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docvault_common::models::{Chunk, ChunkId, TenantId};
    use std::sync::Arc;

    fn snapshot(texts: &[(&str, &str)]) -> IndexSnapshot {
        let tenant = TenantId::parse("tenantA").unwrap();
        IndexSnapshot::build(
            1,
            texts
                .iter()
                .map(|(doc, text)| {
                    Arc::new(Chunk {
                        id: ChunkId::new(*doc, 0),
                        tenant_id: tenant.clone(),
                        start: 0,
                        end: text.chars().count(),
                        text: text.to_string(),
                        embedding: None,
                    })
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_french_declaration_question() {
        let snapshot = snapshot(&[("sinistres.txt", "déclaration sous 5 jours ouvrés")]);
        let results = LexicalRetriever::new()
            .retrieve(&snapshot, "Sous combien de jours doit-on déclarer ?", 3)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].chunk.text.contains("5 jours ouvrés"));
        assert!(results[0].score > 0.12);
    }

    #[tokio::test]
    async fn test_limits_and_orders() {
        let snapshot = snapshot(&[
            ("a.txt", "franchise contrat auto"),
            ("b.txt", "franchise"),
            ("c.txt", "rien à voir"),
        ]);
        let results = LexicalRetriever::new()
            .retrieve(&snapshot, "franchise", 1)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.document_id(), "b.txt");
    }

    #[tokio::test]
    async fn test_empty_snapshot() {
        let results = LexicalRetriever::new()
            .retrieve(&IndexSnapshot::empty(), "question", 3)
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
