//! Immutable per-tenant index snapshots and their publication
//!
//! A snapshot owns one chunk set together with both index views built from
//! it, so lexical and semantic retrieval over the same snapshot always agree
//! on which chunks exist. Writers build a complete replacement off to the
//! side and publish it by swapping one `Arc`; readers clone the current
//! `Arc` and keep a consistent view for as long as they hold it.

use super::{LexicalIndex, SemanticIndex};
use docvault_common::errors::{AppError, Result};
use docvault_common::models::{Chunk, ScoredChunk, TenantId};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, RwLock};

/// One published, immutable version of a tenant's index
#[derive(Debug, Default)]
pub struct IndexSnapshot {
    version: u64,
    /// Sorted by chunk id; row numbers of both views index into this
    chunks: Vec<Arc<Chunk>>,
    lexical: LexicalIndex,
    semantic: SemanticIndex,
    documents: usize,
}

impl IndexSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build both views over `chunks`
    pub fn build(version: u64, mut chunks: Vec<Arc<Chunk>>) -> Self {
        chunks.sort_by(|a, b| a.id.cmp(&b.id));
        let lexical = LexicalIndex::build(chunks.iter().map(|c| c.text.as_str()));
        let semantic = SemanticIndex::build(&chunks);
        let documents = chunks
            .iter()
            .map(|c| c.document_id())
            .collect::<BTreeSet<_>>()
            .len();

        Self {
            version,
            chunks,
            lexical,
            semantic,
            documents,
        }
    }

    /// Next version with `document_id`'s chunks replaced by `chunks`
    pub fn with_document(&self, document_id: &str, chunks: Vec<Chunk>) -> Self {
        let mut merged: Vec<Arc<Chunk>> = self
            .chunks
            .iter()
            .filter(|c| c.document_id() != document_id)
            .cloned()
            .collect();
        merged.extend(chunks.into_iter().map(Arc::new));
        Self::build(self.version + 1, merged)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn chunks(&self) -> &[Arc<Chunk>] {
        &self.chunks
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn document_count(&self) -> usize {
        self.documents
    }

    /// Chunks of one document in sequence order
    pub fn document_chunks(&self, document_id: &str) -> Vec<Arc<Chunk>> {
        self.chunks
            .iter()
            .filter(|c| c.document_id() == document_id)
            .cloned()
            .collect()
    }

    pub fn lexical(&self) -> &LexicalIndex {
        &self.lexical
    }

    pub fn semantic(&self) -> &SemanticIndex {
        &self.semantic
    }

    /// Turn `(row, score)` pairs into the top `k` chunks.
    ///
    /// Non-positive and non-finite scores are dropped. Order is by
    /// descending score, ties broken by ascending chunk id.
    pub fn rank(&self, scores: Vec<(usize, f32)>, k: usize) -> Vec<ScoredChunk> {
        let mut scores: Vec<(usize, f32)> = scores
            .into_iter()
            .filter(|(row, score)| score.is_finite() && *score > 0.0 && *row < self.chunks.len())
            .collect();
        // Rows follow chunk id order, so comparing rows breaks ties by id
        scores.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scores.truncate(k);

        scores
            .into_iter()
            .map(|(row, score)| ScoredChunk {
                chunk: Arc::clone(&self.chunks[row]),
                score,
            })
            .collect()
    }
}

/// The live index of one tenant
#[derive(Debug)]
pub struct TenantIndex {
    tenant_id: TenantId,
    current: RwLock<Arc<IndexSnapshot>>,
    writer: tokio::sync::Mutex<()>,
}

impl TenantIndex {
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            current: RwLock::new(Arc::new(IndexSnapshot::empty())),
            writer: tokio::sync::Mutex::new(()),
        }
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// The currently published snapshot
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace every chunk of `document_id` with `chunks` and publish the
    /// result. Writers of the same tenant are serialized; readers are never
    /// blocked for longer than the pointer swap.
    pub async fn replace_document(
        &self,
        document_id: &str,
        chunks: Vec<Chunk>,
    ) -> Result<Arc<IndexSnapshot>> {
        self.commit_document(document_id, chunks, std::future::ready(Ok(())))
            .await
    }

    /// Like [`TenantIndex::replace_document`], but `commit` runs under the
    /// writer lock once the replacement is built and before it is
    /// published. If `commit` fails, the current snapshot stays in place.
    pub async fn commit_document<F>(
        &self,
        document_id: &str,
        chunks: Vec<Chunk>,
        commit: F,
    ) -> Result<Arc<IndexSnapshot>>
    where
        F: Future<Output = Result<()>>,
    {
        if let Some(stray) = chunks
            .iter()
            .find(|c| c.tenant_id != self.tenant_id || c.document_id() != document_id)
        {
            return Err(AppError::internal(format!(
                "chunk {} of tenant {} cannot be indexed as {} for tenant {}",
                stray.id, stray.tenant_id, document_id, self.tenant_id
            )));
        }

        let _writer = self.writer.lock().await;
        let next = Arc::new(self.snapshot().with_document(document_id, chunks));
        commit.await?;

        match self.current.write() {
            Ok(mut guard) => *guard = Arc::clone(&next),
            Err(poisoned) => *poisoned.into_inner() = Arc::clone(&next),
        }

        docvault_common::metrics::record_index_size(self.tenant_id.as_str(), next.chunk_count());
        tracing::debug!(
            tenant_id = %self.tenant_id,
            document_id,
            version = next.version(),
            chunks = next.chunk_count(),
            "Published index snapshot"
        );
        Ok(next)
    }
}

/// Fixed set of tenant indexes, created once at startup
#[derive(Debug, Default)]
pub struct IndexCatalog {
    tenants: HashMap<TenantId, Arc<TenantIndex>>,
}

impl IndexCatalog {
    pub fn new<'a, I>(tenants: I) -> Self
    where
        I: IntoIterator<Item = &'a TenantId>,
    {
        Self {
            tenants: tenants
                .into_iter()
                .map(|t| (t.clone(), Arc::new(TenantIndex::new(t.clone()))))
                .collect(),
        }
    }

    /// Index of one tenant
    pub fn get(&self, tenant_id: &TenantId) -> Result<Arc<TenantIndex>> {
        self.tenants
            .get(tenant_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound {
                resource_type: "tenant".to_string(),
                id: tenant_id.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}
