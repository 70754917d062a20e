//! Ingestion pipeline
//!
//! Validation, chunking, embedding and staging the raw bytes all happen
//! before the tenant's writer lock is taken. Under the lock, the snapshot is
//! rebuilt, the staged file is moved into place and only then is the new
//! snapshot published. A failure anywhere before the swap leaves both the
//! published snapshot and the stored documents as they were.

use crate::chunker::chunk_text;
use crate::store::DocumentStore;
use crate::validate::validate_upload;
use docvault_common::config::{ChunkingConfig, IngestionConfig};
use docvault_common::embeddings::Embedder;
use docvault_common::errors::{AppError, Result};
use docvault_common::models::{Chunk, ChunkId, TenantId};
use docvault_common::text::normalize_whitespace;
use docvault_search::IndexCatalog;
use serde::Serialize;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Result of ingesting one document
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub document_id: String,
    pub chunks_count: usize,
    pub file_size_bytes: usize,
    /// Whether the chunks carry dense vectors
    pub embedded: bool,
    /// Snapshot version that made the document visible
    pub snapshot_version: u64,
}

/// Result of re-ingesting a tenant's stored documents at startup
#[derive(Debug, Clone, Default, Serialize)]
pub struct BootstrapReport {
    pub documents: usize,
    pub chunks: usize,
    pub skipped: usize,
}

/// A validated document cut into chunks, not yet published
struct PreparedDocument {
    document_id: String,
    chunks: Vec<Chunk>,
    file_size_bytes: usize,
    embedded: bool,
}

/// Ingestion pipeline
pub struct IngestionPipeline {
    catalog: Arc<IndexCatalog>,
    embedder: Arc<dyn Embedder>,
    store: DocumentStore,
    chunking: ChunkingConfig,
    config: IngestionConfig,
}

impl IngestionPipeline {
    pub fn new(
        catalog: Arc<IndexCatalog>,
        embedder: Arc<dyn Embedder>,
        store: DocumentStore,
        chunking: ChunkingConfig,
        config: IngestionConfig,
    ) -> Self {
        Self {
            catalog,
            embedder,
            store,
            chunking,
            config,
        }
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Validate, index and store an uploaded document
    #[instrument(skip(self, bytes), fields(tenant_id = %tenant_id, size = bytes.len()))]
    pub async fn ingest(&self, tenant_id: &TenantId, filename: &str, bytes: &[u8]) -> Result<IngestOutcome> {
        let start = Instant::now();
        let prepared = self.prepare(tenant_id, filename, bytes).await?;
        let staged = self.store.stage(tenant_id, &prepared.document_id, bytes).await?;

        let published = self.publish(tenant_id, prepared, staged.commit(), start).await;
        if published.is_err() {
            staged.discard().await;
        }
        published
    }

    /// Re-index every stored document of a tenant, in file name order.
    /// Files that no longer pass validation are skipped.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn bootstrap_tenant(&self, tenant_id: &TenantId) -> Result<BootstrapReport> {
        let mut report = BootstrapReport::default();

        for path in self.store.list(tenant_id).await? {
            let Some(filename) = path.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
                report.skipped += 1;
                continue;
            };
            match self.reindex_file(tenant_id, &filename, &path).await {
                Ok(outcome) => {
                    report.documents += 1;
                    report.chunks += outcome.chunks_count;
                }
                Err(e) if e.is_client_error() => {
                    warn!(file = %filename, error = %e, "Skipping stored file");
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            documents = report.documents,
            chunks = report.chunks,
            skipped = report.skipped,
            "Tenant bootstrap complete"
        );
        Ok(report)
    }

    async fn reindex_file(&self, tenant_id: &TenantId, filename: &str, path: &Path) -> Result<IngestOutcome> {
        let start = Instant::now();
        let bytes = tokio::fs::read(path).await?;
        let prepared = self.prepare(tenant_id, filename, &bytes).await?;
        self.publish(tenant_id, prepared, std::future::ready(Ok(())), start).await
    }

    async fn prepare(&self, tenant_id: &TenantId, filename: &str, bytes: &[u8]) -> Result<PreparedDocument> {
        self.catalog.get(tenant_id)?;

        let upload = validate_upload(filename, bytes, &self.config)?;
        let text = normalize_whitespace(&upload.text);
        let pieces = chunk_text(&text, &self.chunking)?;

        let texts: Vec<String> = pieces.iter().map(|p| p.content.clone()).collect();
        let embeddings = self.embed_all(&upload.document_id, &texts).await?;
        let embedded = embeddings.is_some();
        let mut embeddings = embeddings.map(Vec::into_iter);

        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .map(|piece| Chunk {
                id: ChunkId::new(upload.document_id.clone(), piece.index),
                tenant_id: tenant_id.clone(),
                start: piece.start_pos,
                end: piece.end_pos,
                text: piece.content,
                embedding: embeddings.as_mut().and_then(Iterator::next),
            })
            .collect();

        Ok(PreparedDocument {
            document_id: upload.document_id,
            chunks,
            file_size_bytes: upload.size_bytes,
            embedded,
        })
    }

    /// Swap the document into the tenant's index once `commit` succeeds
    async fn publish<F>(
        &self,
        tenant_id: &TenantId,
        prepared: PreparedDocument,
        commit: F,
        start: Instant,
    ) -> Result<IngestOutcome>
    where
        F: Future<Output = Result<()>>,
    {
        let tenant_index = self.catalog.get(tenant_id)?;
        let chunks_count = prepared.chunks.len();
        let snapshot = tenant_index
            .commit_document(&prepared.document_id, prepared.chunks, commit)
            .await?;

        let elapsed = start.elapsed();
        docvault_common::metrics::record_ingestion(elapsed.as_secs_f64(), chunks_count, tenant_id.as_str());
        info!(
            document_id = %prepared.document_id,
            chunks = chunks_count,
            embedded = prepared.embedded,
            version = snapshot.version(),
            latency_ms = elapsed.as_millis() as u64,
            "Document indexed"
        );

        Ok(IngestOutcome {
            document_id: prepared.document_id,
            chunks_count,
            file_size_bytes: prepared.file_size_bytes,
            embedded: prepared.embedded,
            snapshot_version: snapshot.version(),
        })
    }

    /// One vector per chunk, or `None` when the document is indexed
    /// lexically only
    async fn embed_all(&self, document_id: &str, texts: &[String]) -> Result<Option<Vec<Vec<f32>>>> {
        let result = self.embedder.embed_batch(texts).await.and_then(|vectors| {
            if vectors.len() == texts.len() {
                Ok(vectors)
            } else {
                Err(AppError::provider(
                    "embedding",
                    format!("expected {} vectors, got {}", texts.len(), vectors.len()),
                ))
            }
        });

        match result {
            Ok(vectors) => Ok(Some(vectors)),
            Err(e) if e.is_provider_failure() && !self.config.require_embeddings => {
                warn!(document_id, error = %e, "Embedding unavailable, indexing lexically only");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docvault_common::embeddings::HashingEmbedder;
    use docvault_common::errors::ErrorCode;
    use docvault_search::IndexSnapshot;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct DownEmbedder;

    #[async_trait]
    impl Embedder for DownEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(AppError::provider("embedding", "connection refused"))
        }

        fn model_name(&self) -> &str {
            "down"
        }
    }

    /// Embeds normally until the given call, then fails
    struct FailsOnCall {
        inner: HashingEmbedder,
        fail_on: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for FailsOnCall {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.fail_on {
                return Err(AppError::provider("embedding", "timed out"));
            }
            self.inner.embed(text).await
        }

        fn model_name(&self) -> &str {
            "fails-on-call"
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        catalog: Arc<IndexCatalog>,
        pipeline: IngestionPipeline,
        tenant_a: TenantId,
        tenant_b: TenantId,
    }

    fn fixture(embedder: Arc<dyn Embedder>, config: IngestionConfig) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let tenant_a = TenantId::parse("tenantA").unwrap();
        let tenant_b = TenantId::parse("tenantB").unwrap();
        let catalog = Arc::new(IndexCatalog::new([&tenant_a, &tenant_b]));
        let pipeline = IngestionPipeline::new(
            Arc::clone(&catalog),
            embedder,
            DocumentStore::new(dir.path()),
            ChunkingConfig::default(),
            config,
        );
        Fixture {
            _dir: dir,
            catalog,
            pipeline,
            tenant_a,
            tenant_b,
        }
    }

    fn snapshot(f: &Fixture, tenant: &TenantId) -> Arc<IndexSnapshot> {
        f.catalog.get(tenant).unwrap().snapshot()
    }

    #[tokio::test]
    async fn test_ingest_indexes_and_stores() {
        let f = fixture(Arc::new(HashingEmbedder::new(64)), IngestionConfig::default());
        let text = "Tout sinistre doit faire l'objet d'une   déclaration\n\nsous 5 jours ouvrés.";

        let outcome = f.pipeline.ingest(&f.tenant_a, "docA1.txt", text.as_bytes()).await.unwrap();
        assert_eq!(outcome.document_id, "docA1.txt");
        assert_eq!(outcome.chunks_count, 1);
        assert_eq!(outcome.file_size_bytes, text.len());
        assert!(outcome.embedded);

        let snap = snapshot(&f, &f.tenant_a);
        assert_eq!(snap.chunk_count(), 1);
        assert_eq!(snap.semantic().len(), 1);
        assert!(snap.chunks()[0].text.contains("déclaration sous 5 jours ouvrés"));
        assert!(snapshot(&f, &f.tenant_b).chunks().is_empty());

        let stored = f.pipeline.store().list(&f.tenant_a).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(tokio::fs::read_to_string(&stored[0]).await.unwrap(), text);
    }

    #[tokio::test]
    async fn test_reingest_supersedes() {
        let f = fixture(Arc::new(HashingEmbedder::new(64)), IngestionConfig::default());
        let long = "Ancienne clause de garantie. ".repeat(40);
        let first = f.pipeline.ingest(&f.tenant_a, "doc.txt", long.as_bytes()).await.unwrap();
        assert!(first.chunks_count > 1);

        let second = f
            .pipeline
            .ingest(&f.tenant_a, "doc.txt", "Nouvelle clause.".as_bytes())
            .await
            .unwrap();
        assert_eq!(second.chunks_count, 1);
        assert!(second.snapshot_version > first.snapshot_version);

        let snap = snapshot(&f, &f.tenant_a);
        assert_eq!(snap.chunk_count(), 1);
        assert_eq!(snap.document_count(), 1);
        assert!(snap.lexical().score("ancienne").is_empty());
    }

    #[tokio::test]
    async fn test_invalid_upload_changes_nothing() {
        let f = fixture(Arc::new(HashingEmbedder::new(64)), IngestionConfig::default());
        f.pipeline.ingest(&f.tenant_a, "ok.txt", b"contenu valide").await.unwrap();
        let before = snapshot(&f, &f.tenant_a);

        for (name, bytes) in [
            ("empty.txt", &b""[..]),
            ("image.png", &b"\x89PNG"[..]),
            ("bin.txt", &b"\xff\xfe"[..]),
        ] {
            let err = f.pipeline.ingest(&f.tenant_a, name, bytes).await.unwrap_err();
            assert!(err.is_client_error());
        }

        let after = snapshot(&f, &f.tenant_a);
        assert_eq!(after.version(), before.version());
        assert_eq!(f.pipeline.store().list(&f.tenant_a).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_embedding_outage_indexes_lexically() {
        let f = fixture(Arc::new(DownEmbedder), IngestionConfig::default());
        let outcome = f.pipeline.ingest(&f.tenant_a, "doc.txt", b"franchise annuelle").await.unwrap();
        assert!(!outcome.embedded);

        let snap = snapshot(&f, &f.tenant_a);
        assert_eq!(snap.chunk_count(), 1);
        assert!(snap.semantic().is_empty());
        assert!(snap.chunks().iter().all(|c| c.embedding.is_none()));
    }

    #[tokio::test]
    async fn test_embedding_outage_fails_when_required() {
        let config = IngestionConfig {
            require_embeddings: true,
            ..IngestionConfig::default()
        };
        let f = fixture(Arc::new(DownEmbedder), config);
        let err = f.pipeline.ingest(&f.tenant_a, "doc.txt", b"franchise").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ProviderUnavailable);
        assert_eq!(snapshot(&f, &f.tenant_a).version(), 0);
        assert!(f.pipeline.store().list(&f.tenant_a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_partial_embedding_failure_keeps_previous_snapshot() {
        let config = IngestionConfig {
            require_embeddings: true,
            ..IngestionConfig::default()
        };
        let embedder = Arc::new(FailsOnCall {
            inner: HashingEmbedder::new(64),
            fail_on: 3,
            calls: AtomicUsize::new(0),
        });
        let f = fixture(embedder, config);
        f.pipeline.ingest(&f.tenant_a, "doc.txt", b"Version initiale.").await.unwrap();
        let before = snapshot(&f, &f.tenant_a);

        // several chunks; the second one fails to embed
        let long = "Nouvelle clause de garantie. ".repeat(40);
        let err = f.pipeline.ingest(&f.tenant_a, "doc.txt", long.as_bytes()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ProviderUnavailable);

        let after = snapshot(&f, &f.tenant_a);
        assert_eq!(after.version(), before.version());
        assert_eq!(after.chunk_count(), 1);
        assert_eq!(after.chunks()[0].text, "Version initiale.");

        let stored = f.pipeline.store().list(&f.tenant_a).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(tokio::fs::read_to_string(&stored[0]).await.unwrap(), "Version initiale.");
    }

    #[tokio::test]
    async fn test_reingesting_same_bytes_is_idempotent() {
        let f = fixture(Arc::new(HashingEmbedder::new(64)), IngestionConfig::default());
        f.pipeline
            .ingest(&f.tenant_a, "autre.txt", "Franchise annuelle du contrat auto.".as_bytes())
            .await
            .unwrap();
        let text = "La franchise est de 150 euros par sinistre. ".repeat(15);

        let first = f.pipeline.ingest(&f.tenant_a, "doc.txt", text.as_bytes()).await.unwrap();
        let ranking_before = snapshot(&f, &f.tenant_a).lexical().score("franchise sinistre");
        let second = f.pipeline.ingest(&f.tenant_a, "doc.txt", text.as_bytes()).await.unwrap();
        let snap = snapshot(&f, &f.tenant_a);

        assert!(first.chunks_count > 1);
        assert_eq!(second.chunks_count, first.chunks_count);
        assert_eq!(snap.chunk_count(), first.chunks_count + 1);
        assert_eq!(snap.document_count(), 2);
        let ranking_after = snap.lexical().score("franchise sinistre");
        assert_eq!(ranking_after.len(), ranking_before.len());
        for ((row_a, score_a), (row_b, score_b)) in ranking_after.iter().zip(&ranking_before) {
            assert_eq!(row_a, row_b);
            assert!((score_a - score_b).abs() < 1e-6);
        }
        assert_eq!(f.pipeline.store().list(&f.tenant_a).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_leaves_document_unindexed() {
        let root = tempfile::NamedTempFile::new().unwrap();
        let tenant = TenantId::parse("tenantA").unwrap();
        let catalog = Arc::new(IndexCatalog::new([&tenant]));
        let pipeline = IngestionPipeline::new(
            Arc::clone(&catalog),
            Arc::new(HashingEmbedder::new(64)),
            DocumentStore::new(root.path()),
            ChunkingConfig::default(),
            IngestionConfig::default(),
        );

        let err = pipeline.ingest(&tenant, "doc.txt", b"franchise annuelle").await.unwrap_err();
        assert!(err.is_server_error());

        let snap = catalog.get(&tenant).unwrap().snapshot();
        assert_eq!(snap.chunk_count(), 0);
        assert_eq!(snap.version(), 0);
    }

    #[tokio::test]
    async fn test_unknown_tenant_rejected() {
        let f = fixture(Arc::new(HashingEmbedder::new(64)), IngestionConfig::default());
        let stranger = TenantId::parse("tenantZ").unwrap();
        let err = f.pipeline.ingest(&stranger, "doc.txt", b"texte").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_bootstrap_reindexes_stored_files() {
        let dir = tempfile::tempdir().unwrap();
        let tenant = TenantId::parse("tenantA").unwrap();
        let store = DocumentStore::new(dir.path());
        store.write(&tenant, "b.txt", b"deuxieme document").await.unwrap();
        store.write(&tenant, "a.txt", b"premier document").await.unwrap();
        store.write(&tenant, "notes.md", b"ignored").await.unwrap();

        let catalog = Arc::new(IndexCatalog::new([&tenant]));
        let pipeline = IngestionPipeline::new(
            Arc::clone(&catalog),
            Arc::new(HashingEmbedder::new(64)),
            store,
            ChunkingConfig::default(),
            IngestionConfig::default(),
        );

        let report = pipeline.bootstrap_tenant(&tenant).await.unwrap();
        assert_eq!(report.documents, 2);
        assert_eq!(report.chunks, 2);
        assert_eq!(report.skipped, 1);

        let snap = catalog.get(&tenant).unwrap().snapshot();
        assert_eq!(snap.document_count(), 2);
        // a.txt is indexed first
        assert_eq!(snap.version(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_tenants_stay_isolated() {
        let f = Arc::new(fixture(Arc::new(HashingEmbedder::new(64)), IngestionConfig::default()));
        let mut handles = Vec::new();
        for i in 0..6 {
            let f = Arc::clone(&f);
            handles.push(tokio::spawn(async move {
                let (tenant, word) = if i % 2 == 0 {
                    (f.tenant_a.clone(), "alpha")
                } else {
                    (f.tenant_b.clone(), "beta")
                };
                let body = format!("{} document {}", word, i);
                f.pipeline
                    .ingest(&tenant, &format!("doc{}.txt", i), body.as_bytes())
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let a = snapshot(&f, &f.tenant_a);
        let b = snapshot(&f, &f.tenant_b);
        assert_eq!(a.document_count(), 3);
        assert_eq!(b.document_count(), 3);
        assert!(a.chunks().iter().all(|c| c.tenant_id == f.tenant_a && c.text.starts_with("alpha")));
        assert!(b.chunks().iter().all(|c| c.tenant_id == f.tenant_b && c.text.starts_with("beta")));
    }
}
