//! Embedding service abstraction
//!
//! Provides a unified interface for multiple embedding providers:
//! - Ollama (`/api/embeddings`, one text per call)
//! - OpenAI-compatible `/embeddings` endpoints
//! - A local feature-hashing embedder that needs no external service
//! - A disabled provider that always reports itself unavailable
//!
//! Every provider is wrapped in a [`GatedEmbedder`] which routes calls
//! through the admission gate, applies the call timeout and rejects
//! malformed vectors. Failures surface as `ProviderUnavailable`; deciding
//! what to do about them is the caller's business.

use crate::config::EmbeddingConfig;
use crate::errors::{AppError, Result};
use crate::gate::AdmissionGate;
use crate::text::tokenize;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;

const PROVIDER: &str = "embedding";

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts, one provider call per text
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Ollama embedding client
pub struct OllamaEmbedder {
    client: reqwest::Client,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(model: String, base_url: Option<String>) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            model,
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".to_string()),
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&OllamaRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| AppError::provider(PROVIDER, format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::provider(
                PROVIDER,
                format!("API error {}: {}", status, body),
            ));
        }

        let result: OllamaResponse = response.json().await.map_err(|e| {
            AppError::provider(PROVIDER, format!("Failed to parse response: {}", e))
        })?;

        Ok(result.embedding)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// OpenAI-compatible embedding client
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    input: Vec<&'a str>,
    model: &'a str,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
}

impl OpenAIEmbedder {
    pub fn new(api_key: String, model: String, base_url: Option<String>) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            api_key,
            model,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&OpenAIRequest {
                input: vec![text],
                model: &self.model,
            })
            .send()
            .await
            .map_err(|e| AppError::provider(PROVIDER, format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::provider(
                PROVIDER,
                format!("API error {}: {}", status, body),
            ));
        }

        let result: OpenAIResponse = response.json().await.map_err(|e| {
            AppError::provider(PROVIDER, format!("Failed to parse response: {}", e))
        })?;

        result
            .data
            .into_iter()
            .next()
            .map(|e| e.embedding)
            .ok_or_else(|| AppError::provider(PROVIDER, "Empty response"))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Local embedder based on signed feature hashing of word tokens.
///
/// Deterministic across runs and platforms; texts sharing vocabulary get a
/// positive cosine similarity. Useful offline and as the default provider.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let hash: [u8; 32] = Sha256::digest(token.as_bytes()).into();
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&hash[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if hash[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    fn model_name(&self) -> &str {
        "feature-hashing"
    }
}

/// Provider used when embeddings are switched off; every call fails
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(AppError::provider(PROVIDER, "embedding provider disabled"))
    }

    fn model_name(&self) -> &str {
        "disabled"
    }
}

/// Gate, time out and validate calls into another embedder
pub struct GatedEmbedder {
    inner: Arc<dyn Embedder>,
    gate: AdmissionGate,
}

impl GatedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, gate: AdmissionGate) -> Self {
        Self { inner, gate }
    }
}

#[async_trait]
impl Embedder for GatedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let result = self
            .gate
            .run(self.inner.embed(text))
            .await
            .and_then(check_vector);

        crate::metrics::record_embedding(
            start.elapsed().as_secs_f64(),
            self.inner.model_name(),
            result.is_ok(),
        );
        if let Err(e) = &result {
            tracing::warn!(model = self.inner.model_name(), error = %e, "Embedding call failed");
        }
        result
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

fn check_vector(vector: Vec<f32>) -> Result<Vec<f32>> {
    if vector.is_empty() {
        return Err(AppError::provider(PROVIDER, "empty embedding returned"));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(AppError::provider(PROVIDER, "non-finite value in embedding"));
    }
    Ok(vector)
}

fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .build()
        .map_err(|e| AppError::Configuration {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

/// Create a gated embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let inner: Arc<dyn Embedder> = match config.provider.as_str() {
        "ollama" => Arc::new(OllamaEmbedder::new(
            config.model.clone(),
            config.api_base.clone(),
        )?),
        "openai" => {
            let key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "embedding.api_key is required for the openai provider".to_string(),
            })?;
            Arc::new(OpenAIEmbedder::new(
                key,
                config.model.clone(),
                config.api_base.clone(),
            )?)
        }
        "hashing" => Arc::new(HashingEmbedder::new(config.dimension)),
        "disabled" => Arc::new(DisabledEmbedder),
        other => {
            return Err(AppError::Configuration {
                message: format!("unknown embedding provider {:?}", other),
            })
        }
    };

    tracing::info!(
        provider = %config.provider,
        model = inner.model_name(),
        max_concurrent = config.max_concurrent,
        "Embedding provider configured"
    );

    let gate = AdmissionGate::new(
        PROVIDER,
        config.max_concurrent,
        config.queue_timeout(),
        config.timeout(),
    );
    Ok(Arc::new(GatedEmbedder::new(inner, gate)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::cosine_similarity;

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    fn gated(inner: Arc<dyn Embedder>) -> GatedEmbedder {
        GatedEmbedder::new(
            inner,
            AdmissionGate::new(
                PROVIDER,
                1,
                std::time::Duration::from_secs(1),
                std::time::Duration::from_secs(1),
            ),
        )
    }

    #[tokio::test]
    async fn test_hashing_embedder_is_deterministic() {
        let embedder = HashingEmbedder::new(256);
        let a = embedder.embed("déclaration sous 5 jours ouvrés").await.unwrap();
        let b = embedder.embed("déclaration sous 5 jours ouvrés").await.unwrap();
        assert_eq!(a.len(), 256);
        assert_eq!(a, b);
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_hashing_embedder_shared_vocabulary_scores_higher() {
        let embedder = HashingEmbedder::new(1024);
        let doc = embedder.embed("déclaration sous 5 jours ouvrés").await.unwrap();
        let related = embedder.embed("sous combien de jours").await.unwrap();
        let unrelated = embedder.embed("préavis trois mois contrat").await.unwrap();
        assert!(cosine_similarity(&doc, &related) > cosine_similarity(&doc, &unrelated));
    }

    #[tokio::test]
    async fn test_batch_is_one_call_per_text() {
        let embedder = HashingEmbedder::new(64);
        let texts = vec!["alpha beta".to_string(), "gamma delta".to_string()];
        let embeddings = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(embeddings.len(), 2);
    }

    #[tokio::test]
    async fn test_disabled_embedder_is_unavailable() {
        let err = gated(Arc::new(DisabledEmbedder)).embed("x").await.unwrap_err();
        assert!(err.is_provider_failure());
    }

    #[tokio::test]
    async fn test_gated_rejects_malformed_vectors() {
        let empty = gated(Arc::new(FixedEmbedder(vec![])));
        assert!(empty.embed("x").await.unwrap_err().is_provider_failure());

        let nan = gated(Arc::new(FixedEmbedder(vec![1.0, f32::NAN])));
        assert!(nan.embed("x").await.unwrap_err().is_provider_failure());

        let ok = gated(Arc::new(FixedEmbedder(vec![1.0, 0.0])));
        assert_eq!(ok.embed("x").await.unwrap(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_create_embedder_rejects_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "telepathy".into(),
            ..EmbeddingConfig::default()
        };
        assert!(create_embedder(&config).is_err());
    }

    #[test]
    fn test_openai_requires_key() {
        let config = EmbeddingConfig {
            provider: "openai".into(),
            ..EmbeddingConfig::default()
        };
        assert!(create_embedder(&config).is_err());
    }
}
