//! Configuration management for DocVault services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml, config/local.toml)
//! - Default values
//!
//! Retrieval thresholds are deliberately configuration rather than constants:
//! the right values depend on the embedding model in use.

use axum::http::HeaderName;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// On-disk layout
    #[serde(default)]
    pub storage: StorageConfig,

    /// Registered tenants and their credentials
    #[serde(default)]
    pub tenants: Vec<TenantConfig>,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Generation (language model) provider configuration
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Chunking parameters
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Upload validation and indexing policy
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Retrieval thresholds
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Answer synthesis parameters
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Overall request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root holding one private document directory per tenant
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Append-only query log (JSON lines). Disabled when unset.
    #[serde(default)]
    pub query_log_path: Option<PathBuf>,

    /// Recent entries kept in memory per tenant for the stats endpoint
    #[serde(default = "default_recent_queries")]
    pub recent_queries: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TenantConfig {
    /// Tenant identifier (also the name of its document directory)
    pub id: String,

    /// Opaque credential presented in the API key header
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Header carrying the tenant credential
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,

    /// Request ID header name
    #[serde(default = "default_request_id_header")]
    pub request_id_header: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: hashing, ollama, openai, disabled
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for hosted providers
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (used by the hashing provider and for validation)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Per-call timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Concurrent calls admitted into the provider
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Seconds a call may wait for an admission slot
    #[serde(default = "default_queue_timeout")]
    pub queue_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    /// Generation provider: ollama, openai, disabled
    #[serde(default = "default_generation_provider")]
    pub provider: String,

    /// API key for hosted providers
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_generation_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum output tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Per-call timeout in seconds
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,

    /// Concurrent calls admitted into the provider
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Seconds a call may wait for an admission slot
    #[serde(default = "default_queue_timeout")]
    pub queue_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkingConfig {
    /// Window size in characters
    #[serde(default = "default_window_chars")]
    pub window_chars: usize,

    /// Overlap between consecutive windows in characters
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestionConfig {
    /// Largest accepted upload in bytes
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,

    /// Accepted file extensions (lowercase, without dot)
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// Fail uploads when the embedding provider is down instead of
    /// indexing the document lexically only
    #[serde(default)]
    pub require_embeddings: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Number of chunks retrieved per question
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum cosine similarity for a semantic result to be trusted
    #[serde(default = "default_semantic_threshold")]
    pub semantic_threshold: f32,

    /// Score floor below which no evidence is reported
    #[serde(default = "default_min_score")]
    pub min_score: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SynthesisConfig {
    /// Character budget for the context block of the prompt
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,

    /// Model outputs recognized as a refusal
    #[serde(default = "default_decline_phrases")]
    pub decline_phrases: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Prometheus exporter port (0 to disable)
    #[serde(default)]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 120 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_data_dir() -> PathBuf { PathBuf::from("data") }
fn default_recent_queries() -> usize { 50 }
fn default_api_key_header() -> String { crate::DEFAULT_API_KEY_HEADER.to_string() }
fn default_request_id_header() -> String { "X-Request-ID".to_string() }
fn default_embedding_provider() -> String { "hashing".to_string() }
fn default_embedding_model() -> String { "mistral".to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_embedding_timeout() -> u64 { 30 }
fn default_generation_provider() -> String { "ollama".to_string() }
fn default_generation_model() -> String { "mistral".to_string() }
fn default_temperature() -> f32 { 0.3 }
fn default_max_tokens() -> usize { 512 }
fn default_generation_timeout() -> u64 { 60 }
fn default_max_concurrent() -> usize { 1 }
fn default_queue_timeout() -> u64 { 30 }
fn default_window_chars() -> usize { 420 }
fn default_overlap_chars() -> usize { 80 }
fn default_max_file_bytes() -> usize { 5 * 1024 * 1024 }
fn default_allowed_extensions() -> Vec<String> { vec!["txt".to_string()] }
fn default_top_k() -> usize { 3 }
fn default_semantic_threshold() -> f32 { 0.30 }
fn default_min_score() -> f32 { 0.12 }
fn default_max_context_chars() -> usize { 6000 }
fn default_decline_phrases() -> Vec<String> {
    vec![
        "Je ne trouve pas cette information dans vos documents".to_string(),
        "I cannot find this information in your documents".to_string(),
        "NO_ANSWER".to_string(),
    ]
}
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "docvault".to_string() }
fn default_rate_limit() -> u32 { 50 }
fn default_burst() -> u32 { 100 }
fn default_enabled() -> bool { true }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            query_log_path: None,
            recent_queries: default_recent_queries(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key_header: default_api_key_header(),
            request_id_header: default_request_id_header(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_concurrent: default_max_concurrent(),
            queue_timeout_secs: default_queue_timeout(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            api_key: None,
            api_base: None,
            model: default_generation_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_generation_timeout(),
            max_concurrent: default_max_concurrent(),
            queue_timeout_secs: default_queue_timeout(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_chars: default_window_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            allowed_extensions: default_allowed_extensions(),
            require_embeddings: false,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            semantic_threshold: default_semantic_threshold(),
            min_score: default_min_score(),
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_context_chars: default_max_context_chars(),
            decline_phrases: default_decline_phrases(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: 0,
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_timeout_secs)
    }
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_timeout_secs)
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__RETRIEVAL__MIN_SCORE=0.2
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject parameter combinations the engine cannot honor
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.window_chars == 0 || self.chunking.overlap_chars >= self.chunking.window_chars {
            return Err(ConfigError::Message(format!(
                "chunking overlap ({}) must be smaller than a non-zero window ({})",
                self.chunking.overlap_chars, self.chunking.window_chars
            )));
        }
        if self.retrieval.semantic_threshold < self.retrieval.min_score {
            return Err(ConfigError::Message(format!(
                "retrieval.semantic_threshold ({}) must not be below retrieval.min_score ({})",
                self.retrieval.semantic_threshold, self.retrieval.min_score
            )));
        }
        if HeaderName::from_bytes(self.auth.request_id_header.as_bytes()).is_err() {
            return Err(ConfigError::Message(format!(
                "auth.request_id_header {:?} is not a valid header name",
                self.auth.request_id_header
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Message("retrieval.top_k must be at least 1".into()));
        }
        if self.embedding.max_concurrent == 0 || self.generation.max_concurrent == 0 {
            return Err(ConfigError::Message(
                "provider max_concurrent must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}
