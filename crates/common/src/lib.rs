//! DocVault Common Library
//!
//! Shared code for the DocVault workspace including:
//! - Tenant registry and credential resolution
//! - Chunk and document models
//! - Embedding and generation provider abstractions
//! - Admission gate for single-capacity providers
//! - Error types and handling
//! - Configuration management
//! - Query log and usage statistics
//! - Text normalization and tokenization
//! - Metrics and observability

pub mod auth;
pub mod config;
pub mod embeddings;
pub mod errors;
pub mod gate;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod query_log;
pub mod text;

// Re-export commonly used types
pub use auth::{AuthenticatedTenant, TenantRegistry};
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use gate::AdmissionGate;
pub use llm::Generator;
pub use models::{Chunk, ChunkId, TenantId};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default header carrying the tenant credential
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-KEY";

/// Default embedding dimension for the local hashing provider
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 512;
