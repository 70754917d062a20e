//! Text generation providers
//!
//! A [`Generator`] turns a fully built prompt into model output. Providers:
//! - Ollama (`/api/generate`, non-streaming)
//! - OpenAI-compatible chat completions
//! - A disabled provider that always reports itself unavailable
//!
//! As with embeddings, every provider is wrapped in a [`GatedGenerator`].

use crate::config::GenerationConfig;
use crate::errors::{AppError, Result};
use crate::gate::AdmissionGate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

const PROVIDER: &str = "generation";

/// A single generation request
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// System instructions sent alongside the prompt
    pub system: Option<String>,
    /// Full prompt including the context block and the question
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// Trait for text generation
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a completion for the request
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Ollama generation client
pub struct OllamaGenerator {
    client: reqwest::Client,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: usize,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
}

impl OllamaGenerator {
    pub fn new(model: String, base_url: Option<String>) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            model,
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".to_string()),
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&OllamaGenerateRequest {
                model: &self.model,
                prompt: &request.prompt,
                system: request.system.as_deref(),
                stream: false,
                options: OllamaOptions {
                    temperature: request.temperature,
                    num_predict: request.max_tokens,
                },
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

        let result: OllamaGenerateResponse = response.json().await.map_err(|e| {
            AppError::provider(PROVIDER, format!("Failed to parse response: {}", e))
        })?;

        Ok(result.response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// OpenAI-compatible chat completion client
pub struct OpenAIGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl OpenAIGenerator {
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
impl Generator for OpenAIGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&ChatRequest {
                model: &self.model,
                messages,
                max_tokens: request.max_tokens,
                temperature: request.temperature,
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

        let result: ChatResponse = response.json().await.map_err(|e| {
            AppError::provider(PROVIDER, format!("Failed to parse response: {}", e))
        })?;

        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| AppError::provider(PROVIDER, "No choices in response"))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Provider used when generation is switched off; every call fails
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
        Err(AppError::provider(PROVIDER, "generation provider disabled"))
    }

    fn model_name(&self) -> &str {
        "disabled"
    }
}

/// Gate and time out calls into another generator
pub struct GatedGenerator {
    inner: Arc<dyn Generator>,
    gate: AdmissionGate,
}

impl GatedGenerator {
    pub fn new(inner: Arc<dyn Generator>, gate: AdmissionGate) -> Self {
        Self { inner, gate }
    }
}

#[async_trait]
impl Generator for GatedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let start = Instant::now();
        let result = self.gate.run(self.inner.generate(request)).await;

        crate::metrics::record_generation(
            start.elapsed().as_secs_f64(),
            self.inner.model_name(),
            result.is_ok(),
        );
        if let Err(e) = &result {
            tracing::warn!(model = self.inner.model_name(), error = %e, "Generation call failed");
        }
        result
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .build()
        .map_err(|e| AppError::Configuration {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

/// Create a gated generator based on configuration
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    let inner: Arc<dyn Generator> = match config.provider.as_str() {
        "ollama" => Arc::new(OllamaGenerator::new(
            config.model.clone(),
            config.api_base.clone(),
        )?),
        "openai" => {
            let key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "generation.api_key is required for the openai provider".to_string(),
            })?;
            Arc::new(OpenAIGenerator::new(
                key,
                config.model.clone(),
                config.api_base.clone(),
            )?)
        }
        "disabled" => Arc::new(DisabledGenerator),
        other => {
            return Err(AppError::Configuration {
                message: format!("unknown generation provider {:?}", other),
            })
        }
    };

    tracing::info!(
        provider = %config.provider,
        model = inner.model_name(),
        max_concurrent = config.max_concurrent,
        "Generation provider configured"
    );

    let gate = AdmissionGate::new(
        PROVIDER,
        config.max_concurrent,
        config.queue_timeout(),
        config.timeout(),
    );
    Ok(Arc::new(GatedGenerator::new(inner, gate)))
}
