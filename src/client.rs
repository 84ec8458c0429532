//! HTTP client for OpenAI-compatible completion backends.
//!
//! This module provides the `CompletionService` seam the agents call through,
//! the shared `CompletionPermits` that bound simultaneous completion calls,
//! and `OpenAIClient`, the HTTP implementation of both completions and
//! embeddings.

use crate::config::ModelConfig;
use crate::error::SimulationError;
use crate::matcher::Embedder;
use crate::models::{ChatRequest, ChatResponse, Completion, EmbeddingRequest, EmbeddingResponse};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// A backend that turns a message sequence into a chosen reply.
///
/// Every call is a suspension point; implementors decide how failures are
/// reported, callers decide whether they are retryable.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Requests one completion.
    async fn complete(&self, request: ChatRequest) -> Result<Completion, SimulationError>;
}

/// Counting semaphore capping simultaneous completion calls across a process.
///
/// One instance is created per batch and cloned into every client, so the
/// cap applies to all conversations regardless of how they are scheduled.
#[derive(Clone, Debug)]
pub struct CompletionPermits {
    semaphore: Arc<Semaphore>,
}

impl CompletionPermits {
    /// Default number of concurrent completion calls.
    pub const DEFAULT: usize = 5;

    /// Creates a permit pool of the given size.
    pub fn new(permits: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Number of permits currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub(crate) async fn acquire(&self) -> Result<tokio::sync::SemaphorePermit<'_>, SimulationError> {
        self.semaphore
            .acquire()
            .await
            .map_err(|e| SimulationError::Request(format!("Completion permits closed: {}", e)))
    }
}

impl Default for CompletionPermits {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}

/// Client for making requests to an OpenAI-compatible API.
///
/// This struct handles HTTP communications, including authentication and
/// request/response formatting. Clones share the underlying connection pool
/// and permit pool.
#[derive(Clone)]
pub struct OpenAIClient {
    /// Configuration for the API
    config: ModelConfig,

    /// HTTP client for making requests
    client: reqwest::Client,

    /// Shared cap on in-flight completions
    permits: CompletionPermits,
}

impl OpenAIClient {
    /// Creates a new client with the given configuration and permit pool.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration to use for API requests
    /// * `permits` - The permit pool shared with every other client of the batch
    pub fn new(config: ModelConfig, permits: CompletionPermits) -> Result<Self, SimulationError> {
        let api_key = config.api_key();
        if api_key.is_empty() {
            return Err(SimulationError::Config("API key not provided".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|_| SimulationError::Config("Invalid API key format".to_string()))?,
        );

        if let Some(org) = config.organization() {
            headers.insert(
                "OpenAI-Organization",
                HeaderValue::from_str(org)
                    .map_err(|_| SimulationError::Config("Invalid organization ID format".to_string()))?,
            );
        }

        if let Some(key) = config.custom_api_key() {
            headers.insert(
                "X-Api-Key",
                HeaderValue::from_str(&key)
                    .map_err(|_| SimulationError::Config("Invalid X-Api-Key format".to_string()))?,
            );
        }

        for (name, value) in config.extra_headers() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| SimulationError::Config(format!("Invalid header name: {}", name)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| SimulationError::Config(format!("Invalid value for header {}", name)))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()
            .map_err(|e| SimulationError::Request(e.to_string()))?;

        Ok(Self {
            config,
            client,
            permits,
        })
    }

    /// Sends a chat completion request.
    pub(crate) async fn chat_completion(
        &self,
        request: ChatRequest,
    ) -> Result<ChatResponse, SimulationError> {
        let url = format!("{}/chat/completions", self.config.base_url());
        let _permit = self.permits.acquire().await?;
        let response = self.client.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(SimulationError::Request(format!(
                "HTTP error {}: {}",
                status, error_text
            )));
        }

        let chat_response: ChatResponse = response.json().await?;
        if let Some(usage) = &chat_response.usage {
            debug!(
                model = %chat_response.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "completion finished"
            );
        }
        Ok(chat_response)
    }

    /// Returns a reference to the client's configuration.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }
}

#[async_trait]
impl CompletionService for OpenAIClient {
    async fn complete(&self, request: ChatRequest) -> Result<Completion, SimulationError> {
        let response = self.chat_completion(request).await?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| SimulationError::Parse("No response choices received".to_string()))?;
        let reasoning = choice
            .message
            .reasoning_content
            .clone()
            .filter(|r| !r.trim().is_empty());
        Ok(Completion {
            message: choice.message,
            reasoning,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SimulationError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/embeddings", self.config.base_url());
        let body = EmbeddingRequest {
            model: self.config.embedding_model(),
            input: texts,
        };
        let response = self.client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(SimulationError::Embedding(format!(
                "HTTP error {}: {}",
                status, error_text
            )));
        }

        let mut parsed: EmbeddingResponse = response.json().await?;
        if parsed.data.len() != texts.len() {
            return Err(SimulationError::Embedding(format!(
                "Expected {} embeddings, received {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}
