//! Configuration for completion clients and simulation runs.
//!
//! `ModelConfig` customizes how one agent talks to its completion backend
//! (credentials, endpoint overrides, model, generation parameters).
//! `RunConfig` is the YAML document that drives a whole batch.

use crate::error::SimulationError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable consulted when no API key is configured.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Configuration for one agent's completion backend.
///
/// This struct contains all the settings needed to customize requests to an
/// OpenAI-compatible endpoint, including authentication, model selection,
/// and generation parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelConfig {
    /// API key for bearer authentication
    #[serde(default, skip_serializing)]
    api_key: String,

    /// Model identifier to use (e.g., "gpt-4o", "gpt-4-turbo")
    #[serde(default, alias = "model_name")]
    model: String,

    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_base_url")]
    base_url: String,

    /// Organization ID for team accounts (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    organization: Option<String>,

    /// Timeout duration for API requests
    #[serde(with = "humantime_serde", default = "default_timeout")]
    timeout: Duration,

    /// Maximum number of tokens to generate in responses
    #[serde(default = "default_max_tokens")]
    max_tokens: usize,

    /// Temperature setting for response randomness (0.0 to 2.0)
    #[serde(default = "default_temperature")]
    temperature: f32,

    /// Additional headers sent with every request
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    extra_headers: IndexMap<String, String>,

    /// Value for the `X-Api-Key` header used by some gateways
    #[serde(default, skip_serializing)]
    custom_api_key: Option<String>,

    /// Name of an environment variable holding the `X-Api-Key` value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    custom_api_key_env: Option<String>,

    /// Model used when the client is asked for embeddings
    #[serde(default = "default_embedding_model")]
    embedding_model: String,
}

/// Default base URL for the OpenAI API.
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

/// Default timeout duration for API requests.
fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

/// Default maximum number of tokens to generate.
fn default_max_tokens() -> usize {
    1024
}

/// Default temperature setting for response randomness.
fn default_temperature() -> f32 {
    0.7
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

impl ModelConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4-turbo".to_string(),
            base_url: default_base_url(),
            organization: None,
            timeout: default_timeout(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            extra_headers: IndexMap::new(),
            custom_api_key: None,
            custom_api_key_env: None,
            embedding_model: default_embedding_model(),
        }
    }

    /// Sets the API key for authentication.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Sets the model to use for requests.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the base URL for the API.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the organization ID for team accounts.
    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    /// Sets the timeout duration for API requests.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the maximum number of tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets the temperature for response randomness.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Adds a header sent with every request.
    pub fn with_extra_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }

    /// Sets the `X-Api-Key` header value.
    pub fn with_custom_api_key(mut self, key: impl Into<String>) -> Self {
        self.custom_api_key = Some(key.into());
        self
    }

    /// Sets the embedding model used for recommendation matching.
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Returns the configured API key, falling back to `OPENAI_API_KEY`.
    pub fn api_key(&self) -> String {
        if !self.api_key.is_empty() {
            return self.api_key.clone();
        }
        std::env::var(API_KEY_ENV).unwrap_or_default()
    }

    /// Returns the `X-Api-Key` value, either literal or read from the named variable.
    pub fn custom_api_key(&self) -> Option<String> {
        self.custom_api_key.clone().or_else(|| {
            self.custom_api_key_env
                .as_deref()
                .and_then(|name| std::env::var(name).ok())
        })
    }

    /// Returns the model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the organization ID if set.
    pub fn organization(&self) -> Option<&str> {
        self.organization.as_deref()
    }

    /// Returns the timeout duration.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the maximum token count.
    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Returns the temperature setting.
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Returns the extra headers.
    pub fn extra_headers(&self) -> &IndexMap<String, String> {
        &self.extra_headers
    }

    /// Returns the embedding model identifier.
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// How the sales agent decides which catalog items a reply recommends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Match in-process using embeddings from the sales agent's completion backend
    #[default]
    Local,
    /// Delegate to the lookup service's `find_recommended_items` endpoint
    Remote,
}

/// Top-level configuration of a simulation batch, loaded from YAML.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    /// Completion settings for the customer agent
    #[serde(default)]
    pub ai_customer_model: Option<ModelConfig>,

    /// Completion settings for the sales agent
    #[serde(default)]
    pub sales_agent_model: Option<ModelConfig>,

    /// Maximum number of customer/sales exchanges per conversation
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Path to the scenario YAML document
    #[serde(default)]
    pub scenarios_path: Option<PathBuf>,

    /// Path to the persona JSONL file
    #[serde(default = "default_personas_path")]
    pub personas_path: PathBuf,

    /// Base URL of the document lookup service
    #[serde(default = "default_lookup_service_url")]
    pub lookup_service_url: String,

    /// Number of conversations admitted together
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Process-wide cap on simultaneous completion calls
    #[serde(default = "default_max_concurrent_completions")]
    pub max_concurrent_completions: usize,

    /// Delay before the customer agent retries a failed completion
    #[serde(with = "humantime_serde", default = "default_customer_retry_cooldown")]
    pub customer_retry_cooldown: Duration,

    /// Where recommendation matching runs
    #[serde(default)]
    pub match_strategy: MatchStrategy,

    /// Optional JSON map of persona name to reference recommendations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ideal_recommendations_path: Option<PathBuf>,
}

fn default_max_turns() -> usize {
    9
}

fn default_personas_path() -> PathBuf {
    PathBuf::from("personas/laptop_personas.jsonl")
}

fn default_lookup_service_url() -> String {
    "http://127.0.0.1:8001".to_string()
}

fn default_batch_size() -> usize {
    5
}

fn default_max_concurrent_completions() -> usize {
    5
}

fn default_customer_retry_cooldown() -> Duration {
    Duration::from_secs(60)
}

impl RunConfig {
    /// Parses and validates a run configuration from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self, SimulationError> {
        let config: RunConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a run configuration file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, SimulationError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SimulationError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Checks that every required field is present, reporting all gaps at once.
    pub fn validate(&self) -> Result<(), SimulationError> {
        let mut missing = Vec::new();

        match &self.ai_customer_model {
            None => missing.push("ai_customer_model"),
            Some(model) if model.model().is_empty() => missing.push("ai_customer_model.model_name"),
            Some(_) => {}
        }
        match &self.sales_agent_model {
            None => missing.push("sales_agent_model"),
            Some(model) if model.model().is_empty() => missing.push("sales_agent_model.model_name"),
            Some(_) => {}
        }
        if self.scenarios_path.is_none() {
            missing.push("scenarios_path");
        }
        if !missing.is_empty() {
            return Err(SimulationError::Config(format!(
                "Missing required configuration fields: {}",
                missing.join(", ")
            )));
        }

        if self.max_turns == 0 {
            return Err(SimulationError::Config("max_turns must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(SimulationError::Config("batch_size must be at least 1".to_string()));
        }
        if self.max_concurrent_completions == 0 {
            return Err(SimulationError::Config(
                "max_concurrent_completions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the customer model settings; valid only after `validate`.
    pub fn customer_model(&self) -> Result<&ModelConfig, SimulationError> {
        self.ai_customer_model
            .as_ref()
            .ok_or_else(|| SimulationError::Config("ai_customer_model is not set".to_string()))
    }

    /// Returns the sales model settings; valid only after `validate`.
    pub fn sales_model(&self) -> Result<&ModelConfig, SimulationError> {
        self.sales_agent_model
            .as_ref()
            .ok_or_else(|| SimulationError::Config("sales_agent_model is not set".to_string()))
    }
}
