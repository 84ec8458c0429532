//! Error types for the simulation engine.
//!
//! This module defines a single error type covering every failure that can
//! occur while building agents, talking to the completion or search backends,
//! and running conversations.

use thiserror::Error;

/// Comprehensive error type for simulation operations.
///
/// Conversations never surface these across the batch boundary: the
/// simulator converts a failing turn into an `error` outcome and the
/// scheduler converts a failing run into an excluded result.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Error occurring during HTTP request processing
    #[error("Request error: {0}")]
    Request(String),

    /// Error from the reqwest HTTP client
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// Error in configuration parameters
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization or deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing error for run and scenario files
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Error related to tool dispatch or execution
    #[error("Tool error: {0}")]
    Tool(String),

    /// Error parsing data or responses
    #[error("Parse error: {0}")]
    Parse(String),

    /// Error in agent operation logic
    #[error("Agent error: {0}")]
    Agent(String),

    /// Error from the document search service
    #[error("Search error: {0}")]
    Search(String),

    /// Error while computing similarity embeddings
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The sales agent kept calling tools without ever answering the shopper
    #[error("Tool loop exhausted after {iterations} completions without a reply to the shopper")]
    ToolLoopExhausted {
        /// Number of completions requested before giving up
        iterations: usize,
    },

    /// The batch was stopped by a shutdown signal before every run finished
    #[error("Batch interrupted after {completed} of {attempted} runs")]
    Interrupted { completed: usize, attempted: usize },

    /// IO error from standard library
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

