//! Agent seams shared by the simulator and both turn generators.
//!
//! The conversation simulator only knows these two traits; the customer and
//! sales agents implement them over a [`CompletionService`](crate::client::CompletionService).

use crate::config::ModelConfig;
use crate::conversation::Turn;
use crate::error::SimulationError;
use crate::persona::ShopperProfile;
use async_trait::async_trait;

/// Generates shopper turns for one conversation.
#[async_trait]
pub trait Shopper: Send + Sync {
    /// The persona, preferences, traits and emotion this shopper plays.
    fn profile(&self) -> &ShopperProfile;

    /// Replies to the salesperson.
    ///
    /// # Arguments
    ///
    /// * `sales_utterance` - The salesperson's latest text
    /// * `history` - Every turn before that utterance
    async fn respond(&self, sales_utterance: &str, history: &[Turn]) -> Result<Turn, SimulationError>;
}

/// Generates salesperson turns for one conversation.
#[async_trait]
pub trait Salesperson: Send + Sync {
    /// Replies to the shopper.
    ///
    /// # Arguments
    ///
    /// * `shopper_utterance` - The shopper's latest text
    /// * `history` - Every turn before that utterance
    async fn respond(&self, shopper_utterance: &str, history: &[Turn]) -> Result<Turn, SimulationError>;

    /// Releases per-run resources such as search sessions.
    async fn release(&self) {}
}

/// Model identifier and sampling parameters for one agent.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
}

impl From<&ModelConfig> for GenerationSettings {
    fn from(config: &ModelConfig) -> Self {
        Self {
            model: config.model().to_string(),
            max_tokens: config.max_tokens(),
            temperature: config.temperature(),
        }
    }
}

/// Cuts generated text where the model started writing the other speaker's line.
pub fn truncate_at_speaker(text: &str, marker: &str) -> String {
    match text.find(marker) {
        Some(idx) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
