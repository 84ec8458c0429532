//! The simulated shopper.
//!
//! One completion per turn, prompted with the shopper's fixed profile and the
//! transcript so far. A failed completion is retried after a cooldown; once
//! the retry budget is spent the shopper disengages with a `[DONE]` turn, so
//! the simulator always receives a well-formed turn from this agent.

use crate::agent::{GenerationSettings, Shopper, truncate_at_speaker};
use crate::client::CompletionService;
use crate::conversation::{DONE_MARKER, Turn, render_lines};
use crate::error::SimulationError;
use crate::models::{ChatMessage, ChatRequest};
use crate::persona::ShopperProfile;
use crate::prompts::{big_five_prompt, customer_prompt};
use crate::retry::{Cooldown, RetryPolicy, TokioCooldown};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

const SALESPERSON_CUE: &str = "\nSalesperson:";

/// Customer agent driven by a completion backend.
pub struct CustomerAgent {
    profile: ShopperProfile,
    completion: Arc<dyn CompletionService>,
    settings: GenerationSettings,
    retry: RetryPolicy,
    cooldown: Arc<dyn Cooldown>,
    preferences: String,
}

impl CustomerAgent {
    /// Creates a shopper with the default retry policy and a real-time cooldown.
    pub fn new(
        profile: ShopperProfile,
        completion: Arc<dyn CompletionService>,
        settings: GenerationSettings,
    ) -> Self {
        let preferences = profile.preferences.render();
        Self {
            profile,
            completion,
            settings,
            retry: RetryPolicy::default(),
            cooldown: Arc::new(TokioCooldown),
            preferences,
        }
    }

    /// Overrides the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Overrides how the agent waits between attempts.
    pub fn with_cooldown(mut self, cooldown: Arc<dyn Cooldown>) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Builds the single-message prompt for the next shopper line.
    pub fn build_request(&self, sales_utterance: &str, history: &[Turn]) -> ChatRequest {
        let mut lines = render_lines(history);
        lines.push(format!("Salesperson: {}", sales_utterance));

        let big_five = self
            .profile
            .traits
            .as_ref()
            .map(big_five_prompt)
            .unwrap_or_default();

        let prompt = customer_prompt(
            &self.profile.persona.describe(),
            &big_five,
            self.profile.emotion.as_str(),
            &self.preferences,
            &lines.join("\n"),
        );

        ChatRequest::new(self.settings.model.clone(), vec![ChatMessage::user(prompt)])
            .with_generation(self.settings.max_tokens, self.settings.temperature)
    }
}

#[async_trait]
impl Shopper for CustomerAgent {
    fn profile(&self) -> &ShopperProfile {
        &self.profile
    }

    async fn respond(&self, sales_utterance: &str, history: &[Turn]) -> Result<Turn, SimulationError> {
        let request = self.build_request(sales_utterance, history);
        let mut retries = 0;

        loop {
            match self.completion.complete(request.clone()).await {
                Ok(completion) => {
                    let text = truncate_at_speaker(completion.text(), SALESPERSON_CUE);
                    debug!(persona = %self.profile.persona.name, text = %text, "shopper replied");
                    return Ok(Turn::shopper(text)
                        .with_reasoning(completion.reasoning)
                        .with_preferences(self.preferences.clone()));
                }
                Err(e) if retries < self.retry.max_retries => {
                    retries += 1;
                    warn!(
                        persona = %self.profile.persona.name,
                        error = %e,
                        retry = retries,
                        cooldown = ?self.retry.cooldown,
                        "shopper completion failed, retrying"
                    );
                    self.cooldown.wait(self.retry.cooldown).await;
                }
                Err(e) => {
                    warn!(
                        persona = %self.profile.persona.name,
                        error = %e,
                        "shopper completion failed, disengaging"
                    );
                    return Ok(Turn::shopper(DONE_MARKER).with_preferences(self.preferences.clone()));
                }
            }
        }
    }
}
