//! Simulated sales conversations between a shopper agent and a sales agent.
//!
//! Each conversation pairs a customer agent, playing a persona with fixed
//! preferences, Big-Five traits and emotion, with a sales agent that searches
//! a product catalog through tool calls before answering. Both agents are
//! driven by an OpenAI-compatible completion backend. Batches of
//! conversations are expanded from a scenario file and run concurrently,
//! producing one [`ConversationRecord`] per run.
//!
//! # Basic usage
//!
//! ```rust,no_run
//! use salessim::prelude::*;
//!
//! # async fn example() -> Result<(), SimulationError> {
//! let config = RunConfig::from_yaml_file("config.yaml")?;
//! let runs = ScenarioFile::load("scenarios.yaml")?.expand()?;
//! let catalog = PersonaCatalog::load(&config.personas_path)?;
//!
//! let permits = CompletionPermits::new(config.max_concurrent_completions);
//! let factory = ModelRunFactory::from_config(&config, catalog, permits)?;
//!
//! let report = BatchScheduler::from_config(&config).run(&runs, &factory).await?;
//! println!("accepted: {:.1}%", report.summary.acceptance_rate * 100.0);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod client;
pub mod config;
pub mod conversation;
pub mod customer;
pub mod error;
pub mod logging;
pub mod matcher;
pub mod models;
pub mod output;
pub mod persona;
pub mod prompts;
pub mod retry;
pub mod sales;
pub mod scenario;
pub mod scheduler;
pub mod search;
pub mod simulator;
pub mod tools;

#[cfg(test)]
mod test_support;

pub mod prelude {
    //! Commonly used types and traits

    pub use crate::agent::{GenerationSettings, Salesperson, Shopper};
    pub use crate::client::{CompletionPermits, CompletionService, OpenAIClient};
    pub use crate::config::{MatchStrategy, ModelConfig, RunConfig};
    pub use crate::conversation::{ConversationRecord, Outcome, Speaker, ToolInvocation, Transcript, Turn};
    pub use crate::customer::CustomerAgent;
    pub use crate::error::SimulationError;
    pub use crate::matcher::{Embedder, ItemMatcher, RecommendationMatcher, RemoteMatcher};
    pub use crate::persona::{BigFiveTraits, Emotion, PersonaCatalog, ShopperProfile, TraitLevel};
    pub use crate::retry::{Cooldown, NoCooldown, RetryPolicy, TokioCooldown};
    pub use crate::sales::SalesAgent;
    pub use crate::scenario::{RunSpec, ScenarioFile, ScenarioSpec};
    pub use crate::scheduler::{BatchReport, BatchScheduler, BatchSummary, ModelRunFactory, RunAgents, RunFactory};
    pub use crate::search::{CandidateDocument, DocumentSearch, LookupServiceClient, SearchKind};
    pub use crate::simulator::ConversationSimulator;
    pub use crate::tools::SalesTool;
}

pub use prelude::*;
