//! Batched execution of many conversations.
//!
//! Runs are admitted in fixed-size windows: every run of a window is spawned
//! onto the tokio runtime, and the next window starts only once the whole
//! window finished. A run that cannot be built, or whose task panics, yields
//! no record; its siblings are unaffected.

use crate::agent::{GenerationSettings, Salesperson, Shopper};
use crate::client::{CompletionPermits, CompletionService, OpenAIClient};
use crate::config::{MatchStrategy, RunConfig};
use crate::conversation::{ConversationRecord, Outcome};
use crate::customer::CustomerAgent;
use crate::error::SimulationError;
use crate::matcher::{ItemMatcher, RecommendationMatcher, RemoteMatcher};
use crate::persona::{PersonaCatalog, ShopperProfile};
use crate::retry::{Cooldown, RetryPolicy, TokioCooldown};
use crate::sales::SalesAgent;
use crate::scenario::RunSpec;
use crate::search::LookupServiceClient;
use crate::simulator::ConversationSimulator;
use futures::future::join_all;
use indexmap::IndexMap;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::task::AbortHandle;
use tracing::{error, info, warn};

/// Default number of conversations admitted together.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// The two agents of one run.
pub struct RunAgents {
    pub shopper: Arc<dyn Shopper>,
    pub salesperson: Arc<dyn Salesperson>,
}

/// Builds the agent pair for each run.
pub trait RunFactory: Send + Sync {
    /// Checks the whole run list before anything starts.
    fn validate(&self, _runs: &[RunSpec]) -> Result<(), SimulationError> {
        Ok(())
    }

    /// Builds the agents of one run.
    fn build(&self, run: &RunSpec) -> Result<RunAgents, SimulationError>;
}

/// Builds OpenAI-backed agents over a shared lookup-service pool.
pub struct ModelRunFactory {
    catalog: PersonaCatalog,
    customer_completion: Arc<dyn CompletionService>,
    customer_settings: GenerationSettings,
    sales_completion: Arc<dyn CompletionService>,
    sales_settings: GenerationSettings,
    lookup: LookupServiceClient,
    matcher: Arc<dyn ItemMatcher>,
    retry: RetryPolicy,
    cooldown: Arc<dyn Cooldown>,
    rng: Mutex<StdRng>,
}

impl ModelRunFactory {
    /// Wires both completion clients, the lookup client and the matcher from a run configuration.
    ///
    /// Both clients draw from the same `permits`.
    pub fn from_config(
        config: &RunConfig,
        catalog: PersonaCatalog,
        permits: CompletionPermits,
    ) -> Result<Self, SimulationError> {
        let customer_model = config.customer_model()?;
        let sales_model = config.sales_model()?;

        let customer_client = OpenAIClient::new(customer_model.clone(), permits.clone())?;
        let sales_client = OpenAIClient::new(sales_model.clone(), permits)?;
        let lookup = LookupServiceClient::new(config.lookup_service_url.clone())?;

        let matcher: Arc<dyn ItemMatcher> = match config.match_strategy {
            MatchStrategy::Local => Arc::new(RecommendationMatcher::new(Arc::new(sales_client.clone()))),
            MatchStrategy::Remote => Arc::new(RemoteMatcher::new(lookup.clone())),
        };

        Ok(Self {
            catalog,
            customer_completion: Arc::new(customer_client),
            customer_settings: GenerationSettings::from(customer_model),
            sales_completion: Arc::new(sales_client),
            sales_settings: GenerationSettings::from(sales_model),
            lookup,
            matcher,
            retry: RetryPolicy::new(1, config.customer_retry_cooldown),
            cooldown: Arc::new(TokioCooldown),
            rng: Mutex::new(StdRng::from_os_rng()),
        })
    }

    /// Assembles a factory from already-built parts.
    pub fn from_parts(
        catalog: PersonaCatalog,
        customer: (Arc<dyn CompletionService>, GenerationSettings),
        sales: (Arc<dyn CompletionService>, GenerationSettings),
        lookup: LookupServiceClient,
        matcher: Arc<dyn ItemMatcher>,
    ) -> Self {
        Self {
            catalog,
            customer_completion: customer.0,
            customer_settings: customer.1,
            sales_completion: sales.0,
            sales_settings: sales.1,
            lookup,
            matcher,
            retry: RetryPolicy::default(),
            cooldown: Arc::new(TokioCooldown),
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Overrides the customer retry policy and how its cooldown is waited out.
    pub fn with_retry(mut self, retry: RetryPolicy, cooldown: Arc<dyn Cooldown>) -> Self {
        self.retry = retry;
        self.cooldown = cooldown;
        self
    }

    /// Makes emotion sampling reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// The shared lookup client.
    pub fn lookup(&self) -> &LookupServiceClient {
        &self.lookup
    }
}

impl RunFactory for ModelRunFactory {
    fn validate(&self, runs: &[RunSpec]) -> Result<(), SimulationError> {
        let unknown: HashSet<&str> = runs
            .iter()
            .map(|run| run.persona.as_str())
            .filter(|persona| self.catalog.find(persona).is_none())
            .collect();
        if unknown.is_empty() {
            return Ok(());
        }
        let mut unknown: Vec<&str> = unknown.into_iter().collect();
        unknown.sort_unstable();
        Err(SimulationError::Config(format!(
            "Unknown personas in scenarios: {}",
            unknown.join(", ")
        )))
    }

    fn build(&self, run: &RunSpec) -> Result<RunAgents, SimulationError> {
        let record = self
            .catalog
            .find(&run.persona)
            .ok_or_else(|| SimulationError::Config(format!("Unknown persona: {}", run.persona)))?;

        let profile = {
            let mut rng = self
                .rng
                .lock()
                .map_err(|_| SimulationError::Agent("Emotion sampler poisoned".to_string()))?;
            ShopperProfile::from_record(record, run.traits, &mut *rng)
        };

        let shopper = CustomerAgent::new(
            profile,
            self.customer_completion.clone(),
            self.customer_settings.clone(),
        )
        .with_retry(self.retry)
        .with_cooldown(self.cooldown.clone());

        let salesperson = SalesAgent::new(
            self.sales_completion.clone(),
            self.sales_settings.clone(),
            Arc::new(self.lookup.session()),
            self.matcher.clone(),
        );

        Ok(RunAgents {
            shopper: Arc::new(shopper),
            salesperson: Arc::new(salesperson),
        })
    }
}

/// Aggregate counters of one batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    /// Runs expanded from the scenarios
    pub attempted: usize,
    /// Runs that produced a record
    pub completed: usize,
    /// Runs that produced no record
    pub excluded: usize,
    pub outcomes: IndexMap<Outcome, usize>,
    pub mean_turns: f64,
    /// Share of completed runs that ended accepted
    pub acceptance_rate: f64,
}

impl BatchSummary {
    pub fn from_records(attempted: usize, records: &[ConversationRecord]) -> Self {
        let completed = records.len();
        let mut outcomes: IndexMap<Outcome, usize> = Outcome::ALL.iter().map(|o| (*o, 0)).collect();
        for record in records {
            *outcomes.entry(record.outcome).or_insert(0) += 1;
        }

        let (mean_turns, acceptance_rate) = if completed == 0 {
            (0.0, 0.0)
        } else {
            let turns: usize = records.iter().map(|r| r.total_turns).sum();
            let accepted = outcomes.get(&Outcome::Accepted).copied().unwrap_or(0);
            (
                turns as f64 / completed as f64,
                accepted as f64 / completed as f64,
            )
        };

        Self {
            attempted,
            completed,
            excluded: attempted.saturating_sub(completed),
            outcomes,
            mean_turns,
            acceptance_rate,
        }
    }

    /// Emits the summary through `tracing`.
    pub fn log(&self) {
        info!(
            attempted = self.attempted,
            completed = self.completed,
            excluded = self.excluded,
            mean_turns = %format!("{:.1}", self.mean_turns),
            acceptance_rate = %format!("{:.1}%", self.acceptance_rate * 100.0),
            "simulation summary"
        );
        for (outcome, count) in self.outcomes.iter().filter(|(_, count)| **count > 0) {
            let share = if self.completed == 0 {
                0.0
            } else {
                *count as f64 / self.completed as f64 * 100.0
            };
            info!(outcome = %outcome, count, share = %format!("{:.1}%", share), "outcome breakdown");
        }
    }
}

/// Records of a batch together with its summary.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub records: Vec<ConversationRecord>,
    pub summary: BatchSummary,
}

/// Aborts the tasks of a window if the batch future is dropped mid-flight.
///
/// Dropping only aborts; tasks are not awaited and nothing is released.
/// Use [`BatchScheduler::run_all_until`] for an orderly stop.
struct AbortOnDrop(Vec<AbortHandle>);

impl AbortOnDrop {
    fn abort_all(&self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.abort_all();
    }
}

/// Runs conversations in fixed-size concurrent windows.
#[derive(Debug, Clone, Copy)]
pub struct BatchScheduler {
    batch_size: usize,
    simulator: ConversationSimulator,
}

impl BatchScheduler {
    pub fn new(batch_size: usize, simulator: ConversationSimulator) -> Self {
        Self {
            batch_size: batch_size.max(1),
            simulator,
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.batch_size, ConversationSimulator::new(config.max_turns))
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Runs every spec, returning one slot per run in run order.
    ///
    /// A `None` slot marks a run whose agents could not be built or whose task
    /// failed outside the simulator. Fails only when `factory` rejects the run
    /// list as a whole.
    pub async fn run_all(
        &self,
        runs: &[RunSpec],
        factory: &dyn RunFactory,
    ) -> Result<Vec<Option<ConversationRecord>>, SimulationError> {
        self.run_all_until(runs, factory, std::future::pending()).await
    }

    /// Like [`run_all`](Self::run_all), but stops once `shutdown` resolves.
    ///
    /// On shutdown the tasks of the current window are aborted and awaited,
    /// every salesperson built so far is released, no further window is
    /// admitted, and the call fails with [`SimulationError::Interrupted`].
    pub async fn run_all_until<F>(
        &self,
        runs: &[RunSpec],
        factory: &dyn RunFactory,
        shutdown: F,
    ) -> Result<Vec<Option<ConversationRecord>>, SimulationError>
    where
        F: Future<Output = ()>,
    {
        factory.validate(runs)?;
        info!(runs = runs.len(), batch_size = self.batch_size, "starting simulations");
        tokio::pin!(shutdown);

        let mut results = Vec::with_capacity(runs.len());
        let mut held: Vec<Arc<dyn Salesperson>> = Vec::with_capacity(runs.len());
        let mut interrupted = false;

        for (batch, window) in runs.chunks(self.batch_size).enumerate() {
            info!(batch, size = window.len(), "dispatching batch");

            let mut slots: Vec<Option<usize>> = Vec::with_capacity(window.len());
            let mut handles = Vec::with_capacity(window.len());
            for run in window {
                let agents = match factory.build(run) {
                    Ok(agents) => agents,
                    Err(e) => {
                        error!(batch, persona = %run.persona, error = %e, "failed to build run");
                        slots.push(None);
                        continue;
                    }
                };
                held.push(agents.salesperson.clone());

                let simulator = self.simulator;
                slots.push(Some(handles.len()));
                handles.push(tokio::spawn(async move {
                    simulator
                        .run(agents.shopper.as_ref(), agents.salesperson.as_ref())
                        .await
                }));
            }

            let guard = AbortOnDrop(handles.iter().map(|h| h.abort_handle()).collect());
            let joined = join_all(handles);
            tokio::pin!(joined);
            let joined = tokio::select! {
                joined = &mut joined => joined,
                _ = &mut shutdown => {
                    warn!(batch, in_flight = guard.0.len(), "shutdown requested, cancelling batch");
                    guard.abort_all();
                    interrupted = true;
                    joined.await
                }
            };
            drop(guard);
            if interrupted {
                break;
            }

            let mut finished: Vec<Option<ConversationRecord>> = joined
                .into_iter()
                .map(|joined| match joined {
                    Ok(record) => Some(record),
                    Err(e) => {
                        error!(batch, error = %e, "simulation task failed");
                        None
                    }
                })
                .collect();
            for slot in slots {
                results.push(slot.and_then(|i| finished[i].take()));
            }
        }

        for salesperson in &held {
            salesperson.release().await;
        }
        info!(released = held.len(), "released run resources");

        if interrupted {
            return Err(SimulationError::Interrupted {
                completed: results.len(),
                attempted: runs.len(),
            });
        }
        Ok(results)
    }

    /// Runs every spec and summarizes the records that were produced.
    pub async fn run(&self, runs: &[RunSpec], factory: &dyn RunFactory) -> Result<BatchReport, SimulationError> {
        self.run_until(runs, factory, std::future::pending()).await
    }

    /// Like [`run`](Self::run), stopping early once `shutdown` resolves.
    pub async fn run_until<F>(
        &self,
        runs: &[RunSpec],
        factory: &dyn RunFactory,
        shutdown: F,
    ) -> Result<BatchReport, SimulationError>
    where
        F: Future<Output = ()>,
    {
        let results = self.run_all_until(runs, factory, shutdown).await?;
        let records: Vec<ConversationRecord> = results.into_iter().flatten().collect();
        let summary = BatchSummary::from_records(runs.len(), &records);
        if summary.excluded > 0 {
            warn!(excluded = summary.excluded, "some runs produced no record");
        }
        summary.log();
        Ok(BatchReport { records, summary })
    }
}
