// tests/simulation_test.rs

use async_trait::async_trait;
use salessim::prelude::*;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use salessim::models::{ChatMessage, ChatRequest, Completion, ToolCall};

const PERSONAS: &str = r#"{"persona_background": "new_grad", "name": "Emily", "age": 22, "background": "Freelance writer.", "knowledge_level": "User.", "budget": "$900"}
{"persona_background": "gamer", "name": "Dev", "age": 27, "background": "Streams on weekends.", "knowledge_level": "Expert.", "gpu": "RTX 4070 or better"}"#;

/// Completion backend that answers from a queue, one queue per agent role.
struct RoleScriptedCompletion {
    customer: Mutex<VecDeque<String>>,
    sales: Mutex<VecDeque<Completion>>,
    sales_requests: AtomicUsize,
}

impl RoleScriptedCompletion {
    fn new(customer: Vec<&str>, sales: Vec<Completion>) -> Self {
        Self {
            customer: Mutex::new(customer.into_iter().map(str::to_string).collect()),
            sales: Mutex::new(sales.into()),
            sales_requests: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CompletionService for RoleScriptedCompletion {
    async fn complete(&self, request: ChatRequest) -> Result<Completion, SimulationError> {
        if request.tools.is_some() {
            self.sales_requests.fetch_add(1, Ordering::SeqCst);
            return self
                .sales
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| SimulationError::Request("no sales reply scripted".to_string()));
        }
        let text = self
            .customer
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "Tell me more.".to_string());
        Ok(Completion::from_message(ChatMessage::assistant(text)))
    }
}

/// Completion backend whose every reply asks for another product search.
struct EndlessToolCalls {
    calls: AtomicUsize,
}

#[async_trait]
impl CompletionService for EndlessToolCalls {
    async fn complete(&self, _request: ChatRequest) -> Result<Completion, SimulationError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let mut message = ChatMessage::assistant("");
        message.content = None;
        message.tool_calls = Some(vec![ToolCall::function(
            format!("call_{n}"),
            "lookup_product_items",
            r#"{"query":"laptop"}"#,
        )]);
        Ok(Completion::from_message(message))
    }
}

struct EmptySearch;

#[async_trait]
impl DocumentSearch for EmptySearch {
    async fn search(
        &self,
        _kind: SearchKind,
        _query: &str,
        _k: usize,
    ) -> Result<Vec<CandidateDocument>, SimulationError> {
        Ok(Vec::new())
    }
}

struct NoMatches;

#[async_trait]
impl ItemMatcher for NoMatches {
    async fn recommended_items(
        &self,
        _response: &str,
        _candidates: &[CandidateDocument],
    ) -> Result<Vec<CandidateDocument>, SimulationError> {
        Ok(Vec::new())
    }
}

fn settings(model: &str) -> GenerationSettings {
    GenerationSettings {
        model: model.to_string(),
        max_tokens: 256,
        temperature: 0.5,
    }
}

fn shopper(completion: Arc<dyn CompletionService>) -> CustomerAgent {
    let catalog = PersonaCatalog::from_jsonl(PERSONAS).unwrap();
    let mut rng = rand::rng();
    let profile = ShopperProfile::from_record(catalog.find("new_grad").unwrap(), None, &mut rng);
    CustomerAgent::new(profile, completion, settings("shopper"))
        .with_cooldown(Arc::new(NoCooldown))
}

#[tokio::test]
async fn test_immediate_accept_ends_after_one_turn() {
    let completion = Arc::new(RoleScriptedCompletion::new(vec!["[ACCEPT] I'll take it"], vec![]));
    let customer = shopper(completion.clone());
    let sales = SalesAgent::new(completion.clone(), settings("sales"), Arc::new(EmptySearch), Arc::new(NoMatches));

    let record = ConversationSimulator::new(9).run(&customer, &sales).await;

    assert_eq!(record.outcome, Outcome::Accepted);
    assert_eq!(record.total_turns, 1);
    assert_eq!(record.conversation.len(), 2);
    assert_eq!(record.conversation[0].speaker, Speaker::Salesperson);
    assert_eq!(record.conversation[1].text, "[ACCEPT] I'll take it");
    assert_eq!(completion.sales_requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_turn_indices_increase_from_zero() {
    let completion = Arc::new(RoleScriptedCompletion::new(
        vec!["I need a laptop.", "Under $900 please.", "Okay, bye [DONE]"],
        vec![
            Completion::from_message(ChatMessage::assistant("What will you use it for?")),
            Completion::from_message(ChatMessage::assistant("Let me check our stock.")),
        ],
    ));
    let customer = shopper(completion.clone());
    let sales = SalesAgent::new(completion.clone(), settings("sales"), Arc::new(EmptySearch), Arc::new(NoMatches));

    let record = ConversationSimulator::new(9).run(&customer, &sales).await;

    assert_eq!(record.outcome, Outcome::EndedByShopper);
    assert_eq!(record.total_turns, 3);
    let indices: Vec<usize> = record.conversation.iter().map(|t| t.turn).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    assert!(record.conversation.last().unwrap().is_done());
}

#[tokio::test]
async fn test_endless_tool_calls_become_error_outcome() {
    let customer_completion = Arc::new(RoleScriptedCompletion::new(vec!["Show me laptops"], vec![]));
    let customer = shopper(customer_completion);
    let sales_completion = Arc::new(EndlessToolCalls {
        calls: AtomicUsize::new(0),
    });
    let sales = SalesAgent::new(sales_completion.clone(), settings("sales"), Arc::new(EmptySearch), Arc::new(NoMatches));

    let record = ConversationSimulator::new(9).run(&customer, &sales).await;

    assert_eq!(record.outcome, Outcome::Error);
    assert_eq!(sales_completion.calls.load(Ordering::SeqCst), 3);
    assert_eq!(record.conversation.len(), 2);
    assert!(record.error_message.unwrap().contains("Tool loop exhausted after 3"));
}

#[tokio::test]
async fn test_max_turns_reached() {
    let completion = Arc::new(RoleScriptedCompletion::new(
        vec![],
        vec![
            Completion::from_message(ChatMessage::assistant("Anything else?")),
            Completion::from_message(ChatMessage::assistant("Anything else?")),
        ],
    ));
    let customer = shopper(completion.clone());
    let sales = SalesAgent::new(completion, settings("sales"), Arc::new(EmptySearch), Arc::new(NoMatches));

    let record = ConversationSimulator::new(2).run(&customer, &sales).await;
    assert_eq!(record.outcome, Outcome::MaxTurnsReached);
    assert_eq!(record.total_turns, 2);
    assert_eq!(record.conversation.len(), 5);
}

/// Builds real agents over scripted backends; `broken` personas fail to build.
struct ScriptedFactory {
    catalog: PersonaCatalog,
    releases: Arc<AtomicUsize>,
}

struct ReleaseCounter {
    inner: SalesAgent,
    releases: Arc<AtomicUsize>,
}

#[async_trait]
impl Salesperson for ReleaseCounter {
    async fn respond(&self, shopper_utterance: &str, history: &[Turn]) -> Result<Turn, SimulationError> {
        self.inner.respond(shopper_utterance, history).await
    }

    async fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.inner.release().await;
    }
}

impl RunFactory for ScriptedFactory {
    fn build(&self, run: &RunSpec) -> Result<RunAgents, SimulationError> {
        let record = self
            .catalog
            .find(&run.persona)
            .ok_or_else(|| SimulationError::Config(format!("Unknown persona: {}", run.persona)))?;
        let mut rng = rand::rng();
        let profile = ShopperProfile::from_record(record, run.traits, &mut rng);
        let completion = Arc::new(RoleScriptedCompletion::new(vec!["[ACCEPT] Deal."], vec![]));
        Ok(RunAgents {
            shopper: Arc::new(CustomerAgent::new(profile, completion.clone(), settings("shopper"))),
            salesperson: Arc::new(ReleaseCounter {
                inner: SalesAgent::new(completion, settings("sales"), Arc::new(EmptySearch), Arc::new(NoMatches)),
                releases: self.releases.clone(),
            }),
        })
    }
}

#[tokio::test]
async fn test_batch_from_scenarios_isolates_build_failures() {
    let scenarios = ScenarioFile::from_yaml_str(
        r#"
scenarios:
  - persona: new_grad
    big_5_specification:
      openness: [Low, High]
      agreeableness: [Medium]
    num_rollouts_per_unique_scenario: 2
  - persona: broken
  - persona: gamer
    big_5_specification:
      extroversion: "Low, High"
"#,
    )
    .unwrap();
    let runs = scenarios.expand().unwrap();
    assert_eq!(runs.len(), 7);

    let factory = ScriptedFactory {
        catalog: PersonaCatalog::from_jsonl(PERSONAS).unwrap(),
        releases: Arc::new(AtomicUsize::new(0)),
    };
    let report = BatchScheduler::new(5, ConversationSimulator::new(9))
        .run(&runs, &factory)
        .await
        .unwrap();

    assert_eq!(report.records.len(), 6);
    assert_eq!(report.summary.attempted, 7);
    assert_eq!(report.summary.excluded, 1);
    assert_eq!(report.summary.acceptance_rate, 1.0);
    assert_eq!(report.summary.mean_turns, 1.0);
    assert_eq!(factory.releases.load(Ordering::SeqCst), 6);

    let traited: Vec<&ConversationRecord> = report
        .records
        .iter()
        .filter(|r| r.shopper_persona.name == "Emily")
        .collect();
    assert_eq!(traited.len(), 4);
    assert!(traited.iter().all(|r| r.shopper_big5_traits.is_some()));
}
