//! The sales agent and its bounded tool-calling loop.

use crate::agent::{GenerationSettings, Salesperson, truncate_at_speaker};
use crate::client::CompletionService;
use crate::conversation::{Speaker, ToolInvocation, Turn};
use crate::error::SimulationError;
use crate::matcher::ItemMatcher;
use crate::models::{ChatMessage, ChatRequest, ToolCall, ToolChoice};
use crate::prompts::SALES_SYSTEM_INSTRUCTION;
use crate::search::{CandidateDocument, DocumentSearch};
use crate::tools::{SalesTool, SearchArgs};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

const SHOPPER_CUE: &str = "\nShopper:";

/// Completion requests allowed per sales turn.
pub const DEFAULT_MAX_ITERATIONS: usize = 3;

/// Documents requested per search.
pub const DEFAULT_SEARCH_K: usize = 4;

/// Result of one executed tool call.
struct Observation {
    message: ChatMessage,
    invocation: ToolInvocation,
    candidates: Vec<CandidateDocument>,
}

/// Sales agent that searches the catalog through tool calls before answering.
pub struct SalesAgent {
    completion: Arc<dyn CompletionService>,
    settings: GenerationSettings,
    search: Arc<dyn DocumentSearch>,
    matcher: Arc<dyn ItemMatcher>,
    tools: Vec<SalesTool>,
    max_iterations: usize,
    search_k: usize,
}

impl SalesAgent {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        settings: GenerationSettings,
        search: Arc<dyn DocumentSearch>,
        matcher: Arc<dyn ItemMatcher>,
    ) -> Self {
        Self {
            completion,
            settings,
            search,
            matcher,
            tools: SalesTool::ALL.to_vec(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            search_k: DEFAULT_SEARCH_K,
        }
    }

    /// Restricts the tools declared to the model.
    pub fn with_tools(mut self, tools: Vec<SalesTool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_search_k(mut self, k: usize) -> Self {
        self.search_k = k;
        self
    }

    /// Builds the opening message sequence for one turn.
    fn initial_messages(&self, shopper_utterance: &str, history: &[Turn]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(SALES_SYSTEM_INSTRUCTION));
        for turn in history {
            messages.push(match turn.speaker {
                Speaker::Salesperson => ChatMessage::assistant(turn.text.clone()),
                Speaker::Shopper => ChatMessage::user(turn.text.clone()),
            });
        }
        messages.push(ChatMessage::user(shopper_utterance));
        messages
    }

    fn prepare_request(&self, messages: &[ChatMessage]) -> ChatRequest {
        let request = ChatRequest::new(self.settings.model.clone(), messages.to_vec())
            .with_generation(self.settings.max_tokens, self.settings.temperature);
        if self.tools.is_empty() {
            request
        } else {
            request.with_tools(SalesTool::specs(&self.tools), ToolChoice::Auto)
        }
    }

    /// Executes one tool call against the document search.
    async fn execute_tool_call(&self, tc: &ToolCall) -> Result<Observation, SimulationError> {
        let tool = SalesTool::resolve(&tc.function.name, &self.tools)?;
        let args = SearchArgs::parse(&tc.function.arguments)?;

        info!(action = %tool, query = %args.query, "sales agent searching");
        let documents = self
            .search
            .search(tool.search_kind(), &args.query, self.search_k)
            .await?;

        let knowledge = documents
            .iter()
            .map(|d| d.page_content.as_str())
            .collect::<Vec<_>>()
            .join("\n---\n");
        let observation = format!("{}:\n{}", tool.observation_heading(), knowledge);

        let candidates = if tool.yields_candidates() {
            documents
        } else {
            Vec::new()
        };

        Ok(Observation {
            message: ChatMessage::tool_result(observation, tool.name(), tc.id.clone()),
            invocation: ToolInvocation {
                action: tool.name().to_string(),
                query: args.query,
                knowledge,
            },
            candidates,
        })
    }
}

#[async_trait]
impl Salesperson for SalesAgent {
    async fn respond(&self, shopper_utterance: &str, history: &[Turn]) -> Result<Turn, SimulationError> {
        let mut messages = self.initial_messages(shopper_utterance, history);
        let mut invocations = Vec::new();
        let mut candidates = Vec::new();

        for iteration in 0..self.max_iterations {
            let completion = self.completion.complete(self.prepare_request(&messages)).await?;
            let tool_calls = completion.message.requested_tool_calls().to_vec();

            if tool_calls.is_empty() {
                let text = truncate_at_speaker(completion.text(), SHOPPER_CUE);
                // Only the text the shopper will see is matched, so an invented
                // shopper line cannot contribute recommendations.
                let recommended = self.matcher.recommended_items(&text, &candidates).await?;
                debug!(
                    iteration,
                    searches = invocations.len(),
                    recommended = recommended.len(),
                    "sales agent replied"
                );
                return Ok(Turn::salesperson(text)
                    .with_reasoning(completion.reasoning)
                    .with_tool_invocations(invocations)
                    .with_recommended_items(recommended));
            }

            debug!(iteration, calls = tool_calls.len(), "model requested tool calls");
            messages.push(completion.message);
            for tc in &tool_calls {
                let observation = self.execute_tool_call(tc).await?;
                messages.push(observation.message);
                invocations.push(observation.invocation);
                candidates.extend(observation.candidates);
            }
        }

        warn!(iterations = self.max_iterations, "sales agent never produced a reply");
        Err(SimulationError::ToolLoopExhausted {
            iterations: self.max_iterations,
        })
    }

    async fn release(&self) {
        self.search.release().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Completion;
    use crate::search::SearchKind;
    use crate::test_support::{ScriptedCompletion, StaticSearch};

    /// Matcher that recommends every candidate whose title appears verbatim.
    struct MentionMatcher;

    #[async_trait]
    impl ItemMatcher for MentionMatcher {
        async fn recommended_items(
            &self,
            response: &str,
            candidates: &[CandidateDocument],
        ) -> Result<Vec<CandidateDocument>, SimulationError> {
            Ok(candidates
                .iter()
                .filter(|c| c.title().is_some_and(|t| response.contains(t)))
                .cloned()
                .collect())
        }
    }

    fn settings() -> GenerationSettings {
        GenerationSettings {
            model: "sales-model".to_string(),
            max_tokens: 512,
            temperature: 0.3,
        }
    }

    fn tool_call_message(id: &str, name: &str, query: &str) -> Completion {
        let mut message = ChatMessage::assistant("");
        message.content = None;
        message.tool_calls = Some(vec![ToolCall::function(
            id,
            name,
            serde_json::json!({ "query": query }).to_string(),
        )]);
        Completion::from_message(message)
    }

    fn catalog() -> Arc<StaticSearch> {
        Arc::new(StaticSearch::new(
            vec![
                CandidateDocument::titled("Aero 13", "Aero 13: 16GB RAM, $899"),
                CandidateDocument::titled("Titan 17", "Titan 17: RTX 4080, $2499"),
            ],
            vec![CandidateDocument::titled("RAM guide", "16GB is enough for most students.")],
        ))
    }

    #[tokio::test]
    async fn test_direct_reply_without_tools() {
        let completion = Arc::new(ScriptedCompletion::new(vec![Ok(Completion::from_message(
            ChatMessage::assistant("What will you use it for?\nShopper: gaming"),
        ))]));
        let search = catalog();
        let agent = SalesAgent::new(completion.clone(), settings(), search.clone(), Arc::new(MentionMatcher));

        let history = vec![Turn::salesperson("Hello!")];
        let turn = agent.respond("I need a laptop", &history).await.unwrap();

        assert_eq!(turn.speaker, Speaker::Salesperson);
        assert_eq!(turn.text, "What will you use it for?");
        assert!(turn.tool_invocations.is_empty());
        assert!(turn.knowledge_used.is_none());
        assert_eq!(turn.recommended_items_count, Some(0));
        assert!(search.queries().is_empty());

        let request = &completion.requests()[0];
        let roles: Vec<&str> = request.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "assistant", "user"]);
        assert_eq!(request.tool_choice, Some(ToolChoice::Auto));
        assert_eq!(request.tools.as_ref().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_tool_results_feed_back_and_items_are_matched() {
        let completion = Arc::new(ScriptedCompletion::new(vec![
            Ok(tool_call_message("call_1", "lookup_buying_guide", "how much ram")),
            Ok(tool_call_message("call_2", "lookup_product_items", "16GB laptop under $900")),
            Ok(Completion {
                message: ChatMessage::assistant("The Aero 13 fits your budget."),
                reasoning: Some("picked the cheaper one".to_string()),
            }),
        ]));
        let search = catalog();
        let agent = SalesAgent::new(completion.clone(), settings(), search.clone(), Arc::new(MentionMatcher));

        let turn = agent.respond("Something with 16GB please", &[]).await.unwrap();

        assert_eq!(turn.text, "The Aero 13 fits your budget.");
        assert_eq!(turn.reasoning.as_deref(), Some("picked the cheaper one"));
        assert_eq!(turn.tool_invocations.len(), 2);
        assert_eq!(turn.tool_invocations[0].action, "lookup_buying_guide");
        assert_eq!(turn.tool_invocations[1].query, "16GB laptop under $900");
        let items = turn.recommended_items.as_ref().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title(), Some("Aero 13"));
        assert_eq!(turn.recommended_items_count, Some(1));

        assert_eq!(
            search.queries(),
            vec![
                (SearchKind::BuyingGuides, "how much ram".to_string(), DEFAULT_SEARCH_K),
                (SearchKind::Products, "16GB laptop under $900".to_string(), DEFAULT_SEARCH_K),
            ]
        );

        let last_request = completion.requests().pop().unwrap();
        let tool_messages: Vec<&ChatMessage> =
            last_request.messages.iter().filter(|m| m.role == "tool").collect();
        assert_eq!(tool_messages.len(), 2);
        assert_eq!(
            tool_messages[0].content.as_deref(),
            Some("Buying guide information:\n16GB is enough for most students.")
        );
        assert_eq!(tool_messages[1].tool_call_id.as_deref(), Some("call_2"));
        assert!(
            tool_messages[1]
                .content
                .as_deref()
                .unwrap()
                .starts_with("Product information:\nAero 13: 16GB RAM, $899\n---\n")
        );
    }

    #[tokio::test]
    async fn test_items_after_shopper_cue_are_not_recommended() {
        let completion = Arc::new(ScriptedCompletion::new(vec![
            Ok(tool_call_message("call_1", "lookup_product_items", "laptops")),
            Ok(Completion::from_message(ChatMessage::assistant(
                "The Aero 13 is light.\nShopper: what about the Titan 17?",
            ))),
        ]));
        let agent = SalesAgent::new(completion, settings(), catalog(), Arc::new(MentionMatcher));

        let turn = agent.respond("Show me laptops", &[]).await.unwrap();
        assert_eq!(turn.text, "The Aero 13 is light.");
        let titles: Vec<Option<&str>> = turn
            .recommended_items
            .as_ref()
            .unwrap()
            .iter()
            .map(|d| d.title())
            .collect();
        assert_eq!(titles, vec![Some("Aero 13")]);
    }

    #[tokio::test]
    async fn test_guide_results_are_not_recommendable() {
        let completion = Arc::new(ScriptedCompletion::new(vec![
            Ok(tool_call_message("call_1", "lookup_buying_guide", "ram")),
            Ok(Completion::from_message(ChatMessage::assistant(
                "Our RAM guide says 16GB is enough.",
            ))),
        ]));
        let agent = SalesAgent::new(completion, settings(), catalog(), Arc::new(MentionMatcher));

        let turn = agent.respond("How much RAM?", &[]).await.unwrap();
        assert_eq!(turn.recommended_items_count, Some(0));
    }

    #[tokio::test]
    async fn test_tool_loop_stops_after_three_requests() {
        let completion = Arc::new(ScriptedCompletion::new(
            (0..10)
                .map(|i| Ok(tool_call_message(&format!("call_{i}"), "lookup_product_items", "laptop")))
                .collect(),
        ));
        let agent = SalesAgent::new(completion.clone(), settings(), catalog(), Arc::new(MentionMatcher));

        let result = agent.respond("Show me laptops", &[]).await;
        assert!(matches!(
            result,
            Err(SimulationError::ToolLoopExhausted { iterations: 3 })
        ));
        assert_eq!(completion.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_tool_fails_the_turn() {
        let completion = Arc::new(ScriptedCompletion::new(vec![Ok(tool_call_message(
            "call_1",
            "lookup_reviews",
            "laptop",
        ))]));
        let search = catalog();
        let agent = SalesAgent::new(completion, settings(), search.clone(), Arc::new(MentionMatcher));

        let result = agent.respond("Any reviews?", &[]).await;
        match result {
            Err(SimulationError::Tool(message)) => assert_eq!(message, "Tool not found: lookup_reviews"),
            other => panic!("expected tool error, got {:?}", other),
        }
        assert!(search.queries().is_empty());
    }

    #[tokio::test]
    async fn test_undeclared_tool_is_rejected() {
        let completion = Arc::new(ScriptedCompletion::new(vec![Ok(tool_call_message(
            "call_1",
            "lookup_product_items",
            "laptop",
        ))]));
        let agent = SalesAgent::new(completion, settings(), catalog(), Arc::new(MentionMatcher))
            .with_tools(vec![SalesTool::LookupBuyingGuide]);

        assert!(matches!(
            agent.respond("laptops?", &[]).await,
            Err(SimulationError::Tool(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_arguments_fail_the_turn() {
        let mut message = ChatMessage::assistant("");
        message.tool_calls = Some(vec![ToolCall::function("call_1", "lookup_product_items", "{not json")]);
        let completion = Arc::new(ScriptedCompletion::new(vec![Ok(Completion::from_message(message))]));
        let agent = SalesAgent::new(completion, settings(), catalog(), Arc::new(MentionMatcher));

        assert!(matches!(
            agent.respond("laptops?", &[]).await,
            Err(SimulationError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_release_reaches_search_session() {
        let search = catalog();
        let agent = SalesAgent::new(
            Arc::new(ScriptedCompletion::new(vec![])),
            settings(),
            search.clone(),
            Arc::new(MentionMatcher),
        );
        agent.release().await;
        assert_eq!(search.releases(), 1);
    }
}
