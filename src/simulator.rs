//! Drives one conversation from the opening greeting to a terminal outcome.

use crate::agent::{Salesperson, Shopper};
use crate::conversation::{ConversationRecord, Outcome, Transcript, Turn};
use crate::prompts::OPENING_GREETING;
use tracing::{debug, info, warn};

/// Default exchange budget per conversation.
pub const DEFAULT_MAX_TURNS: usize = 9;

/// Runs single conversations between a shopper and a salesperson.
#[derive(Debug, Clone, Copy)]
pub struct ConversationSimulator {
    max_turns: usize,
}

impl Default for ConversationSimulator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS)
    }
}

impl ConversationSimulator {
    /// Creates a simulator allowing at most `max_turns` shopper/sales exchanges.
    pub fn new(max_turns: usize) -> Self {
        Self { max_turns }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Runs one conversation to completion.
    ///
    /// Agent failures never escape: they end the conversation with
    /// [`Outcome::Error`] and the transcript gathered so far.
    pub async fn run(&self, shopper: &dyn Shopper, salesperson: &dyn Salesperson) -> ConversationRecord {
        let profile = shopper.profile();
        let mut transcript = Transcript::new();
        transcript.push(Turn::salesperson(OPENING_GREETING));

        let mut total_turns = 0;
        let mut outcome = Outcome::Incomplete;
        let mut error_message = None;

        while total_turns < self.max_turns {
            total_turns += 1;

            let sales_text = match transcript.last() {
                Some(turn) => turn.text.clone(),
                None => break,
            };
            let shopper_turn = match shopper.respond(&sales_text, transcript.history()).await {
                Ok(turn) => turn,
                Err(e) => {
                    warn!(persona = %profile.persona.name, turn = total_turns, error = %e, "shopper turn failed");
                    outcome = Outcome::Error;
                    error_message = Some(e.to_string());
                    break;
                }
            };

            let shopper_turn = transcript.push(shopper_turn);
            debug!(turn = shopper_turn.turn, text = %shopper_turn.text, "shopper");
            if shopper_turn.is_accept() {
                outcome = Outcome::Accepted;
                break;
            }
            if shopper_turn.is_done() {
                outcome = Outcome::EndedByShopper;
                break;
            }

            let shopper_text = shopper_turn.text.clone();
            match salesperson.respond(&shopper_text, transcript.history()).await {
                Ok(turn) => {
                    let sales_turn = transcript.push(turn);
                    debug!(turn = sales_turn.turn, text = %sales_turn.text, "salesperson");
                }
                Err(e) => {
                    warn!(persona = %profile.persona.name, turn = total_turns, error = %e, "sales turn failed");
                    outcome = Outcome::Error;
                    error_message = Some(e.to_string());
                    break;
                }
            }
        }

        if outcome == Outcome::Incomplete && total_turns >= self.max_turns {
            outcome = Outcome::MaxTurnsReached;
        }

        let record = ConversationRecord::new(profile, transcript, outcome, error_message, total_turns);
        info!(
            conversation_id = %record.conversation_id,
            persona = %profile.persona.name,
            outcome = %record.outcome,
            total_turns,
            "conversation finished"
        );
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Speaker;
    use crate::error::SimulationError;
    use crate::persona::{Emotion, Persona, PreferenceSet, ShopperProfile};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn profile() -> ShopperProfile {
        ShopperProfile {
            persona: Persona {
                name: "Sam".to_string(),
                age: "34".to_string(),
                background: "Nurse".to_string(),
                speaking_style: None,
                knowledge_level: "Novice".to_string(),
            },
            preferences: PreferenceSet::default(),
            traits: None,
            emotion: Emotion::Neutral,
        }
    }

    struct ScriptedShopper {
        profile: ShopperProfile,
        replies: Mutex<VecDeque<Result<String, String>>>,
        seen_history: Mutex<Vec<usize>>,
    }

    impl ScriptedShopper {
        fn new(replies: Vec<Result<&str, &str>>) -> Self {
            Self {
                profile: profile(),
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                seen_history: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Shopper for ScriptedShopper {
        fn profile(&self) -> &ShopperProfile {
            &self.profile
        }

        async fn respond(&self, _sales_utterance: &str, history: &[Turn]) -> Result<Turn, SimulationError> {
            self.seen_history.lock().unwrap().push(history.len());
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(text)) => Ok(Turn::shopper(text)),
                Some(Err(e)) => Err(SimulationError::Agent(e)),
                None => Ok(Turn::shopper("Tell me more.")),
            }
        }
    }

    struct EchoSales {
        fail_on_call: Option<usize>,
        calls: Mutex<usize>,
    }

    impl EchoSales {
        fn new() -> Self {
            Self {
                fail_on_call: None,
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl Salesperson for EchoSales {
        async fn respond(&self, shopper_utterance: &str, _history: &[Turn]) -> Result<Turn, SimulationError> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if self.fail_on_call == Some(*calls) {
                return Err(SimulationError::ToolLoopExhausted { iterations: 3 });
            }
            Ok(Turn::salesperson(format!("You said: {}", shopper_utterance)))
        }
    }

    #[tokio::test]
    async fn test_accept_on_first_turn() {
        let shopper = ScriptedShopper::new(vec![Ok("[ACCEPT] I'll take it")]);
        let sales = EchoSales::new();
        let record = ConversationSimulator::new(9).run(&shopper, &sales).await;

        assert_eq!(record.outcome, Outcome::Accepted);
        assert_eq!(record.total_turns, 1);
        assert_eq!(record.conversation.len(), 2);
        assert_eq!(record.conversation[0].text, OPENING_GREETING);
        assert_eq!(record.conversation[0].speaker, Speaker::Salesperson);
        assert_eq!(record.conversation[1].turn, 1);
        assert!(record.error_message.is_none());
        assert_eq!(*sales.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_done_marker_ends_conversation() {
        let shopper = ScriptedShopper::new(vec![Ok("Looking for a laptop"), Ok("No thanks [DONE]")]);
        let record = ConversationSimulator::new(9).run(&shopper, &EchoSales::new()).await;

        assert_eq!(record.outcome, Outcome::EndedByShopper);
        assert_eq!(record.total_turns, 2);
        assert_eq!(record.conversation.len(), 4);
    }

    #[tokio::test]
    async fn test_budget_exhaustion() {
        let shopper = ScriptedShopper::new(vec![]);
        let record = ConversationSimulator::new(3).run(&shopper, &EchoSales::new()).await;

        assert_eq!(record.outcome, Outcome::MaxTurnsReached);
        assert_eq!(record.total_turns, 3);
        assert_eq!(record.conversation.len(), 7);
        let indices: Vec<usize> = record.conversation.iter().map(|t| t.turn).collect();
        assert_eq!(indices, (0..7).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_history_excludes_latest_utterance() {
        let shopper = ScriptedShopper::new(vec![]);
        ConversationSimulator::new(2).run(&shopper, &EchoSales::new()).await;
        assert_eq!(*shopper.seen_history.lock().unwrap(), vec![0, 2]);
    }

    #[tokio::test]
    async fn test_sales_failure_keeps_partial_transcript() {
        let shopper = ScriptedShopper::new(vec![]);
        let sales = EchoSales {
            fail_on_call: Some(2),
            calls: Mutex::new(0),
        };
        let record = ConversationSimulator::new(9).run(&shopper, &sales).await;

        assert_eq!(record.outcome, Outcome::Error);
        assert_eq!(record.total_turns, 2);
        assert_eq!(record.conversation.len(), 4);
        assert!(record.error_message.unwrap().contains("3"));
    }

    #[tokio::test]
    async fn test_shopper_failure_is_captured() {
        let shopper = ScriptedShopper::new(vec![Err("backend down")]);
        let record = ConversationSimulator::new(9).run(&shopper, &EchoSales::new()).await;

        assert_eq!(record.outcome, Outcome::Error);
        assert_eq!(record.conversation.len(), 1);
        assert!(record.error_message.unwrap().contains("backend down"));
    }
}
