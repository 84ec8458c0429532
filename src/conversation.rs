//! Turns, transcripts and conversation records.

use crate::persona::{BigFiveTraits, Emotion, Persona, PreferenceSet, ShopperProfile};
use crate::search::CandidateDocument;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Marker a shopper emits to accept a recommendation.
pub const ACCEPT_MARKER: &str = "[ACCEPT]";

/// Marker a shopper emits to leave the conversation.
pub const DONE_MARKER: &str = "[DONE]";

/// Who spoke a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    Salesperson,
    Shopper,
}

impl Speaker {
    /// Prefix used when a transcript is rendered as text.
    pub fn label(self) -> &'static str {
        match self {
            Speaker::Salesperson => "Salesperson",
            Speaker::Shopper => "Shopper",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One search a sales turn performed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInvocation {
    /// Action tag the model requested
    pub action: String,
    /// Query it was run with
    pub query: String,
    /// Passages returned, joined with `---` separators
    pub knowledge: String,
}

/// One utterance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub speaker: Speaker,
    /// Position in the transcript, assigned when the turn is appended
    pub turn: usize,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// All knowledge retrieved during a sales turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_used: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_invocations: Vec<ToolInvocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_items: Option<Vec<CandidateDocument>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_items_count: Option<usize>,
    /// Preferences the shopper was playing with on this turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences_used: Option<String>,
}

impl Turn {
    fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            turn: 0,
            text: text.into(),
            reasoning: None,
            knowledge_used: None,
            tool_invocations: Vec::new(),
            recommended_items: None,
            recommended_items_count: None,
            preferences_used: None,
        }
    }

    /// A salesperson utterance.
    pub fn salesperson(text: impl Into<String>) -> Self {
        Self::new(Speaker::Salesperson, text)
    }

    /// A shopper utterance.
    pub fn shopper(text: impl Into<String>) -> Self {
        Self::new(Speaker::Shopper, text)
    }

    /// Attaches a reasoning trace; blank traces are dropped.
    pub fn with_reasoning(mut self, reasoning: Option<String>) -> Self {
        self.reasoning = reasoning.filter(|r| !r.trim().is_empty());
        self
    }

    /// Attaches the preferences trace of a shopper turn.
    pub fn with_preferences(mut self, preferences: impl Into<String>) -> Self {
        self.preferences_used = Some(preferences.into());
        self
    }

    /// Attaches the searches of a sales turn and the knowledge they returned.
    pub fn with_tool_invocations(mut self, invocations: Vec<ToolInvocation>) -> Self {
        if !invocations.is_empty() {
            let knowledge = invocations
                .iter()
                .map(|i| i.knowledge.as_str())
                .collect::<Vec<_>>()
                .join("\n---\n");
            self.knowledge_used = Some(knowledge);
        }
        self.tool_invocations = invocations;
        self
    }

    /// Attaches the items this sales turn recommends.
    pub fn with_recommended_items(mut self, items: Vec<CandidateDocument>) -> Self {
        self.recommended_items_count = Some(items.len());
        self.recommended_items = Some(items);
        self
    }

    /// Whether the text carries the accept marker.
    pub fn is_accept(&self) -> bool {
        self.text.contains(ACCEPT_MARKER)
    }

    /// Whether the text carries the done marker.
    pub fn is_done(&self) -> bool {
        self.text.contains(DONE_MARKER)
    }
}

/// Append-only ordered turns of one conversation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    /// Creates an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a turn, assigning it the next index.
    pub fn push(&mut self, mut turn: Turn) -> &Turn {
        turn.turn = self.turns.len();
        self.turns.push(turn);
        &self.turns[self.turns.len() - 1]
    }

    /// All turns in order.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The most recent turn.
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// All turns except the most recent one.
    pub fn history(&self) -> &[Turn] {
        match self.turns.len() {
            0 => &[],
            n => &self.turns[..n - 1],
        }
    }

    /// Number of turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether no turn was appended yet.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn into_turns(self) -> Vec<Turn> {
        self.turns
    }
}

/// Renders turns as `Speaker: text` lines.
pub fn render_lines(turns: &[Turn]) -> Vec<String> {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.speaker.label(), t.text))
        .collect()
}

/// How a conversation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Accepted,
    EndedByShopper,
    MaxTurnsReached,
    Error,
    Incomplete,
}

impl Outcome {
    pub const ALL: [Outcome; 5] = [
        Outcome::Accepted,
        Outcome::EndedByShopper,
        Outcome::MaxTurnsReached,
        Outcome::Error,
        Outcome::Incomplete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Accepted => "accepted",
            Outcome::EndedByShopper => "ended_by_shopper",
            Outcome::MaxTurnsReached => "max_turns_reached",
            Outcome::Error => "error",
            Outcome::Incomplete => "incomplete",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal artifact of one simulated conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationRecord {
    pub conversation_id: Uuid,
    pub shopper_persona: Persona,
    pub shopper_preferences: PreferenceSet,
    pub shopper_big5_traits: Option<BigFiveTraits>,
    pub shopper_emotion: Emotion,
    pub conversation: Vec<Turn>,
    pub outcome: Outcome,
    pub error_message: Option<String>,
    /// Customer/sales exchanges started
    pub total_turns: usize,
    pub timestamp: DateTime<Utc>,
    /// Reference recommendations for the persona, when supplied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ideal_recommendations: Option<serde_json::Value>,
}

impl ConversationRecord {
    /// Seals a finished conversation.
    pub fn new(
        profile: &ShopperProfile,
        transcript: Transcript,
        outcome: Outcome,
        error_message: Option<String>,
        total_turns: usize,
    ) -> Self {
        Self {
            conversation_id: Uuid::new_v4(),
            shopper_persona: profile.persona.clone(),
            shopper_preferences: profile.preferences.clone(),
            shopper_big5_traits: profile.traits,
            shopper_emotion: profile.emotion,
            conversation: transcript.into_turns(),
            outcome,
            error_message: error_message.filter(|_| outcome == Outcome::Error),
            total_turns,
            timestamp: Utc::now(),
            ideal_recommendations: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_assigns_consecutive_indices() {
        let mut transcript = Transcript::new();
        transcript.push(Turn::salesperson("Hello"));
        let mut shopper = Turn::shopper("Hi");
        shopper.turn = 42;
        transcript.push(shopper);
        transcript.push(Turn::salesperson("What budget?"));

        let indices: Vec<usize> = transcript.turns().iter().map(|t| t.turn).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(transcript.history().len(), 2);
        assert_eq!(transcript.last().unwrap().text, "What budget?");
    }

    #[test]
    fn test_markers() {
        assert!(Turn::shopper("[ACCEPT] I'll take it").is_accept());
        assert!(Turn::shopper("thanks, bye [DONE]").is_done());
        assert!(!Turn::shopper("accept?").is_accept());
    }

    #[test]
    fn test_tool_invocations_fill_knowledge() {
        let turn = Turn::salesperson("Here you go").with_tool_invocations(vec![
            ToolInvocation {
                action: "lookup_buying_guide".into(),
                query: "ram".into(),
                knowledge: "16GB is plenty".into(),
            },
            ToolInvocation {
                action: "lookup_product_items".into(),
                query: "16GB laptop".into(),
                knowledge: "Aero 13".into(),
            },
        ]);
        assert_eq!(turn.knowledge_used.as_deref(), Some("16GB is plenty\n---\nAero 13"));
    }

    #[test]
    fn test_render_lines() {
        let turns = vec![Turn::salesperson("Hello"), Turn::shopper("Hi there")];
        assert_eq!(render_lines(&turns), vec!["Salesperson: Hello", "Shopper: Hi there"]);
    }

    #[test]
    fn test_outcome_serialization() {
        assert_eq!(serde_json::to_value(Outcome::EndedByShopper).unwrap(), "ended_by_shopper");
        assert_eq!(Outcome::MaxTurnsReached.to_string(), "max_turns_reached");
    }
}
