//! Shopper personas, preferences, Big-Five traits and emotions.
//!
//! Persona files are JSON Lines: each line is one flat object. Identity keys
//! describe who the shopper is, every other key is a preference the shopper
//! brings to the conversation.

use crate::error::SimulationError;
use indexmap::IndexMap;
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Keys of a persona record that describe identity rather than preferences.
pub const IDENTITY_KEYS: [&str; 6] = [
    "persona_background",
    "name",
    "age",
    "background",
    "speaking_style",
    "knowledge_level",
];

/// Identity of the simulated shopper.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Persona {
    pub name: String,
    pub age: String,
    pub background: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaking_style: Option<String>,
    pub knowledge_level: String,
}

impl Persona {
    /// Renders the persona block of the customer prompt.
    pub fn describe(&self) -> String {
        let mut description = format!(
            "Name: {} (Age: {})\nBackground: {}",
            self.name, self.age, self.background
        );
        if let Some(style) = self.speaking_style.as_deref().filter(|s| !s.is_empty()) {
            description.push_str(&format!("\nSpeaking Style: '{}'", style));
        }
        description
    }
}

/// Ordered preferences of one shopper.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct PreferenceSet(IndexMap<String, Value>);

impl PreferenceSet {
    /// Number of preferences.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no preferences.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Looks up one preference.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Renders preferences as `key: value` lines in insertion order.
    pub fn render(&self) -> String {
        self.0
            .iter()
            .map(|(key, value)| format!("{}: {}", key, plain_text(value)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "Unknown".to_string(),
        other => other.to_string(),
    }
}

/// One line of a persona file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct PersonaRecord(IndexMap<String, Value>);

impl PersonaRecord {
    /// The reference scenarios use to select this persona.
    pub fn background_key(&self) -> Option<&str> {
        self.0.get("persona_background").and_then(Value::as_str)
    }

    fn text(&self, key: &str) -> Option<String> {
        self.0.get(key).filter(|v| !v.is_null()).map(plain_text)
    }

    /// Splits the record into identity and preferences.
    pub fn split(&self) -> (Persona, PreferenceSet) {
        let persona = Persona {
            name: self.text("name").unwrap_or_else(|| "Unknown".to_string()),
            age: self.text("age").unwrap_or_else(|| "Unknown".to_string()),
            background: self.text("background").unwrap_or_default(),
            speaking_style: self.text("speaking_style").filter(|s| !s.is_empty()),
            knowledge_level: self.text("knowledge_level").unwrap_or_default(),
        };
        let preferences = self
            .0
            .iter()
            .filter(|(key, _)| !IDENTITY_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        (persona, PreferenceSet(preferences))
    }
}

/// All personas available to a batch.
#[derive(Debug, Clone, Default)]
pub struct PersonaCatalog {
    records: Vec<PersonaRecord>,
}

impl PersonaCatalog {
    /// Parses JSON Lines text; blank lines are skipped.
    pub fn from_jsonl(text: &str) -> Result<Self, SimulationError> {
        let mut records = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: PersonaRecord = serde_json::from_str(line).map_err(|e| {
                SimulationError::Parse(format!("Persona line {}: {}", line_no + 1, e))
            })?;
            records.push(record);
        }
        Ok(Self { records })
    }

    /// Reads a persona file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SimulationError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SimulationError::Config(format!("Cannot read personas {}: {}", path.display(), e))
        })?;
        Self::from_jsonl(&text)
    }

    /// Finds the first persona with the given background reference.
    pub fn find(&self, reference: &str) -> Option<&PersonaRecord> {
        self.records
            .iter()
            .find(|record| record.background_key() == Some(reference))
    }

    /// Number of personas.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Level of one Big-Five trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraitLevel {
    #[serde(rename = "Extreme Low")]
    ExtremeLow,
    Low,
    Medium,
    High,
    #[serde(rename = "Extreme High")]
    ExtremeHigh,
}

impl TraitLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            TraitLevel::ExtremeLow => "Extreme Low",
            TraitLevel::Low => "Low",
            TraitLevel::Medium => "Medium",
            TraitLevel::High => "High",
            TraitLevel::ExtremeHigh => "Extreme High",
        }
    }
}

impl FromStr for TraitLevel {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_lowercase();
        match normalized.as_str() {
            "extreme low" => Ok(TraitLevel::ExtremeLow),
            "low" => Ok(TraitLevel::Low),
            "medium" => Ok(TraitLevel::Medium),
            "high" => Ok(TraitLevel::High),
            "extreme high" => Ok(TraitLevel::ExtremeHigh),
            _ => Err(SimulationError::Parse(format!("Unknown trait level: {:?}", s))),
        }
    }
}

impl fmt::Display for TraitLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the five personality dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BigFiveTrait {
    Extroversion,
    Neuroticism,
    Conscientiousness,
    Agreeableness,
    Openness,
}

impl FromStr for BigFiveTrait {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "extroversion" | "extraversion" => Ok(BigFiveTrait::Extroversion),
            "neuroticism" => Ok(BigFiveTrait::Neuroticism),
            "conscientiousness" => Ok(BigFiveTrait::Conscientiousness),
            "agreeableness" => Ok(BigFiveTrait::Agreeableness),
            "openness" => Ok(BigFiveTrait::Openness),
            _ => Err(SimulationError::Parse(format!("Unknown Big Five trait: {:?}", s))),
        }
    }
}

/// A complete Big-Five profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BigFiveTraits {
    pub extroversion: TraitLevel,
    pub neuroticism: TraitLevel,
    pub conscientiousness: TraitLevel,
    pub agreeableness: TraitLevel,
    pub openness: TraitLevel,
}

impl Default for BigFiveTraits {
    fn default() -> Self {
        Self {
            extroversion: TraitLevel::Medium,
            neuroticism: TraitLevel::Medium,
            conscientiousness: TraitLevel::Medium,
            agreeableness: TraitLevel::Medium,
            openness: TraitLevel::Medium,
        }
    }
}

impl BigFiveTraits {
    /// Builds a profile from the traits a scenario pins; the rest stay `Medium`.
    pub fn from_levels<'a>(levels: impl IntoIterator<Item = (&'a BigFiveTrait, &'a TraitLevel)>) -> Self {
        let mut traits = Self::default();
        for (dimension, level) in levels {
            traits.set(*dimension, *level);
        }
        traits
    }

    /// Sets one dimension.
    pub fn set(&mut self, dimension: BigFiveTrait, level: TraitLevel) {
        match dimension {
            BigFiveTrait::Extroversion => self.extroversion = level,
            BigFiveTrait::Neuroticism => self.neuroticism = level,
            BigFiveTrait::Conscientiousness => self.conscientiousness = level,
            BigFiveTrait::Agreeableness => self.agreeableness = level,
            BigFiveTrait::Openness => self.openness = level,
        }
    }
}

/// Emotional state a shopper starts (and stays) in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Excited,
    Curious,
    Anxious,
    Impatient,
    Overwhelmed,
    Confident,
    Uncertain,
    Frustrated,
    Relaxed,
    Cautious,
    Neutral,
}

impl Emotion {
    /// The fixed emotion vocabulary.
    pub const ALL: [Emotion; 11] = [
        Emotion::Excited,
        Emotion::Curious,
        Emotion::Anxious,
        Emotion::Impatient,
        Emotion::Overwhelmed,
        Emotion::Confident,
        Emotion::Uncertain,
        Emotion::Frustrated,
        Emotion::Relaxed,
        Emotion::Cautious,
        Emotion::Neutral,
    ];

    /// Draws one emotion uniformly.
    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        *Self::ALL.choose(rng).unwrap_or(&Emotion::Neutral)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Emotion::Excited => "excited",
            Emotion::Curious => "curious",
            Emotion::Anxious => "anxious",
            Emotion::Impatient => "impatient",
            Emotion::Overwhelmed => "overwhelmed",
            Emotion::Confident => "confident",
            Emotion::Uncertain => "uncertain",
            Emotion::Frustrated => "frustrated",
            Emotion::Relaxed => "relaxed",
            Emotion::Cautious => "cautious",
            Emotion::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything fixed about a shopper for one conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShopperProfile {
    pub persona: Persona,
    pub preferences: PreferenceSet,
    pub traits: Option<BigFiveTraits>,
    pub emotion: Emotion,
}

impl ShopperProfile {
    /// Builds a profile from a persona record, drawing the emotion from `rng`.
    pub fn from_record<R: Rng + ?Sized>(
        record: &PersonaRecord,
        traits: Option<BigFiveTraits>,
        rng: &mut R,
    ) -> Self {
        let (persona, preferences) = record.split();
        Self {
            persona,
            preferences,
            traits,
            emotion: Emotion::sample(rng),
        }
    }
}
