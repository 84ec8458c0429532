//! Scenario files and their expansion into individual runs.
//!
//! A scenario names a persona, optionally pins Big-Five traits to one or more
//! levels, and says how many times each unique combination is rolled out.
//!
//! ```yaml
//! scenarios:
//!   - persona: new_grad
//!     big_5_specification:
//!       openness: Low, High
//!       agreeableness: [Medium]
//!     num_rollouts_per_unique_scenario: 2
//! ```

use crate::error::SimulationError;
use crate::persona::{BigFiveTrait, BigFiveTraits, TraitLevel};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

/// Allowed levels for one trait: a single value, a comma-separated string or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TraitFilter {
    List(Vec<String>),
    Single(String),
}

impl TraitFilter {
    /// Parses every level the filter allows, in the order given.
    pub fn levels(&self) -> Result<Vec<TraitLevel>, SimulationError> {
        let raw: Vec<&str> = match self {
            TraitFilter::List(values) => values.iter().map(String::as_str).collect(),
            TraitFilter::Single(value) => value.split(',').collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(TraitLevel::from_str)
            .collect()
    }
}

fn default_rollouts() -> usize {
    1
}

/// One scenario entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSpec {
    /// Background reference of the persona to play
    pub persona: String,

    #[serde(default)]
    pub big_5_specification: IndexMap<String, TraitFilter>,

    #[serde(default = "default_rollouts")]
    pub num_rollouts_per_unique_scenario: usize,
}

/// A single conversation to simulate.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSpec {
    pub persona: String,
    pub traits: Option<BigFiveTraits>,
}

impl ScenarioSpec {
    /// Every unique trait combination this scenario allows.
    ///
    /// Without a Big-Five specification there is exactly one combination and
    /// the shopper plays without personality traits.
    pub fn combinations(&self) -> Result<Vec<Option<BigFiveTraits>>, SimulationError> {
        if self.big_5_specification.is_empty() {
            warn!(persona = %self.persona, "scenario has no Big Five specification");
            return Ok(vec![None]);
        }

        let mut axes = Vec::with_capacity(self.big_5_specification.len());
        for (name, filter) in &self.big_5_specification {
            let dimension = BigFiveTrait::from_str(name)?;
            let levels = filter.levels()?;
            if levels.is_empty() {
                return Err(SimulationError::Config(format!(
                    "Scenario for {} lists no levels for {}",
                    self.persona, name
                )));
            }
            axes.push((dimension, levels));
        }

        // Cartesian product, last axis varying fastest.
        let mut combos: Vec<Vec<(BigFiveTrait, TraitLevel)>> = vec![Vec::new()];
        for (dimension, levels) in &axes {
            combos = combos
                .into_iter()
                .flat_map(|prefix| {
                    levels.iter().map(move |level| {
                        let mut next = prefix.clone();
                        next.push((*dimension, *level));
                        next
                    })
                })
                .collect();
        }

        Ok(combos
            .iter()
            .map(|combo| Some(BigFiveTraits::from_levels(combo.iter().map(|(d, l)| (d, l)))))
            .collect())
    }

    /// Expands into runs: every combination repeated by the rollout count.
    pub fn expand(&self) -> Result<Vec<RunSpec>, SimulationError> {
        let mut runs = Vec::new();
        for traits in self.combinations()? {
            for _ in 0..self.num_rollouts_per_unique_scenario {
                runs.push(RunSpec {
                    persona: self.persona.clone(),
                    traits,
                });
            }
        }
        Ok(runs)
    }
}

/// Top-level scenario document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioFile {
    #[serde(default)]
    pub scenarios: Vec<ScenarioSpec>,
}

impl ScenarioFile {
    pub fn from_yaml_str(text: &str) -> Result<Self, SimulationError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Reads a scenario file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SimulationError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SimulationError::Config(format!("Cannot read scenarios {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&text)
    }

    /// A single scenario playing `persona` once, without traits.
    pub fn single(persona: impl Into<String>) -> Self {
        Self {
            scenarios: vec![ScenarioSpec {
                persona: persona.into(),
                big_5_specification: IndexMap::new(),
                num_rollouts_per_unique_scenario: 1,
            }],
        }
    }

    /// All runs of all scenarios, in file order.
    pub fn expand(&self) -> Result<Vec<RunSpec>, SimulationError> {
        let mut runs = Vec::new();
        for scenario in &self.scenarios {
            runs.extend(scenario.expand()?);
        }
        Ok(runs)
    }
}
