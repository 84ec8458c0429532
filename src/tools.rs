//! Search tools offered to the sales agent.
//!
//! Tools are a closed set: each variant of [`SalesTool`] maps one action tag
//! the model may emit to the lookup it performs. Parsing a tag that is not
//! part of the declared set fails instead of being ignored.

use crate::error::SimulationError;
use crate::models::{ToolDefinition, ToolSpec};
use crate::search::SearchKind;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Arguments shared by both search tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SearchArgs {
    /// Free-text search query
    pub query: String,
}

impl SearchArgs {
    /// Parses the JSON argument string of a tool call.
    pub fn parse(arguments: &str) -> Result<Self, SimulationError> {
        serde_json::from_str(arguments)
            .map_err(|e| SimulationError::Parse(format!("Failed to parse tool arguments: {}", e)))
    }
}

/// An action the sales agent may request from the model's tool calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SalesTool {
    /// Search buying guides and comparison articles
    LookupBuyingGuide,
    /// Search the product catalog
    LookupProductItems,
}

impl SalesTool {
    /// Every tool, in the order they are declared to the model.
    pub const ALL: [SalesTool; 2] = [SalesTool::LookupBuyingGuide, SalesTool::LookupProductItems];

    /// The action tag used on the wire.
    pub fn name(self) -> &'static str {
        match self {
            SalesTool::LookupBuyingGuide => "lookup_buying_guide",
            SalesTool::LookupProductItems => "lookup_product_items",
        }
    }

    /// Description shown to the model.
    pub fn description(self) -> &'static str {
        match self {
            SalesTool::LookupBuyingGuide => {
                "Search for buying guides and articles about product categories to help understand product features and comparisons"
            }
            SalesTool::LookupProductItems => {
                "Search for specific products in the store inventory based on customer requirements"
            }
        }
    }

    /// Index the tool searches.
    pub fn search_kind(self) -> SearchKind {
        match self {
            SalesTool::LookupBuyingGuide => SearchKind::BuyingGuides,
            SalesTool::LookupProductItems => SearchKind::Products,
        }
    }

    /// Heading placed before the retrieved passages in the observation.
    pub fn observation_heading(self) -> &'static str {
        match self {
            SalesTool::LookupBuyingGuide => "Buying guide information",
            SalesTool::LookupProductItems => "Product information",
        }
    }

    /// Whether results of this tool are eligible as recommended items.
    pub fn yields_candidates(self) -> bool {
        matches!(self, SalesTool::LookupProductItems)
    }

    /// Builds the tool's metadata, with parameters generated from [`SearchArgs`].
    pub fn definition(self) -> ToolDefinition {
        let schema = schemars::schema_for!(SearchArgs);

        let mut schema_value = serde_json::to_value(schema).unwrap_or_else(|_| {
            serde_json::json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"],
            })
        });

        if let Some(schema_obj) = schema_value.as_object_mut() {
            schema_obj.insert(
                "additionalProperties".to_string(),
                serde_json::Value::Bool(false),
            );
        }

        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: schema_value,
            strict: Some(true),
        }
    }

    /// Resolves an action tag against a declared tool set.
    pub fn resolve(name: &str, declared: &[SalesTool]) -> Result<SalesTool, SimulationError> {
        declared
            .iter()
            .copied()
            .find(|tool| tool.name() == name)
            .ok_or_else(|| SimulationError::Tool(format!("Tool not found: {}", name)))
    }

    /// Wraps the definitions of `tools` for an API request.
    pub fn specs(tools: &[SalesTool]) -> Vec<ToolSpec> {
        tools
            .iter()
            .map(|tool| ToolSpec {
                r#type: "function".to_string(),
                function: tool.definition(),
            })
            .collect()
    }
}

impl fmt::Display for SalesTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
