//! Wire models for the OpenAI-compatible completion and embedding APIs.
//!
//! This module defines the structures used to represent messages, requests,
//! responses and tool calls exchanged with the completion backend.

use serde::{Deserialize, Serialize};

/// A message in a conversation with various roles (system, user, assistant, tool).
///
/// Messages form the core of chat interactions with the completion backend.
/// Each message has a role, optional content, and may include tool calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// Role of the message sender (system, user, assistant, or tool)
    pub role: String,

    /// Content of the message, optional when using tool calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Name of the speaker if applicable (e.g., tool name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Required for 'tool' role messages - must match the id of the tool call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Tool calls requested by the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// Reasoning trace returned by models that expose one; never sent back
    #[serde(default, skip_serializing)]
    pub reasoning_content: Option<String>,
}

impl ChatMessage {
    fn with_role(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
            name: None,
            tool_call_id: None,
            tool_calls: None,
            reasoning_content: None,
        }
    }

    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", content.into())
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", content.into())
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", content.into())
    }

    /// Creates a tool result message.
    ///
    /// # Arguments
    ///
    /// * `content` - The result of the tool execution
    /// * `tool_name` - The name of the tool that was executed
    /// * `tool_call_id` - The ID of the tool call this result is for
    pub fn tool_result(
        content: impl Into<String>,
        tool_name: impl Into<String>,
        tool_call_id: impl Into<String>,
    ) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            name: Some(tool_name.into()),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: None,
            reasoning_content: None,
        }
    }

    /// Returns the tool calls carried by this message, if any.
    pub fn requested_tool_calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or_default()
    }
}

/// Metadata for a tool that can be called by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    /// Name of the tool
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema defining the tool's parameters
    pub parameters: serde_json::Value,

    /// Optional flag for strict JSON schema enforcement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

/// Top-level wrapper for a tool in the API request.
///
/// The API expects tools to be wrapped with a type field and
/// nested function definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    /// Type of the tool (currently always "function")
    #[serde(rename = "type")]
    pub r#type: String,

    /// The tool definition
    pub function: ToolDefinition,
}

/// Function data within a tool call.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FunctionCall {
    /// Name of the function to call
    #[serde(default)]
    pub name: String,

    /// Arguments for the function as a JSON string
    #[serde(default)]
    pub arguments: String,
}

/// A request from the model to call a tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Unique identifier for this tool call
    #[serde(default)]
    pub id: String,

    /// Type of the call (always "function" in current API)
    #[serde(rename = "type", default = "default_call_type")]
    pub call_type: String,

    /// Function name and arguments
    #[serde(default)]
    pub function: FunctionCall,
}

fn default_call_type() -> String {
    "function".to_string()
}

impl ToolCall {
    /// Builds a function tool call.
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: default_call_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// Tool-choice policy sent with a request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    /// The model decides whether to call tools
    Auto,
}

/// Request to the Chat Completions API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    /// Model identifier to use for completion
    pub model: String,

    /// Conversation history as a sequence of messages
    pub messages: Vec<ChatMessage>,

    /// Tools that the model can use during the conversation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSpec>>,

    /// Tool-choice policy, only meaningful when tools are present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,

    /// Maximum number of tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,

    /// Temperature for controlling randomness
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ChatRequest {
    /// Creates a request without tools.
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: None,
            tool_choice: None,
            max_tokens: None,
            temperature: None,
        }
    }

    /// Sets generation parameters.
    pub fn with_generation(mut self, max_tokens: usize, temperature: f32) -> Self {
        self.max_tokens = Some(max_tokens);
        self.temperature = Some(temperature);
        self
    }

    /// Enables tool calling with the given schema list and policy.
    pub fn with_tools(mut self, tools: Vec<ToolSpec>, choice: ToolChoice) -> Self {
        self.tools = Some(tools);
        self.tool_choice = Some(choice);
        self
    }
}

/// A single choice/response from the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ChatChoice {
    /// Index of this choice in the array of choices
    #[serde(default)]
    pub index: usize,

    /// The message generated by the model
    pub message: ChatMessage,

    /// Reason why the model stopped generating
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Response from the Chat Completions API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ChatResponse {
    /// Unique identifier for this completion
    #[serde(default)]
    pub id: String,

    /// Model used for the completion
    #[serde(default)]
    pub model: String,

    /// Array of completion choices
    pub choices: Vec<ChatChoice>,

    /// Token usage statistics
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// Token usage statistics for a request/response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Usage {
    /// Number of tokens in the prompt
    pub prompt_tokens: usize,

    /// Number of tokens in the completion
    pub completion_tokens: usize,

    /// Total number of tokens used
    pub total_tokens: usize,
}

/// The chosen message of a completion together with its optional reasoning.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Message selected from the response choices
    pub message: ChatMessage,

    /// Reasoning text, when the backend exposes it
    pub reasoning: Option<String>,
}

impl Completion {
    /// Wraps a message with no reasoning trace.
    pub fn from_message(message: ChatMessage) -> Self {
        Self {
            message,
            reasoning: None,
        }
    }

    /// Returns the message text, or an empty string for tool-only replies.
    pub fn text(&self) -> &str {
        self.message.content.as_deref().unwrap_or_default()
    }
}

/// Request body for the embeddings endpoint.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct EmbeddingRequest<'a> {
    pub model: &'a str,
    pub input: &'a [String],
}

/// One embedding vector in an embeddings response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EmbeddingData {
    #[serde(default)]
    pub index: usize,
    pub embedding: Vec<f32>,
}

/// Response from the embeddings endpoint.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EmbeddingResponse {
    pub data: Vec<EmbeddingData>,
}
