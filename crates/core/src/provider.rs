//! Provider trait: the abstraction over LLM backends.
//!
//! A Provider knows how to send a conversation to an LLM and get the next
//! assistant turn back. Wire-format differences between backends live in the
//! implementations; what differs in *behavior* is described by a
//! [`ProviderCapabilities`] value rather than by separate code paths.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;
use crate::tool::ToolCall;

/// A single request to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o", "claude-sonnet-4-20250514")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A complete response from a provider, before normalization into a [`Turn`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Generated text (may be empty when the model only calls tools)
    pub content: String,

    /// Tool calls the model requested, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

impl ProviderResponse {
    /// Normalize into a turn: a final answer XOR a non-empty list of tool calls.
    pub fn into_turn(self) -> std::result::Result<Turn, ProviderError> {
        if !self.tool_calls.is_empty() {
            return Ok(Turn::ToolCalls {
                content: self.content,
                calls: self.tool_calls,
            });
        }
        if self.content.trim().is_empty() {
            return Err(ProviderError::InvalidResponse(
                "response contained neither text nor tool calls".into(),
            ));
        }
        Ok(Turn::Answer { content: self.content })
    }
}

/// The next move the model made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Turn {
    /// A final text answer; the task is done.
    Answer { content: String },

    /// One or more tool calls, optionally with accompanying text.
    ToolCalls { content: String, calls: Vec<ToolCall> },
}

impl Turn {
    pub fn content(&self) -> &str {
        match self {
            Turn::Answer { content } | Turn::ToolCalls { content, .. } => content,
        }
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Turn::Answer { .. } => &[],
            Turn::ToolCalls { calls, .. } => calls,
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,

    #[serde(default)]
    pub cache_read_input_tokens: u64,

    #[serde(default)]
    pub reasoning_tokens: u64,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
        self.cache_read_input_tokens += rhs.cache_read_input_tokens;
        self.reasoning_tokens += rhs.reasoning_tokens;
    }
}

/// Backoff shape for transient failures of one backend. How many retries a
/// task gets comes from its settings, not from here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry (milliseconds)
    pub initial_delay_ms: u64,

    pub backoff_multiplier: f64,

    /// Upper bound for any single delay (milliseconds)
    pub max_delay_ms: u64,

    /// Spread delays by ±20%
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
            jitter: true,
        }
    }
}

/// What a backend can do, and how requests to it must be shaped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    /// Whether tool schemas may be sent at all
    pub supports_tool_calling: bool,

    /// Whether tool schemas must list every property as required
    #[serde(default)]
    pub strict_tool_schemas: bool,

    /// Headers added to every request
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_headers: Vec<(String, String)>,

    /// Backoff used when this backend fails transiently
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for ProviderCapabilities {
    fn default() -> Self {
        Self {
            supports_tool_calling: true,
            strict_tool_schemas: false,
            extra_headers: Vec::new(),
            retry: RetryPolicy::default(),
        }
    }
}

/// The core Provider trait.
///
/// Every LLM backend implements this trait. The agent loop calls `complete()`
/// without knowing which provider is being used.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "anthropic").
    fn name(&self) -> &str;

    /// Behavior descriptor for this backend.
    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::default()
    }

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(content: &str, calls: Vec<ToolCall>) -> ProviderResponse {
        ProviderResponse {
            content: content.into(),
            tool_calls: calls,
            usage: None,
            model: "test".into(),
            finish_reason: None,
        }
    }

    #[test]
    fn text_only_response_is_an_answer() {
        let turn = response("All done.", vec![]).into_turn().unwrap();
        assert_eq!(turn, Turn::Answer { content: "All done.".into() });
        assert!(turn.tool_calls().is_empty());
    }

    #[test]
    fn tool_calls_win_over_text() {
        let call = ToolCall {
            id: "c1".into(),
            name: "read_file".into(),
            arguments: serde_json::json!({"filename": "a.txt"}),
        };
        let turn = response("Let me look.", vec![call]).into_turn().unwrap();
        assert_eq!(turn.content(), "Let me look.");
        assert_eq!(turn.tool_calls().len(), 1);
    }

    #[test]
    fn empty_response_is_invalid() {
        let err = response("  ", vec![]).into_turn().unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn usage_accumulates() {
        let mut total = Usage::default();
        total += Usage { input_tokens: 10, output_tokens: 5, ..Default::default() };
        total += Usage { input_tokens: 3, output_tokens: 2, reasoning_tokens: 1, ..Default::default() };
        assert_eq!(total.total(), 20);
        assert_eq!(total.reasoning_tokens, 1);
    }
}
