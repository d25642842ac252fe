//! Shared test helpers for agent loop tests.

use std::sync::Mutex;

use runbox_core::error::ProviderError;
use runbox_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use runbox_core::task::{ProviderSettings, TaskId, TaskSpec};
use runbox_core::tool::ToolCall;

/// A mock provider that returns a sequence of scripted outcomes.
///
/// Each call to `complete` returns the next outcome in the queue; once the
/// queue is exhausted the last outcome repeats.
pub struct SequentialMockProvider {
    outcomes: Vec<Result<ProviderResponse, ProviderError>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(outcomes: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        assert!(!outcomes.is_empty(), "SequentialMockProvider needs at least one outcome");
        Self {
            outcomes,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a provider that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![Ok(make_text_response(text))])
    }

    /// Create a provider that first returns tool calls, then a final answer.
    pub fn tool_then_answer(tool_calls: Vec<ToolCall>, thought: &str, answer: &str) -> Self {
        Self::new(vec![
            Ok(make_tool_call_response(tool_calls, thought)),
            Ok(make_text_response(answer)),
        ])
    }

    /// Return the same response on every call.
    pub fn repeating(response: ProviderResponse) -> Self {
        Self::new(vec![Ok(response)])
    }

    pub fn failing(error: ProviderError) -> Self {
        Self::new(vec![Err(error)])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Every request seen so far, in order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let index = requests.len().min(self.outcomes.len() - 1);
        requests.push(request);
        self.outcomes[index].clone()
    }
}

/// A provider whose calls never return.
pub struct HangingProvider;

#[async_trait::async_trait]
impl Provider for HangingProvider {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        std::future::pending().await
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        content: text.into(),
        tool_calls: vec![],
        usage: Some(Usage {
            input_tokens: 10,
            output_tokens: 5,
            ..Default::default()
        }),
        model: "mock-model".into(),
        finish_reason: Some("stop".into()),
    }
}

/// Create a response with tool calls and optional thought content.
pub fn make_tool_call_response(tool_calls: Vec<ToolCall>, thought: &str) -> ProviderResponse {
    ProviderResponse {
        content: thought.into(),
        tool_calls,
        usage: Some(Usage {
            input_tokens: 10,
            output_tokens: 5,
            ..Default::default()
        }),
        model: "mock-model".into(),
        finish_reason: Some("tool_calls".into()),
    }
}

/// Helper to create a tool call.
pub fn make_tool_call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: args,
    }
}

/// A task spec pointing at the system temp directory.
pub fn test_spec(step_budget: u32) -> TaskSpec {
    TaskSpec {
        id: TaskId::new(),
        instruction: "Summarize the project".into(),
        working_directory: std::env::temp_dir(),
        step_budget,
        provider: ProviderSettings {
            provider: "sequential_mock".into(),
            model: "mock-model".into(),
            base_url: None,
            api_key: None,
            api_version: None,
            temperature: Some(0.5),
            max_tokens: None,
            top_p: None,
            top_k: None,
            max_retries: 0,
        },
        system_prompt: None,
        tool_timeout_secs: 5,
    }
}
