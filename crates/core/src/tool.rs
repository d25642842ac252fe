//! Tool trait and registry: the Tool Invoker.
//!
//! Tools are what give the agent the ability to act on its working directory.
//! The registry never lets a tool failure escape as an `Err`: unknown tools,
//! bad arguments, timeouts and execution failures all come back as a
//! [`ToolResult`] carrying an error message and code, so the agent loop can
//! hand them to the model and keep going.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// Default upper bound for a single tool invocation.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// A request to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the LLM's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON object
    pub arguments: serde_json::Value,
}

/// The result of a tool invocation.
///
/// Exactly one of `output` / `error` is meaningful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i32>,
}

impl ToolResult {
    pub fn success(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            output: Some(output.into()),
            error: None,
            error_code: None,
        }
    }

    pub fn failure(call_id: impl Into<String>, error: impl Into<String>, code: i32) -> Self {
        Self {
            call_id: call_id.into(),
            output: None,
            error: Some(error.into()),
            error_code: Some(code),
        }
    }

    fn from_error(call_id: &str, err: &ToolError) -> Self {
        Self::failure(call_id, err.to_string(), err.code())
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Text handed back to the model for this result: the output, then an
    /// `Error:` line when the invocation failed, trimmed.
    pub fn render(&self) -> String {
        let mut text = self.output.clone().unwrap_or_default();
        if let Some(error) = &self.error {
            text.push_str("\nError: ");
            text.push_str(error);
        }
        text.trim().to_string()
    }
}

/// The core Tool trait.
///
/// A tool returns its textual output on success. Stateful tools keep their
/// state behind interior mutability; one registry (and so one set of tool
/// instances) belongs to exactly one task.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "read_file").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<String, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// The agent loop uses this to:
/// 1. Get tool definitions to send to the LLM
/// 2. Invoke tools when the LLM requests them
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Bound every invocation by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Get all tool definitions (for sending to the LLM), sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Invoke a tool call. Never fails: errors become error results.
    pub async fn invoke(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, "Model requested an unknown tool");
            return ToolResult::from_error(&call.id, &ToolError::NotFound(call.name.clone()));
        };

        if !call.arguments.is_object() && !call.arguments.is_null() {
            let err = ToolError::InvalidArguments(format!(
                "arguments for '{}' must be a JSON object",
                call.name
            ));
            return ToolResult::from_error(&call.id, &err);
        }

        let started = std::time::Instant::now();
        let outcome = tokio::time::timeout(self.timeout, tool.execute(call.arguments.clone())).await;
        debug!(tool = %call.name, elapsed_ms = started.elapsed().as_millis() as u64, "Tool finished");

        match outcome {
            Ok(Ok(output)) => ToolResult::success(&call.id, output),
            Ok(Err(e)) => ToolResult::from_error(&call.id, &e),
            Err(_) => ToolResult::from_error(
                &call.id,
                &ToolError::Timeout {
                    tool_name: call.name.clone(),
                    timeout_secs: self.timeout.as_secs(),
                },
            ),
        }
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
