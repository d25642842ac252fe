//! Sequential thinking tool.
//!
//! Lets the model lay out its reasoning as numbered thoughts that can be
//! revised or branched. The tool keeps the thought history for the
//! lifetime of one task and reports a short status after each step; it
//! has no side effects outside its own state.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use runbox_core::error::ToolError;
use runbox_core::tool::Tool;
use serde::{Deserialize, Serialize};

/// One validated thought.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    pub thought: String,
    pub thought_number: u32,
    pub total_thoughts: u32,
    pub next_thought_needed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_revision: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revises_thought: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_from_thought: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_more_thoughts: Option<bool>,
}

#[derive(Default)]
struct ThinkingState {
    history: Vec<Thought>,
    branches: BTreeMap<String, Vec<Thought>>,
}

#[derive(Default)]
pub struct SequentialThinkingTool {
    state: Mutex<ThinkingState>,
}

impl SequentialThinkingTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of thoughts recorded so far.
    pub fn history_len(&self) -> usize {
        self.state.lock().map(|s| s.history.len()).unwrap_or(0)
    }
}

fn invalid(reason: impl Into<String>) -> ToolError {
    ToolError::InvalidArguments(reason.into())
}

fn required_number(arguments: &serde_json::Value, key: &str) -> Result<u32, ToolError> {
    let n = arguments[key]
        .as_i64()
        .ok_or_else(|| invalid(format!("Invalid {key}: must be an integer")))?;
    if n < 1 {
        return Err(invalid(format!("{key} must be at least 1")));
    }
    u32::try_from(n).map_err(|_| invalid(format!("{key} is out of range")))
}

/// Zero and null both mean "not set".
fn optional_number(arguments: &serde_json::Value, key: &str) -> Result<Option<u32>, ToolError> {
    match &arguments[key] {
        serde_json::Value::Null => Ok(None),
        v => match v.as_i64() {
            Some(0) => Ok(None),
            Some(n) if n >= 1 => u32::try_from(n)
                .map(Some)
                .map_err(|_| invalid(format!("{key} is out of range"))),
            Some(_) => Err(invalid(format!("{key} must be a positive integer"))),
            None => Err(invalid(format!("Invalid {key}: must be an integer"))),
        },
    }
}

fn parse_thought(arguments: &serde_json::Value) -> Result<Thought, ToolError> {
    let thought = arguments["thought"]
        .as_str()
        .ok_or_else(|| invalid("Invalid thought: must be a string"))?
        .to_string();
    let next_thought_needed = arguments["next_thought_needed"]
        .as_bool()
        .ok_or_else(|| invalid("Invalid next_thought_needed: must be a boolean"))?;
    let thought_number = required_number(arguments, "thought_number")?;
    let total_thoughts = required_number(arguments, "total_thoughts")?;

    Ok(Thought {
        thought,
        thought_number,
        // The estimate grows when the model runs past it
        total_thoughts: total_thoughts.max(thought_number),
        next_thought_needed,
        is_revision: arguments["is_revision"].as_bool(),
        revises_thought: optional_number(arguments, "revises_thought")?,
        branch_from_thought: optional_number(arguments, "branch_from_thought")?,
        branch_id: arguments["branch_id"].as_str().map(str::to_string),
        needs_more_thoughts: arguments["needs_more_thoughts"].as_bool(),
    })
}

#[async_trait]
impl Tool for SequentialThinkingTool {
    fn name(&self) -> &str {
        "sequentialthinking"
    }

    fn description(&self) -> &str {
        "A tool for dynamic, reflective problem solving through numbered thoughts.\n\
         Each thought can build on, question, or revise earlier ones; thoughts may \
         also branch from an earlier point. Adjust total_thoughts as understanding \
         changes, and set next_thought_needed to false only when a satisfactory \
         answer has been reached."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "thought": {
                    "type": "string",
                    "description": "Your current thinking step"
                },
                "next_thought_needed": {
                    "type": "boolean",
                    "description": "Whether another thought step is needed"
                },
                "thought_number": {
                    "type": "integer",
                    "description": "Current thought number. Minimum value is 1."
                },
                "total_thoughts": {
                    "type": "integer",
                    "description": "Estimated total thoughts needed. Minimum value is 1."
                },
                "is_revision": {
                    "type": "boolean",
                    "description": "Whether this revises previous thinking"
                },
                "revises_thought": {
                    "type": "integer",
                    "description": "Which thought is being reconsidered. Minimum value is 1."
                },
                "branch_from_thought": {
                    "type": "integer",
                    "description": "Branching point thought number. Minimum value is 1."
                },
                "branch_id": {
                    "type": "string",
                    "description": "Branch identifier"
                },
                "needs_more_thoughts": {
                    "type": "boolean",
                    "description": "Whether more thoughts are needed"
                }
            },
            "required": ["thought", "next_thought_needed", "thought_number", "total_thoughts"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let thought = parse_thought(&arguments)?;

        let mut state = self.state.lock().map_err(|_| ToolError::ExecutionFailed {
            tool_name: "sequentialthinking".into(),
            reason: "thinking state is poisoned".into(),
        })?;

        tracing::debug!(
            thought_number = thought.thought_number,
            total_thoughts = thought.total_thoughts,
            "Recording thought"
        );

        state.history.push(thought.clone());
        if let (Some(_), Some(branch_id)) = (thought.branch_from_thought, &thought.branch_id) {
            state
                .branches
                .entry(branch_id.clone())
                .or_default()
                .push(thought.clone());
        }

        let status = serde_json::json!({
            "thought_number": thought.thought_number,
            "total_thoughts": thought.total_thoughts,
            "next_thought_needed": thought.next_thought_needed,
            "branches": state.branches.keys().collect::<Vec<_>>(),
            "thought_history_length": state.history.len(),
        });
        let pretty = serde_json::to_string_pretty(&status).map_err(|e| ToolError::ExecutionFailed {
            tool_name: "sequentialthinking".into(),
            reason: e.to_string(),
        })?;

        Ok(format!("Sequential thinking step completed.\n\nStatus:\n{pretty}"))
    }
}
