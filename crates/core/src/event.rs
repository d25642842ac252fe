//! Task events: the structured progress messages a worker emits.
//!
//! Every event serializes to one self-describing JSON object:
//! `{"type": "...", "task_id": "...", "timestamp": "...", ...payload}`.
//! A task's event sequence is `start`, zero or more `step`, at most one of
//! `complete` / `error`, and finally exactly one `end`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::provider::Usage;
use crate::task::TaskId;
use crate::tool::{ToolCall, ToolResult};

/// Why a task stopped running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// The model produced a final answer.
    Completed,
    /// The step budget ran out before a final answer.
    StepBudgetExceeded,
    /// A provider or internal error ended the run.
    Failed,
    /// The task was stopped on request.
    Terminated,
    /// The worker disappeared without reporting its end.
    WorkerLost,
}

impl ExitReason {
    pub fn is_success(self) -> bool {
        matches!(self, ExitReason::Completed)
    }
}

/// One completed Turn plus its tool executions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStep {
    #[serde(rename = "step")]
    pub step_number: u32,

    /// Text the model produced this turn
    #[serde(default)]
    pub content: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Results in the same order as `tool_calls`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Event payloads, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Start {
        message: String,
    },

    Step(AgentStep),

    Complete {
        message: String,
        answer: String,
        steps: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },

    Error {
        error: String,

        /// Set when this error ends the task
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<ExitReason>,

        /// Step during which the error happened
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<u32>,

        /// Stringified form of an event that could not be encoded
        #[serde(default, skip_serializing_if = "Option::is_none")]
        original_message: Option<String>,
    },

    End {
        exit: ExitReason,
    },
}

/// A timestamped event for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: TaskId,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl TaskEvent {
    pub fn new(task_id: TaskId, kind: EventKind) -> Self {
        Self {
            task_id,
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn start(task_id: TaskId, instruction: &str) -> Self {
        Self::new(
            task_id,
            EventKind::Start {
                message: format!("Starting task: {instruction}"),
            },
        )
    }

    pub fn step(task_id: TaskId, step: AgentStep) -> Self {
        Self::new(task_id, EventKind::Step(step))
    }

    pub fn complete(task_id: TaskId, answer: String, steps: u32, usage: Option<Usage>) -> Self {
        Self::new(
            task_id,
            EventKind::Complete {
                message: "Task completed".into(),
                answer,
                steps,
                usage,
            },
        )
    }

    /// A terminal error.
    pub fn failed(task_id: TaskId, error: String, reason: ExitReason, step: Option<u32>) -> Self {
        Self::new(
            task_id,
            EventKind::Error {
                error,
                reason: Some(reason),
                step,
                original_message: None,
            },
        )
    }

    pub fn end(task_id: TaskId, exit: ExitReason) -> Self {
        Self::new(task_id, EventKind::End { exit })
    }

    /// Event name as it appears in the `type` field.
    pub fn event_type(&self) -> &'static str {
        match &self.kind {
            EventKind::Start { .. } => "start",
            EventKind::Step(_) => "step",
            EventKind::Complete { .. } => "complete",
            EventKind::Error { .. } => "error",
            EventKind::End { .. } => "end",
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self.kind, EventKind::End { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_event_is_flat_json() {
        let event = TaskEvent::step(
            TaskId::from("t1"),
            AgentStep {
                step_number: 2,
                content: "checking".into(),
                tool_calls: vec![],
                tool_results: vec![ToolResult::success("c1", "ok")],
                usage: None,
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "step");
        assert_eq!(json["task_id"], "t1");
        assert_eq!(json["step"], 2);
        assert_eq!(json["tool_results"][0]["output"], "ok");
        assert!(json.get("timestamp").is_some());
    }

    #[test]
    fn end_event_carries_exit_reason() {
        let event = TaskEvent::end(TaskId::from("t1"), ExitReason::StepBudgetExceeded);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "end");
        assert_eq!(json["exit"], "step_budget_exceeded");
        assert!(event.is_end());
    }

    #[test]
    fn events_decode_from_their_encoding() {
        let events = vec![
            TaskEvent::start(TaskId::from("t"), "list files"),
            TaskEvent::failed(TaskId::from("t"), "boom".into(), ExitReason::Failed, Some(3)),
            TaskEvent::end(TaskId::from("t"), ExitReason::Failed),
        ];
        for event in events {
            let line = serde_json::to_string(&event).unwrap();
            let decoded: TaskEvent = serde_json::from_str(&line).unwrap();
            assert_eq!(decoded, event);
        }
    }

    #[test]
    fn start_message_mentions_instruction() {
        let event = TaskEvent::start(TaskId::from("t"), "write a haiku");
        assert_eq!(event.event_type(), "start");
        match event.kind {
            EventKind::Start { message } => assert!(message.contains("write a haiku")),
            _ => panic!("Expected start event"),
        }
    }
}
