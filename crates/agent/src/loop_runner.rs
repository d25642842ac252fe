//! The agent reasoning loop implementation.

use std::path::PathBuf;
use std::time::Duration;

use runbox_core::error::ProviderError;
use runbox_core::event::{AgentStep, ExitReason, TaskEvent};
use runbox_core::message::{Conversation, Message};
use runbox_core::provider::Turn;
use runbox_core::task::{TaskId, TaskSpec};
use runbox_core::tool::ToolRegistry;
use runbox_providers::LlmClient;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::prompt::{DEFAULT_SYSTEM_PROMPT, task_message};
use crate::sink::EventSink;

/// How a run ended, before it is turned into terminal events.
enum Outcome {
    Completed { answer: String, steps: u32 },
    Failed { reason: ExitReason, error: String, step: Option<u32> },
}

impl Outcome {
    fn terminated(step: u32) -> Self {
        Outcome::Failed {
            reason: ExitReason::Terminated,
            error: "Task was stopped before it finished".into(),
            step: Some(step),
        }
    }
}

/// Drives one task: alternates provider turns and tool executions until
/// the model answers, the step budget runs out, an error ends the run, or
/// the task is cancelled.
pub struct AgentLoop {
    task_id: TaskId,
    instruction: String,
    working_directory: PathBuf,
    step_budget: u32,
    system_prompt: String,

    /// Provider client (retry + usage accounting)
    client: LlmClient,

    /// Tools owned by this run
    tools: ToolRegistry,

    cancel: CancellationToken,
}

impl AgentLoop {
    /// Create a loop for `spec` with an already-built client and registry.
    pub fn new(spec: &TaskSpec, client: LlmClient, tools: ToolRegistry) -> Self {
        Self {
            task_id: spec.id.clone(),
            instruction: spec.instruction.clone(),
            working_directory: spec.working_directory.clone(),
            step_budget: spec.step_budget,
            system_prompt: spec
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            client,
            tools,
            cancel: CancellationToken::new(),
        }
    }

    /// Build the provider named by the task spec and the built-in tools.
    pub fn from_spec(spec: &TaskSpec) -> Result<Self, ProviderError> {
        let client = LlmClient::from_settings(&spec.provider)?;
        let tools = runbox_tools::default_registry(
            &spec.working_directory,
            Duration::from_secs(spec.tool_timeout_secs),
        );
        Ok(Self::new(spec, client, tools))
    }

    /// Observe `token` at every suspension point.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Run to a terminal state.
    ///
    /// Emits `start`, one `step` per completed turn, then `complete` or
    /// `error`, and always `end` last.
    pub async fn run(mut self, sink: &dyn EventSink) -> ExitReason {
        info!(
            task_id = %self.task_id,
            provider = %self.client.provider_name(),
            model = %self.client.model(),
            step_budget = self.step_budget,
            "Starting task"
        );
        sink.emit(TaskEvent::start(self.task_id.clone(), &self.instruction));

        let exit = match self.drive(sink).await {
            Outcome::Completed { answer, steps } => {
                let usage = self.client.total_usage();
                let usage = (usage.total() > 0).then_some(usage);
                info!(task_id = %self.task_id, steps, "Task completed");
                sink.emit(TaskEvent::complete(self.task_id.clone(), answer, steps, usage));
                ExitReason::Completed
            }
            Outcome::Failed { reason, error, step } => {
                warn!(task_id = %self.task_id, ?reason, step, error = %error, "Task failed");
                sink.emit(TaskEvent::failed(self.task_id.clone(), error, reason, step));
                reason
            }
        };

        sink.emit(TaskEvent::end(self.task_id.clone(), exit));
        exit
    }

    async fn drive(&mut self, sink: &dyn EventSink) -> Outcome {
        let cancel = self.cancel.clone();
        let definitions = self.tools.definitions();

        let mut conversation = Conversation::new();
        conversation.push(Message::system(&self.system_prompt));
        conversation.push(Message::user(task_message(&self.instruction, &self.working_directory)));

        let mut step = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Outcome::terminated(step);
            }

            step += 1;
            if step > self.step_budget {
                return Outcome::Failed {
                    reason: ExitReason::StepBudgetExceeded,
                    error: format!(
                        "Step budget of {} exhausted without a final answer",
                        self.step_budget
                    ),
                    step: Some(self.step_budget),
                };
            }

            debug!(task_id = %self.task_id, step, messages = conversation.len(), "Agent turn");

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Outcome::terminated(step),
                response = self.client.send(&conversation, &definitions) => response,
            };
            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    return Outcome::Failed {
                        reason: ExitReason::Failed,
                        error: e.to_string(),
                        step: Some(step),
                    };
                }
            };

            match response.turn {
                Turn::Answer { content } => {
                    conversation.push(Message::assistant(&content));
                    sink.emit(TaskEvent::step(
                        self.task_id.clone(),
                        AgentStep {
                            step_number: step,
                            content: content.clone(),
                            tool_calls: Vec::new(),
                            tool_results: Vec::new(),
                            usage: response.usage,
                        },
                    ));
                    return Outcome::Completed { answer: content, steps: step };
                }
                Turn::ToolCalls { content, calls } => {
                    conversation.push(Message::assistant_with_calls(&content, calls.clone()));

                    let mut results = Vec::with_capacity(calls.len());
                    for call in &calls {
                        let result = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return Outcome::terminated(step),
                            result = self.tools.invoke(call) => result,
                        };
                        if result.is_error() {
                            debug!(
                                task_id = %self.task_id,
                                tool = %call.name,
                                code = ?result.error_code,
                                "Tool returned an error"
                            );
                        }
                        conversation.push(Message::tool_result(&result));
                        results.push(result);
                    }

                    sink.emit(TaskEvent::step(
                        self.task_id.clone(),
                        AgentStep {
                            step_number: step,
                            content,
                            tool_calls: calls,
                            tool_results: results,
                            usage: response.usage,
                        },
                    ));
                }
            }
        }
    }
}

/// Report a task whose agent could not be built (for example, a missing
/// API key): `start`, a terminal `error`, then `end`.
pub fn report_startup_failure(spec: &TaskSpec, error: &ProviderError, sink: &dyn EventSink) -> ExitReason {
    warn!(task_id = %spec.id, error = %error, "Could not start task");
    sink.emit(TaskEvent::start(spec.id.clone(), &spec.instruction));
    sink.emit(TaskEvent::failed(
        spec.id.clone(),
        error.to_string(),
        ExitReason::Failed,
        None,
    ));
    sink.emit(TaskEvent::end(spec.id.clone(), ExitReason::Failed));
    ExitReason::Failed
}

/// Build the agent for `spec` and run it, reporting build failures as
/// events.
pub async fn run_task(spec: &TaskSpec, cancel: CancellationToken, sink: &dyn EventSink) -> ExitReason {
    match AgentLoop::from_spec(spec) {
        Ok(agent) => agent.with_cancellation(cancel).run(sink).await,
        Err(e) => report_startup_failure(spec, &e, sink),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use runbox_core::event::EventKind;
    use runbox_core::message::Role;
    use runbox_providers::RetryConfig;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn agent(provider: Arc<dyn runbox_core::provider::Provider>, budget: u32) -> AgentLoop {
        let spec = test_spec(budget);
        let client = LlmClient::new(provider, &spec.provider).with_retry(RetryConfig::no_retry());
        let tools = runbox_tools::default_registry(&spec.working_directory, Duration::from_secs(5));
        AgentLoop::new(&spec, client, tools)
    }

    async fn run_collect(agent: AgentLoop) -> (ExitReason, Vec<TaskEvent>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let exit = agent.run(&tx).await;
        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        (exit, events)
    }

    fn types(events: &[TaskEvent]) -> Vec<&'static str> {
        events.iter().map(|e| e.event_type()).collect()
    }

    #[tokio::test]
    async fn immediate_answer() {
        let provider = Arc::new(SequentialMockProvider::single_text("All done."));
        let (exit, events) = run_collect(agent(provider, 5)).await;

        assert_eq!(exit, ExitReason::Completed);
        assert_eq!(types(&events), vec!["start", "step", "complete", "end"]);
        match &events[1].kind {
            EventKind::Step(step) => {
                assert_eq!(step.step_number, 1);
                assert_eq!(step.content, "All done.");
            }
            other => panic!("expected step, got {other:?}"),
        }
        match &events[2].kind {
            EventKind::Complete { answer, steps, usage, .. } => {
                assert_eq!(answer, "All done.");
                assert_eq!(*steps, 1);
                assert_eq!(usage.unwrap().total(), 15);
            }
            other => panic!("expected complete, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn step_budget_exceeded() {
        let think = make_tool_call(
            "c",
            "sequentialthinking",
            serde_json::json!({
                "thought": "still going", "next_thought_needed": true,
                "thought_number": 1, "total_thoughts": 9
            }),
        );
        let provider = Arc::new(SequentialMockProvider::repeating(make_tool_call_response(
            vec![think],
            "thinking",
        )));
        let (exit, events) = run_collect(agent(provider.clone(), 3)).await;

        assert_eq!(exit, ExitReason::StepBudgetExceeded);
        assert_eq!(types(&events), vec!["start", "step", "step", "step", "error", "end"]);
        assert!(matches!(
            events[4].kind,
            EventKind::Error { reason: Some(ExitReason::StepBudgetExceeded), .. }
        ));
        assert!(matches!(
            events[5].kind,
            EventKind::End { exit: ExitReason::StepBudgetExceeded }
        ));
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_and_loop_continues() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call("c1", "launch_rockets", serde_json::json!({}))],
            "trying",
            "Could not do it.",
        ));
        let (exit, events) = run_collect(agent(provider.clone(), 5)).await;

        assert_eq!(exit, ExitReason::Completed);
        assert_eq!(types(&events), vec!["start", "step", "step", "complete", "end"]);
        let EventKind::Step(step) = &events[1].kind else {
            panic!("expected step");
        };
        assert_eq!(step.tool_results.len(), 1);
        assert_eq!(step.tool_results[0].error_code, Some(2));

        // The model saw the failure on its second turn
        let second = &provider.requests()[1];
        let tool_msg = second.messages.iter().find(|m| m.role == Role::Tool).unwrap();
        assert!(tool_msg.is_error);
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn tool_results_keep_call_order() {
        let calls = vec![
            make_tool_call("first", "launch_rockets", serde_json::json!({})),
            make_tool_call(
                "second",
                "sequentialthinking",
                serde_json::json!({
                    "thought": "t", "next_thought_needed": false,
                    "thought_number": 1, "total_thoughts": 1
                }),
            ),
            make_tool_call("third", "read_file", serde_json::json!({"filename": ""})),
        ];
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(calls, "", "done"));
        let (_, events) = run_collect(agent(provider.clone(), 5)).await;

        let EventKind::Step(step) = &events[1].kind else {
            panic!("expected step");
        };
        let ids: Vec<&str> = step.tool_results.iter().map(|r| r.call_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
        assert!(!step.tool_results[1].is_error());

        let history = &provider.requests()[1].messages;
        let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Tool, Role::Tool]
        );
        let tool_ids: Vec<_> = history[3..].iter().map(|m| m.tool_call_id.clone().unwrap()).collect();
        assert_eq!(tool_ids, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn provider_error_fails_the_task() {
        let provider = Arc::new(SequentialMockProvider::failing(ProviderError::AuthenticationFailed(
            "bad key".into(),
        )));
        let (exit, events) = run_collect(agent(provider, 5)).await;

        assert_eq!(exit, ExitReason::Failed);
        assert_eq!(types(&events), vec!["start", "error", "end"]);
        match &events[1].kind {
            EventKind::Error { error, step, .. } => {
                assert!(error.contains("bad key"));
                assert_eq!(*step, Some(1));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_terminates_in_flight_turn() {
        let agent = agent(Arc::new(HangingProvider), 5);
        let token = agent.cancellation_token();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move { agent.run(&tx).await });

        // Wait for the run to reach the provider call
        let first = rx.recv().await.unwrap();
        assert_eq!(first.event_type(), "start");
        token.cancel();

        assert_eq!(handle.await.unwrap(), ExitReason::Terminated);
        let error = rx.recv().await.unwrap();
        assert!(matches!(
            error.kind,
            EventKind::Error { reason: Some(ExitReason::Terminated), .. }
        ));
        assert!(rx.recv().await.unwrap().is_end());
    }

    #[tokio::test]
    async fn startup_failure_still_ends() {
        let mut spec = test_spec(5);
        spec.provider.provider = "openai".into();
        spec.provider.api_key = None;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let exit = run_task(&spec, CancellationToken::new(), &tx).await;
        assert_eq!(exit, ExitReason::Failed);

        let mut seen = Vec::new();
        while let Ok(e) = rx.try_recv() {
            seen.push(e.event_type());
        }
        assert_eq!(seen, vec!["start", "error", "end"]);
    }
}
