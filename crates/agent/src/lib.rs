//! The agent loop: the turn-by-turn state machine that runs inside a
//! worker.
//!
//! The agent follows a **Turn → Act → Observe** cycle:
//!
//! 1. **Seed** the conversation with the system prompt and the task
//! 2. **Send** the conversation to the provider client
//! 3. **If tool calls**: execute them in order, append results, loop back to step 2
//! 4. **If a final answer**: report it and stop
//!
//! The loop also stops when the step budget runs out, when the provider
//! fails, or when the task's cancellation token fires. Progress goes out
//! through an [`EventSink`], and the last event is always `end`.

pub mod loop_runner;
pub mod prompt;
pub mod sink;

#[cfg(test)]
mod test_helpers;

pub use loop_runner::{AgentLoop, report_startup_failure, run_task};
pub use sink::EventSink;
