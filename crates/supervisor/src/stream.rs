//! The stream adapter: turns a task's channel into JSON records.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use runbox_core::event::{EventKind, TaskEvent};
use tracing::{debug, warn};

use crate::supervisor::TaskEntry;

/// Encode one event as a self-describing JSON record.
///
/// An event that cannot be encoded is replaced by an `error` event carrying
/// the original's debug rendering, so a reader never sees a gap.
pub fn encode_event(event: &TaskEvent) -> serde_json::Value {
    match serde_json::to_value(event) {
        Ok(value) => value,
        Err(e) => {
            warn!(task_id = %event.task_id, error = %e, "Could not encode event");
            let substitute = TaskEvent::new(
                event.task_id.clone(),
                EventKind::Error {
                    error: format!("Failed to encode {} event: {e}", event.event_type()),
                    reason: None,
                    step: None,
                    original_message: Some(format!("{event:?}")),
                },
            );
            serde_json::to_value(&substitute).unwrap_or_else(|_| {
                serde_json::json!({
                    "type": "error",
                    "task_id": event.task_id.as_str(),
                    "error": "Failed to encode event",
                })
            })
        }
    }
}

struct StreamState {
    entry: Arc<TaskEntry>,
    pending: VecDeque<TaskEvent>,
    poll_interval: Duration,
    done: bool,
}

/// Relay a task's events as they arrive, finishing after `end`.
///
/// Events are consumed: a second reader on the same task sees only what
/// this one has not taken. If the `end` was already taken by another
/// reader, this stream closes with a copy of it.
pub fn event_stream(
    entry: Arc<TaskEntry>,
    poll_interval: Duration,
) -> impl Stream<Item = serde_json::Value> + Send + 'static {
    let state = StreamState {
        entry,
        pending: VecDeque::new(),
        poll_interval,
        done: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if state.done {
                return None;
            }
            if let Some(event) = state.pending.pop_front() {
                if event.is_end() {
                    state.done = true;
                }
                return Some((encode_event(&event), state));
            }

            let batch = state.entry.poll_events().await;
            if !batch.is_empty() {
                state.pending.extend(batch);
                continue;
            }

            if let Some(exit) = state.entry.delivered_exit().await {
                debug!(task_id = %state.entry.task_id(), "End already consumed, closing stream");
                state
                    .pending
                    .push_back(TaskEvent::end(state.entry.task_id().clone(), exit));
                continue;
            }

            tokio::time::sleep(state.poll_interval).await;
        }
    })
}
