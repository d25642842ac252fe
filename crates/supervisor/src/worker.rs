//! Child side of process isolation: the body of `runbox worker`.
//!
//! Reads one `TaskSpec` JSON line from stdin, runs the task, and writes
//! every event to stdout as a JSON line. EOF on stdin cancels the task.
//! Nothing but events may go to stdout; logs belong on stderr.

use std::io::{BufRead, Write};

use runbox_agent::{EventSink, run_task};
use runbox_core::event::{ExitReason, TaskEvent};
use runbox_core::task::TaskSpec;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::SupervisorError;
use crate::stream::encode_event;

/// Writes events to stdout, one JSON record per line.
pub struct StdoutSink;

impl EventSink for StdoutSink {
    fn emit(&self, event: TaskEvent) {
        let line = encode_event(&event).to_string();
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
            debug!(error = %e, "Could not write event to stdout");
        }
    }
}

/// Run one task under the stdin/stdout worker protocol.
pub async fn run_worker_stdio() -> Result<ExitReason, SupervisorError> {
    let first = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line).map(|_| line)
    })
    .await
    .map_err(|e| SupervisorError::Launch(format!("stdin reader failed: {e}")))??;

    if first.trim().is_empty() {
        return Err(SupervisorError::InvalidTask("no task spec on stdin".into()));
    }
    let spec: TaskSpec = serde_json::from_str(first.trim())?;
    info!(task_id = %spec.id, "Worker received task");

    let cancel = CancellationToken::new();
    let on_eof = cancel.clone();
    // A plain thread, so a blocked stdin read never holds up process exit
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            if line.is_err() {
                break;
            }
        }
        debug!("Stdin closed, cancelling task");
        on_eof.cancel();
    });

    Ok(run_task(&spec, cancel, &StdoutSink).await)
}
