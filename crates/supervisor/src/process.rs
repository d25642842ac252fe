//! OS-process isolation: each task runs in a child `runbox worker`.
//!
//! Protocol:
//! - the parent writes the `TaskSpec` as one JSON line on the child's stdin
//!   and keeps stdin open;
//! - the child writes one JSON `TaskEvent` per line on stdout and logs to
//!   stderr;
//! - closing stdin asks the child to stop; SIGKILL ends it regardless.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use runbox_agent::EventSink;
use runbox_core::event::{EventKind, TaskEvent};
use runbox_core::task::{TaskId, TaskSpec};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channel::EventSender;
use crate::error::SupervisorError;
use crate::launcher::{Worker, WorkerLauncher};

pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessLauncher {
    /// Launch `program` with `args`; it must speak the worker protocol.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Re-run the current executable as `<exe> worker`.
    pub fn current_exe() -> Result<Self, SupervisorError> {
        let exe = std::env::current_exe()?;
        Ok(Self::new(exe, vec!["worker".into()]))
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(&self, spec: TaskSpec, events: EventSender) -> Result<Box<dyn Worker>, SupervisorError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            error!(program = %self.program.display(), error = %e, "Failed to spawn worker process");
            SupervisorError::Launch(format!("could not spawn {}: {e}", self.program.display()))
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SupervisorError::Launch("worker stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SupervisorError::Launch("worker stdout unavailable".into()))?;

        let mut line = serde_json::to_string(&spec)?;
        line.push('\n');
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;

        info!(task_id = %spec.id, pid = ?child.id(), "Worker process started");

        let reader = tokio::spawn(forward_events(spec.id.clone(), stdout, events));

        Ok(Box::new(ProcessWorker {
            child,
            stdin: Some(stdin),
            reader,
        }))
    }
}

/// Relay the child's stdout into the task's channel until EOF.
async fn forward_events(task_id: TaskId, stdout: ChildStdout, events: EventSender) {
    let mut lines = BufReader::new(stdout).lines();
    let mut count = 0u64;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                count += 1;
                match serde_json::from_str::<TaskEvent>(trimmed) {
                    Ok(event) => events.emit(event),
                    Err(e) => {
                        warn!(task_id = %task_id, error = %e, "Undecodable worker output");
                        events.emit(TaskEvent::new(
                            task_id.clone(),
                            EventKind::Error {
                                error: format!("Undecodable worker output: {e}"),
                                reason: None,
                                step: None,
                                original_message: Some(trimmed.to_string()),
                            },
                        ));
                    }
                }
            }
            Ok(None) => {
                debug!(task_id = %task_id, lines = count, "Worker stdout closed");
                break;
            }
            Err(e) => {
                error!(task_id = %task_id, error = %e, "Error reading worker stdout");
                break;
            }
        }
    }
}

struct ProcessWorker {
    child: Child,
    stdin: Option<ChildStdin>,
    /// Alive until every line the child wrote has been forwarded
    reader: JoinHandle<()>,
}

#[async_trait]
impl Worker for ProcessWorker {
    fn is_alive(&mut self) -> bool {
        !self.reader.is_finished() || matches!(self.child.try_wait(), Ok(None))
    }

    fn request_stop(&mut self) {
        // EOF on stdin is the worker's cancellation signal
        self.stdin.take();
    }

    async fn wait(&mut self) {
        match self.child.wait().await {
            Ok(status) => debug!(code = ?status.code(), "Worker process exited"),
            Err(e) => warn!(error = %e, "Could not wait for worker process"),
        }
    }

    async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "Could not kill worker process");
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::channel::event_channel;
    use crate::test_support::test_spec;
    use std::time::Duration;

    fn shell(script: &str) -> ProcessLauncher {
        ProcessLauncher::new("sh", vec!["-c".into(), script.into()])
    }

    async fn wait_dead(worker: &mut Box<dyn Worker>) {
        for _ in 0..200 {
            if !worker.is_alive() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("worker did not exit");
    }

    #[tokio::test]
    async fn child_receives_spec_and_events_are_decoded() {
        let spec = test_spec(2);
        let end = serde_json::to_string(&TaskEvent::end(
            spec.id.clone(),
            runbox_core::event::ExitReason::Completed,
        ))
        .unwrap();
        // Echo the task id back as proof the child read it, then emit end
        let launcher = shell(&format!(
            "read spec; case \"$spec\" in *{}*) echo '{}';; esac",
            spec.id, end
        ));
        let (tx, mut rx) = event_channel();
        let mut worker = launcher.launch(spec, tx).await.unwrap();
        wait_dead(&mut worker).await;

        let events = rx.drain();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_end());
    }

    #[tokio::test]
    async fn undecodable_lines_become_error_events() {
        let launcher = shell("read spec; echo 'this is not json'");
        let (tx, mut rx) = event_channel();
        let mut worker = launcher.launch(test_spec(2), tx).await.unwrap();
        wait_dead(&mut worker).await;

        let events = rx.drain();
        assert_eq!(events.len(), 1);
        match &events[0].kind {
            EventKind::Error { original_message, reason, .. } => {
                assert_eq!(original_message.as_deref(), Some("this is not json"));
                assert!(reason.is_none());
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn closing_stdin_stops_a_cooperative_child() {
        let launcher = shell("read spec; cat > /dev/null");
        let (tx, _rx) = event_channel();
        let mut worker = launcher.launch(test_spec(2), tx).await.unwrap();
        assert!(worker.is_alive());

        worker.request_stop();
        tokio::time::timeout(Duration::from_secs(5), worker.wait())
            .await
            .expect("child should exit on stdin EOF");
    }

    #[tokio::test]
    async fn kill_ends_an_uncooperative_child() {
        let launcher = shell("read spec; exec sleep 30");
        let (tx, _rx) = event_channel();
        let mut worker = launcher.launch(test_spec(2), tx).await.unwrap();

        worker.request_stop();
        worker.kill().await;
        wait_dead(&mut worker).await;
    }

    #[tokio::test]
    async fn missing_program_is_a_launch_error() {
        let launcher = ProcessLauncher::new("/nonexistent/runbox-worker", vec![]);
        let (tx, _rx) = event_channel();
        let err = launcher.launch(test_spec(2), tx).await.err().unwrap();
        assert!(matches!(err, SupervisorError::Launch(_)));
    }
}
