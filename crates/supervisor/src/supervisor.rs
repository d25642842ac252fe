//! The task supervisor: launches workers, keeps the registry, and answers
//! status, stream and stop requests.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::BoxStream;
use runbox_config::{IsolationMode, SupervisorConfig};
use runbox_core::event::{EventKind, ExitReason, TaskEvent};
use runbox_core::task::{TaskId, TaskSpec, TaskStatus};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::channel::{EventReceiver, event_channel};
use crate::error::SupervisorError;
use crate::launcher::{InProcessLauncher, Worker, WorkerLauncher};
use crate::process::ProcessLauncher;
use crate::stream::{encode_event, event_stream};

/// What the registry has learned about a task from its events.
struct EntryState {
    status: TaskStatus,
    /// Set once an `end` has been handed to a reader
    exit: Option<ExitReason>,
    /// Exit reported if the worker vanishes without an `end`
    lost_exit: ExitReason,
}

impl EntryState {
    fn observe(&mut self, event: &TaskEvent) {
        match &event.kind {
            EventKind::Complete { .. } if self.status == TaskStatus::Running => {
                self.status = TaskStatus::Completed;
            }
            EventKind::Error { reason: Some(_), .. } if self.status == TaskStatus::Running => {
                self.status = TaskStatus::Failed;
            }
            EventKind::End { exit } => {
                self.exit = Some(*exit);
                if self.status == TaskStatus::Running {
                    self.status = match exit {
                        ExitReason::Completed => TaskStatus::Completed,
                        ExitReason::Terminated => TaskStatus::Stopped,
                        _ => TaskStatus::Failed,
                    };
                }
            }
            _ => {}
        }
    }
}

/// One registered task: its worker, the reading half of its channel, and
/// what has been observed so far.
pub struct TaskEntry {
    task_id: TaskId,
    start_time: DateTime<Utc>,
    started: Instant,
    receiver: Mutex<EventReceiver>,
    worker: Mutex<Box<dyn Worker>>,
    state: Mutex<EntryState>,
}

impl TaskEntry {
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Drain every queued event.
    ///
    /// If the worker is gone and never reported its end, an `end` is
    /// appended once per task: `terminated` when a stop killed it,
    /// `worker_lost` otherwise.
    pub async fn poll_events(&self) -> Vec<TaskEvent> {
        let mut receiver = self.receiver.lock().await;
        // Liveness first: anything the worker sent before dying is queued by now
        let alive = self.worker.lock().await.is_alive();
        let mut events = receiver.drain();

        let mut state = self.state.lock().await;
        for event in &events {
            state.observe(event);
        }
        if !alive && state.exit.is_none() {
            if state.lost_exit == ExitReason::WorkerLost {
                warn!(task_id = %self.task_id, "Worker exited without reporting its end");
            }
            let end = TaskEvent::end(self.task_id.clone(), state.lost_exit);
            state.observe(&end);
            events.push(end);
        }
        events
    }

    /// Exit reason of an `end` some reader already received.
    pub async fn delivered_exit(&self) -> Option<ExitReason> {
        self.state.lock().await.exit
    }

    pub async fn status(&self) -> TaskStatus {
        self.state.lock().await.status
    }
}

/// A point-in-time view of one task. Building it consumes the buffered events.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub start_time: DateTime<Utc>,
    /// Seconds since the task started
    pub duration: f64,
    pub messages: Vec<serde_json::Value>,
}

/// A registry listing row. Listing never drains events.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub start_time: DateTime<Utc>,
    pub duration: f64,
}

fn already_registered(task_id: &TaskId) -> SupervisorError {
    SupervisorError::InvalidTask(format!("task id {task_id} is already registered"))
}

pub struct Supervisor {
    launcher: Arc<dyn WorkerLauncher>,
    tasks: RwLock<HashMap<TaskId, Arc<TaskEntry>>>,
    stop_grace: Duration,
    poll_interval: Duration,
}

impl Supervisor {
    pub fn new(launcher: Arc<dyn WorkerLauncher>) -> Self {
        let defaults = SupervisorConfig::default();
        Self {
            launcher,
            tasks: RwLock::new(HashMap::new()),
            stop_grace: defaults.stop_grace(),
            poll_interval: defaults.poll_interval(),
        }
    }

    /// Build a supervisor with the launcher the config's isolation mode names.
    pub fn from_config(config: &SupervisorConfig) -> Result<Self, SupervisorError> {
        let launcher: Arc<dyn WorkerLauncher> = match config.isolation {
            IsolationMode::InProcess => Arc::new(InProcessLauncher::new()),
            IsolationMode::Process => Arc::new(ProcessLauncher::current_exe()?),
        };
        Ok(Self::new(launcher)
            .with_stop_grace(config.stop_grace())
            .with_poll_interval(config.poll_interval()))
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Launch a worker for `spec` and register it. Does not wait for the
    /// task to make progress.
    pub async fn start(&self, spec: TaskSpec) -> Result<TaskId, SupervisorError> {
        if spec.step_budget == 0 {
            return Err(SupervisorError::InvalidTask("step budget must be positive".into()));
        }
        if !spec.working_directory.is_absolute() {
            return Err(SupervisorError::InvalidTask(format!(
                "working directory must be absolute: {}",
                spec.working_directory.display()
            )));
        }

        let task_id = spec.id.clone();
        if self.tasks.read().await.contains_key(&task_id) {
            return Err(already_registered(&task_id));
        }

        let (sender, receiver) = event_channel();
        let worker = self.launcher.launch(spec, sender).await?;

        let entry = Arc::new(TaskEntry {
            task_id: task_id.clone(),
            start_time: Utc::now(),
            started: Instant::now(),
            receiver: Mutex::new(receiver),
            worker: Mutex::new(worker),
            state: Mutex::new(EntryState {
                status: TaskStatus::Running,
                exit: None,
                lost_exit: ExitReason::WorkerLost,
            }),
        });

        // Another start with the same id may have launched meanwhile
        let taken = match self.tasks.write().await.entry(task_id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(entry.clone());
                false
            }
            Entry::Occupied(_) => true,
        };
        if taken {
            entry.worker.lock().await.kill().await;
            return Err(already_registered(&task_id));
        }

        info!(task_id = %task_id, "Task started");
        Ok(task_id)
    }

    async fn entry(&self, task_id: &TaskId) -> Result<Arc<TaskEntry>, SupervisorError> {
        self.tasks
            .read()
            .await
            .get(task_id)
            .cloned()
            .ok_or_else(|| SupervisorError::NotFound(task_id.clone()))
    }

    /// Status plus every event buffered since the last read.
    pub async fn status(&self, task_id: &TaskId) -> Result<TaskSnapshot, SupervisorError> {
        let entry = self.entry(task_id).await?;
        let events = entry.poll_events().await;
        Ok(TaskSnapshot {
            task_id: task_id.clone(),
            status: entry.status().await,
            start_time: entry.start_time(),
            duration: entry.elapsed().as_secs_f64(),
            messages: events.iter().map(encode_event).collect(),
        })
    }

    /// A live stream of the task's events as JSON records, ending after `end`.
    pub async fn stream(&self, task_id: &TaskId) -> Result<BoxStream<'static, serde_json::Value>, SupervisorError> {
        let entry = self.entry(task_id).await?;
        Ok(event_stream(entry, self.poll_interval).boxed())
    }

    /// Stop a task: ask the worker to wind down, give it the grace period,
    /// then kill it. The task is deregistered; stopping it again is `NotFound`.
    pub async fn stop(&self, task_id: &TaskId) -> Result<(), SupervisorError> {
        let entry = self
            .tasks
            .write()
            .await
            .remove(task_id)
            .ok_or_else(|| SupervisorError::NotFound(task_id.clone()))?;

        entry.state.lock().await.lost_exit = ExitReason::Terminated;
        {
            let mut worker = entry.worker.lock().await;
            if worker.is_alive() {
                worker.request_stop();
                if tokio::time::timeout(self.stop_grace, worker.wait()).await.is_err() {
                    warn!(
                        task_id = %task_id,
                        grace_secs = self.stop_grace.as_secs_f64(),
                        "Worker ignored stop request, killing it"
                    );
                    worker.kill().await;
                }
            }
        }

        entry.state.lock().await.status = TaskStatus::Stopped;
        info!(task_id = %task_id, "Task stopped");
        Ok(())
    }

    /// Every registered task, without consuming any events.
    pub async fn list(&self) -> Vec<TaskSummary> {
        let entries: Vec<Arc<TaskEntry>> = self.tasks.read().await.values().cloned().collect();
        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            rows.push(TaskSummary {
                task_id: entry.task_id().clone(),
                status: entry.status().await,
                start_time: entry.start_time(),
                duration: entry.elapsed().as_secs_f64(),
            });
        }
        rows.sort_by_key(|r| r.start_time);
        rows
    }

    /// Stop every registered task.
    pub async fn shutdown(&self) {
        let ids: Vec<TaskId> = self.tasks.read().await.keys().cloned().collect();
        debug!(tasks = ids.len(), "Stopping all tasks");
        for id in ids {
            if let Err(e) = self.stop(&id).await
                && !e.is_not_found()
            {
                warn!(task_id = %id, error = %e, "Failed to stop task during shutdown");
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}
