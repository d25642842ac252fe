//! Worker launchers: how a task gets its own isolated execution context.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use runbox_agent::{AgentLoop, report_startup_failure};
use runbox_core::error::ProviderError;
use runbox_core::event::ExitReason;
use runbox_core::provider::Provider;
use runbox_core::task::{ProviderSettings, TaskSpec};
use runbox_providers::LlmClient;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::channel::EventSender;
use crate::error::SupervisorError;

/// Starts workers. One worker runs exactly one task.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    /// Start a worker for `spec` that reports through `events`.
    /// Returns as soon as the worker is running.
    async fn launch(&self, spec: TaskSpec, events: EventSender) -> Result<Box<dyn Worker>, SupervisorError>;
}

/// Control handle for one running worker.
#[async_trait]
pub trait Worker: Send {
    /// False once the worker can no longer produce events.
    fn is_alive(&mut self) -> bool;

    /// Ask the worker to wind down cooperatively.
    fn request_stop(&mut self);

    /// Wait until the worker has exited.
    async fn wait(&mut self);

    /// Terminate the worker without waiting for it to cooperate.
    async fn kill(&mut self);
}

/// Builds the provider a task talks to.
pub type ProviderFactory =
    Arc<dyn Fn(&ProviderSettings) -> Result<Arc<dyn Provider>, ProviderError> + Send + Sync>;

/// Runs each worker as a tokio task in this process.
///
/// Every worker still gets its own provider client, tool registry and
/// conversation; nothing is shared between tasks.
pub struct InProcessLauncher {
    providers: ProviderFactory,
}

impl InProcessLauncher {
    pub fn new() -> Self {
        Self {
            providers: Arc::new(runbox_providers::build_provider),
        }
    }

    /// Use `factory` instead of the built-in provider adapters.
    pub fn with_provider_factory(factory: ProviderFactory) -> Self {
        Self { providers: factory }
    }
}

impl Default for InProcessLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkerLauncher for InProcessLauncher {
    async fn launch(&self, spec: TaskSpec, events: EventSender) -> Result<Box<dyn Worker>, SupervisorError> {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let providers = Arc::clone(&self.providers);

        let handle = tokio::spawn(async move {
            match providers(&spec.provider) {
                Ok(provider) => {
                    let client = LlmClient::new(provider, &spec.provider);
                    let tools = runbox_tools::default_registry(
                        &spec.working_directory,
                        Duration::from_secs(spec.tool_timeout_secs),
                    );
                    AgentLoop::new(&spec, client, tools)
                        .with_cancellation(token)
                        .run(&events)
                        .await
                }
                Err(e) => report_startup_failure(&spec, &e, &events),
            }
        });

        Ok(Box::new(InProcessWorker { handle, cancel }))
    }
}

struct InProcessWorker {
    handle: JoinHandle<ExitReason>,
    cancel: CancellationToken,
}

#[async_trait]
impl Worker for InProcessWorker {
    fn is_alive(&mut self) -> bool {
        !self.handle.is_finished()
    }

    fn request_stop(&mut self) {
        self.cancel.cancel();
    }

    async fn wait(&mut self) {
        if self.handle.is_finished() {
            return;
        }
        match (&mut self.handle).await {
            Ok(exit) => debug!(?exit, "In-process worker exited"),
            Err(e) if e.is_panic() => warn!("In-process worker panicked"),
            Err(_) => debug!("In-process worker was aborted"),
        }
    }

    async fn kill(&mut self) {
        self.handle.abort();
        self.wait().await;
    }
}
