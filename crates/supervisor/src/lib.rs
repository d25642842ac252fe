//! Task supervision for Runbox.
//!
//! The supervisor launches one isolated worker per task, keeps a registry
//! of running tasks, and exposes each task's progress through an ordered
//! event channel:
//!
//! - [`channel`]: the per-task event channel (single writer, drained reads)
//! - [`launcher`]: the worker abstraction and the in-process launcher
//! - [`process`]: OS-process isolation through `runbox worker`
//! - [`supervisor`]: the registry with `start`, `status`, `stream`, `stop`
//! - [`stream`]: the JSON encoding and the live stream adapter
//! - [`worker`]: the child-process side of the worker protocol

pub mod channel;
pub mod error;
pub mod launcher;
pub mod process;
pub mod stream;
pub mod supervisor;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use channel::{EventReceiver, EventSender, event_channel};
pub use error::SupervisorError;
pub use launcher::{InProcessLauncher, ProviderFactory, Worker, WorkerLauncher};
pub use process::ProcessLauncher;
pub use stream::{encode_event, event_stream};
pub use supervisor::{Supervisor, TaskEntry, TaskSnapshot, TaskSummary};
pub use worker::{StdoutSink, run_worker_stdio};
