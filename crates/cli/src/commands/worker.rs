//! `runbox worker`: the child-process side of process isolation.
//!
//! Exit codes: 0 when the task completed, 1 when it ended any other way,
//! 2 when no task could be read from stdin.

use tracing::error;

pub async fn run() -> i32 {
    match runbox_supervisor::run_worker_stdio().await {
        Ok(exit) if exit.is_success() => 0,
        Ok(_) => 1,
        Err(e) => {
            error!(error = %e, "Worker could not start");
            2
        }
    }
}
