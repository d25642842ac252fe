use runbox_core::task::TaskId;

/// Supervisor errors. Lookups of unknown tasks are a value, never a panic.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Failed to launch worker: {0}")]
    Launch(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SupervisorError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SupervisorError::NotFound(_))
    }
}
