//! Trajectory recording: an optional log of every provider interaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use runbox_core::message::Message;
use runbox_core::provider::ProviderResponse;

/// One request/response exchange with a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmInteraction {
    pub timestamp: DateTime<Utc>,
    pub provider: String,
    pub model: String,
    /// Messages sent on this turn
    pub input_messages: Vec<Message>,
    pub response: ProviderResponse,
    /// Names of the tools offered to the model
    #[serde(default)]
    pub tools_available: Vec<String>,
}

/// Receives every provider interaction of a task.
pub trait TrajectorySink: Send + Sync {
    fn record(&self, interaction: &LlmInteraction);
}

/// Keeps interactions in memory.
#[derive(Default)]
pub struct InMemoryTrajectory {
    interactions: Mutex<Vec<LlmInteraction>>,
}

impl InMemoryTrajectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interactions(&self) -> Vec<LlmInteraction> {
        self.interactions
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl TrajectorySink for InMemoryTrajectory {
    fn record(&self, interaction: &LlmInteraction) {
        if let Ok(mut guard) = self.interactions.lock() {
            guard.push(interaction.clone());
        }
    }
}

/// Appends interactions to a file, one JSON object per line.
pub struct JsonlTrajectory {
    path: PathBuf,
    file: Mutex<std::fs::File>,
}

impl JsonlTrajectory {
    pub fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TrajectorySink for JsonlTrajectory {
    fn record(&self, interaction: &LlmInteraction) {
        let line = match serde_json::to_string(interaction) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Could not encode trajectory entry");
                return;
            }
        };
        if let Ok(mut file) = self.file.lock() {
            if let Err(e) = writeln!(file, "{line}") {
                tracing::warn!(path = %self.path.display(), error = %e, "Could not write trajectory entry");
            }
        }
    }
}
