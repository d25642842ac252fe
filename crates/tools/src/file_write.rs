//! File save tool: overwrite or append, creating parent directories.

use async_trait::async_trait;
use runbox_core::error::ToolError;
use runbox_core::tool::Tool;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

use crate::resolve_path;

pub struct SaveFileTool {
    /// Relative filenames resolve against this directory
    working_dir: PathBuf,
}

impl SaveFileTool {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }
}

fn failed(reason: String) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: "save_file".into(),
        reason,
    }
}

#[async_trait]
impl Tool for SaveFileTool {
    fn name(&self) -> &str {
        "save_file"
    }

    fn description(&self) -> &str {
        "Save content to a file using the given write mode.\n\
         * Mode 'a' appends to the existing content; 'w' replaces it.\n\
         * Missing parent directories are created.\n\
         * Relative paths resolve against the task's working directory."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "filename": {
                    "type": "string",
                    "description": "Path of the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                },
                "mode": {
                    "type": "string",
                    "enum": ["a", "w"],
                    "description": "'a' to append, 'w' to overwrite. Defaults to 'w'."
                }
            },
            "required": ["filename", "content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let filename = arguments["filename"]
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'filename' argument".into()))?;

        let content = arguments["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;

        let append = match arguments["mode"].as_str().unwrap_or("w") {
            "w" => false,
            "a" => true,
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "mode must be 'a' (append) or 'w' (overwrite), got '{other}'"
                )));
            }
        };

        let path = resolve_path(&self.working_dir, filename);

        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Err(failed(format!("Failed to create directory: {e}")));
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::PermissionDenied => ToolError::PermissionDenied {
                    tool_name: "save_file".into(),
                    reason: e.to_string(),
                },
                _ => failed(format!("Failed to open file: {e}")),
            })?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| failed(format!("Failed to write file: {e}")))?;
        file.flush()
            .await
            .map_err(|e| failed(format!("Failed to write file: {e}")))?;

        let action = if append { "appended to" } else { "written to" };
        Ok(format!(
            "Content {action} '{filename}' ({} chars)",
            content.chars().count()
        ))
    }
}
