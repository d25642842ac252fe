//! File read tool: read a whole file or an inclusive line range.

use async_trait::async_trait;
use runbox_core::error::ToolError;
use runbox_core::tool::Tool;
use std::path::PathBuf;

use crate::resolve_path;

pub struct ReadFileTool {
    /// Relative filenames resolve against this directory
    working_dir: PathBuf,
}

impl ReadFileTool {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }
}

fn failed(reason: String) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: "read_file".into(),
        reason,
    }
}

fn optional_line(arguments: &serde_json::Value, key: &str) -> Result<Option<i64>, ToolError> {
    match &arguments[key] {
        serde_json::Value::Null => Ok(None),
        v => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| ToolError::InvalidArguments(format!("'{key}' must be an integer"))),
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read content from a file.\n\
         * Reads the whole file, or a range of lines when start_line/end_line are given.\n\
         * Line numbers are 1-based and end_line is inclusive.\n\
         * Relative paths resolve against the task's working directory."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "filename": {
                    "type": "string",
                    "description": "Path of the file to read"
                },
                "start_line": {
                    "type": "integer",
                    "description": "First line to read (1-based). Defaults to the first line."
                },
                "end_line": {
                    "type": "integer",
                    "description": "Last line to read (inclusive). Defaults to the end of the file."
                }
            },
            "required": ["filename"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let filename = arguments["filename"]
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'filename' argument".into()))?;
        let start_line = optional_line(&arguments, "start_line")?;
        let end_line = optional_line(&arguments, "end_line")?;

        let path = resolve_path(&self.working_dir, filename);
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => failed(format!("File does not exist: {filename}")),
            std::io::ErrorKind::PermissionDenied => ToolError::PermissionDenied {
                tool_name: "read_file".into(),
                reason: e.to_string(),
            },
            std::io::ErrorKind::InvalidData => failed(format!("File is not valid UTF-8: {e}")),
            _ => failed(format!("Failed to read file: {e}")),
        })?;

        if start_line.is_none() && end_line.is_none() {
            let line_count = if content.is_empty() { 0 } else { content.matches('\n').count() + 1 };
            return Ok(format!(
                "Read '{filename}' ({line_count} lines, {} chars)\n\n{content}",
                content.chars().count()
            ));
        }

        let lines: Vec<&str> = content.split_inclusive('\n').collect();
        let total = lines.len() as i64;
        let start_idx = start_line.map(|n| n.saturating_sub(1)).unwrap_or(0).max(0);
        let end_idx = end_line.unwrap_or(total).min(total);
        if start_idx >= end_idx {
            return Err(ToolError::InvalidArguments(
                "start_line must be less than or equal to end_line and within the file".into(),
            ));
        }

        let selected = lines[start_idx as usize..end_idx as usize].concat();
        Ok(format!(
            "Read '{filename}' lines {}-{end_idx} ({} lines, {} chars)\n\n{selected}",
            start_idx + 1,
            end_idx - start_idx,
            selected.chars().count()
        ))
    }
}
