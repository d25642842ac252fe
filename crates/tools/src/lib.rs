//! Built-in tool implementations for Runbox.
//!
//! Every task gets its own set of tools, rooted at the task's working
//! directory: relative filenames resolve against it, and stateful tools
//! (sequential thinking) never share state between tasks.

pub mod file_read;
pub mod file_write;
pub mod sequential_thinking;

use std::path::{Path, PathBuf};
use std::time::Duration;

use runbox_core::provider::ToolDefinition;
use runbox_core::tool::ToolRegistry;

pub use file_read::ReadFileTool;
pub use file_write::SaveFileTool;
pub use sequential_thinking::SequentialThinkingTool;

/// Resolve a model-supplied filename against the task's working directory.
///
/// Absolute paths are used as given.
pub fn resolve_path(working_dir: &Path, filename: &str) -> PathBuf {
    let path = Path::new(filename);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    }
}

/// Create a fresh registry with all built-in tools for one task.
pub fn default_registry(working_dir: &Path, timeout: Duration) -> ToolRegistry {
    let mut registry = ToolRegistry::new().with_timeout(timeout);
    registry.register(Box::new(ReadFileTool::new(working_dir)));
    registry.register(Box::new(SaveFileTool::new(working_dir)));
    registry.register(Box::new(SequentialThinkingTool::new()));
    registry
}

/// Definitions of the built-in tools, sorted by name.
pub fn tool_catalog() -> Vec<ToolDefinition> {
    default_registry(Path::new("."), runbox_core::tool::DEFAULT_TOOL_TIMEOUT).definitions()
}

#[cfg(test)]
mod tests {
    use super::*;
    use runbox_core::tool::ToolCall;

    #[test]
    fn catalog_lists_builtin_tools() {
        let names: Vec<String> = tool_catalog().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["read_file", "save_file", "sequentialthinking"]);
    }

    #[test]
    fn relative_paths_join_working_dir() {
        let root = Path::new("/work/task-1");
        assert_eq!(resolve_path(root, "src/main.rs"), PathBuf::from("/work/task-1/src/main.rs"));
        assert_eq!(resolve_path(root, "/etc/hosts"), PathBuf::from("/etc/hosts"));
    }

    #[tokio::test]
    async fn registry_round_trip_through_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let registry = default_registry(dir.path(), Duration::from_secs(5));

        let save = ToolCall {
            id: "c1".into(),
            name: "save_file".into(),
            arguments: serde_json::json!({"filename": "report.md", "content": "hello"}),
        };
        assert!(!registry.invoke(&save).await.is_error());

        let read = ToolCall {
            id: "c2".into(),
            name: "read_file".into(),
            arguments: serde_json::json!({"filename": "report.md"}),
        };
        let result = registry.invoke(&read).await;
        assert_eq!(result.call_id, "c2");
        assert!(result.output.unwrap().ends_with("hello"));
    }

    #[tokio::test]
    async fn registries_do_not_share_thinking_state() {
        let a = default_registry(Path::new("."), Duration::from_secs(5));
        let b = default_registry(Path::new("."), Duration::from_secs(5));
        let call = ToolCall {
            id: "t1".into(),
            name: "sequentialthinking".into(),
            arguments: serde_json::json!({
                "thought": "x", "next_thought_needed": false,
                "thought_number": 1, "total_thoughts": 1
            }),
        };
        a.invoke(&call).await;
        let second = b.invoke(&call).await;
        assert!(second.output.unwrap().contains("\"thought_history_length\": 1"));
    }
}
