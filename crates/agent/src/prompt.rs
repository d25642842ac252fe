//! Prompt text seeded into every new conversation.

use std::path::Path;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert software engineering agent. \
You complete the user's task by working step by step inside the given project directory.

Guidelines:
- Inspect files with read_file before changing them.
- Write results with save_file. Relative paths are resolved against the project root.
- Use sequentialthinking to plan multi-step work and to revise your plan.
- Call tools whenever they help; you may call several in one turn.
- When the task is done, reply with a concise final answer and no tool calls.";

/// The first user message: the instruction plus where to work.
pub fn task_message(instruction: &str, working_directory: &Path) -> String {
    format!(
        "[Project root path]:\n{}\n\n[Task]:\n{}",
        working_directory.display(),
        instruction
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_message_names_the_directory() {
        let msg = task_message("fix the build", Path::new("/work/app"));
        assert!(msg.starts_with("[Project root path]:\n/work/app"));
        assert!(msg.ends_with("fix the build"));
    }
}
