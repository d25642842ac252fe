//! `runbox run`: run one task in the foreground.
//!
//! Events go to stdout as JSON lines, logs to stderr. Ctrl-C cancels the
//! task, which still ends with an `end` event.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgGroup, Args};
use runbox_agent::{AgentLoop, report_startup_failure};
use runbox_config::{AppConfig, ProviderOverrides};
use runbox_core::task::{TaskId, TaskSpec};
use runbox_providers::{JsonlTrajectory, LlmClient};
use runbox_supervisor::StdoutSink;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("source").required(true).args(["task", "file"])))]
pub struct RunArgs {
    /// The task instruction
    #[arg(short, long)]
    pub task: Option<String>,

    /// Read the task instruction from a file
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Directory the task works in (created if missing)
    #[arg(short, long)]
    pub working_dir: Option<PathBuf>,

    /// Step budget
    #[arg(long)]
    pub max_steps: Option<u32>,

    #[arg(long)]
    pub provider: Option<String>,

    #[arg(short, long)]
    pub model: Option<String>,

    /// Provider base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Append every provider interaction to this JSONL file
    #[arg(long)]
    pub trajectory_file: Option<PathBuf>,
}

pub async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let cwd = std::env::current_dir()?;
    let spec = build_spec(&config, &args, &cwd).await?;

    info!(
        task_id = %spec.id,
        provider = %spec.provider.provider,
        model = %spec.provider.model,
        dir = %spec.working_directory.display(),
        "Running task"
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling task");
            on_signal.cancel();
        }
    });

    let exit = match LlmClient::from_settings(&spec.provider) {
        Ok(mut client) => {
            if let Some(path) = &args.trajectory_file {
                client = client.with_trajectory(Arc::new(JsonlTrajectory::create(path)?));
            }
            let tools = runbox_tools::default_registry(
                &spec.working_directory,
                Duration::from_secs(spec.tool_timeout_secs),
            );
            AgentLoop::new(&spec, client, tools)
                .with_cancellation(cancel)
                .run(&StdoutSink)
                .await
        }
        Err(e) => report_startup_failure(&spec, &e, &StdoutSink),
    };

    if exit.is_success() {
        Ok(())
    } else {
        Err(format!("Task ended without completing: {exit:?}").into())
    }
}

/// Resolve the arguments against the config into a runnable task.
async fn build_spec(
    config: &AppConfig,
    args: &RunArgs,
    cwd: &Path,
) -> Result<TaskSpec, Box<dyn std::error::Error>> {
    let instruction = match (&args.task, &args.file) {
        (Some(task), None) => task.clone(),
        (None, Some(file)) => tokio::fs::read_to_string(file)
            .await
            .map_err(|e| format!("Error reading file {}: {e}", file.display()))?,
        _ => return Err("Provide exactly one of --task or --file".into()),
    };

    let step_budget = args.max_steps.unwrap_or(config.agent.max_steps);
    if step_budget == 0 {
        return Err("--max-steps must be at least 1".into());
    }

    let working_directory = match &args.working_dir {
        Some(dir) => cwd.join(dir),
        None => cwd.to_path_buf(),
    };
    tokio::fs::create_dir_all(&working_directory).await?;

    let overrides = ProviderOverrides {
        provider: args.provider.clone(),
        model: args.model.clone(),
        base_url: args.base_url.clone(),
        ..Default::default()
    };

    Ok(TaskSpec {
        id: TaskId::new(),
        instruction,
        working_directory,
        step_budget,
        provider: config.resolve_provider(&overrides),
        system_prompt: config.agent.system_prompt.clone(),
        tool_timeout_secs: config.agent.tool_timeout_secs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> RunArgs {
        RunArgs {
            task: None,
            file: None,
            working_dir: None,
            max_steps: None,
            provider: None,
            model: None,
            base_url: None,
            trajectory_file: None,
        }
    }

    #[tokio::test]
    async fn spec_from_task_uses_config_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = AppConfig::default();
        let spec = build_spec(
            &config,
            &RunArgs {
                task: Some("List files".into()),
                ..args()
            },
            tmp.path(),
        )
        .await
        .unwrap();

        assert_eq!(spec.instruction, "List files");
        assert_eq!(spec.working_directory, tmp.path());
        assert_eq!(spec.step_budget, config.agent.max_steps);
        assert_eq!(spec.provider.provider, "openai");
    }

    #[tokio::test]
    async fn spec_from_file_creates_relative_working_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("task.txt");
        std::fs::write(&file, "Fix the bug").unwrap();

        let spec = build_spec(
            &AppConfig::default(),
            &RunArgs {
                file: Some(file),
                working_dir: Some("project".into()),
                max_steps: Some(7),
                provider: Some("anthropic".into()),
                model: Some("claude-test".into()),
                ..args()
            },
            tmp.path(),
        )
        .await
        .unwrap();

        assert_eq!(spec.instruction, "Fix the bug");
        assert_eq!(spec.working_directory, tmp.path().join("project"));
        assert!(spec.working_directory.is_dir());
        assert_eq!(spec.step_budget, 7);
        assert_eq!(spec.provider.provider, "anthropic");
        assert_eq!(spec.provider.model, "claude-test");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let result = build_spec(
            &AppConfig::default(),
            &RunArgs {
                file: Some(tmp.path().join("missing.txt")),
                ..args()
            },
            tmp.path(),
        )
        .await;
        assert!(result.unwrap_err().to_string().contains("Error reading file"));
    }

    #[tokio::test]
    async fn zero_step_budget_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let result = build_spec(
            &AppConfig::default(),
            &RunArgs {
                task: Some("x".into()),
                max_steps: Some(0),
                ..args()
            },
            tmp.path(),
        )
        .await;
        assert!(result.is_err());
    }
}
