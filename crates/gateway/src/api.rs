//! The `/api` task endpoints.
//!
//! - `GET  /health`              liveness
//! - `POST /run`                 submit a task, returns its id
//! - `GET  /tasks`               registry listing (never drains events)
//! - `GET  /tasks/{id}/status`   snapshot plus the events buffered since the last read
//! - `GET  /tasks/{id}/stream`   SSE, one `data:` record per event, closes after `end`
//! - `POST /tasks/{id}/stop`     stop and unregister a task
//! - `GET  /tools`               built-in tool catalog
//! - `GET  /config`              resolved provider settings, key redacted

use std::convert::Infallible;
use std::path::PathBuf;

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{
        Json,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::StreamExt;
use runbox_config::{IsolationMode, ProviderOverrides};
use runbox_core::task::{TaskId, TaskSpec, TaskStatus};
use runbox_supervisor::{SupervisorError, TaskSummary};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::SharedState;

/// Build the API router. Paths are relative to the `/api` mount point.
pub fn api_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/run", post(run_handler))
        .route("/tasks", get(list_tasks_handler))
        .route("/tasks/{id}/status", get(task_status_handler))
        .route("/tasks/{id}/stream", get(task_stream_handler))
        .route("/tasks/{id}/stop", post(stop_task_handler))
        .route("/tools", get(tools_handler))
        .route("/config", get(config_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct RunRequest {
    #[serde(default)]
    task: Option<String>,
    #[serde(default)]
    file_path: Option<String>,
    #[serde(default)]
    working_dir: Option<String>,
    #[serde(default)]
    max_steps: Option<u32>,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default, alias = "base_url")]
    model_base_url: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    max_retries: Option<u32>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    message: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct RunResponse {
    status: &'static str,
    task_id: TaskId,
    message: String,
}

#[derive(Serialize)]
struct TaskListResponse {
    status: &'static str,
    active_tasks: Vec<TaskSummary>,
    total_tasks: usize,
}

#[derive(Serialize)]
struct TaskStatusResponse {
    status: &'static str,
    task_id: TaskId,
    task_status: TaskStatus,
    start_time: String,
    duration: f64,
    messages: Vec<serde_json::Value>,
}

#[derive(Serialize)]
struct StopResponse {
    status: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ToolDto {
    name: String,
    description: String,
}

#[derive(Serialize)]
struct ToolListResponse {
    status: &'static str,
    tools: Vec<ToolDto>,
    total_tools: usize,
}

#[derive(Serialize)]
struct ConfigResponse {
    status: &'static str,
    provider: String,
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    base_url: Option<String>,
    api_key_set: bool,
    max_steps: u32,
    max_retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    isolation: IsolationMode,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn supervisor_error(e: SupervisorError) -> ApiError {
    match e {
        SupervisorError::NotFound(_) => api_error(StatusCode::NOT_FOUND, "Task not found"),
        SupervisorError::InvalidTask(msg) => api_error(StatusCode::BAD_REQUEST, msg),
        other => api_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        message: "Runbox API is running",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn run_handler(
    State(state): State<SharedState>,
    Json(payload): Json<RunRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    let instruction = match (&payload.task, &payload.file_path) {
        (Some(_), Some(_)) => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "Provide either task or file_path, not both",
            ));
        }
        (None, None) => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "Either task or file_path is required",
            ));
        }
        (Some(task), None) => task.clone(),
        (None, Some(path)) => tokio::fs::read_to_string(path).await.map_err(|e| {
            api_error(StatusCode::BAD_REQUEST, format!("Error reading file: {e}"))
        })?,
    };

    if payload.max_steps == Some(0) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "max_steps must be at least 1",
        ));
    }

    let working_directory = resolve_working_dir(payload.working_dir.as_deref())
        .await
        .map_err(|e| {
            api_error(
                StatusCode::BAD_REQUEST,
                format!("Cannot prepare working directory: {e}"),
            )
        })?;

    let overrides = ProviderOverrides {
        provider: payload.provider,
        model: payload.model,
        base_url: payload.model_base_url,
        api_key: payload.api_key,
        max_retries: payload.max_retries,
    };
    let config = &state.config;
    let spec = TaskSpec {
        id: TaskId::new(),
        instruction,
        working_directory,
        step_budget: payload.max_steps.unwrap_or(config.agent.max_steps),
        provider: config.resolve_provider(&overrides),
        system_prompt: config.agent.system_prompt.clone(),
        tool_timeout_secs: config.agent.tool_timeout_secs,
    };

    info!(
        task_id = %spec.id,
        provider = %spec.provider.provider,
        model = %spec.provider.model,
        dir = %spec.working_directory.display(),
        "api/run request"
    );

    let task_id = state
        .supervisor
        .start(spec)
        .await
        .map_err(supervisor_error)?;

    Ok(Json(RunResponse {
        status: "success",
        message: format!("Task started with ID: {task_id}"),
        task_id,
    }))
}

/// Relative directories resolve against the server's cwd. The directory is
/// created when missing.
async fn resolve_working_dir(dir: Option<&str>) -> std::io::Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    let dir = match dir {
        Some(d) if !d.trim().is_empty() => cwd.join(d),
        _ => cwd,
    };
    tokio::fs::create_dir_all(&dir).await?;
    Ok(dir)
}

async fn list_tasks_handler(State(state): State<SharedState>) -> Json<TaskListResponse> {
    let tasks = state.supervisor.list().await;
    Json(TaskListResponse {
        status: "success",
        total_tasks: tasks.len(),
        active_tasks: tasks,
    })
}

async fn task_status_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    let snapshot = state
        .supervisor
        .status(&TaskId::from(id.as_str()))
        .await
        .map_err(supervisor_error)?;

    Ok(Json(TaskStatusResponse {
        status: "success",
        task_id: snapshot.task_id,
        task_status: snapshot.status,
        start_time: snapshot.start_time.to_rfc3339(),
        duration: snapshot.duration,
        messages: snapshot.messages,
    }))
}

async fn task_stream_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let records = state
        .supervisor
        .stream(&TaskId::from(id.as_str()))
        .await
        .map_err(supervisor_error)?;

    info!(task_id = %id, "api/tasks stream opened");
    let stream =
        records.map(|record| Ok::<_, Infallible>(SseEvent::default().data(record.to_string())));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn stop_task_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<StopResponse>, ApiError> {
    let task_id = TaskId::from(id.as_str());
    if let Err(e) = state.supervisor.stop(&task_id).await {
        if !e.is_not_found() {
            warn!(task_id = %task_id, error = %e, "Stop failed");
        }
        return Err(supervisor_error(e));
    }

    Ok(Json(StopResponse {
        status: "success",
        message: format!("Task {task_id} stopped"),
    }))
}

async fn tools_handler() -> Json<ToolListResponse> {
    let tools: Vec<ToolDto> = runbox_tools::tool_catalog()
        .into_iter()
        .map(|def| ToolDto {
            name: def.name,
            description: def.description,
        })
        .collect();

    Json(ToolListResponse {
        status: "success",
        total_tools: tools.len(),
        tools,
    })
}

async fn config_handler(State(state): State<SharedState>) -> Json<ConfigResponse> {
    let config = &state.config;
    let settings = config.resolve_provider(&ProviderOverrides::default());

    Json(ConfigResponse {
        status: "success",
        provider: settings.provider,
        model: settings.model,
        base_url: settings.base_url,
        api_key_set: settings.api_key.is_some_and(|k| !k.is_empty()),
        max_steps: config.agent.max_steps,
        max_retries: settings.max_retries,
        temperature: settings.temperature,
        max_tokens: settings.max_tokens,
        isolation: config.supervisor.isolation,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────
