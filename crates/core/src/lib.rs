//! # runbox core
//!
//! Domain types, traits, and error definitions for the runbox task engine.
//! This crate has no framework dependencies; it defines the domain model
//! that all other crates implement against.
//!
//! - [`provider`]: the LLM backend trait and the normalized [`Turn`]
//! - [`tool`]: the tool trait and the never-failing [`ToolRegistry`]
//! - [`task`]: task identity and immutable task description
//! - [`event`]: the progress events a worker emits

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod task;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use event::{AgentStep, EventKind, ExitReason, TaskEvent};
pub use message::{Conversation, Message, Role};
pub use provider::{
    Provider, ProviderCapabilities, ProviderRequest, ProviderResponse, RetryPolicy, ToolDefinition,
    Turn, Usage,
};
pub use task::{ProviderSettings, TaskId, TaskSpec, TaskStatus};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
