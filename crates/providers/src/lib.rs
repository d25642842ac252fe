//! LLM provider implementations for runbox.
//!
//! All wire adapters implement the `runbox_core::Provider` trait.
//! [`LlmClient`] is what the agent loop talks to: it adds retry/backoff,
//! usage accounting and trajectory recording on top of an adapter.

pub mod anthropic;
pub mod client;
pub mod openai_compat;
pub mod retry;
pub mod router;
pub mod trajectory;

pub use anthropic::AnthropicProvider;
pub use client::{LlmClient, TurnResponse};
pub use openai_compat::{OpenAiCompatProvider, ProviderProfile};
pub use retry::{RetryConfig, with_retry};
pub use router::build_provider;
pub use trajectory::{InMemoryTrajectory, JsonlTrajectory, LlmInteraction, TrajectorySink};
