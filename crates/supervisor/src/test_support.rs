//! Scripted providers and fixtures for supervisor tests.

use std::sync::Arc;

use async_trait::async_trait;
use runbox_core::error::ProviderError;
use runbox_core::provider::{Provider, ProviderRequest, ProviderResponse};
use runbox_core::task::{ProviderSettings, TaskId, TaskSpec};
use runbox_core::tool::ToolCall;

use crate::launcher::InProcessLauncher;

enum Behavior {
    Answer(String),
    ToolLoop,
    Hang,
    Panic,
}

pub struct ScriptedProvider {
    behavior: Behavior,
}

impl ScriptedProvider {
    pub fn answer(text: &str) -> Self {
        Self {
            behavior: Behavior::Answer(text.into()),
        }
    }

    /// Requests a sequential thinking step on every turn.
    pub fn tool_loop() -> Self {
        Self {
            behavior: Behavior::ToolLoop,
        }
    }

    pub fn hanging() -> Self {
        Self { behavior: Behavior::Hang }
    }

    pub fn panicking() -> Self {
        Self { behavior: Behavior::Panic }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let (content, tool_calls) = match &self.behavior {
            Behavior::Answer(text) => (text.clone(), vec![]),
            Behavior::ToolLoop => (
                "thinking".to_string(),
                vec![ToolCall {
                    id: "think".into(),
                    name: "sequentialthinking".into(),
                    arguments: serde_json::json!({
                        "thought": "not yet",
                        "next_thought_needed": true,
                        "thought_number": 1,
                        "total_thoughts": 10
                    }),
                }],
            ),
            Behavior::Hang => std::future::pending().await,
            Behavior::Panic => panic!("scripted provider crashed"),
        };
        Ok(ProviderResponse {
            content,
            tool_calls,
            usage: None,
            model: "scripted-1".into(),
            finish_reason: None,
        })
    }
}

/// An in-process launcher whose workers talk to `make()`'s provider.
pub fn scripted_launcher<F>(make: F) -> InProcessLauncher
where
    F: Fn() -> ScriptedProvider + Send + Sync + 'static,
{
    InProcessLauncher::with_provider_factory(Arc::new(move |_settings: &ProviderSettings| {
        Ok::<_, ProviderError>(Arc::new(make()) as Arc<dyn Provider>)
    }))
}

pub fn test_spec(step_budget: u32) -> TaskSpec {
    TaskSpec {
        id: TaskId::new(),
        instruction: "Write a summary".into(),
        working_directory: std::env::temp_dir(),
        step_budget,
        provider: ProviderSettings {
            provider: "scripted".into(),
            model: "scripted-1".into(),
            base_url: None,
            api_key: None,
            api_version: None,
            temperature: None,
            max_tokens: None,
            top_p: None,
            top_k: None,
            max_retries: 0,
        },
        system_prompt: None,
        tool_timeout_secs: 5,
    }
}
