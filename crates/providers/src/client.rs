//! The provider client used by the agent loop.
//!
//! Wraps a [`Provider`] with the task's sampling settings, retry policy,
//! usage accounting and optional trajectory recording, and normalizes every
//! response into a [`Turn`].

use std::sync::Arc;

use chrono::Utc;
use runbox_core::error::ProviderError;
use runbox_core::message::Conversation;
use runbox_core::provider::{Provider, ProviderRequest, ToolDefinition, Turn, Usage};
use runbox_core::task::ProviderSettings;
use tracing::debug;

use crate::retry::{RetryConfig, with_retry};
use crate::router::build_provider;
use crate::trajectory::{LlmInteraction, TrajectorySink};

/// One normalized model turn.
#[derive(Debug, Clone)]
pub struct TurnResponse {
    pub turn: Turn,
    pub usage: Option<Usage>,
    /// Model that actually answered
    pub model: String,
}

pub struct LlmClient {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    top_p: Option<f32>,
    top_k: Option<u32>,
    retry: RetryConfig,
    usage: Usage,
    trajectory: Option<Arc<dyn TrajectorySink>>,
}

impl LlmClient {
    /// Wrap an existing provider with a task's settings.
    pub fn new(provider: Arc<dyn Provider>, settings: &ProviderSettings) -> Self {
        let retry = RetryConfig::from_policy(&provider.capabilities().retry, settings.max_retries);
        Self {
            provider,
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            top_p: settings.top_p,
            top_k: settings.top_k,
            retry,
            usage: Usage::default(),
            trajectory: None,
        }
    }

    /// Build the provider named by `settings` and wrap it.
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        Ok(Self::new(build_provider(settings)?, settings))
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_trajectory(mut self, sink: Arc<dyn TrajectorySink>) -> Self {
        self.trajectory = Some(sink);
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Usage summed over every successful turn so far.
    pub fn total_usage(&self) -> Usage {
        self.usage
    }

    /// Send the conversation and get the model's next turn.
    ///
    /// Transient failures are retried per the retry policy; anything else,
    /// including a response with neither text nor tool calls, is returned
    /// as an error.
    pub async fn send(
        &mut self,
        conversation: &Conversation,
        tools: &[ToolDefinition],
    ) -> Result<TurnResponse, ProviderError> {
        let capabilities = self.provider.capabilities();
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: conversation.messages().to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: self.top_p,
            top_k: self.top_k,
            tools: if capabilities.supports_tool_calling {
                tools.to_vec()
            } else {
                Vec::new()
            },
        };

        let provider = Arc::clone(&self.provider);
        let operation = format!("{}:{}", provider.name(), self.model);
        let response = with_retry(&self.retry, &operation, || provider.complete(request.clone())).await?;

        if let Some(sink) = &self.trajectory {
            sink.record(&LlmInteraction {
                timestamp: Utc::now(),
                provider: provider.name().to_string(),
                model: self.model.clone(),
                input_messages: request.messages.clone(),
                response: response.clone(),
                tools_available: request.tools.iter().map(|t| t.name.clone()).collect(),
            });
        }

        let usage = response.usage;
        if let Some(u) = usage {
            self.usage += u;
        }
        let model = response.model.clone();
        let turn = response.into_turn()?;

        debug!(
            provider = %provider.name(),
            model = %model,
            tool_calls = turn.tool_calls().len(),
            "Received turn"
        );

        Ok(TurnResponse { turn, usage, model })
    }
}
