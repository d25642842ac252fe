//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI, OpenRouter, Ollama, DeepSeek, DashScope (Ali),
//! Zhipu AI, Doubao and any other `/chat/completions` endpoint. What differs
//! between those services is captured by a [`ProviderProfile`] rather than by
//! a separate client type per vendor.

use async_trait::async_trait;
use runbox_core::error::ProviderError;
use runbox_core::message::{Message, Role};
use runbox_core::provider::*;
use runbox_core::tool::ToolCall;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// What an OpenAI-compatible backend is and how to talk to it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderProfile {
    /// Provider name used in logs and trajectories
    pub name: String,

    /// Base URL up to (not including) `/chat/completions`
    pub base_url: String,

    pub capabilities: ProviderCapabilities,
}

impl ProviderProfile {
    /// Profile for a well-known provider name, or a generic one for anything else.
    pub fn for_provider(name: &str, base_url: Option<&str>) -> Self {
        let mut capabilities = ProviderCapabilities::default();
        if name == "openai" {
            capabilities.strict_tool_schemas = true;
        }
        match name {
            // Local servers either answer fast or are down
            "ollama" | "vllm" => {
                capabilities.retry = RetryPolicy {
                    initial_delay_ms: 250,
                    backoff_multiplier: 2.0,
                    max_delay_ms: 2_000,
                    jitter: false,
                };
            }
            // Shared upstream pools rate-limit aggressively
            "openrouter" | "dashscope" | "ali" | "zhipuai" | "doubao" => {
                capabilities.retry = RetryPolicy {
                    initial_delay_ms: 2_000,
                    max_delay_ms: 60_000,
                    ..RetryPolicy::default()
                };
            }
            _ => {}
        }
        if name == "openrouter" {
            capabilities.extra_headers = vec![
                ("HTTP-Referer".into(), "https://github.com/runbox-dev/runbox".into()),
                ("X-Title".into(), "runbox".into()),
            ];
        }

        Self {
            name: name.to_string(),
            base_url: base_url
                .map(str::to_string)
                .unwrap_or_else(|| default_base_url(name))
                .trim_end_matches('/')
                .to_string(),
            capabilities,
        }
    }
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "dashscope" | "ali" => "https://dashscope.aliyuncs.com/compatible-mode/v1".into(),
        "zhipuai" => "https://open.bigmodel.cn/api/paas/v4".into(),
        "doubao" => "https://ark.cn-beijing.volces.com/api/v3".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => "https://api.openai.com/v1".into(),
    }
}

/// Reasoning models reject `temperature` and take `max_completion_tokens`.
fn is_reasoning_model(model: &str) -> bool {
    model.contains("o3") || model.contains("o4-mini") || model.contains("gpt-5")
}

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    profile: ProviderProfile,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(profile: ProviderProfile, api_key: impl Into<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            profile,
            api_key: api_key.into(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.profile.base_url
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                    Role::Tool => "tool".into(),
                },
                content: Some(m.content.clone()),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.to_string(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition], strict: bool) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: if strict {
                        require_all_properties(&t.parameters)
                    } else {
                        t.parameters.clone()
                    },
                },
            })
            .collect()
    }

    fn build_body(&self, request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
        });

        let reasoning = is_reasoning_model(&request.model);
        if let Some(temperature) = request.temperature.filter(|_| !reasoning) {
            body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            let key = if reasoning { "max_completion_tokens" } else { "max_tokens" };
            body[key] = serde_json::json!(max_tokens);
        }
        if let Some(top_p) = request.top_p {
            body["top_p"] = serde_json::json!(top_p);
        }

        if !request.tools.is_empty() && self.profile.capabilities.supports_tool_calling {
            body["tools"] = serde_json::json!(Self::to_api_tools(
                &request.tools,
                self.profile.capabilities.strict_tool_schemas
            ));
        }

        body
    }

    fn parse_response(api_response: ApiResponse) -> Result<ProviderResponse, ProviderError> {
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let arguments = if tc.function.arguments.trim().is_empty() {
                    serde_json::json!({})
                } else {
                    serde_json::from_str(&tc.function.arguments).map_err(|e| {
                        ProviderError::InvalidResponse(format!(
                            "tool call '{}' has malformed arguments: {e}",
                            tc.function.name
                        ))
                    })?
                };
                Ok(ToolCall {
                    id: tc.id,
                    name: tc.function.name,
                    arguments,
                })
            })
            .collect::<Result<Vec<_>, ProviderError>>()?;

        let usage = api_response.usage.map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            cache_read_input_tokens: u.prompt_tokens_details.map(|d| d.cached_tokens).unwrap_or(0),
            reasoning_tokens: u
                .completion_tokens_details
                .map(|d| d.reasoning_tokens)
                .unwrap_or(0),
        });

        Ok(ProviderResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            usage,
            model: api_response.model,
            finish_reason: choice.finish_reason,
        })
    }
}

/// Strict mode wants every property listed under `required`.
fn require_all_properties(schema: &serde_json::Value) -> serde_json::Value {
    let mut schema = schema.clone();
    if let Some(props) = schema.get("properties").and_then(|p| p.as_object()) {
        let names: Vec<serde_json::Value> = props.keys().cloned().map(serde_json::Value::String).collect();
        schema["required"] = serde_json::Value::Array(names);
    }
    schema
}

/// Seconds from a `retry-after` header, when it is a plain number.
pub(crate) fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .map(|secs| secs.ceil() as u64)
}

/// Map a transport-level reqwest error.
pub(crate) fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

#[async_trait]
impl runbox_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.profile.name
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.profile.capabilities.clone()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.profile.base_url);
        let body = self.build_body(&request);

        debug!(provider = %self.profile.name, model = %request.model, "Sending completion request");

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");
        if !self.api_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.api_key));
        }
        for (name, value) in &self.profile.capabilities.extra_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.json(&body).send().await.map_err(transport_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let retry_after = retry_after_secs(response.headers());
            let error_body = response.text().await.unwrap_or_default();
            warn!(provider = %self.profile.name, status, body = %error_body, "Provider returned error");
            return Err(ProviderError::from_http_status(status, &error_body, retry_after));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        Self::parse_response(api_response)
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
    #[serde(default)]
    completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct CompletionTokensDetails {
    #[serde(default)]
    reasoning_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use runbox_core::tool::ToolResult;
    use runbox_core::Provider;

    fn provider(name: &str) -> OpenAiCompatProvider {
        OpenAiCompatProvider::new(ProviderProfile::for_provider(name, None), "sk-test").unwrap()
    }

    fn request(model: &str) -> ProviderRequest {
        ProviderRequest {
            model: model.into(),
            messages: vec![Message::system("You are helpful"), Message::user("Hello")],
            temperature: Some(0.5),
            max_tokens: Some(1024),
            top_p: None,
            top_k: None,
            tools: vec![ToolDefinition {
                name: "read_file".into(),
                description: "Read a file".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {"filename": {"type": "string"}, "start_line": {"type": "integer"}},
                    "required": ["filename"]
                }),
            }],
        }
    }

    #[test]
    fn profiles_carry_their_retry_policy() {
        let local = ProviderProfile::for_provider("ollama", None).capabilities.retry;
        assert_eq!(local.max_delay_ms, 2_000);
        assert!(!local.jitter);

        let pooled = ProviderProfile::for_provider("openrouter", None).capabilities.retry;
        assert_eq!(pooled.initial_delay_ms, 2_000);
        assert_eq!(pooled.max_delay_ms, 60_000);

        assert_eq!(
            ProviderProfile::for_provider("openai", None).capabilities.retry,
            RetryPolicy::default()
        );
    }

    #[test]
    fn profiles_pick_known_base_urls() {
        assert!(provider("openrouter").base_url().contains("openrouter.ai"));
        assert!(provider("ollama").base_url().contains("localhost:11434"));
        assert!(provider("dashscope").base_url().contains("dashscope"));
        let custom = ProviderProfile::for_provider("openai", Some("http://proxy.local/v1/"));
        assert_eq!(custom.base_url, "http://proxy.local/v1");
    }

    #[test]
    fn message_conversion() {
        let messages = vec![Message::system("You are helpful"), Message::user("Hello")];
        let api_messages = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
    }

    #[test]
    fn message_conversion_with_tool_calls_and_results() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "read_file".into(),
            arguments: serde_json::json!({"filename": "a.txt"}),
        };
        let assistant = Message::assistant_with_calls("checking", vec![call]);
        let result = Message::tool_result(&ToolResult::failure("call_1", "not found", 1));

        let api_msgs = OpenAiCompatProvider::to_api_messages(&[assistant, result]);
        let tc = api_msgs[0].tool_calls.as_ref().unwrap();
        assert_eq!(tc[0].function.name, "read_file");
        assert_eq!(tc[0].function.arguments, r#"{"filename":"a.txt"}"#);
        assert_eq!(api_msgs[1].role, "tool");
        assert_eq!(api_msgs[1].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(api_msgs[1].content.as_deref(), Some("Error: not found"));
    }

    #[test]
    fn openai_profile_makes_every_property_required() {
        let body = provider("openai").build_body(&request("gpt-4o"));
        let required = &body["tools"][0]["function"]["parameters"]["required"];
        assert_eq!(required.as_array().unwrap().len(), 2);

        let body = provider("openrouter").build_body(&request("gpt-4o"));
        let required = &body["tools"][0]["function"]["parameters"]["required"];
        assert_eq!(required.as_array().unwrap().len(), 1);
    }

    #[test]
    fn reasoning_models_drop_temperature() {
        let body = provider("openai").build_body(&request("o4-mini"));
        assert!(body.get("temperature").is_none());
        assert_eq!(body["max_completion_tokens"], 1024);
        assert!(body.get("max_tokens").is_none());

        let body = provider("openai").build_body(&request("gpt-4o"));
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["max_tokens"], 1024);
    }

    #[test]
    fn tools_omitted_without_tool_calling() {
        let mut profile = ProviderProfile::for_provider("vllm", None);
        profile.capabilities.supports_tool_calling = false;
        let p = OpenAiCompatProvider::new(profile, "").unwrap();
        assert!(p.build_body(&request("local")).get("tools").is_none());
        assert!(!p.capabilities().supports_tool_calling);
    }

    #[test]
    fn parse_tool_call_response() {
        let data = r#"{
            "model": "gpt-4o-2024-08-06",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{"id": "call_a", "type": "function",
                        "function": {"name": "read_file", "arguments": "{\"filename\":\"x\"}"}}]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4,
                "prompt_tokens_details": {"cached_tokens": 8}}
        }"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        let response = OpenAiCompatProvider::parse_response(parsed).unwrap();
        assert_eq!(response.tool_calls[0].arguments["filename"], "x");
        assert_eq!(response.finish_reason.as_deref(), Some("tool_calls"));
        let usage = response.usage.unwrap();
        assert_eq!(usage.cache_read_input_tokens, 8);
        assert_eq!(usage.reasoning_tokens, 0);
        assert!(matches!(response.into_turn().unwrap(), Turn::ToolCalls { .. }));
    }

    #[test]
    fn malformed_arguments_are_invalid_response() {
        let data = r#"{"model": "m", "choices": [{"message": {"role": "assistant",
            "tool_calls": [{"id": "c", "type": "function", "function": {"name": "f", "arguments": "{oops"}}]}}]}"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        let err = OpenAiCompatProvider::parse_response(parsed).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[test]
    fn empty_choices_rejected() {
        let parsed: ApiResponse = serde_json::from_str(r#"{"model": "m", "choices": []}"#).unwrap();
        assert!(OpenAiCompatProvider::parse_response(parsed).is_err());
    }
}
