//! Configuration loading, validation, and per-task resolution for runbox.
//!
//! Loads configuration from `~/.runbox/config.toml` (or `$RUNBOX_CONFIG`)
//! with environment variable overrides. Request-level overrides from the HTTP
//! API or CLI are merged on top by [`AppConfig::resolve_provider`].

use runbox_core::ProviderSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.runbox/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Agent defaults
    #[serde(default)]
    pub agent: AgentConfig,

    /// Provider-specific configurations, keyed by provider name
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Worker supervision settings
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Provider used when a request names none
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Model used when neither the request nor the provider section names one
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Step budget for a task
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Retries for transient provider failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    /// Replaces the built-in system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Upper bound for one tool invocation
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_max_steps() -> u32 {
    20
}
fn default_max_retries() -> u32 {
    10
}
fn default_temperature() -> f32 {
    0.5
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_tool_timeout_secs() -> u64 {
    120
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            default_model: default_model(),
            max_steps: default_max_steps(),
            max_retries: default_max_retries(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: None,
            top_k: None,
            system_prompt: None,
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

/// Per-provider settings from the `[providers.<name>]` table.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    5000
}
fn default_host() -> String {
    "0.0.0.0".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// How workers are isolated from the supervising process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationMode {
    /// Each task runs on its own tokio task.
    #[default]
    InProcess,
    /// Each task runs in a child `runbox worker` process.
    Process,
}

impl std::str::FromStr for IsolationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in-process" | "inprocess" => Ok(Self::InProcess),
            "process" => Ok(Self::Process),
            other => Err(ConfigError::ValidationError(format!(
                "unknown isolation mode '{other}' (expected 'in-process' or 'process')"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default)]
    pub isolation: IsolationMode,

    /// Time a worker gets to wind down after a stop request
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,

    /// Delay between channel polls when the queue is empty
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_stop_grace_secs() -> u64 {
    5
}
fn default_poll_interval_ms() -> u64 {
    100
}

impl SupervisorConfig {
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            isolation: IsolationMode::default(),
            stop_grace_secs: default_stop_grace_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Request-level values that take precedence over the file config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderOverrides {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, alias = "model_base_url")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl AppConfig {
    /// Load configuration from the default path, then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("RUNBOX_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"));
        let mut config = Self::load_from(&path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        // Allow env var to override default provider
        if let Ok(provider) = std::env::var("RUNBOX_PROVIDER") {
            self.agent.default_provider = provider;
        }

        // Allow env var to override default model
        if let Ok(model) = std::env::var("RUNBOX_MODEL") {
            self.agent.default_model = model;
        }

        // RUNBOX_API_KEY applies to the default provider; <NAME>_API_KEY to a named one
        if let Ok(key) = std::env::var("RUNBOX_API_KEY") {
            let name = self.agent.default_provider.clone();
            self.providers.entry(name).or_default().api_key = Some(key);
        }
        for name in KNOWN_PROVIDERS {
            let var = format!("{}_API_KEY", name.to_uppercase());
            if let Ok(key) = std::env::var(&var) {
                let entry = self.providers.entry((*name).to_string()).or_default();
                if entry.api_key.is_none() {
                    entry.api_key = Some(key);
                }
            }
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".runbox")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.agent.temperature) {
            return Err(ConfigError::ValidationError(
                "agent.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_steps must be greater than 0".into(),
            ));
        }

        if self.supervisor.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "supervisor.poll_interval_ms must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Merge request overrides, the provider's config section and agent
    /// defaults into the settings a task runs with.
    ///
    /// Precedence per field: override, then `[providers.<name>]`, then
    /// `[agent]` defaults.
    pub fn resolve_provider(&self, overrides: &ProviderOverrides) -> ProviderSettings {
        let provider = overrides
            .provider
            .clone()
            .unwrap_or_else(|| self.agent.default_provider.clone());
        let section = self.providers.get(&provider).cloned().unwrap_or_default();

        ProviderSettings {
            model: overrides
                .model
                .clone()
                .or(section.model)
                .unwrap_or_else(|| self.agent.default_model.clone()),
            base_url: overrides.base_url.clone().or(section.base_url),
            api_key: overrides.api_key.clone().or(section.api_key),
            api_version: section.api_version,
            temperature: Some(self.agent.temperature),
            max_tokens: Some(self.agent.max_tokens),
            top_p: self.agent.top_p,
            top_k: self.agent.top_k,
            max_retries: overrides.max_retries.unwrap_or(self.agent.max_retries),
            provider,
        }
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Provider names whose `<NAME>_API_KEY` environment variable is honored.
const KNOWN_PROVIDERS: &[&str] = &[
    "openai",
    "anthropic",
    "openrouter",
    "deepseek",
    "dashscope",
    "zhipuai",
    "doubao",
    "azure",
];

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.agent.default_provider, "openai");
        assert_eq!(config.gateway.port, 5000);
        assert_eq!(config.supervisor.stop_grace(), Duration::from_secs(5));
        assert_eq!(config.supervisor.poll_interval(), Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.agent.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_step_budget_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_steps = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.agent.max_steps, 20);
    }

    #[test]
    fn parses_sections_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[agent]
default_provider = "anthropic"
max_steps = 7

[providers.anthropic]
api_key = "sk-ant-test"
model = "claude-sonnet-4-20250514"

[supervisor]
isolation = "process"
stop_grace_secs = 2
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.agent.default_provider, "anthropic");
        assert_eq!(config.agent.max_steps, 7);
        assert_eq!(config.supervisor.isolation, IsolationMode::Process);
        assert_eq!(config.supervisor.stop_grace_secs, 2);
        assert_eq!(config.gateway.port, 5000);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent\nmax_steps = ").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn overrides_beat_provider_section_beat_defaults() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "openrouter".into(),
            ProviderConfig {
                api_key: Some("file-key".into()),
                base_url: Some("https://openrouter.ai/api/v1".into()),
                api_version: None,
                model: Some("file-model".into()),
            },
        );

        let overrides = ProviderOverrides {
            provider: Some("openrouter".into()),
            model: Some("request-model".into()),
            ..Default::default()
        };
        let settings = config.resolve_provider(&overrides);
        assert_eq!(settings.provider, "openrouter");
        assert_eq!(settings.model, "request-model");
        assert_eq!(settings.api_key.as_deref(), Some("file-key"));
        assert_eq!(settings.base_url.as_deref(), Some("https://openrouter.ai/api/v1"));
        assert_eq!(settings.max_retries, 10);

        let settings = config.resolve_provider(&ProviderOverrides::default());
        assert_eq!(settings.provider, "openai");
        assert_eq!(settings.model, "gpt-4o");
        assert!(settings.api_key.is_none());
    }

    #[test]
    fn model_base_url_alias_accepted() {
        let overrides: ProviderOverrides =
            serde_json::from_value(serde_json::json!({"model_base_url": "http://localhost:11434/v1"})).unwrap();
        assert_eq!(overrides.base_url.as_deref(), Some("http://localhost:11434/v1"));
    }

    #[test]
    fn isolation_mode_from_str() {
        assert_eq!("process".parse::<IsolationMode>().unwrap(), IsolationMode::Process);
        assert_eq!("in-process".parse::<IsolationMode>().unwrap(), IsolationMode::InProcess);
        assert!("thread".parse::<IsolationMode>().is_err());
    }

    #[test]
    fn provider_config_debug_redacts_key() {
        let cfg = ProviderConfig {
            api_key: Some("sk-live".into()),
            ..Default::default()
        };
        assert!(!format!("{cfg:?}").contains("sk-live"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gpt-4o"));
        assert!(toml_str.contains("5000"));
    }
}
