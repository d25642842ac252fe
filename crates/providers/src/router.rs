//! Provider construction from resolved task settings.

use std::sync::Arc;

use runbox_core::error::ProviderError;
use runbox_core::provider::Provider;
use runbox_core::task::ProviderSettings;

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::{OpenAiCompatProvider, ProviderProfile};

/// Providers that run locally and need no API key.
const KEYLESS: &[&str] = &["ollama", "vllm"];

/// Build the provider a task's settings name.
///
/// `anthropic` gets the native Messages API adapter; every other name is
/// served by the OpenAI-compatible adapter with the matching profile.
pub fn build_provider(settings: &ProviderSettings) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = settings.api_key.clone().unwrap_or_default();
    if api_key.is_empty() && !KEYLESS.contains(&settings.provider.as_str()) {
        return Err(ProviderError::NotConfigured(format!(
            "no API key for provider '{}' (set it in the config file or {}_API_KEY)",
            settings.provider,
            settings.provider.to_uppercase()
        )));
    }

    let provider: Arc<dyn Provider> = if settings.provider == "anthropic" {
        let mut p = AnthropicProvider::new(api_key)?;
        if let Some(base_url) = &settings.base_url {
            p = p.with_base_url(base_url);
        }
        if let Some(version) = &settings.api_version {
            p = p.with_api_version(version);
        }
        Arc::new(p)
    } else {
        let profile = ProviderProfile::for_provider(&settings.provider, settings.base_url.as_deref());
        Arc::new(OpenAiCompatProvider::new(profile, api_key)?)
    };

    Ok(provider)
}
