//! Builds the configured language-model provider.

use std::sync::Arc;

use twinsearch_config::AppConfig;
use twinsearch_core::error::ProviderError;
use twinsearch_core::provider::Provider;

use crate::openai_compat::OpenAiCompatProvider;

/// Build the provider named by `config.default_provider`.
///
/// Every supported backend speaks the OpenAI-compatible protocol; they only
/// differ in base URL and key handling.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let name = config.default_provider.as_str();

    let base_url = config
        .providers
        .get(name)
        .and_then(|p| p.api_url.clone())
        .or_else(|| default_base_url(name).map(String::from))
        .ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "unknown provider '{name}'; set providers.{name}.api_url"
            ))
        })?;

    let api_key = match config.llm_api_key() {
        Some(key) => key,
        None if name == "ollama" => "ollama".to_string(),
        None => {
            return Err(ProviderError::NotConfigured(format!(
                "no API key for provider '{name}'"
            )));
        }
    };

    tracing::debug!(provider = name, base_url = %base_url, "Building language-model provider");
    Ok(Arc::new(OpenAiCompatProvider::new(name, base_url, api_key)))
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> Option<&'static str> {
    match provider_name {
        "openai" => Some("https://api.openai.com/v1"),
        "openrouter" => Some("https://openrouter.ai/api/v1"),
        "ollama" => Some("http://localhost:11434/v1"),
        "groq" => Some("https://api.groq.com/openai/v1"),
        "together" => Some("https://api.together.xyz/v1"),
        "vllm" => Some("http://localhost:8000/v1"),
        _ => None,
    }
}
