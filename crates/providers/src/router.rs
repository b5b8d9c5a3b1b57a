//! Provider selection from configuration.

use persona_config::AppConfig;
use persona_core::error::ProviderError;
use persona_core::provider::Provider;
use std::sync::Arc;
use tracing::debug;

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// Build the provider named by `config.default_provider`.
///
/// A `[providers.<name>]` section overrides the top-level API key and the
/// well-known base URL. Every provider except Ollama needs a key.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let name = config.default_provider.as_str();
    let section = config.providers.get(name);

    let api_key = section
        .and_then(|p| p.api_key.clone())
        .or_else(|| config.api_key.clone());
    let api_url = section.and_then(|p| p.api_url.clone());

    let provider: Arc<dyn Provider> = match (name, api_key) {
        ("ollama", key) => {
            let url = api_url.unwrap_or_else(|| default_base_url(name));
            Arc::new(OpenAiCompatProvider::new(name, url, key.unwrap_or_else(|| "ollama".into())))
        }
        (_, None) => {
            return Err(ProviderError::NotConfigured(format!(
                "no API key for provider '{name}' (set api_key in config or PERSONA_API_KEY)"
            )));
        }
        ("anthropic", Some(key)) => {
            let mut p = AnthropicProvider::new(key);
            if let Some(url) = api_url {
                p = p.with_base_url(url);
            }
            Arc::new(p)
        }
        (_, Some(key)) => {
            let url = api_url.unwrap_or_else(|| default_base_url(name));
            Arc::new(OpenAiCompatProvider::new(name, url, key))
        }
    };

    debug!(provider = %name, "Provider built from config");
    Ok(provider)
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persona_config::ProviderConfig;

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("openrouter").contains("openrouter.ai"));
        assert!(default_base_url("openai").contains("api.openai.com"));
        assert!(default_base_url("ollama").contains("localhost:11434"));
    }

    #[test]
    fn missing_key_is_not_configured() {
        let mut config = AppConfig::default();
        config.api_key = None;
        let err = build_from_config(&config).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn anthropic_from_top_level_key() {
        let mut config = AppConfig::default();
        config.api_key = Some("sk-ant-test".into());
        let provider = build_from_config(&config).unwrap();
        assert_eq!(provider.name(), "anthropic");
    }

    #[test]
    fn section_key_and_openai_compat() {
        let mut config = AppConfig::default();
        config.api_key = None;
        config.default_provider = "openrouter".into();
        config.providers.insert(
            "openrouter".into(),
            ProviderConfig {
                api_key: Some("sk-or-test".into()),
                api_url: None,
                default_model: None,
            },
        );
        let provider = build_from_config(&config).unwrap();
        assert_eq!(provider.name(), "openrouter");
    }

    #[test]
    fn ollama_needs_no_key() {
        let mut config = AppConfig::default();
        config.api_key = None;
        config.default_provider = "ollama".into();
        assert_eq!(build_from_config(&config).unwrap().name(), "ollama");
    }
}
