//! Provider trait — the abstraction over LLM backends.
//!
//! A Provider takes an assembled prompt (a cacheable prefix plus a per-turn
//! suffix) and returns the model's reply. It is the only network boundary in
//! the system; callers never hold a cache lock while awaiting it.
//!
//! Implementations: Anthropic Messages API, OpenAI-compatible endpoints.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cache::{CacheBreakpoint, CacheMetrics};
use crate::error::ProviderError;

/// An assembled prompt ready to be sent to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRequest {
    /// The model to use (e.g., "claude-sonnet-4-20250514", "gpt-4o")
    pub model: String,

    pub character_id: String,

    pub user_id: String,

    /// The consistent prefix — identical across turns, provider-cacheable
    pub system_prompt: String,

    /// The dynamic suffix — conversation history plus the current message
    pub message: String,

    /// Layer breakdown of the prompt, in assembly order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub breakpoints: Vec<CacheBreakpoint>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.7
}

/// Token usage information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    /// Prompt tokens the provider reports as read from its own cache
    #[serde(default)]
    pub cached_prompt_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            cached_prompt_tokens: 0,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated text
    pub content: String,

    /// Token usage statistics
    #[serde(default)]
    pub usage: Option<TokenUsage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// The engine's answer to a conversation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiResponse {
    pub content: String,

    pub token_usage: TokenUsage,

    /// Always populated, whichever path served the request
    pub cache_metrics: CacheMetrics,

    pub model: String,
}

/// The core Provider trait.
///
/// Every LLM backend implements this trait. The conversation service calls
/// `send_request()` without knowing which provider is being used.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "anthropic", "openrouter").
    fn name(&self) -> &str;

    /// Send a prompt and get a complete response.
    async fn send_request(
        &self,
        request: PromptRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_totals() {
        let usage = TokenUsage::new(120, 30);
        assert_eq!(usage.total_tokens, 150);
        assert_eq!(usage.cached_prompt_tokens, 0);
    }

    #[test]
    fn prompt_request_default_temperature() {
        let req: PromptRequest = serde_json::from_str(
            r#"{"model":"m","character_id":"c","user_id":"u","system_prompt":"s","message":"hi"}"#,
        )
        .unwrap();
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
        assert!(req.breakpoints.is_empty());
        assert!(req.max_tokens.is_none());
    }
}
