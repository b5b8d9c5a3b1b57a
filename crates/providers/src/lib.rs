//! LLM Provider implementations for Persona.
//!
//! All providers implement the `persona_core::Provider` trait and send the
//! consistent prompt prefix separately from the per-turn suffix, so the
//! backend's own prompt cache can match on it.
//! [`build_from_config`] selects the provider named in configuration.

pub mod anthropic;
pub mod openai_compat;
pub mod router;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::build_from_config;

use persona_core::error::ProviderError;

/// Retry delay assumed when a 429 carries no usable `retry-after` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Map a non-success HTTP status to a provider error.
pub(crate) fn error_for_status(
    status: u16,
    retry_after: Option<u64>,
    body: String,
) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        401 | 403 => ProviderError::AuthenticationFailed(if body.is_empty() {
            "Invalid API key or insufficient permissions".into()
        } else {
            body
        }),
        _ => ProviderError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

/// Parse the `retry-after` header, seconds form only.
pub(crate) fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

pub(crate) fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}
