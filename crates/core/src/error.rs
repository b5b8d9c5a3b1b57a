//! Error types for the Persona domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Persona operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Lookup errors ---
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    // --- Collaborator errors ---
    #[error("Repository error: {0}")]
    Repository(String),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a missing character.
    pub fn character_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Character",
            id: id.into(),
        }
    }

    /// Shorthand for a missing scenario.
    pub fn scenario_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Scenario",
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request cancelled by caller")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 529,
            message: "Overloaded".into(),
        });
        assert!(err.to_string().contains("529"));
        assert!(err.to_string().contains("Overloaded"));
    }

    #[test]
    fn not_found_names_the_kind() {
        let err = Error::character_not_found("wizard-1");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Character not found: wizard-1");
    }

    #[test]
    fn cancellation_is_a_provider_error() {
        let err: Error = ProviderError::Cancelled.into();
        assert!(matches!(err, Error::Provider(ProviderError::Cancelled)));
        assert!(!err.is_not_found());
    }
}
