//! Configuration loading, validation, and management for Persona.
//!
//! Loads configuration from `~/.persona/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use persona_core::CacheLayer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.persona/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Upper bound on a single provider round-trip
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Prompt and response cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Prompt assembly settings
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "anthropic".into()
}
fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn default_temperature() -> f32 {
    0.8
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_request_timeout() -> u64 {
    120
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("cache", &self.cache)
            .field("prompt", &self.prompt)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Breakpoint store, TTL policy and response memo settings. All durations in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_base_ttl")]
    pub base_ttl_secs: u64,

    #[serde(default = "default_min_ttl")]
    pub min_ttl_secs: u64,

    #[serde(default = "default_max_ttl")]
    pub max_ttl_secs: u64,

    /// Fractional TTL bonus for recently accessed entries
    #[serde(default = "default_active_bonus")]
    pub active_bonus: f64,

    /// Fractional TTL bonus for complex characters
    #[serde(default = "default_complexity_bonus")]
    pub complexity_bonus: f64,

    /// How recent an access must be to count as "active"
    #[serde(default = "default_active_window")]
    pub active_window_secs: u64,

    /// Lifetime of the core-personality breakpoint
    #[serde(default = "default_core_personality_ttl")]
    pub core_personality_ttl_secs: u64,

    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Lifetime of a memoized full response
    #[serde(default = "default_response_ttl")]
    pub response_ttl_secs: u64,

    #[serde(default = "default_response_sweep_interval")]
    pub response_sweep_interval_secs: u64,

    #[serde(default)]
    pub layer_ttls: LayerTtlConfig,
}

fn default_base_ttl() -> u64 {
    600
}
fn default_min_ttl() -> u64 {
    60
}
fn default_max_ttl() -> u64 {
    3600
}
fn default_active_bonus() -> f64 {
    0.5
}
fn default_complexity_bonus() -> f64 {
    0.2
}
fn default_active_window() -> u64 {
    300
}
fn default_core_personality_ttl() -> u64 {
    24 * 60 * 60
}
fn default_cleanup_interval() -> u64 {
    60
}
fn default_response_ttl() -> u64 {
    600
}
fn default_response_sweep_interval() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            base_ttl_secs: default_base_ttl(),
            min_ttl_secs: default_min_ttl(),
            max_ttl_secs: default_max_ttl(),
            active_bonus: default_active_bonus(),
            complexity_bonus: default_complexity_bonus(),
            active_window_secs: default_active_window(),
            core_personality_ttl_secs: default_core_personality_ttl(),
            cleanup_interval_secs: default_cleanup_interval(),
            response_ttl_secs: default_response_ttl(),
            response_sweep_interval_secs: default_response_sweep_interval(),
            layer_ttls: LayerTtlConfig::default(),
        }
    }
}

impl CacheConfig {
    pub fn base_ttl(&self) -> Duration {
        Duration::from_secs(self.base_ttl_secs)
    }
    pub fn min_ttl(&self) -> Duration {
        Duration::from_secs(self.min_ttl_secs)
    }
    pub fn max_ttl(&self) -> Duration {
        Duration::from_secs(self.max_ttl_secs)
    }
    pub fn active_window(&self) -> Duration {
        Duration::from_secs(self.active_window_secs)
    }
    pub fn core_personality_ttl(&self) -> Duration {
        Duration::from_secs(self.core_personality_ttl_secs)
    }
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
    pub fn response_ttl(&self) -> Duration {
        Duration::from_secs(self.response_ttl_secs)
    }
    pub fn response_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.response_sweep_interval_secs)
    }
}

/// Default per-layer breakpoint TTLs in seconds.
///
/// The conversation layer has no entry: it is never cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerTtlConfig {
    #[serde(default = "default_static_layer_ttl")]
    pub system_admin: u64,
    #[serde(default = "default_static_layer_ttl")]
    pub scenario_context: u64,
    #[serde(default = "default_core_personality_ttl")]
    pub core_personality: u64,
    #[serde(default = "default_learned_behavior_ttl")]
    pub learned_behavior: u64,
    #[serde(default = "default_emotional_state_ttl")]
    pub emotional_state: u64,
    #[serde(default = "default_user_memory_ttl")]
    pub user_memory: u64,
}

fn default_static_layer_ttl() -> u64 {
    24 * 60 * 60
}
fn default_learned_behavior_ttl() -> u64 {
    60 * 60
}
fn default_emotional_state_ttl() -> u64 {
    5 * 60
}
fn default_user_memory_ttl() -> u64 {
    10 * 60
}

impl Default for LayerTtlConfig {
    fn default() -> Self {
        Self {
            system_admin: default_static_layer_ttl(),
            scenario_context: default_static_layer_ttl(),
            core_personality: default_core_personality_ttl(),
            learned_behavior: default_learned_behavior_ttl(),
            emotional_state: default_emotional_state_ttl(),
            user_memory: default_user_memory_ttl(),
        }
    }
}

impl LayerTtlConfig {
    /// Default TTL for a freshly assembled breakpoint of `layer`.
    pub fn ttl_for(&self, layer: CacheLayer) -> Duration {
        let secs = match layer {
            CacheLayer::SystemAdmin => self.system_admin,
            CacheLayer::ScenarioContext => self.scenario_context,
            CacheLayer::CorePersonality => self.core_personality,
            CacheLayer::LearnedBehavior => self.learned_behavior,
            CacheLayer::EmotionalState => self.emotional_state,
            CacheLayer::UserMemory => self.user_memory,
            CacheLayer::Conversation => 0,
        };
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Global rules placed in the system-admin layer of every prompt
    #[serde(default = "default_system_admin")]
    pub system_admin: String,
}

fn default_system_admin() -> String {
    "You are an AI performing as a roleplay character. Stay in character at all times, \
     never mention being an AI model, and keep replies consistent with the character's \
     personality, memories and current emotional state."
        .into()
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_admin: default_system_admin(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.persona/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `PERSONA_API_KEY` (highest priority)
    /// - `ANTHROPIC_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("PERSONA_API_KEY")
                .ok()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("PERSONA_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("PERSONA_MODEL") {
            config.default_model = model;
        }

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

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".persona")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "request_timeout_secs must be > 0".into(),
            ));
        }

        let cache = &self.cache;
        if cache.min_ttl_secs > cache.max_ttl_secs {
            return Err(ConfigError::ValidationError(
                "cache.min_ttl_secs must not exceed cache.max_ttl_secs".into(),
            ));
        }

        if !(cache.active_bonus >= 0.0 && cache.complexity_bonus >= 0.0) {
            return Err(ConfigError::ValidationError(
                "cache bonuses must be non-negative".into(),
            ));
        }

        if cache.cleanup_interval_secs == 0 || cache.response_sweep_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "cache worker intervals must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
            || self
                .providers
                .get(&self.default_provider)
                .is_some_and(|p| p.api_key.is_some())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout(),
            cache: CacheConfig::default(),
            prompt: PromptConfig::default(),
            providers: HashMap::new(),
        }
    }
}

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
