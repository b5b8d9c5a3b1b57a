//! Prompt-cache domain types shared by the cache, the engine and providers.
//!
//! A prompt is a stack of [`CacheBreakpoint`]s, one per [`CacheLayer`].
//! Layers are ordered from most stable (system rules) to least stable
//! (conversation history); providers that support explicit cache control
//! place their cache marker after the last non-conversation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::token;

/// A named stage in the prompt hierarchy.
///
/// The derived `Ord` is the assembly order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheLayer {
    SystemAdmin,
    ScenarioContext,
    CorePersonality,
    LearnedBehavior,
    EmotionalState,
    UserMemory,
    Conversation,
}

impl CacheLayer {
    /// All layers in assembly order.
    pub const ALL: [CacheLayer; 7] = [
        CacheLayer::SystemAdmin,
        CacheLayer::ScenarioContext,
        CacheLayer::CorePersonality,
        CacheLayer::LearnedBehavior,
        CacheLayer::EmotionalState,
        CacheLayer::UserMemory,
        CacheLayer::Conversation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheLayer::SystemAdmin => "system_admin",
            CacheLayer::ScenarioContext => "scenario_context",
            CacheLayer::CorePersonality => "core_personality",
            CacheLayer::LearnedBehavior => "learned_behavior",
            CacheLayer::EmotionalState => "emotional_state",
            CacheLayer::UserMemory => "user_memory",
            CacheLayer::Conversation => "conversation",
        }
    }

    /// Whether this layer belongs to the request-invariant prefix.
    pub fn is_prefix(&self) -> bool {
        !matches!(self, CacheLayer::Conversation)
    }
}

impl std::fmt::Display for CacheLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One independently-TTL'd segment of an assembled prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheBreakpoint {
    pub layer: CacheLayer,

    pub content: String,

    /// Estimated tokens in `content`
    pub token_count: usize,

    pub ttl: Duration,

    pub last_used: DateTime<Utc>,

    /// Set when the content was served from the breakpoint store rather
    /// than synthesized for this request.
    #[serde(default)]
    pub from_cache: bool,
}

impl CacheBreakpoint {
    pub fn new(layer: CacheLayer, content: impl Into<String>, ttl: Duration) -> Self {
        let content = content.into();
        Self {
            layer,
            token_count: token::estimate_tokens(&content),
            content,
            ttl,
            last_used: Utc::now(),
            from_cache: false,
        }
    }

    /// Age-out test used by the cleanup worker.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        elapsed_between(self.last_used, now) > self.ttl
    }
}

/// Non-negative wall-clock distance from `earlier` to `later`.
///
/// Clock skew (a `later` before `earlier`) yields zero.
pub fn elapsed_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> Duration {
    (later - earlier).to_std().unwrap_or_default()
}

/// Cache observability attached to every response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheMetrics {
    /// Whether any cache (memo, provider, or local breakpoint) served this request
    pub hit: bool,

    /// Layers that were served from cache
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layers: Vec<CacheLayer>,

    /// Estimated prompt tokens not re-processed thanks to the cache
    pub saved_tokens: usize,

    /// Wall-clock time spent serving the request
    pub latency: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_order_matches_assembly_order() {
        let mut shuffled = vec![
            CacheLayer::Conversation,
            CacheLayer::CorePersonality,
            CacheLayer::SystemAdmin,
            CacheLayer::UserMemory,
            CacheLayer::ScenarioContext,
            CacheLayer::EmotionalState,
            CacheLayer::LearnedBehavior,
        ];
        shuffled.sort();
        assert_eq!(shuffled, CacheLayer::ALL.to_vec());
    }

    #[test]
    fn only_conversation_is_outside_prefix() {
        let outside: Vec<_> = CacheLayer::ALL.iter().filter(|l| !l.is_prefix()).collect();
        assert_eq!(outside, vec![&CacheLayer::Conversation]);
    }

    #[test]
    fn layer_serializes_snake_case() {
        let json = serde_json::to_string(&CacheLayer::CorePersonality).unwrap();
        assert_eq!(json, "\"core_personality\"");
        assert_eq!(CacheLayer::CorePersonality.to_string(), "core_personality");
    }

    #[test]
    fn breakpoint_estimates_tokens() {
        let bp = CacheBreakpoint::new(CacheLayer::SystemAdmin, "abcdefgh", Duration::from_secs(1));
        assert_eq!(bp.token_count, 2);
        assert!(!bp.from_cache);
    }

    #[test]
    fn breakpoint_expiry() {
        let mut bp = CacheBreakpoint::new(
            CacheLayer::EmotionalState,
            "calm",
            Duration::from_millis(100),
        );
        let t0 = Utc::now();
        bp.last_used = t0;
        assert!(!bp.is_expired_at(t0 + chrono::Duration::milliseconds(50)));
        assert!(bp.is_expired_at(t0 + chrono::Duration::milliseconds(150)));
    }

    #[test]
    fn elapsed_clamps_negative_to_zero() {
        let now = Utc::now();
        let earlier = now - chrono::Duration::seconds(5);
        assert_eq!(elapsed_between(now, earlier), Duration::ZERO);
        assert_eq!(elapsed_between(earlier, now), Duration::from_secs(5));
    }
}
