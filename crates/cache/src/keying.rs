//! Cache key derivation.
//!
//! Keys hash identity plus the consistent prefix, never the conversation
//! layer, so every turn of a session lands on the same key.

use persona_core::cache::{CacheBreakpoint, CacheLayer};
use sha2::{Digest, Sha256};

/// Separator between layer contents in the consistent prefix.
pub const PREFIX_SEPARATOR: &str = "\n\n";

/// Non-conversation layer contents in layer order, joined by [`PREFIX_SEPARATOR`].
pub fn consistent_prefix(breakpoints: &[CacheBreakpoint]) -> String {
    let mut prefix_layers: Vec<&CacheBreakpoint> = breakpoints
        .iter()
        .filter(|bp| bp.layer.is_prefix())
        .collect();
    // Stable sort keeps caller order within a layer.
    prefix_layers.sort_by_key(|bp| bp.layer);
    prefix_layers
        .iter()
        .map(|bp| bp.content.as_str())
        .collect::<Vec<_>>()
        .join(PREFIX_SEPARATOR)
}

/// Hex SHA-256 over `character_id | user_id | scenario_id? | consistent_prefix`.
pub fn generate_cache_key(
    character_id: &str,
    user_id: &str,
    scenario_id: Option<&str>,
    breakpoints: &[CacheBreakpoint],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(character_id.as_bytes());
    hasher.update(b"|");
    hasher.update(user_id.as_bytes());
    hasher.update(b"|");
    if let Some(scenario_id) = scenario_id {
        hasher.update(scenario_id.as_bytes());
        hasher.update(b"|");
    }
    hasher.update(consistent_prefix(breakpoints).as_bytes());
    hex::encode(hasher.finalize())
}

/// Store key of a character's core-personality entry.
pub fn core_personality_key(character_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(CacheLayer::CorePersonality.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(character_id.as_bytes());
    hex::encode(hasher.finalize())
}
