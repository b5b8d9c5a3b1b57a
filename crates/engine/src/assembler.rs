//! Prompt assembly — the layered, cache-friendly prompt builder.
//!
//! Builds one breakpoint per layer, always in this order:
//!
//! 1. **System admin** (global roleplay rules)
//! 2. **Scenario context** (only when the request names a resolvable scenario)
//! 3. **Core personality** (reused from the breakpoint store when live)
//! 4. **Learned behaviours** (only when the character has any)
//! 5. **Emotional state**
//! 6. **User memory** (always present, placeholder when empty)
//! 7. **Conversation** (only when the request carries history)
//!
//! # Determinism
//!
//! Layers 1–6 form the consistent prefix. It depends only on identity and
//! the current character/scenario/profile state: no timestamps, no map
//! iteration order, fixed float formatting. Providers with automatic prefix
//! caching rely on it being byte-identical across turns.

use persona_cache::{CacheService, consistent_prefix, core_personality_key};
use persona_config::{AppConfig, LayerTtlConfig, PromptConfig};
use persona_core::cache::{CacheBreakpoint, CacheLayer};
use persona_core::character::{Character, CharacterRepository, EmotionalState};
use persona_core::error::{Error, Result};
use persona_core::message::ConversationRequest;
use persona_core::scenario::{Scenario, ScenarioRepository, UserProfile, UserProfileRepository};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Separates the consistent prefix from the per-turn suffix in a full prompt.
pub const PROMPT_SECTION_MARKER: &str = "\n\n=== CURRENT CONVERSATION ===\n\n";

/// The marker's title line. Never appears inside prefix layer content.
const MARKER_TITLE: &str = "=== CURRENT CONVERSATION ===";
const DEFANGED_MARKER_TITLE: &str = "== CURRENT CONVERSATION ==";

const EMPTY_USER_MEMORY: &str = "No memories of this user yet.";

// ── Types ─────────────────────────────────────────────────────────────────

/// The output of [`PromptAssembler::build_prompt`].
#[derive(Debug, Clone, Serialize)]
pub struct AssembledPrompt {
    /// `prefix + PROMPT_SECTION_MARKER + suffix`
    pub full_prompt: String,
    /// All non-conversation layers joined by a blank line
    pub prefix: String,
    /// Conversation history (if any) and the current message line
    pub suffix: String,
    /// One breakpoint per included layer, in layer order
    pub breakpoints: Vec<CacheBreakpoint>,
    /// Whether the character qualifies for the complexity TTL bonus
    pub is_complex: bool,
}

impl AssembledPrompt {
    pub fn breakpoint(&self, layer: CacheLayer) -> Option<&CacheBreakpoint> {
        self.breakpoints.iter().find(|bp| bp.layer == layer)
    }

    /// Whether the core-personality layer was served from the breakpoint store.
    pub fn core_from_cache(&self) -> bool {
        self.breakpoint(CacheLayer::CorePersonality)
            .is_some_and(|bp| bp.from_cache)
    }

    /// Breakpoints eligible for the breakpoint store.
    pub fn prefix_breakpoints(&self) -> Vec<CacheBreakpoint> {
        self.breakpoints
            .iter()
            .filter(|bp| bp.layer.is_prefix())
            .cloned()
            .collect()
    }

    pub fn total_tokens(&self) -> usize {
        self.breakpoints.iter().map(|bp| bp.token_count).sum()
    }
}

/// Split a full prompt back into `(prefix, suffix)` at the first section marker.
///
/// Prefix layers never contain the marker title, so the first marker is
/// always the one [`PromptAssembler::build_prompt`] inserted.
pub fn split_prompt(full_prompt: &str) -> Option<(&str, &str)> {
    full_prompt.split_once(PROMPT_SECTION_MARKER)
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// Builds layered prompts. Create one and share it across requests.
pub struct PromptAssembler {
    characters: Arc<dyn CharacterRepository>,
    scenarios: Option<Arc<dyn ScenarioRepository>>,
    profiles: Option<Arc<dyn UserProfileRepository>>,
    cache: Arc<CacheService>,
    layer_ttls: LayerTtlConfig,
    system_admin: String,
    core_personality_ttl: Duration,
}

impl PromptAssembler {
    pub fn new(characters: Arc<dyn CharacterRepository>, cache: Arc<CacheService>) -> Self {
        let layer_ttls = LayerTtlConfig::default();
        Self {
            characters,
            scenarios: None,
            profiles: None,
            cache,
            core_personality_ttl: layer_ttls.ttl_for(CacheLayer::CorePersonality),
            layer_ttls,
            system_admin: PromptConfig::default().system_admin,
        }
    }

    /// An assembler with TTLs and system rules taken from `config`.
    pub fn from_config(
        characters: Arc<dyn CharacterRepository>,
        cache: Arc<CacheService>,
        config: &AppConfig,
    ) -> Self {
        Self::new(characters, cache)
            .with_layer_ttls(config.cache.layer_ttls.clone())
            .with_core_personality_ttl(config.cache.core_personality_ttl())
            .with_system_admin(config.prompt.system_admin.clone())
    }

    pub fn with_scenarios(mut self, scenarios: Arc<dyn ScenarioRepository>) -> Self {
        self.scenarios = Some(scenarios);
        self
    }

    pub fn with_profiles(mut self, profiles: Arc<dyn UserProfileRepository>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    pub fn with_layer_ttls(mut self, layer_ttls: LayerTtlConfig) -> Self {
        self.layer_ttls = layer_ttls;
        self
    }

    pub fn with_core_personality_ttl(mut self, ttl: Duration) -> Self {
        self.core_personality_ttl = ttl;
        self
    }

    pub fn with_system_admin(mut self, text: impl Into<String>) -> Self {
        self.system_admin = text.into();
        self
    }

    pub fn characters(&self) -> &Arc<dyn CharacterRepository> {
        &self.characters
    }

    pub fn cache(&self) -> &Arc<CacheService> {
        &self.cache
    }

    pub fn core_personality_ttl(&self) -> Duration {
        self.core_personality_ttl
    }

    /// Assemble the layered prompt for one conversation turn.
    ///
    /// An unknown character is the only fatal condition; scenario and
    /// profile lookups degrade to a missing or placeholder layer.
    pub async fn build_prompt(&self, request: &ConversationRequest) -> Result<AssembledPrompt> {
        let character = self
            .characters
            .get_character(&request.character_id)
            .await?
            .ok_or_else(|| Error::character_not_found(&request.character_id))?;

        let mut breakpoints = Vec::with_capacity(CacheLayer::ALL.len());

        // ── Layer 1: System admin ──────────────────────────────────────────
        breakpoints.push(self.layer(
            CacheLayer::SystemAdmin,
            format!("[System]\n{}", self.system_admin.trim()),
        ));

        // ── Layer 2: Scenario context (optional) ───────────────────────────
        if let Some(scenario) = self.resolve_scenario(request).await {
            breakpoints.push(self.layer(CacheLayer::ScenarioContext, render_scenario(&scenario)));
        }

        // ── Layer 3: Core personality (store-backed) ───────────────────────
        breakpoints.push(self.core_personality(&character).await);

        // ── Layer 4: Learned behaviours (optional) ─────────────────────────
        if !character.learned_behaviors.is_empty() {
            breakpoints.push(self.layer(
                CacheLayer::LearnedBehavior,
                bullet_section("[Learned Behaviors]", &character.learned_behaviors),
            ));
        }

        // ── Layer 5: Emotional state ───────────────────────────────────────
        breakpoints.push(self.layer(
            CacheLayer::EmotionalState,
            render_emotional_state(&character.current_mood),
        ));

        // ── Layer 6: User memory ───────────────────────────────────────────
        let profile = self.resolve_profile(request).await;
        breakpoints.push(self.layer(
            CacheLayer::UserMemory,
            render_user_memory(profile.as_ref(), &character),
        ));

        // ── Layer 7: Conversation (optional, never cached) ─────────────────
        let history = render_history(request);
        if let Some(history) = &history {
            breakpoints.push(CacheBreakpoint::new(
                CacheLayer::Conversation,
                history.clone(),
                Duration::ZERO,
            ));
        }

        let prefix = consistent_prefix(&breakpoints);
        let current = format!("User: {}", request.message);
        let suffix = match history {
            Some(history) => format!("{history}\n\n{current}"),
            None => current,
        };
        let full_prompt = format!("{prefix}{PROMPT_SECTION_MARKER}{suffix}");

        let assembled = AssembledPrompt {
            full_prompt,
            prefix,
            suffix,
            breakpoints,
            is_complex: character.is_complex(),
        };
        debug!(
            character_id = %request.character_id,
            layers = assembled.breakpoints.len(),
            tokens = assembled.total_tokens(),
            core_from_cache = assembled.core_from_cache(),
            "Assembled prompt"
        );
        Ok(assembled)
    }

    fn layer(&self, layer: CacheLayer, content: String) -> CacheBreakpoint {
        CacheBreakpoint::new(
            layer,
            defang_section_marker(content),
            self.layer_ttls.ttl_for(layer),
        )
    }

    async fn core_personality(&self, character: &Character) -> CacheBreakpoint {
        let key = core_personality_key(&character.id);
        let cached = self
            .cache
            .breakpoints
            .get(&key)
            .await
            .and_then(|entry| entry.breakpoint(CacheLayer::CorePersonality).cloned());

        if let Some(breakpoint) = cached {
            debug!(character_id = %character.id, "Core personality cache hit");
            return reused(breakpoint);
        }

        // `character` may already be stale if an invalidation landed since it
        // was read; store_if_missing leaves any warmup that beat us in place.
        debug!(character_id = %character.id, "Core personality cache miss, rebuilding");
        let breakpoint = CacheBreakpoint::new(
            CacheLayer::CorePersonality,
            synthesize_core_personality(character),
            self.core_personality_ttl,
        );
        match self
            .cache
            .breakpoints
            .store_if_missing(&key, breakpoint.clone(), self.core_personality_ttl)
            .await
        {
            Some(current) => {
                debug!(character_id = %character.id, "Core personality warmed concurrently");
                reused(current)
            }
            None => breakpoint,
        }
    }

    async fn resolve_scenario(&self, request: &ConversationRequest) -> Option<Scenario> {
        let scenario_id = request.scenario_id.as_deref()?;
        let Some(scenarios) = &self.scenarios else {
            warn!(
                scenario_id = %scenario_id,
                "No scenario repository configured, skipping scenario layer"
            );
            return None;
        };
        match scenarios.load_scenario(scenario_id).await {
            Ok(scenario) => Some(scenario),
            Err(e) => {
                warn!(
                    scenario_id = %scenario_id,
                    error = %e,
                    "Scenario lookup failed, skipping scenario layer"
                );
                None
            }
        }
    }

    async fn resolve_profile(&self, request: &ConversationRequest) -> Option<UserProfile> {
        let profiles = self.profiles.as_ref()?;
        match profiles
            .load_user_profile(&request.user_id, &request.character_id)
            .await
        {
            Ok(profile) => Some(profile),
            Err(e) if e.is_not_found() => {
                debug!(user_id = %request.user_id, "No user profile yet");
                None
            }
            Err(e) => {
                warn!(user_id = %request.user_id, error = %e, "User profile lookup failed");
                None
            }
        }
    }
}

// ── Layer renderers ───────────────────────────────────────────────────────

fn reused(mut breakpoint: CacheBreakpoint) -> CacheBreakpoint {
    breakpoint.content = defang_section_marker(breakpoint.content);
    breakpoint.from_cache = true;
    breakpoint
}

/// Rewrite every occurrence of the section marker title in prefix content.
///
/// Repeats until none is left: each pass shortens the text, and a
/// replacement can complete a new title out of surrounding `=` signs.
fn defang_section_marker(mut content: String) -> String {
    while content.contains(MARKER_TITLE) {
        content = content.replace(MARKER_TITLE, DEFANGED_MARKER_TITLE);
    }
    content
}

/// Render the foundational fields of a character into the core-personality layer.
///
/// Only static fields feed this text, so it survives across turns until the
/// character itself is edited.
pub fn synthesize_core_personality(character: &Character) -> String {
    let mut out = format!("[Core Personality]\nName: {}", character.name);
    if !character.description.trim().is_empty() {
        out.push_str(&format!("\nDescription: {}", character.description.trim()));
    }
    if !character.backstory.trim().is_empty() {
        out.push_str(&format!("\nBackstory: {}", character.backstory.trim()));
    }
    let p = &character.personality;
    out.push_str(&format!(
        "\nPersonality: openness {:.2}, conscientiousness {:.2}, extraversion {:.2}, \
         agreeableness {:.2}, neuroticism {:.2}",
        p.openness, p.conscientiousness, p.extraversion, p.agreeableness, p.neuroticism
    ));
    if !character.speech_style.trim().is_empty() {
        out.push_str(&format!("\nSpeech style: {}", character.speech_style.trim()));
    }
    if !character.quirks.is_empty() {
        out.push('\n');
        out.push_str(&bullet_section("Quirks:", &character.quirks));
    }
    defang_section_marker(out)
}

fn render_scenario(scenario: &Scenario) -> String {
    let mut out = format!("[Scenario: {}]", scenario.name);
    for part in [&scenario.description, &scenario.prompt] {
        if !part.trim().is_empty() {
            out.push('\n');
            out.push_str(part.trim());
        }
    }
    out
}

fn render_emotional_state(mood: &EmotionalState) -> String {
    let (dominant, level) = mood.dominant();
    format!(
        "[Emotional State]\nDominant: {dominant} ({level:.2})\n\
         joy {:.2}, surprise {:.2}, anger {:.2}, fear {:.2}, sadness {:.2}, disgust {:.2}",
        mood.joy, mood.surprise, mood.anger, mood.fear, mood.sadness, mood.disgust
    )
}

fn render_user_memory(profile: Option<&UserProfile>, character: &Character) -> String {
    let mut lines = Vec::new();
    if let Some(profile) = profile.filter(|p| !p.is_empty()) {
        if let Some(name) = &profile.display_name {
            lines.push(format!("User name: {name}"));
        }
        if let Some(relationship) = &profile.relationship {
            lines.push(format!("Relationship: {relationship}"));
        }
        if !profile.facts.is_empty() {
            lines.push(bullet_section("Known facts:", &profile.facts));
        }
    }
    if !character.memories.is_empty() {
        let memories: Vec<String> = character
            .memories
            .iter()
            .map(|m| m.content.clone())
            .collect();
        lines.push(bullet_section("Memories:", &memories));
    }
    if lines.is_empty() {
        lines.push(EMPTY_USER_MEMORY.to_string());
    }
    format!("[User Memory]\n{}", lines.join("\n"))
}

fn render_history(request: &ConversationRequest) -> Option<String> {
    if request.history.is_empty() {
        return None;
    }
    let turns: Vec<String> = request
        .history
        .iter()
        .map(|m| format!("{}: {}", m.role.label(), m.content))
        .collect();
    Some(format!("[Conversation]\n{}", turns.join("\n")))
}

fn bullet_section(header: &str, items: &[String]) -> String {
    let mut out = header.to_string();
    for item in items {
        out.push_str("\n- ");
        out.push_str(item);
    }
    out
}
