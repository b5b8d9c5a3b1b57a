//! # Persona Engine
//!
//! Turns a conversation request into a provider call through the layered
//! caches:
//!
//! - [`PromptAssembler`] builds the deterministic, layer-ordered prompt
//! - [`ConversationService`] runs the memo fast path, the provider call and
//!   cache population
//! - [`CacheInvalidator`] tombstones and rebuilds a character's cached core
//!   personality when the character changes

pub mod assembler;
pub mod conversation;
pub mod invalidator;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use assembler::{
    AssembledPrompt, PROMPT_SECTION_MARKER, PromptAssembler, split_prompt,
    synthesize_core_personality,
};
pub use conversation::ConversationService;
pub use invalidator::CacheInvalidator;
