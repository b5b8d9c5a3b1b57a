//! # Persona Core
//!
//! Domain types, collaborator traits, and error definitions for the Persona
//! prompt engine. This crate has **no framework dependencies** — it defines
//! the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (character lookup, scenarios, user profiles,
//! the LLM provider) is a trait here. Implementations live elsewhere, except
//! for the in-memory repositories in [`repository`], which exist for tests and
//! the CLI.

pub mod cache;
pub mod character;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod repository;
pub mod scenario;
pub mod token;

// Re-export key types at crate root for ergonomics
pub use cache::{CacheBreakpoint, CacheLayer, CacheMetrics};
pub use character::{Character, CharacterRepository, EmotionalState, Memory, PersonalityTraits};
pub use error::{Error, ProviderError, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{ConversationRequest, HistoryMessage, Role};
pub use provider::{AiResponse, PromptRequest, Provider, ProviderResponse, TokenUsage};
pub use scenario::{Scenario, ScenarioRepository, UserProfile, UserProfileRepository};
