//! Character domain model and lookup trait.
//!
//! A character's *foundational* fields (name, description, backstory,
//! personality, speech style, quirks) feed the long-lived core-personality
//! prompt layer. Everything else (mood, learned behaviours, memories) changes
//! between turns and is rendered fresh on every request.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Quirk count above which a character counts as complex.
const COMPLEX_QUIRK_COUNT: usize = 3;

/// Backstory length (in characters) above which a character counts as complex.
const COMPLEX_BACKSTORY_CHARS: usize = 500;

/// Big-Five personality traits, each in 0.0–1.0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonalityTraits {
    #[serde(default)]
    pub openness: f64,
    #[serde(default)]
    pub conscientiousness: f64,
    #[serde(default)]
    pub extraversion: f64,
    #[serde(default)]
    pub agreeableness: f64,
    #[serde(default)]
    pub neuroticism: f64,
}

/// Current emotional state, each component in 0.0–1.0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionalState {
    #[serde(default)]
    pub joy: f64,
    #[serde(default)]
    pub surprise: f64,
    #[serde(default)]
    pub anger: f64,
    #[serde(default)]
    pub fear: f64,
    #[serde(default)]
    pub sadness: f64,
    #[serde(default)]
    pub disgust: f64,
}

impl EmotionalState {
    /// Name and value of the strongest emotion, ties resolved in declaration order.
    pub fn dominant(&self) -> (&'static str, f64) {
        let all = [
            ("joy", self.joy),
            ("surprise", self.surprise),
            ("anger", self.anger),
            ("fear", self.fear),
            ("sadness", self.sadness),
            ("disgust", self.disgust),
        ];
        all.into_iter()
            .fold(("neutral", 0.0), |best, cur| if cur.1 > best.1 { cur } else { best })
    }
}

/// How durable a memory is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    #[default]
    ShortTerm,
    MediumTerm,
    LongTerm,
}

/// Something the character remembers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    #[serde(default)]
    pub kind: MemoryKind,

    pub content: String,

    /// Emotional significance, 0.0–1.0
    #[serde(default)]
    pub emotional_weight: f64,

    pub timestamp: DateTime<Utc>,
}

/// A roleplay character.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub backstory: String,

    #[serde(default)]
    pub personality: PersonalityTraits,

    #[serde(default)]
    pub speech_style: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quirks: Vec<String>,

    /// Behaviours picked up over time (personality evolution output)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub learned_behaviors: Vec<String>,

    #[serde(default)]
    pub current_mood: EmotionalState,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub memories: Vec<Memory>,
}

impl Character {
    /// Create a character with only the required fields set.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            backstory: String::new(),
            personality: PersonalityTraits::default(),
            speech_style: String::new(),
            quirks: Vec::new(),
            learned_behaviors: Vec::new(),
            current_mood: EmotionalState::default(),
            memories: Vec::new(),
        }
    }

    /// Complex characters get a longer cache lifetime.
    pub fn is_complex(&self) -> bool {
        self.quirks.len() > COMPLEX_QUIRK_COUNT
            || self.backstory.chars().count() > COMPLEX_BACKSTORY_CHARS
    }
}

/// Character lookup by ID.
#[async_trait]
pub trait CharacterRepository: Send + Sync {
    /// Returns `Ok(None)` when no character has this ID.
    async fn get_character(&self, id: &str) -> Result<Option<Character>>;
}
