//! Conversation turn types.
//!
//! These are the value objects that flow through the engine:
//! a caller builds a [`ConversationRequest`] → the engine assembles a prompt →
//! the provider answers → the reply is appended to the caller's history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The character (model output)
    Assistant,
    /// Out-of-band system notes
    System,
}

impl Role {
    /// Speaker label used when rendering history into the prompt.
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Character",
            Role::System => "System",
        }
    }
}

/// A prior turn supplied with a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// When the message was sent
    pub timestamp: DateTime<Utc>,
}

impl HistoryMessage {
    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a new character (assistant) message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A single conversation turn addressed to a character.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRequest {
    /// The character being addressed
    pub character_id: String,

    /// The user speaking
    pub user_id: String,

    /// Optional scenario framing the conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_id: Option<String>,

    /// The current message text
    pub message: String,

    /// Prior turns, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<HistoryMessage>,
}

impl ConversationRequest {
    pub fn new(
        character_id: impl Into<String>,
        user_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            character_id: character_id.into(),
            user_id: user_id.into(),
            scenario_id: None,
            message: message.into(),
            history: Vec::new(),
        }
    }

    pub fn with_scenario(mut self, scenario_id: impl Into<String>) -> Self {
        self.scenario_id = Some(scenario_id.into());
        self
    }

    pub fn with_history(mut self, history: Vec<HistoryMessage>) -> Self {
        self.history = history;
        self
    }
}
