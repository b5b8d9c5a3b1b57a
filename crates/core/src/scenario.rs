//! Scenarios and user profiles — the optional collaborators.
//!
//! Both are looked up per request. A failed lookup never aborts prompt
//! assembly; the corresponding layer is simply left out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A scene or setting that frames the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Free-form setting text rendered verbatim into the prompt
    #[serde(default)]
    pub prompt: String,
}

/// What a character knows about a particular user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,

    pub character_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Facts learned about the user, in insertion order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facts: Vec<String>,

    /// Short description of the relationship so far
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
}

impl UserProfile {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.facts.is_empty() && self.relationship.is_none()
    }
}

#[async_trait]
pub trait ScenarioRepository: Send + Sync {
    async fn load_scenario(&self, id: &str) -> Result<Scenario>;
}

#[async_trait]
pub trait UserProfileRepository: Send + Sync {
    async fn load_user_profile(&self, user_id: &str, character_id: &str) -> Result<UserProfile>;
}
