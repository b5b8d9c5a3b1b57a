//! In-memory collaborator implementations — useful for testing, the CLI and
//! ephemeral sessions where persistence isn't needed.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::character::{Character, CharacterRepository};
use crate::error::{Error, Result};
use crate::event::{DomainEvent, EventBus};
use crate::scenario::{Scenario, ScenarioRepository, UserProfile, UserProfileRepository};

/// Characters held in a map, optionally announcing mutations on an [`EventBus`].
pub struct InMemoryCharacterRepository {
    characters: Arc<RwLock<HashMap<String, Character>>>,
    events: Option<Arc<EventBus>>,
}

impl InMemoryCharacterRepository {
    pub fn new() -> Self {
        Self {
            characters: Arc::new(RwLock::new(HashMap::new())),
            events: None,
        }
    }

    /// Publish `CharacterCreated/Updated/Deleted` on `bus` for every mutation.
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Insert or replace a character.
    pub async fn save(&self, character: Character) {
        let character_id = character.id.clone();
        let existed = self
            .characters
            .write()
            .await
            .insert(character_id.clone(), character)
            .is_some();

        let timestamp = Utc::now();
        self.publish(if existed {
            DomainEvent::CharacterUpdated {
                character_id,
                timestamp,
            }
        } else {
            DomainEvent::CharacterCreated {
                character_id,
                timestamp,
            }
        });
    }

    /// Remove a character. Returns whether it existed.
    pub async fn delete(&self, id: &str) -> bool {
        let removed = self.characters.write().await.remove(id).is_some();
        if removed {
            self.publish(DomainEvent::CharacterDeleted {
                character_id: id.to_string(),
                timestamp: Utc::now(),
            });
        }
        removed
    }

    pub async fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.characters.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}

impl Default for InMemoryCharacterRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CharacterRepository for InMemoryCharacterRepository {
    async fn get_character(&self, id: &str) -> Result<Option<Character>> {
        Ok(self.characters.read().await.get(id).cloned())
    }
}

/// Scenarios held in a map.
#[derive(Default)]
pub struct InMemoryScenarioRepository {
    scenarios: RwLock<HashMap<String, Scenario>>,
}

impl InMemoryScenarioRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn save(&self, scenario: Scenario) {
        self.scenarios
            .write()
            .await
            .insert(scenario.id.clone(), scenario);
    }
}

#[async_trait]
impl ScenarioRepository for InMemoryScenarioRepository {
    async fn load_scenario(&self, id: &str) -> Result<Scenario> {
        self.scenarios
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::scenario_not_found(id))
    }
}

/// User profiles keyed by `(user_id, character_id)`.
#[derive(Default)]
pub struct InMemoryUserProfileRepository {
    profiles: RwLock<HashMap<(String, String), UserProfile>>,
}

impl InMemoryUserProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn save(&self, profile: UserProfile) {
        let key = (profile.user_id.clone(), profile.character_id.clone());
        self.profiles.write().await.insert(key, profile);
    }
}

#[async_trait]
impl UserProfileRepository for InMemoryUserProfileRepository {
    async fn load_user_profile(&self, user_id: &str, character_id: &str) -> Result<UserProfile> {
        self.profiles
            .read()
            .await
            .get(&(user_id.to_string(), character_id.to_string()))
            .cloned()
            .ok_or_else(|| Error::NotFound {
                kind: "UserProfile",
                id: format!("{user_id}/{character_id}"),
            })
    }
}
