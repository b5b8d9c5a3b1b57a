//! Subcommands and the session wiring they share.

pub mod chat;
pub mod doctor;
pub mod onboard;
pub mod prompt;

use persona_cache::{CacheService, CacheWorkers};
use persona_config::AppConfig;
use persona_core::character::Character;
use persona_core::event::EventBus;
use persona_core::repository::{InMemoryCharacterRepository, InMemoryScenarioRepository};
use persona_core::scenario::Scenario;
use persona_engine::{CacheInvalidator, PromptAssembler};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Who the user is talking to, and where the data comes from.
pub struct Target {
    pub characters: PathBuf,
    pub scenarios: Option<PathBuf>,
    pub character: String,
    pub user: String,
    pub scenario: Option<String>,
}

/// Repositories, caches and background workers for one CLI run.
pub struct Session {
    pub config: AppConfig,
    pub cache: Arc<CacheService>,
    pub assembler: Arc<PromptAssembler>,
    workers: CacheWorkers,
}

impl Session {
    /// Load the data files, start the cache workers and the invalidation
    /// listener, then register every character (which warms its cache).
    pub async fn open(
        config: AppConfig,
        target: &Target,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let characters: Vec<Character> = load_json_array(&target.characters, "characters")?;
        if !characters.iter().any(|c| c.id == target.character) {
            return Err(format!(
                "character '{}' not found in {}",
                target.character,
                target.characters.display()
            )
            .into());
        }

        let events = Arc::new(EventBus::default());
        let character_repo =
            Arc::new(InMemoryCharacterRepository::new().with_events(events.clone()));
        let cache = Arc::new(CacheService::from_config(&config.cache));

        let invalidator = Arc::new(CacheInvalidator::new(
            character_repo.clone(),
            cache.clone(),
            config.cache.core_personality_ttl(),
        ));
        let mut workers = cache.start_workers();
        workers.attach(invalidator.spawn_listener(&events, workers.token()));

        for character in characters {
            character_repo.save(character).await;
        }
        tracing::debug!(characters = ?character_repo.list_ids().await, "Characters registered");

        let mut assembler = PromptAssembler::from_config(character_repo, cache.clone(), &config);
        if let Some(path) = &target.scenarios {
            let scenario_repo = Arc::new(InMemoryScenarioRepository::new());
            for scenario in load_json_array::<Scenario>(path, "scenarios")? {
                scenario_repo.save(scenario).await;
            }
            assembler = assembler.with_scenarios(scenario_repo);
        }

        Ok(Self {
            config,
            cache,
            assembler: Arc::new(assembler),
            workers,
        })
    }

    pub async fn close(self) {
        let stats = self.cache.stats().await;
        tracing::debug!(
            breakpoint_entries = stats.breakpoints.entries,
            memoized_responses = stats.responses.entries,
            "Closing session"
        );
        self.workers.shutdown().await;
    }
}

/// Read a JSON array of `T` from `path`.
pub fn load_json_array<T: DeserializeOwned>(
    path: &Path,
    what: &str,
) -> Result<Vec<T>, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {what} from {}: {e}", path.display()))?;
    let items = serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse {what} in {}: {e}", path.display()))?;
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_character_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("characters.json");
        std::fs::write(
            &path,
            r#"[{"id":"wizard-1","name":"Gandalf","quirks":["Smokes a pipe"]},{"id":"knight-1","name":"Boromir"}]"#,
        )
        .unwrap();

        let characters: Vec<Character> = load_json_array(&path, "characters").unwrap();
        assert_eq!(characters.len(), 2);
        assert_eq!(characters[0].quirks, vec!["Smokes a pipe".to_string()]);
    }

    #[test]
    fn bad_json_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = load_json_array::<Character>(&path, "characters").unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }

    #[tokio::test]
    async fn session_rejects_unknown_character() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("characters.json");
        std::fs::write(&path, r#"[{"id":"wizard-1","name":"Gandalf"}]"#).unwrap();
        let target = Target {
            characters: path,
            scenarios: None,
            character: "nobody".into(),
            user: "u".into(),
            scenario: None,
        };
        assert!(Session::open(AppConfig::default(), &target).await.is_err());
    }
}
