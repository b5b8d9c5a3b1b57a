//! Shared test helpers for engine tests.

use persona_core::character::{Character, PersonalityTraits};
use persona_core::error::ProviderError;
use persona_core::provider::{PromptRequest, Provider, ProviderResponse, TokenUsage};
use persona_core::repository::InMemoryCharacterRepository;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A provider that replays scripted outcomes and records every request.
///
/// Panics if more calls are made than outcomes provided.
pub struct ScriptedProvider {
    outcomes: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<PromptRequest>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(outcomes: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleep before answering, to exercise cancellation and timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<PromptRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn send_request(
        &self,
        request: PromptRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.is_empty() {
            panic!("ScriptedProvider: no outcome scripted for call #{call}");
        }
        outcomes.remove(0)
    }
}

pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        content: text.into(),
        usage: Some(TokenUsage::new(120, 12)),
        model: "mock-model".into(),
    }
}

/// The reference character used across engine tests.
pub fn wizard() -> Character {
    let mut c = Character::new("wizard-1", "Gandalf");
    c.description = "A wandering wizard in a grey cloak.".into();
    c.backstory = "One of the Istari, sent to oppose the shadow.".into();
    c.personality = PersonalityTraits {
        openness: 0.9,
        conscientiousness: 0.7,
        extraversion: 0.4,
        agreeableness: 0.6,
        neuroticism: 0.2,
    };
    c.speech_style = "Archaic and measured".into();
    c.quirks = vec!["Smokes a pipe".into(), "Arrives precisely when he means to".into()];
    c.learned_behaviors = vec!["Answers questions with questions".into()];
    c.current_mood.joy = 0.6;
    c.memories = vec![persona_core::character::Memory {
        kind: Default::default(),
        content: "Met a curious hobbit in the Shire".into(),
        emotional_weight: 0.5,
        timestamp: chrono::Utc::now(),
    }];
    c
}

pub async fn character_repo(characters: Vec<Character>) -> Arc<InMemoryCharacterRepository> {
    let repo = Arc::new(InMemoryCharacterRepository::new());
    for character in characters {
        repo.save(character).await;
    }
    repo
}

/// Poll `check` for up to a second.
pub async fn wait_for<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
