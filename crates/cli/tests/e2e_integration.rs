//! End-to-end integration tests for the Persona prompt cache.
//!
//! These tests wire the real repositories, cache service, assembler,
//! invalidator and conversation service together, with only the provider
//! scripted.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use persona_cache::{CacheService, core_personality_key, generate_cache_key};
use persona_config::AppConfig;
use persona_core::cache::CacheLayer;
use persona_core::character::{Character, PersonalityTraits};
use persona_core::error::ProviderError;
use persona_core::event::EventBus;
use persona_core::message::{ConversationRequest, HistoryMessage};
use persona_core::provider::{PromptRequest, Provider, ProviderResponse, TokenUsage};
use persona_core::repository::{InMemoryCharacterRepository, InMemoryScenarioRepository};
use persona_core::scenario::Scenario;
use persona_engine::{CacheInvalidator, ConversationService, PromptAssembler, split_prompt};
use tokio_util::sync::CancellationToken;

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that answers with a numbered reply and records requests.
struct RecordingProvider {
    requests: Mutex<Vec<PromptRequest>>,
}

impl RecordingProvider {
    fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<PromptRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for RecordingProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn send_request(
        &self,
        request: PromptRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request);
        Ok(ProviderResponse {
            content: format!("Reply #{}", requests.len()),
            usage: Some(TokenUsage::new(200, 10)),
            model: "mock".into(),
        })
    }
}

fn wizard() -> Character {
    let mut c = Character::new("wizard-1", "Merlin");
    c.description = "An ancient wizard of great wisdom.".into();
    c.backstory = "Advisor to kings, keeper of old secrets.".into();
    c.personality = PersonalityTraits {
        openness: 0.95,
        conscientiousness: 0.8,
        extraversion: 0.3,
        agreeableness: 0.7,
        neuroticism: 0.1,
    };
    c.speech_style = "Formal and cryptic".into();
    c.quirks = vec!["Strokes his beard".into()];
    c
}

struct Stack {
    repo: Arc<InMemoryCharacterRepository>,
    cache: Arc<CacheService>,
    service: ConversationService,
    provider: Arc<RecordingProvider>,
}

async fn stack() -> Stack {
    let repo = Arc::new(InMemoryCharacterRepository::new());
    repo.save(wizard()).await;
    let cache = Arc::new(CacheService::default());
    let assembler = Arc::new(PromptAssembler::new(repo.clone(), cache.clone()));
    let provider = Arc::new(RecordingProvider::new());
    let service = ConversationService::new(assembler, provider.clone(), "mock");
    Stack {
        repo,
        cache,
        service,
        provider,
    }
}

// ── E2E: Two-turn session ────────────────────────────────────────────────

#[tokio::test]
async fn e2e_wizard_two_turn_session() {
    let s = stack().await;

    let first = ConversationRequest::new("wizard-1", "user-1", "Hello there");
    let reply = s.service.process_request(&first, CancellationToken::new()).await.unwrap();
    assert_eq!(reply.content, "Reply #1");

    let second = ConversationRequest::new("wizard-1", "user-1", "Tell me about magic")
        .with_history(vec![
            HistoryMessage::user("Hello there"),
            HistoryMessage::assistant(reply.content.clone()),
        ]);
    let reply = s.service.process_request(&second, CancellationToken::new()).await.unwrap();
    assert_eq!(reply.content, "Reply #2");

    let sent = s.provider.requests();
    assert_eq!(sent[0].system_prompt, sent[1].system_prompt);
    assert!(sent[0].system_prompt.contains("Name: Merlin"));
    assert!(sent[1].message.ends_with("User: Tell me about magic"));
    assert_eq!(
        generate_cache_key("wizard-1", "user-1", None, &sent[0].breakpoints),
        generate_cache_key("wizard-1", "user-1", None, &sent[1].breakpoints)
    );
}

#[tokio::test]
async fn e2e_prefix_identical_across_independent_stacks() {
    let a = stack().await;
    let b = stack().await;
    let request = ConversationRequest::new("wizard-1", "user-1", "Hello");

    let mut prefixes = Vec::new();
    for s in [&a, &b] {
        for _ in 0..3 {
            let prompt = s.service.assembler().build_prompt(&request).await.unwrap();
            let (prefix, _) = split_prompt(&prompt.full_prompt).unwrap();
            prefixes.push(prefix.to_string());
        }
    }
    assert!(prefixes.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn e2e_memo_serves_repeat_and_invalidation_clears_it() {
    let s = stack().await;
    let invalidator =
        CacheInvalidator::new(s.repo.clone(), s.cache.clone(), Duration::from_secs(3600));
    let request = ConversationRequest::new("wizard-1", "user-1", "What is your name?");

    s.service.process_request(&request, CancellationToken::new()).await.unwrap();
    let repeat = s.service.process_request(&request, CancellationToken::new()).await.unwrap();
    assert_eq!(repeat.content, "Reply #1");
    assert!(repeat.cache_metrics.hit);
    assert_eq!(s.provider.requests().len(), 1);

    let mut renamed = wizard();
    renamed.name = "Myrddin".into();
    s.repo.save(renamed).await;
    invalidator.invalidate_character_cache("wizard-1").await.unwrap();

    let fresh = s.service.process_request(&request, CancellationToken::new()).await.unwrap();
    assert_eq!(fresh.content, "Reply #2");
    assert!(s.provider.requests()[1].system_prompt.contains("Name: Myrddin"));
}

#[tokio::test]
async fn e2e_scenario_changes_key_but_not_determinism() {
    let repo = Arc::new(InMemoryCharacterRepository::new());
    repo.save(wizard()).await;
    let scenarios = Arc::new(InMemoryScenarioRepository::new());
    scenarios
        .save(Scenario {
            id: "camelot".into(),
            name: "Camelot".into(),
            description: "The great hall at midwinter.".into(),
            prompt: String::new(),
        })
        .await;
    let cache = Arc::new(CacheService::default());
    let assembler = PromptAssembler::new(repo, cache).with_scenarios(scenarios);

    let plain = ConversationRequest::new("wizard-1", "user-1", "Hi");
    let framed = ConversationRequest::new("wizard-1", "user-1", "Hi").with_scenario("camelot");
    let a = assembler.build_prompt(&plain).await.unwrap();
    let b = assembler.build_prompt(&framed).await.unwrap();
    let b2 = assembler.build_prompt(&framed).await.unwrap();

    assert_eq!(b.prefix, b2.prefix);
    assert!(b.breakpoint(CacheLayer::ScenarioContext).is_some());
    assert_ne!(
        generate_cache_key("wizard-1", "user-1", None, &a.breakpoints),
        generate_cache_key("wizard-1", "user-1", Some("camelot"), &b.breakpoints)
    );
}

#[tokio::test]
async fn e2e_event_driven_warmup_and_worker_lifecycle() {
    let bus = Arc::new(EventBus::default());
    let repo = Arc::new(InMemoryCharacterRepository::new().with_events(bus.clone()));
    let cache = Arc::new(CacheService::from_config(&AppConfig::default().cache));
    let invalidator = Arc::new(CacheInvalidator::new(
        repo.clone(),
        cache.clone(),
        Duration::from_secs(3600),
    ));

    let mut workers = cache.start_workers();
    workers.attach(invalidator.spawn_listener(&bus, workers.token()));

    repo.save(wizard()).await;
    let key = core_personality_key("wizard-1");
    let mut warmed = false;
    for _ in 0..100 {
        if cache.breakpoints.get(&key).await.is_some() {
            warmed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(warmed, "core personality was not warmed by the listener");

    let token = workers.token();
    workers.shutdown().await;
    assert!(token.is_cancelled());
}
