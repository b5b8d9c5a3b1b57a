//! Character cache invalidation and warmup.
//!
//! Any edit to a character's foundational fields must reach
//! [`CacheInvalidator::invalidate_character_cache`], either directly or
//! through a [`DomainEvent`] picked up by [`CacheInvalidator::spawn_listener`].

use persona_cache::{CacheService, core_personality_key};
use persona_core::cache::{CacheBreakpoint, CacheLayer};
use persona_core::character::{Character, CharacterRepository};
use persona_core::error::Result;
use persona_core::event::{DomainEvent, EventBus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::assembler::synthesize_core_personality;

/// Tombstones and rebuilds cached character content.
pub struct CacheInvalidator {
    characters: Arc<dyn CharacterRepository>,
    cache: Arc<CacheService>,
    core_personality_ttl: Duration,
}

impl CacheInvalidator {
    pub fn new(
        characters: Arc<dyn CharacterRepository>,
        cache: Arc<CacheService>,
        core_personality_ttl: Duration,
    ) -> Self {
        Self {
            characters,
            cache,
            core_personality_ttl,
        }
    }

    /// Tombstone the character's core entry, purge its memoized answers, and
    /// rebuild the core entry if the character still exists.
    pub async fn invalidate_character_cache(&self, character_id: &str) -> Result<()> {
        let key = core_personality_key(character_id);
        self.cache
            .breakpoints
            .store_with_ttl(&key, Vec::new(), Duration::ZERO)
            .await;
        let purged = self.cache.responses.remove_character(character_id).await;
        info!(
            character_id = %character_id,
            purged_responses = purged,
            "Invalidated character cache"
        );

        match self.characters.get_character(character_id).await? {
            Some(character) => self.warmup(&character).await,
            None => debug!(character_id = %character_id, "Character gone, leaving tombstone"),
        }
        Ok(())
    }

    /// Eagerly populate the core-personality entry for `character`.
    pub async fn warmup(&self, character: &Character) {
        let breakpoint = CacheBreakpoint::new(
            CacheLayer::CorePersonality,
            synthesize_core_personality(character),
            self.core_personality_ttl,
        );
        let tokens = breakpoint.token_count;
        self.cache
            .breakpoints
            .store_with_ttl(
                &core_personality_key(&character.id),
                vec![breakpoint],
                self.core_personality_ttl,
            )
            .await;
        info!(character_id = %character.id, tokens, "Warmed core personality cache");
    }

    /// React to one domain event.
    pub async fn handle_event(&self, event: &DomainEvent) -> Result<()> {
        match event {
            DomainEvent::CharacterCreated { character_id, .. } => {
                match self.characters.get_character(character_id).await? {
                    Some(character) => self.warmup(&character).await,
                    None => debug!(character_id = %character_id, "Created character already gone"),
                }
                Ok(())
            }
            DomainEvent::CharacterUpdated { character_id, .. }
            | DomainEvent::CharacterDeleted { character_id, .. } => {
                self.invalidate_character_cache(character_id).await
            }
        }
    }

    /// Subscribe to `bus` and handle character events until `cancel` fires.
    ///
    /// The subscription is taken before this returns, so events published
    /// afterwards are never missed.
    pub fn spawn_listener(
        self: &Arc<Self>,
        bus: &EventBus,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let mut events = bus.subscribe();
        let invalidator = Arc::clone(self);
        tokio::spawn(async move {
            info!("Cache invalidation listener started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = events.recv() => match received {
                        Ok(event) => {
                            if let Err(e) = invalidator.handle_event(&event).await {
                                warn!(
                                    character_id = %event.character_id(),
                                    error = %e,
                                    "Cache invalidation failed"
                                );
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Invalidation listener lagged behind the event bus");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            info!("Cache invalidation listener stopped");
        })
    }
}
