//! Domain event system — decoupled communication between bounded contexts.
//!
//! Character persistence publishes mutation events here; the cache
//! invalidator subscribes and rebuilds the affected core-personality layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A new character was saved
    CharacterCreated {
        character_id: String,
        timestamp: DateTime<Utc>,
    },

    /// One or more foundational fields of a character changed
    CharacterUpdated {
        character_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A character was removed
    CharacterDeleted {
        character_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn character_id(&self) -> &str {
        match self {
            DomainEvent::CharacterCreated { character_id, .. }
            | DomainEvent::CharacterUpdated { character_id, .. }
            | DomainEvent::CharacterDeleted { character_id, .. } => character_id,
        }
    }
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::CharacterUpdated {
            character_id: "wizard-1".into(),
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::CharacterUpdated { character_id, .. } => {
                assert_eq!(character_id, "wizard-1");
            }
            _ => panic!("Expected CharacterUpdated event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::CharacterDeleted {
            character_id: "gone".into(),
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn character_id_accessor() {
        let event = DomainEvent::CharacterCreated {
            character_id: "c1".into(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.character_id(), "c1");
    }
}
