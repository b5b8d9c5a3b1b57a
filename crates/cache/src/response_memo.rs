//! Full-response memoization keyed by exact request identity.
//!
//! Keys are SHA-256 over `character_id|user_id|message` with no
//! normalization: a single differing byte (whitespace included) is a miss.

use chrono::{DateTime, Utc};
use persona_core::provider::TokenUsage;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// A memoized provider answer.
#[derive(Debug, Clone, Serialize)]
pub struct CachedResponse {
    pub content: String,
    pub token_usage: TokenUsage,
    pub model: String,
    /// Lets invalidation purge a character's answers
    pub character_id: String,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub hit_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemoStats {
    pub entries: usize,
    pub total_hits: u64,
}

/// Exact-request response cache with a single process-wide TTL.
pub struct ResponseMemo {
    entries: Arc<RwLock<HashMap<String, CachedResponse>>>,
    ttl: Duration,
}

impl ResponseMemo {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Hex SHA-256 of the literal `character_id|user_id|message`.
    pub fn generate_key(character_id: &str, user_id: &str, message: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(character_id.as_bytes());
        hasher.update(b"|");
        hasher.update(user_id.as_bytes());
        hasher.update(b"|");
        hasher.update(message.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// A live response for `key`. Expired entries are left for the sweep.
    pub async fn get(&self, key: &str) -> Option<CachedResponse> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let cached = entries.get_mut(key)?;
        if now >= cached.expires_at {
            debug!(key = %key, "Memoized response expired");
            return None;
        }
        cached.hit_count += 1;
        Some(cached.clone())
    }

    /// Memoize a successful provider answer for the configured TTL.
    pub async fn store(
        &self,
        key: &str,
        character_id: &str,
        content: impl Into<String>,
        token_usage: TokenUsage,
        model: impl Into<String>,
    ) {
        let cached_at = Utc::now();
        let expires_at = cached_at
            + chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        let response = CachedResponse {
            content: content.into(),
            token_usage,
            model: model.into(),
            character_id: character_id.to_string(),
            cached_at,
            expires_at,
            hit_count: 0,
        };
        self.entries.write().await.insert(key.to_string(), response);
        debug!(key = %key, character_id = %character_id, "Memoized response");
    }

    /// Remove entries whose expiry has passed. Returns the number removed.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, cached| now <= cached.expires_at);
        before - entries.len()
    }

    /// Drop every memoized answer given by `character_id`.
    pub async fn remove_character(&self, character_id: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, cached| cached.character_id != character_id);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn stats(&self) -> MemoStats {
        let entries = self.entries.read().await;
        MemoStats {
            entries: entries.len(),
            total_hits: entries.values().map(|c| c.hit_count).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage() -> TokenUsage {
        TokenUsage::new(100, 20)
    }

    #[test]
    fn key_is_sha256_of_pipe_joined_fields() {
        let key = ResponseMemo::generate_key("c", "u", "m");
        assert_eq!(key.len(), 64);
        let expected = hex::encode(Sha256::digest(b"c|u|m"));
        assert_eq!(key, expected);
    }

    #[test]
    fn key_is_exact() {
        let base = ResponseMemo::generate_key("wizard-1", "user-1", "Hello there");
        assert_eq!(base, ResponseMemo::generate_key("wizard-1", "user-1", "Hello there"));
        assert_ne!(base, ResponseMemo::generate_key("wizard-1", "user-1", "Hello there "));
        assert_ne!(base, ResponseMemo::generate_key("wizard-1", "user-1", "hello there"));
        assert_ne!(base, ResponseMemo::generate_key("wizard-1", "user-1", "Hello there!"));
        assert_ne!(base, ResponseMemo::generate_key("wizard-1", "user-2", "Hello there"));
    }

    #[tokio::test]
    async fn store_then_hit() {
        let memo = ResponseMemo::new(Duration::from_secs(60));
        let key = ResponseMemo::generate_key("c", "u", "m");
        memo.store(&key, "c", "reply", usage(), "mock").await;

        let first = memo.get(&key).await.unwrap();
        assert_eq!(first.content, "reply");
        assert_eq!(first.hit_count, 1);
        assert_eq!(memo.get(&key).await.unwrap().hit_count, 2);
        assert!(memo.get("other").await.is_none());
    }

    #[tokio::test]
    async fn whitespace_difference_is_a_miss() {
        let memo = ResponseMemo::new(Duration::from_secs(60));
        memo.store(&ResponseMemo::generate_key("c", "u", "hi"), "c", "reply", usage(), "mock")
            .await;
        assert!(memo.get(&ResponseMemo::generate_key("c", "u", "hi ")).await.is_none());
        assert!(memo.get(&ResponseMemo::generate_key("c", "u", "hi")).await.is_some());
    }

    #[tokio::test]
    async fn expired_is_a_miss_but_not_deleted() {
        let memo = ResponseMemo::new(Duration::ZERO);
        memo.store("k", "c", "reply", usage(), "mock").await;
        assert!(memo.get("k").await.is_none());
        assert_eq!(memo.len().await, 1);

        let removed = memo.sweep_expired(Utc::now() + chrono::Duration::seconds(1)).await;
        assert_eq!(removed, 1);
        assert!(memo.is_empty().await);
    }

    #[tokio::test]
    async fn sweep_keeps_live_entries() {
        let memo = ResponseMemo::new(Duration::from_secs(600));
        memo.store("k", "c", "reply", usage(), "mock").await;
        assert_eq!(memo.sweep_expired(Utc::now()).await, 0);
        assert_eq!(memo.len().await, 1);
    }

    #[tokio::test]
    async fn remove_character_only_touches_that_character() {
        let memo = ResponseMemo::new(Duration::from_secs(600));
        memo.store("a", "wizard-1", "x", usage(), "mock").await;
        memo.store("b", "wizard-1", "y", usage(), "mock").await;
        memo.store("c", "knight-1", "z", usage(), "mock").await;

        assert_eq!(memo.remove_character("wizard-1").await, 2);
        assert_eq!(memo.len().await, 1);
        assert!(memo.get("c").await.is_some());

        let stats = memo.stats().await;
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.total_hits, 1);
    }
}
