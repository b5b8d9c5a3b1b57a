//! Breakpoint store — cache key → layered breakpoints.
//!
//! One process-wide `RwLock` guards the map. Every method holds it only for
//! the map operation itself, never across another await.
//!
//! Reads never check TTLs; expiry is the cleanup worker's job. Cleanup is
//! deliberately coarse: an entry is dropped as a whole as soon as *any* of
//! its breakpoints has aged past its own TTL.

use chrono::{DateTime, Utc};
use persona_core::cache::{CacheBreakpoint, CacheLayer};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use crate::ttl::TtlPolicy;

/// The layered breakpoints cached under one key.
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry {
    /// Always sorted by layer, never contains a conversation breakpoint
    pub breakpoints: Vec<CacheBreakpoint>,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    pub hit_count: u64,
}

impl CacheEntry {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            breakpoints: Vec::new(),
            created_at: now,
            last_access: now,
            hit_count: 0,
        }
    }

    /// The breakpoint for `layer`, if present.
    pub fn breakpoint(&self, layer: CacheLayer) -> Option<&CacheBreakpoint> {
        self.breakpoints.iter().find(|bp| bp.layer == layer)
    }

    /// True once any breakpoint has outlived its TTL.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.breakpoints.iter().any(|bp| bp.is_expired_at(now))
    }

    pub fn total_tokens(&self) -> usize {
        self.breakpoints.iter().map(|bp| bp.token_count).sum()
    }

    /// A fresh entry whose breakpoints all take `ttl` and `now`.
    fn replacement(breakpoints: Vec<CacheBreakpoint>, ttl: Duration, now: DateTime<Utc>) -> Self {
        let mut breakpoints: Vec<CacheBreakpoint> = breakpoints
            .into_iter()
            .filter(|bp| bp.layer.is_prefix())
            .map(|mut bp| {
                bp.ttl = ttl;
                bp.last_used = now;
                bp.from_cache = false;
                bp
            })
            .collect();
        breakpoints.sort_by_key(|bp| bp.layer);
        Self {
            breakpoints,
            created_at: now,
            last_access: now,
            hit_count: 0,
        }
    }

    fn insert_ordered(&mut self, breakpoint: CacheBreakpoint) {
        let at = self
            .breakpoints
            .partition_point(|bp| bp.layer <= breakpoint.layer);
        self.breakpoints.insert(at, breakpoint);
    }
}

/// Snapshot of store occupancy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub entries: usize,
    pub breakpoints: usize,
    pub tokens: usize,
    pub total_hits: u64,
}

/// Map of cache key → [`CacheEntry`] with TTL-aware cleanup.
pub struct BreakpointStore {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    policy: TtlPolicy,
}

impl BreakpointStore {
    pub fn new(policy: TtlPolicy) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            policy,
        }
    }

    pub fn policy(&self) -> &TtlPolicy {
        &self.policy
    }

    /// Append one breakpoint to the entry for `key`, creating it if absent.
    ///
    /// Conversation content is never cached; such calls are ignored.
    pub async fn store(
        &self,
        key: &str,
        layer: CacheLayer,
        content: impl Into<String>,
        ttl: Duration,
    ) {
        if !layer.is_prefix() {
            debug!(key = %key, "Ignoring store of conversation breakpoint");
            return;
        }

        let breakpoint = CacheBreakpoint::new(layer, content, ttl);
        let now = breakpoint.last_used;
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| CacheEntry::new(now));
        entry.insert_ordered(breakpoint);
        entry.last_access = now;
        debug!(key = %key, layer = %layer, "Stored breakpoint");
    }

    /// Replace the entry for `key` wholesale; every breakpoint takes `ttl`.
    ///
    /// An empty `breakpoints` list with a zero TTL is a tombstone: lookups
    /// still find the key but no layer content.
    pub async fn store_with_ttl(
        &self,
        key: &str,
        breakpoints: Vec<CacheBreakpoint>,
        ttl: Duration,
    ) {
        let entry = CacheEntry::replacement(breakpoints, ttl, Utc::now());
        let count = entry.breakpoints.len();
        self.entries.write().await.insert(key.to_string(), entry);
        debug!(key = %key, breakpoints = count, ttl_secs = ttl.as_secs(), "Replaced cache entry");
    }

    /// Replace the entry for `key` with `breakpoint` unless the entry already
    /// holds a breakpoint for the same layer.
    ///
    /// Check and write happen under one write guard, so a lazy rebuild from
    /// a stale read cannot clobber content a concurrent warmup stored first.
    /// Returns the breakpoint that was already cached, or `None` if
    /// `breakpoint` was stored.
    pub async fn store_if_missing(
        &self,
        key: &str,
        breakpoint: CacheBreakpoint,
        ttl: Duration,
    ) -> Option<CacheBreakpoint> {
        let layer = breakpoint.layer;
        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get(key).and_then(|e| e.breakpoint(layer)) {
            debug!(key = %key, layer = %layer, "Breakpoint already cached, keeping it");
            return Some(existing.clone());
        }
        entries.insert(
            key.to_string(),
            CacheEntry::replacement(vec![breakpoint], ttl, Utc::now()),
        );
        debug!(key = %key, layer = %layer, ttl_secs = ttl.as_secs(), "Stored missing breakpoint");
        None
    }

    /// Look up `key`, counting the hit and refreshing `last_access`.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(key)?;
        entry.hit_count += 1;
        entry.last_access = Utc::now();
        Some(entry.clone())
    }

    /// Adaptive TTL for an entry (or a cold key when `entry` is `None`).
    pub fn calculate_adaptive_ttl(&self, entry: Option<&CacheEntry>, is_complex: bool) -> Duration {
        self.policy
            .calculate(entry.map(|e| e.last_access), is_complex, Utc::now())
    }

    /// Drop every entry with at least one expired breakpoint. Returns the number removed.
    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        before - entries.len()
    }

    pub async fn remove(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn stats(&self) -> StoreStats {
        let entries = self.entries.read().await;
        entries.values().fold(
            StoreStats {
                entries: entries.len(),
                ..Default::default()
            },
            |mut stats, entry| {
                stats.breakpoints += entry.breakpoints.len();
                stats.tokens += entry.total_tokens();
                stats.total_hits += entry.hit_count;
                stats
            },
        )
    }
}

impl Default for BreakpointStore {
    fn default() -> Self {
        Self::new(TtlPolicy::default())
    }
}
