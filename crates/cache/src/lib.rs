//! Local prompt caches for Persona.
//!
//! - [`BreakpointStore`]: layered prompt breakpoints keyed by cache key,
//!   evicted by the cleanup worker once any layer outlives its TTL.
//! - [`ResponseMemo`]: complete provider answers keyed by exact request.
//! - [`TtlPolicy`]: adaptive lifetimes from activity and complexity.
//! - [`keying`]: stable key derivation from the consistent prefix.
//!
//! Both caches are unbounded and expire by time only.

pub mod breakpoint_store;
pub mod keying;
pub mod response_memo;
pub mod service;
pub mod ttl;

pub use breakpoint_store::{BreakpointStore, CacheEntry, StoreStats};
pub use keying::{consistent_prefix, core_personality_key, generate_cache_key, PREFIX_SEPARATOR};
pub use response_memo::{CachedResponse, MemoStats, ResponseMemo};
pub use service::{CacheService, CacheStats, CacheWorkers};
pub use ttl::TtlPolicy;
