//! Adaptive TTL policy.
//!
//! ```text
//! ttl = base
//!     + base * active_bonus      (entry accessed within the active window)
//!     + base * complexity_bonus  (complex character)
//! ttl = clamp(ttl, min_ttl, max_ttl)
//! ```
//!
//! Both bonuses are computed from `base`; neither compounds on the other.

use chrono::{DateTime, Utc};
use persona_config::CacheConfig;
use persona_core::cache::elapsed_between;
use std::time::Duration;

/// Parameters for adaptive cache lifetimes.
///
/// Constructors normalize their inputs, so [`TtlPolicy::calculate`] is total:
/// bounds are reordered if inverted and unusable bonuses become zero.
#[derive(Debug, Clone, PartialEq)]
pub struct TtlPolicy {
    base_ttl: Duration,
    active_bonus: f64,
    complexity_bonus: f64,
    min_ttl: Duration,
    max_ttl: Duration,
    active_window: Duration,
}

pub const DEFAULT_ACTIVE_BONUS: f64 = 0.5;
pub const DEFAULT_COMPLEXITY_BONUS: f64 = 0.2;
pub const DEFAULT_ACTIVE_WINDOW: Duration = Duration::from_secs(5 * 60);

impl TtlPolicy {
    pub fn new(base_ttl: Duration, min_ttl: Duration, max_ttl: Duration) -> Self {
        let (min_ttl, max_ttl) = if min_ttl <= max_ttl {
            (min_ttl, max_ttl)
        } else {
            (max_ttl, min_ttl)
        };
        Self {
            base_ttl,
            active_bonus: DEFAULT_ACTIVE_BONUS,
            complexity_bonus: DEFAULT_COMPLEXITY_BONUS,
            min_ttl,
            max_ttl,
            active_window: DEFAULT_ACTIVE_WINDOW,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.base_ttl(), config.min_ttl(), config.max_ttl())
            .with_bonuses(config.active_bonus, config.complexity_bonus)
            .with_active_window(config.active_window())
    }

    pub fn with_bonuses(mut self, active_bonus: f64, complexity_bonus: f64) -> Self {
        self.active_bonus = sanitize_bonus(active_bonus);
        self.complexity_bonus = sanitize_bonus(complexity_bonus);
        self
    }

    pub fn with_active_window(mut self, window: Duration) -> Self {
        self.active_window = window;
        self
    }

    pub fn base_ttl(&self) -> Duration {
        self.base_ttl
    }

    pub fn min_ttl(&self) -> Duration {
        self.min_ttl
    }

    pub fn max_ttl(&self) -> Duration {
        self.max_ttl
    }

    /// Compute the TTL for an entry last accessed at `last_access` (if cached at all).
    pub fn calculate(
        &self,
        last_access: Option<DateTime<Utc>>,
        is_complex: bool,
        now: DateTime<Utc>,
    ) -> Duration {
        let mut factor = 1.0;
        if let Some(last_access) = last_access {
            if elapsed_between(last_access, now) < self.active_window {
                factor += self.active_bonus;
            }
        }
        if is_complex {
            factor += self.complexity_bonus;
        }
        self.scale(factor)
    }

    /// Clamp `ttl` into the policy bounds.
    pub fn clamp(&self, ttl: Duration) -> Duration {
        ttl.clamp(self.min_ttl, self.max_ttl)
    }

    fn scale(&self, factor: f64) -> Duration {
        // Anything at or past the ceiling is the ceiling; avoids overflow in mul_f64.
        if self.base_ttl.as_secs_f64() * factor >= self.max_ttl.as_secs_f64() {
            return self.max_ttl;
        }
        self.clamp(self.base_ttl.mul_f64(factor))
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

fn sanitize_bonus(bonus: f64) -> f64 {
    if bonus.is_finite() && bonus > 0.0 { bonus } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> TtlPolicy {
        TtlPolicy::new(
            Duration::from_secs(600),
            Duration::from_secs(60),
            Duration::from_secs(3600),
        )
    }

    #[test]
    fn cold_simple_entry_gets_base() {
        let p = policy();
        assert_eq!(p.calculate(None, false, Utc::now()), Duration::from_secs(600));
    }

    #[test]
    fn active_bonus_law() {
        let p = policy();
        let now = Utc::now();
        assert_eq!(
            p.calculate(Some(now), false, now),
            p.clamp(p.base_ttl().mul_f64(1.5))
        );
    }

    #[test]
    fn complexity_bonus_law() {
        let p = policy();
        assert_eq!(
            p.calculate(None, true, Utc::now()),
            p.clamp(p.base_ttl().mul_f64(1.2))
        );
    }

    #[test]
    fn bonuses_add_from_base() {
        let p = policy();
        let now = Utc::now();
        // 600 * (1 + 0.5 + 0.2) = 1020, not 600 * 1.5 * 1.2 = 1080
        let ttl = p.calculate(Some(now), true, now);
        assert!((ttl.as_secs_f64() - 1020.0).abs() < 1e-6, "{ttl:?}");
    }

    #[test]
    fn stale_access_gets_no_active_bonus() {
        let p = policy();
        let now = Utc::now();
        let stale = now - chrono::Duration::minutes(6);
        assert_eq!(p.calculate(Some(stale), false, now), Duration::from_secs(600));
    }

    #[test]
    fn clamp_law_over_many_inputs() {
        let now = Utc::now();
        let bases = [0u64, 1, 30, 59, 60, 600, 3000, 3600, 10_000, u64::MAX / 2];
        let bonuses = [0.0, 0.2, 0.5, 3.0, -1.0, f64::NAN, f64::INFINITY];
        for base in bases {
            for bonus in bonuses {
                let p = TtlPolicy::new(
                    Duration::from_secs(base),
                    Duration::from_secs(60),
                    Duration::from_secs(3600),
                )
                .with_bonuses(bonus, bonus);
                for access in [None, Some(now), Some(now - chrono::Duration::hours(1))] {
                    for complex in [false, true] {
                        let ttl = p.calculate(access, complex, now);
                        assert!(ttl >= p.min_ttl() && ttl <= p.max_ttl(), "{ttl:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn inverted_bounds_are_reordered() {
        let p = TtlPolicy::new(
            Duration::from_secs(10),
            Duration::from_secs(100),
            Duration::from_secs(50),
        );
        assert_eq!(p.min_ttl(), Duration::from_secs(50));
        assert_eq!(p.max_ttl(), Duration::from_secs(100));
        assert_eq!(p.calculate(None, false, Utc::now()), Duration::from_secs(50));
    }

    #[test]
    fn from_default_config() {
        let p = TtlPolicy::default();
        assert_eq!(p.base_ttl(), Duration::from_secs(600));
        assert_eq!(p.min_ttl(), Duration::from_secs(60));
        assert_eq!(p.max_ttl(), Duration::from_secs(3600));
    }
}
