//! The shared cache service and its background maintenance tasks.

use chrono::Utc;
use persona_config::CacheConfig;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::breakpoint_store::{BreakpointStore, StoreStats};
use crate::response_memo::{MemoStats, ResponseMemo};
use crate::ttl::TtlPolicy;

/// Both caches, constructed once and shared as `Arc<CacheService>`.
pub struct CacheService {
    pub breakpoints: BreakpointStore,
    pub responses: ResponseMemo,
    cleanup_interval: Duration,
    sweep_interval: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub breakpoints: StoreStats,
    pub responses: MemoStats,
}

impl CacheService {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            breakpoints: BreakpointStore::new(TtlPolicy::from_config(config)),
            responses: ResponseMemo::new(config.response_ttl()),
            cleanup_interval: config.cleanup_interval(),
            sweep_interval: config.response_sweep_interval(),
        }
    }

    /// Override the worker intervals (mostly for tests).
    pub fn with_intervals(mut self, cleanup: Duration, sweep: Duration) -> Self {
        self.cleanup_interval = cleanup;
        self.sweep_interval = sweep;
        self
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            breakpoints: self.breakpoints.stats().await,
            responses: self.responses.stats().await,
        }
    }

    /// Spawn the breakpoint cleanup and response sweep loops.
    pub fn start_workers(self: &Arc<Self>) -> CacheWorkers {
        let cancel = CancellationToken::new();

        let cleanup = {
            let service = Arc::clone(self);
            let cancel = cancel.clone();
            let period = self.cleanup_interval;
            tokio::spawn(async move {
                run_periodic("breakpoint_cleanup", period, cancel, || async {
                    service.breakpoints.cleanup_expired(Utc::now()).await
                })
                .await
            })
        };

        let sweep = {
            let service = Arc::clone(self);
            let cancel = cancel.clone();
            let period = self.sweep_interval;
            tokio::spawn(async move {
                run_periodic("response_sweep", period, cancel, || async {
                    service.responses.sweep_expired(Utc::now()).await
                })
                .await
            })
        };

        info!(
            cleanup_secs = self.cleanup_interval.as_secs(),
            sweep_secs = self.sweep_interval.as_secs(),
            "Cache workers started"
        );

        CacheWorkers {
            cancel,
            handles: vec![cleanup, sweep],
        }
    }
}

impl Default for CacheService {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

async fn run_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    cancel: CancellationToken,
    mut tick: F,
)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = usize>,
{
    // interval() panics on a zero period
    let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(worker = name, "Cache worker stopping");
                return;
            }
            _ = interval.tick() => {
                let removed = tick().await;
                if removed > 0 {
                    info!(worker = name, removed, "Evicted expired cache entries");
                } else {
                    debug!(worker = name, "Nothing to evict");
                }
            }
        }
    }
}

/// Handle owning the background cache tasks.
pub struct CacheWorkers {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl CacheWorkers {
    /// A token that cancels with these workers; lets other tasks share the lifecycle.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Adopt another task into this worker set (e.g. an invalidation listener).
    pub fn attach(&mut self, handle: JoinHandle<()>) {
        self.handles.push(handle);
    }

    pub fn is_running(&self) -> bool {
        self.handles.iter().any(|h| !h.is_finished())
    }

    /// Cancel every worker and wait for it to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Cache worker ended abnormally");
            }
        }
        info!("Cache workers stopped");
    }
}
