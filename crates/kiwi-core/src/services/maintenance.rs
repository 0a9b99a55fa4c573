//! Maintenance Sweeper
//!
//! Periodically evicts expired rate-limiter windows and cache entries so
//! the in-memory maps stay bounded.

use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::time::{interval, Duration};

use super::cache::TtlCache;
use super::rate_limit::RateLimiters;
use crate::models::User;

/// Counts removed by one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub rate_limit_windows: usize,
    pub cache_entries: usize,
}

/// Background task that sweeps the in-memory state on a fixed interval
pub struct MaintenanceService {
    limiters: Arc<RateLimiters>,
    user_cache: Arc<TtlCache<User>>,
    period: Duration,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl MaintenanceService {
    pub fn new(limiters: Arc<RateLimiters>, user_cache: Arc<TtlCache<User>>, period: Duration) -> Self {
        Self {
            limiters,
            user_cache,
            period,
            shutdown_tx: Mutex::new(None),
        }
    }

    /// Run one sweep immediately
    pub fn sweep(&self) -> SweepReport {
        sweep(&self.limiters, &self.user_cache)
    }

    pub async fn is_running(&self) -> bool {
        self.shutdown_tx.lock().await.is_some()
    }

    /// Start the sweeper loop; a second call while running is a no-op
    pub async fn start(&self) {
        let mut slot = self.shutdown_tx.lock().await;
        if slot.is_some() {
            log::info!("[maintenance] Sweeper is already running");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        *slot = Some(shutdown_tx);
        drop(slot);

        log::info!("[maintenance] Starting sweeper every {}s", self.period.as_secs());

        let limiters = Arc::clone(&self.limiters);
        let user_cache = Arc::clone(&self.user_cache);
        let period = self.period;

        tokio::spawn(async move {
            let mut timer = interval(period);

            // Skip the first tick (immediate)
            timer.tick().await;

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        sweep(&limiters, &user_cache);
                    }
                    _ = &mut shutdown_rx => {
                        log::info!("[maintenance] Sweeper received shutdown signal");
                        break;
                    }
                }
            }

            log::info!("[maintenance] Sweeper stopped");
        });
    }

    /// Stop the sweeper loop
    pub async fn stop(&self) {
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(());
        }
    }
}

fn sweep(limiters: &RateLimiters, user_cache: &TtlCache<User>) -> SweepReport {
    let report = SweepReport {
        rate_limit_windows: limiters.cleanup_all(),
        cache_entries: user_cache.cleanup(),
    };

    if report.rate_limit_windows > 0 || report.cache_entries > 0 {
        log::info!(
            "[maintenance] Evicted {} rate-limit windows and {} cache entries",
            report.rate_limit_windows,
            report.cache_entries
        );
    } else {
        log::debug!("[maintenance] Nothing to evict");
    }

    report
}
