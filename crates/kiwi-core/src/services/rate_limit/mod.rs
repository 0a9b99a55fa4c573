//! In-process rate limiting
//!
//! Fixed-window request counting per caller identity. Each limiter is an
//! independent instance with its own policy and state; the
//! [`RateLimiters`] registry owns one per [`RateLimitGroup`].
//!
//! State is process-local and lost on restart. In a horizontally scaled
//! deployment it is only a soft backstop.

mod registry;

pub use registry::{RateLimitGroup, RateLimiters};

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

/// Window length and request budget for one limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub window: Duration,
    pub max_requests: u32,
}

impl RateLimitPolicy {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
        }
    }

    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(Duration::from_secs(60), max_requests)
    }
}

/// Outcome of a single rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub success: bool,
    pub remaining: u32,
}

#[derive(Debug, Clone, Copy)]
struct WindowRecord {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window limiter keyed by caller identity
#[derive(Debug)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    windows: DashMap<String, WindowRecord>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            windows: DashMap::new(),
        }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Count one request from `identifier`
    pub fn check(&self, identifier: &str) -> RateLimitDecision {
        self.check_at(identifier, Instant::now())
    }

    pub fn check_at(&self, identifier: &str, now: Instant) -> RateLimitDecision {
        let max = self.policy.max_requests;
        let mut entry = self
            .windows
            .entry(identifier.to_string())
            .or_insert(WindowRecord {
                count: 0,
                reset_at: now,
            });
        let record = entry.value_mut();

        if record.count == 0 || now >= record.reset_at {
            record.count = 1;
            record.reset_at = now + self.policy.window;
            return RateLimitDecision {
                success: max > 0,
                remaining: max.saturating_sub(1),
            };
        }

        if record.count >= max {
            log::debug!("[rate_limit] {} denied ({} in window)", identifier, record.count);
            return RateLimitDecision {
                success: false,
                remaining: 0,
            };
        }

        record.count += 1;
        RateLimitDecision {
            success: true,
            remaining: max - record.count,
        }
    }

    /// Evict records whose window has elapsed
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    pub fn cleanup_at(&self, now: Instant) -> usize {
        let mut evicted = 0;
        self.windows.retain(|_, record| {
            let live = now < record.reset_at;
            if !live {
                evicted += 1;
            }
            live
        });
        evicted
    }

    /// Number of identifiers currently tracked
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_burst_then_reset() {
        let limiter = RateLimiter::new(RateLimitPolicy::new(secs(60), 5));
        let start = Instant::now();

        let remaining: Vec<u32> = (0..5)
            .map(|i| {
                let decision = limiter.check_at("X", start + secs(i * 2));
                assert!(decision.success);
                decision.remaining
            })
            .collect();
        assert_eq!(remaining, vec![4, 3, 2, 1, 0]);

        let denied = limiter.check_at("X", start + secs(30));
        assert!(!denied.success);
        assert_eq!(denied.remaining, 0);

        let fresh = limiter.check_at("X", start + secs(61));
        assert!(fresh.success);
        assert_eq!(fresh.remaining, 4);
    }

    #[test]
    fn test_window_boundary_is_inclusive() {
        let limiter = RateLimiter::new(RateLimitPolicy::new(secs(10), 1));
        let start = Instant::now();
        assert!(limiter.check_at("a", start).success);
        assert!(!limiter.check_at("a", start + secs(9)).success);
        assert!(limiter.check_at("a", start + secs(10)).success);
    }

    #[test]
    fn test_identifiers_are_independent() {
        let limiter = RateLimiter::new(RateLimitPolicy::per_minute(1));
        let now = Instant::now();
        assert!(limiter.check_at("user1", now).success);
        assert!(limiter.check_at("user2", now).success);
        assert!(!limiter.check_at("user1", now).success);
    }

    #[test]
    fn test_denied_requests_do_not_extend_window() {
        let limiter = RateLimiter::new(RateLimitPolicy::new(secs(60), 2));
        let start = Instant::now();
        limiter.check_at("a", start);
        limiter.check_at("a", start);
        for i in 1..10 {
            assert!(!limiter.check_at("a", start + secs(i * 5)).success);
        }
        assert!(limiter.check_at("a", start + secs(60)).success);
    }

    #[test]
    fn test_cleanup_evicts_expired_windows() {
        let limiter = RateLimiter::new(RateLimitPolicy::new(secs(60), 5));
        let start = Instant::now();
        limiter.check_at("old", start);
        limiter.check_at("new", start + secs(50));
        assert_eq!(limiter.len(), 2);

        assert_eq!(limiter.cleanup_at(start + secs(70)), 1);
        assert_eq!(limiter.len(), 1);
        assert_eq!(limiter.cleanup_at(start + secs(200)), 1);
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_zero_budget_denies_everything() {
        let limiter = RateLimiter::new(RateLimitPolicy::per_minute(0));
        let decision = limiter.check("a");
        assert!(!decision.success);
        assert_eq!(decision.remaining, 0);
    }

    #[test]
    fn test_concurrent_checks_never_exceed_budget() {
        use std::sync::Arc;

        let limiter = Arc::new(RateLimiter::new(RateLimitPolicy::per_minute(50)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..20).filter(|_| limiter.check("shared").success).count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 50);
    }

    #[test]
    fn test_cleanup_while_inserting() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let limiter = Arc::new(RateLimiter::new(RateLimitPolicy::new(
            Duration::from_millis(1),
            5,
        )));
        let done = Arc::new(AtomicBool::new(false));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        limiter.check(&format!("{}-{}", t, i));
                    }
                })
            })
            .collect();

        let sweeper = {
            let limiter = limiter.clone();
            let done = done.clone();
            std::thread::spawn(move || {
                let mut evicted = 0;
                while !done.load(Ordering::Relaxed) {
                    evicted += limiter.cleanup();
                }
                evicted
            })
        };

        for handle in handles {
            handle.join().unwrap();
        }
        done.store(true, Ordering::Relaxed);
        let mut evicted = sweeper.join().unwrap();

        std::thread::sleep(Duration::from_millis(5));
        evicted += limiter.cleanup();
        assert_eq!(evicted, 2000);
        assert!(limiter.is_empty());
    }
}
