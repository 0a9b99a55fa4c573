//! Services module

pub mod cache;
pub mod maintenance;
pub mod projects;
pub mod rate_limit;
pub mod subscription;
pub mod usage;
pub mod users;

pub use cache::{cache_key, TtlCache, DEFAULT_TTL};
pub use maintenance::{MaintenanceService, SweepReport};
pub use projects::ProjectStore;
pub use rate_limit::{
    RateLimitDecision, RateLimitGroup, RateLimitPolicy, RateLimiter, RateLimiters,
};
pub use subscription::{
    sign_webhook_payload, verify_webhook_signature, BillingEvent, EventOutcome,
    SubscriptionService, SIGNATURE_HEADER, SIGNATURE_TOLERANCE_SECS,
};
pub use usage::{
    local_today, Caller, CachedUserDirectory, ConsumeOutcome, IncrementOutcome, Limit,
    ResetOutcome, SqliteUsageStore, SqliteUserDirectory, TierPolicy, UsageCheck, UsageService,
    UsageStore, UserDirectory,
};
pub use users::{NewUser, UserStore};
