//! Usage quota module
//!
//! Daily per-service usage counting gated by subscription tier.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ UsageService                                  │
//! │   - check_usage()      (pure read)            │
//! │   - increment_usage()  (atomic +1)            │
//! │   - consume()          (atomic check + 1)     │
//! │   - reset_usage()      (admin only)           │
//! └───────────────────────────────────────────────┘
//!      │                │                 │
//!      ▼                ▼                 ▼
//! ┌──────────┐   ┌─────────────┐   ┌──────────────┐
//! │TierPolicy│   │ UsageStore  │   │UserDirectory │
//! │ (static) │   │ (usage_logs)│   │   (users)    │
//! └──────────┘   └─────────────┘   └──────────────┘
//! ```

pub mod service;
pub mod store;
pub mod tier;

pub use service::{
    local_today, Caller, ConsumeOutcome, IncrementOutcome, ResetOutcome, UsageCheck,
    UsageService, ANONYMOUS_TIER,
};
pub use store::{
    CachedUserDirectory, SqliteUsageStore, SqliteUserDirectory, UsageStore, UserDirectory,
};
pub use tier::{Allowance, Limit, TierPolicy};
