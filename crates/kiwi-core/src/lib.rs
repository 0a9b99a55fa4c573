//! # kiwi-core
//!
//! Core business logic for Kiwi - shared between the CLI and the HTTP server.
//!
//! This crate provides:
//! - Database operations (`db` module)
//! - Data models (`models` module)
//! - Usage quotas, tier policy and rate limiting (`services` module)
//! - Authentication utilities (`auth` module)
//! - Runtime configuration (`config` module)
//! - Unified error handling (`error` module)

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

// Re-exports for convenience
pub use config::AppConfig;
pub use db::Database;
pub use error::{Error, Result};

// Re-export commonly used types from models
pub use models::{
    Claims, CreateKeyword, CreateProject, Keyword, MembershipTier, PersonaRole, Project,
    Subscription, SubscriptionStatus, UsageLog, User, UserResponse,
};

// Re-export commonly used types from services
pub use services::{
    Caller, Limit, MaintenanceService, ProjectStore, RateLimitGroup, RateLimiters,
    SubscriptionService, TierPolicy, TtlCache, UsageCheck, UsageService, UserStore,
};

/// Library version, reported by the server's health check
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
