//! CLI commands module
//!
//! Contains all CLI command implementations.

pub mod config;
pub mod subscription;
pub mod tiers;
pub mod usage;
pub mod user;

use crate::output::OutputFormat;
use kiwi_core::{AppConfig, Database};

/// Shared context for all commands
pub struct Context {
    pub db: Database,
    pub config: AppConfig,
    pub format: OutputFormat,
    pub quiet: bool,
}
