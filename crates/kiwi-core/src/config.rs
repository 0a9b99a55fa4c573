//! Runtime configuration
//!
//! Every knob comes from a `KIWI_*` environment variable with a sensible
//! default. The loaded [`AppConfig`] is passed down explicitly to the
//! components that need it.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::services::rate_limit::RateLimitGroup;

/// Default listen address for the HTTP server
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";

/// Advisory allowance shown to signed-out callers
pub const DEFAULT_ANONYMOUS_ALLOWANCE: u32 = 5;

/// How often expired limiter windows and cache entries are swept
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 5 * 60;

/// Per-minute request budgets for each rate-limit group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitSettings {
    pub global_per_minute: u32,
    pub general_per_minute: u32,
    pub keyword_analysis_per_minute: u32,
    pub trends_per_minute: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            global_per_minute: RateLimitGroup::Global.default_per_minute(),
            general_per_minute: RateLimitGroup::General.default_per_minute(),
            keyword_analysis_per_minute: RateLimitGroup::KeywordAnalysis.default_per_minute(),
            trends_per_minute: RateLimitGroup::Trends.default_per_minute(),
        }
    }
}

impl RateLimitSettings {
    /// Budget for one group
    pub fn per_minute(&self, group: RateLimitGroup) -> u32 {
        match group {
            RateLimitGroup::Global => self.global_per_minute,
            RateLimitGroup::General => self.general_per_minute,
            RateLimitGroup::KeywordAnalysis => self.keyword_analysis_per_minute,
            RateLimitGroup::Trends => self.trends_per_minute,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub bind_addr: String,
    #[serde(skip)]
    pub jwt_secret: Option<String>,
    #[serde(skip)]
    pub webhook_secret: Option<String>,
    pub anonymous_allowance: u32,
    pub rate_limits: RateLimitSettings,
    pub cleanup_interval_secs: u64,
    /// Peers whose `x-forwarded-for` header is believed
    pub trusted_proxies: Vec<IpAddr>,
}

impl AppConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = match lookup("KIWI_DB_PATH").filter(|p| !p.is_empty()) {
            Some(path) => expand_path(&path)?,
            None => default_db_path()?,
        };

        let defaults = RateLimitSettings::default();
        let rate_limits = RateLimitSettings {
            global_per_minute: parse_or(&lookup, "KIWI_RATE_GLOBAL", defaults.global_per_minute)?,
            general_per_minute: parse_or(&lookup, "KIWI_RATE_GENERAL", defaults.general_per_minute)?,
            keyword_analysis_per_minute: parse_or(
                &lookup,
                "KIWI_RATE_KEYWORD_ANALYSIS",
                defaults.keyword_analysis_per_minute,
            )?,
            trends_per_minute: parse_or(&lookup, "KIWI_RATE_TRENDS", defaults.trends_per_minute)?,
        };

        let cleanup_interval_secs = parse_or(
            &lookup,
            "KIWI_CLEANUP_INTERVAL_SECS",
            DEFAULT_CLEANUP_INTERVAL_SECS,
        )?;
        if cleanup_interval_secs == 0 {
            return Err(Error::config("KIWI_CLEANUP_INTERVAL_SECS must be positive"));
        }

        let trusted_proxies = parse_proxies(lookup("KIWI_TRUSTED_PROXIES").as_deref())?;

        Ok(Self {
            db_path,
            bind_addr: lookup("KIWI_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            jwt_secret: lookup("KIWI_JWT_SECRET").filter(|s| !s.is_empty()),
            webhook_secret: lookup("KIWI_WEBHOOK_SECRET").filter(|s| !s.is_empty()),
            anonymous_allowance: parse_or(
                &lookup,
                "KIWI_ANONYMOUS_ALLOWANCE",
                DEFAULT_ANONYMOUS_ALLOWANCE,
            )?,
            rate_limits,
            cleanup_interval_secs,
            trusted_proxies,
        })
    }

    /// Sweeper interval as a `Duration`
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| Error::config(format!("{} has an invalid value: {}", key, raw))),
        _ => Ok(default),
    }
}

fn parse_proxies(raw: Option<&str>) -> Result<Vec<IpAddr>> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(|addr| {
            addr.parse::<IpAddr>().map_err(|_| {
                Error::config(format!("KIWI_TRUSTED_PROXIES has an invalid address: {}", addr))
            })
        })
        .collect()
}

fn expand_path(raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw)
        .map_err(|e| Error::config(format!("Could not expand path {}: {}", raw, e)))?;
    Ok(PathBuf::from(expanded.into_owned()))
}

/// Default database location inside the platform data directory
pub fn default_db_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("com", "kiwi", "Kiwi")
        .ok_or_else(|| Error::config("Could not determine project directories"))?;

    Ok(dirs.data_dir().join("kiwi.db"))
}
