//! Config commands
//!
//! Shows the effective configuration assembled from `KIWI_*` variables.

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;
use tabled::Tabled;

use kiwi_core::AppConfig;

use super::Context;
use crate::output::{print_output, OutputFormat};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
}

/// Config row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct ConfigRow {
    #[tabled(rename = "Key")]
    pub key: String,
    #[tabled(rename = "Value")]
    pub value: String,
    #[tabled(rename = "Source")]
    pub source: String,
}

pub async fn execute(ctx: &Context, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => match ctx.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&ctx.config)?);
                Ok(())
            }
            OutputFormat::Table => print_output(&config_rows(&ctx.config), ctx.format),
        },
    }
}

fn source(key: &str) -> String {
    if std::env::var(key).is_ok() { "env" } else { "default" }.to_string()
}

fn row(key: &str, value: impl ToString) -> ConfigRow {
    ConfigRow {
        key: key.to_string(),
        value: value.to_string(),
        source: source(key),
    }
}

fn secret_row(key: &str, value: Option<&String>) -> ConfigRow {
    ConfigRow {
        key: key.to_string(),
        value: if value.is_some() { "****" } else { "(not set)" }.to_string(),
        source: source(key),
    }
}

fn proxies_label(config: &AppConfig) -> String {
    if config.trusted_proxies.is_empty() {
        return "(none)".to_string();
    }
    config
        .trusted_proxies
        .iter()
        .map(|ip| ip.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn config_rows(config: &AppConfig) -> Vec<ConfigRow> {
    let limits = &config.rate_limits;
    vec![
        row("KIWI_DB_PATH", config.db_path.display()),
        row("KIWI_BIND_ADDR", &config.bind_addr),
        secret_row("KIWI_JWT_SECRET", config.jwt_secret.as_ref()),
        secret_row("KIWI_WEBHOOK_SECRET", config.webhook_secret.as_ref()),
        row("KIWI_ANONYMOUS_ALLOWANCE", config.anonymous_allowance),
        row("KIWI_RATE_GLOBAL", limits.global_per_minute),
        row("KIWI_RATE_GENERAL", limits.general_per_minute),
        row("KIWI_RATE_KEYWORD_ANALYSIS", limits.keyword_analysis_per_minute),
        row("KIWI_RATE_TRENDS", limits.trends_per_minute),
        row("KIWI_CLEANUP_INTERVAL_SECS", config.cleanup_interval_secs),
        row("KIWI_TRUSTED_PROXIES", proxies_label(config)),
    ]
}
