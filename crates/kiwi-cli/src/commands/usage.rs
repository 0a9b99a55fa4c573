//! Usage commands
//!
//! Check, record and reset per-service daily usage.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Subcommand;
use serde::Serialize;
use tabled::Tabled;

use kiwi_core::services::{Caller, SqliteUsageStore, SqliteUserDirectory, UsageService, UserStore};

use super::Context;
use crate::output::{allowed_label, print_output, print_single, print_success, OutputFormat};

#[derive(Subcommand)]
pub enum UsageAction {
    /// Check whether a user may use a service today
    Check {
        /// User ID (omit to see what a signed-out caller gets)
        #[arg(long)]
        user: Option<String>,

        /// Service name, e.g. keyword_analysis
        #[arg(long, short)]
        service: String,
    },

    /// Record one use of a service for today
    Increment {
        /// User ID
        #[arg(long)]
        user: String,

        /// Service name
        #[arg(long, short)]
        service: String,
    },

    /// Reset today's usage of a service for a user
    Reset {
        /// User ID
        #[arg(long)]
        user: String,

        /// Service name
        #[arg(long, short)]
        service: String,

        /// Administrator performing the reset (defaults to the first admin)
        #[arg(long = "as")]
        actor: Option<String>,
    },

    /// Show recent daily usage for a user
    History {
        /// User ID
        #[arg(long)]
        user: String,

        /// Number of days, today included
        #[arg(long, default_value = "7")]
        days: u32,
    },
}

/// Usage check row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct CheckRow {
    #[tabled(rename = "Tier")]
    pub tier: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Used")]
    pub used: String,
    #[tabled(rename = "Remaining")]
    pub remaining: String,
    #[tabled(rename = "Limit")]
    pub limit: String,
    #[tabled(rename = "Message")]
    pub message: String,
}

/// History row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct HistoryRow {
    #[tabled(rename = "Date")]
    pub date: String,
    #[tabled(rename = "Service")]
    pub service: String,
    #[tabled(rename = "Count")]
    pub count: i64,
}

fn usage_service(ctx: &Context) -> UsageService {
    UsageService::new(
        Arc::new(SqliteUsageStore::new(ctx.db.pool.clone())),
        Arc::new(SqliteUserDirectory::new(ctx.db.pool.clone())),
    )
    .with_anonymous_allowance(ctx.config.anonymous_allowance)
}

pub async fn execute(ctx: &Context, action: UsageAction) -> Result<()> {
    match action {
        UsageAction::Check { user, service } => check(ctx, user, service).await,
        UsageAction::Increment { user, service } => increment(ctx, user, service).await,
        UsageAction::Reset {
            user,
            service,
            actor,
        } => reset(ctx, user, service, actor).await,
        UsageAction::History { user, days } => history(ctx, user, days).await,
    }
}

async fn check(ctx: &Context, user: Option<String>, service: String) -> Result<()> {
    let caller = Caller::from_user_id(user);
    let check = usage_service(ctx).check_usage(&caller, &service).await?;

    let row = CheckRow {
        tier: check.tier.clone(),
        status: allowed_label(check.is_allowed),
        used: check
            .current_usage
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string()),
        remaining: check.remaining.to_string(),
        limit: check.limit.to_string(),
        message: check.message.clone(),
    };
    print_single(&row, &check, ctx.format)
}

async fn increment(ctx: &Context, user: String, service: String) -> Result<()> {
    let outcome = usage_service(ctx)
        .increment_usage(&Caller::User(user.clone()), &service)
        .await?;

    match ctx.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Table => print_success(
            &format!(
                "Recorded {} for {} ({} today)",
                service,
                user,
                outcome.count.unwrap_or_default()
            ),
            ctx.quiet,
        ),
    }
    Ok(())
}

async fn reset(ctx: &Context, user: String, service: String, actor: Option<String>) -> Result<()> {
    let actor = match actor {
        Some(actor) => actor,
        None => UserStore::new(ctx.db.pool.clone())
            .list()
            .await?
            .into_iter()
            .find(|u| u.is_admin)
            .map(|u| u.id)
            .ok_or_else(|| anyhow!("No administrator found; pass --as <admin id>"))?,
    };

    let outcome = usage_service(ctx).reset_usage(&actor, &user, &service).await?;

    match ctx.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Table => {
            print_success(&format!("{} ({} / {})", outcome.message, user, service), ctx.quiet)
        }
    }
    Ok(())
}

async fn history(ctx: &Context, user: String, days: u32) -> Result<()> {
    let logs = usage_service(ctx).usage_history(&user, days).await?;
    let rows: Vec<HistoryRow> = logs
        .into_iter()
        .map(|log| HistoryRow {
            date: log.usage_date.format("%Y-%m-%d").to_string(),
            service: log.service,
            count: log.count,
        })
        .collect();
    print_output(&rows, ctx.format)
}
