//! Subscription commands

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;
use tabled::Tabled;

use kiwi_core::services::SubscriptionService;
use kiwi_core::Subscription;

use super::Context;
use crate::output::print_output;

#[derive(Subcommand)]
pub enum SubscriptionAction {
    /// List subscriptions, newest first
    List {
        /// Only show this user's subscriptions
        #[arg(long)]
        user: Option<String>,
    },
}

/// Subscription row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct SubscriptionRow {
    #[tabled(rename = "User")]
    pub user_id: String,
    #[tabled(rename = "Subscription")]
    pub subscription_id: String,
    #[tabled(rename = "Plan")]
    pub plan: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Period End")]
    pub period_end: String,
    #[tabled(rename = "Cancels")]
    pub cancels: String,
}

impl From<Subscription> for SubscriptionRow {
    fn from(sub: Subscription) -> Self {
        Self {
            period_end: sub
                .current_period_end
                .map(|t| t.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "-".to_string()),
            cancels: if sub.cancel_at_period_end { "at period end" } else { "" }.to_string(),
            user_id: sub.user_id,
            subscription_id: sub.stripe_subscription_id,
            plan: sub.plan,
            status: sub.status,
        }
    }
}

pub async fn execute(ctx: &Context, action: SubscriptionAction) -> Result<()> {
    match action {
        SubscriptionAction::List { user } => {
            let subscriptions = SubscriptionService::new(ctx.db.pool.clone())
                .list(user.as_deref())
                .await?;
            let rows: Vec<SubscriptionRow> =
                subscriptions.into_iter().map(SubscriptionRow::from).collect();
            print_output(&rows, ctx.format)
        }
    }
}
