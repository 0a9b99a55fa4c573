//! User commands

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;
use tabled::Tabled;

use kiwi_core::services::UserStore;
use kiwi_core::{MembershipTier, User};

use super::Context;
use crate::output::{print_info, print_output, print_success};

#[derive(Subcommand)]
pub enum UserAction {
    /// List all users
    List,

    /// Change a user's membership tier
    SetTier {
        /// User ID
        id: String,

        /// free, basic, standard or premium
        tier: MembershipTier,
    },
}

/// User row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct UserRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Email")]
    pub email: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Role")]
    pub role: String,
    #[tabled(rename = "Tier")]
    pub tier: String,
    #[tabled(rename = "Admin")]
    pub admin: String,
}

impl From<User> for UserRow {
    fn from(user: User) -> Self {
        Self {
            role: user
                .persona()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string()),
            tier: user.tier().to_string(),
            admin: if user.is_admin { "yes" } else { "" }.to_string(),
            id: user.id,
            email: user.email,
            name: user.name,
        }
    }
}

pub async fn execute(ctx: &Context, action: UserAction) -> Result<()> {
    let users = UserStore::new(ctx.db.pool.clone());

    match action {
        UserAction::List => {
            let rows: Vec<UserRow> = users.list().await?.into_iter().map(UserRow::from).collect();
            print_output(&rows, ctx.format)
        }
        UserAction::SetTier { id, tier } => {
            let user = users.set_tier(&id, tier).await?;
            print_success(&format!("{} is now on the {} tier", user.email, tier), ctx.quiet);
            print_info(
                "A running server picks this up once its cached user record expires (60s).",
                ctx.quiet,
            );
            Ok(())
        }
    }
}
