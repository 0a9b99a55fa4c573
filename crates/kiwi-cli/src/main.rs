//! Kiwi CLI - usage quota administration
//!
//! A command-line interface for inspecting and adjusting daily usage,
//! membership tiers and subscriptions in a Kiwi database.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "kiwi")]
#[command(author, version, about = "Usage quota administration CLI", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format: table (default) or json
    #[arg(long, global = true, default_value = "table")]
    format: output::OutputFormat,

    /// Suppress progress messages
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Override database path (or set KIWI_DB_PATH env var)
    #[arg(long, env = "KIWI_DB_PATH", global = true)]
    db: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check, record and reset daily usage
    Usage {
        #[command(subcommand)]
        action: commands::usage::UsageAction,
    },

    /// List users and change their tier
    User {
        #[command(subcommand)]
        action: commands::user::UserAction,
    },

    /// Inspect billing subscriptions
    Subscription {
        #[command(subcommand)]
        action: commands::subscription::SubscriptionAction,
    },

    /// Show effective configuration
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },

    /// Show the daily allowance of each tier
    Tiers,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let mut config = kiwi_core::AppConfig::from_env()?;
    if let Some(db_path) = &cli.db {
        config.db_path = shellexpand::tilde(db_path).into_owned().into();
    }

    // Tier table needs no database
    if let Commands::Tiers = cli.command {
        return commands::tiers::execute(cli.format);
    }

    let db = kiwi_core::Database::open(config.db_path.clone()).await?;

    let ctx = commands::Context {
        db,
        config,
        format: cli.format,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Usage { action } => commands::usage::execute(&ctx, action).await,
        Commands::User { action } => commands::user::execute(&ctx, action).await,
        Commands::Subscription { action } => commands::subscription::execute(&ctx, action).await,
        Commands::Config { action } => commands::config::execute(&ctx, action).await,
        Commands::Tiers => commands::tiers::execute(ctx.format),
    }
}
