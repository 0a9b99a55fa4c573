//! Kiwi HTTP server

use anyhow::Result;
use clap::Parser;

#[derive(Parser)]
#[command(name = "kiwi-server")]
#[command(version, about = "Kiwi usage quota HTTP API", long_about = None)]
struct Args {
    /// Listen address (or set KIWI_BIND_ADDR env var)
    #[arg(long)]
    bind: Option<String>,

    /// Override database path (or set KIWI_DB_PATH env var)
    #[arg(long)]
    db: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = kiwi_core::AppConfig::from_env()?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(db) = args.db {
        config.db_path = db.into();
    }

    log::info!("[server] kiwi-server {} starting", kiwi_core::VERSION);
    kiwi_server::serve(config).await
}
