//! # kiwi-server
//!
//! Axum HTTP API over `kiwi-core`: usage quotas, accounts, the billing
//! webhook and saved projects.

pub mod api;
pub mod error;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use kiwi_core::auth::AuthKeys;
use kiwi_core::services::{
    CachedUserDirectory, MaintenanceService, ProjectStore, RateLimiters, SqliteUsageStore,
    SqliteUserDirectory, SubscriptionService, TtlCache, UsageService, UserStore,
};
use kiwi_core::{AppConfig, Database, User};

pub use api::create_router;
pub use error::{ApiError, ApiResult};

/// How long a user record is served from cache before re-reading it
pub const USER_CACHE_TTL: Duration = Duration::from_secs(60);

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub keys: AuthKeys,
    pub users: UserStore,
    pub usage: Arc<UsageService>,
    pub directory: Arc<CachedUserDirectory>,
    pub user_cache: Arc<TtlCache<User>>,
    pub limiters: Arc<RateLimiters>,
    pub subscriptions: SubscriptionService,
    pub projects: ProjectStore,
}

impl AppState {
    pub fn new(db: Database, config: AppConfig) -> Self {
        let keys = AuthKeys::from_config_secret(config.jwt_secret.as_deref());
        let user_cache = Arc::new(TtlCache::new());
        let directory = Arc::new(CachedUserDirectory::new(
            Arc::new(SqliteUserDirectory::new(db.pool.clone())),
            Arc::clone(&user_cache),
            USER_CACHE_TTL,
        ));
        let usage = UsageService::new(
            Arc::new(SqliteUsageStore::new(db.pool.clone())),
            directory.clone(),
        )
        .with_anonymous_allowance(config.anonymous_allowance);

        Self {
            keys,
            users: UserStore::new(db.pool.clone()),
            usage: Arc::new(usage),
            directory,
            user_cache,
            limiters: Arc::new(RateLimiters::from_settings(&config.rate_limits)),
            subscriptions: SubscriptionService::new(db.pool.clone()),
            projects: ProjectStore::new(db.pool),
            config: Arc::new(config),
        }
    }

    /// Sweeper over this state's limiter windows and cached users
    pub fn maintenance(&self) -> MaintenanceService {
        MaintenanceService::new(
            Arc::clone(&self.limiters),
            Arc::clone(&self.user_cache),
            self.config.cleanup_interval(),
        )
    }

    /// Drop a cached user after their tier or role changed
    pub fn forget_user(&self, user_id: &str) {
        self.directory.invalidate(user_id);
    }
}

/// Open the database, start the sweeper and serve until shutdown
pub async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let db = Database::open(config.db_path.clone()).await?;
    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(db, config);

    let maintenance = state.maintenance();
    maintenance.start().await;

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    log::info!("[server] Listening on http://{}", listener.local_addr()?);

    // Peer addresses key the global rate limit
    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    maintenance.stop().await;
    result?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("[server] Failed to listen for shutdown signal: {}", e);
        return;
    }
    log::info!("[server] Shutting down");
}
