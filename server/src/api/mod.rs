//! API module - Axum routes

pub mod admin;
pub mod auth;
pub mod extract;
pub mod projects;
pub mod rate_limit;
pub mod subscription;
pub mod usage;
pub mod users;

use axum::{middleware, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let limited = Router::new()
        .nest("/api/auth", auth::routes())
        .nest("/api/users", users::routes())
        .nest("/api/admin", admin::routes())
        .nest("/api/usage", usage::routes())
        .nest("/api/subscription", subscription::routes())
        .nest("/api/projects", projects::routes())
        .nest("/api/keywords", projects::keyword_routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::limit_requests,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(limited)
        .nest("/api/stripe", subscription::webhook_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": kiwi_core::VERSION }))
}
