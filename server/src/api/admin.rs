//! Administrative API routes

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;

use kiwi_core::{Error, MembershipTier, UserResponse};

use super::extract::{ApiJson, AuthUser};
use crate::{error::ApiResult, AppState};

/// Admin routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id/tier", put(set_user_tier))
}

#[derive(Debug, Deserialize)]
pub struct SetTierRequest {
    pub tier: MembershipTier,
}

async fn require_admin(state: &AppState, auth: &AuthUser) -> ApiResult<()> {
    let actor = state.users.require(&auth.0.sub).await?;
    if !actor.is_admin {
        return Err(Error::forbidden("Administrator privileges required").into());
    }
    Ok(())
}

async fn list_users(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<Vec<UserResponse>>> {
    require_admin(&state, &auth).await?;
    let users = state.users.list().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// Change a user's tier outside the billing flow
async fn set_user_tier(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<String>,
    ApiJson(req): ApiJson<SetTierRequest>,
) -> ApiResult<Json<UserResponse>> {
    require_admin(&state, &auth).await?;

    let user = state.users.set_tier(&user_id, req.tier).await?;
    state.forget_user(&user.id);

    log::info!("[admin] {} set {} to {}", auth.0.sub, user.id, req.tier);
    Ok(Json(UserResponse::from(user)))
}
