//! Users API routes

use axum::{extract::State, routing::{get, patch}, Json, Router};
use serde::Deserialize;

use kiwi_core::{PersonaRole, UserResponse};

use super::extract::{ApiJson, AuthUser};
use crate::{error::ApiResult, AppState};

/// Users routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_profile))
        .route("/onboarding", patch(complete_onboarding))
}

#[derive(Debug, Deserialize)]
pub struct OnboardingRequest {
    pub role: PersonaRole,
}

/// Get current user profile
async fn get_profile(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<UserResponse>> {
    let user = state.users.require(&auth.0.sub).await?;
    Ok(Json(UserResponse::from(user)))
}

/// Record the persona picked during onboarding
async fn complete_onboarding(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<OnboardingRequest>,
) -> ApiResult<Json<UserResponse>> {
    let user = state.users.set_role(&auth.0.sub, req.role).await?;
    state.forget_user(&user.id);
    Ok(Json(UserResponse::from(user)))
}
