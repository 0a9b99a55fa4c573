//! Auth API routes

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use kiwi_core::auth::token_lifetime_secs;
use kiwi_core::services::NewUser;
use kiwi_core::UserResponse;

use super::extract::{ApiJson, MaybeUser};
use crate::{error::ApiResult, AppState};

/// Auth routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/session", get(session))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: Option<UserResponse>,
}

/// Register a new user
async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .users
        .register(NewUser {
            email: req.email,
            password: req.password,
            name: req.name,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// Exchange credentials for a bearer token
async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let user = state.users.authenticate(&req.email, &req.password).await?;
    let access_token = state.keys.create_token(&user)?;

    log::info!("[auth] {} signed in", user.id);

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
        expires_in: token_lifetime_secs(),
    }))
}

/// Current session; `user` is null for anonymous callers
async fn session(
    State(state): State<AppState>,
    caller: MaybeUser,
) -> ApiResult<Json<SessionResponse>> {
    let user = match caller.user_id() {
        Some(id) => state.users.find_by_id(&id).await?.map(UserResponse::from),
        None => None,
    };
    Ok(Json(SessionResponse { user }))
}
