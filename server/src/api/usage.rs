//! Usage quota API routes

use axum::{
    extract::{Query, State},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::Deserialize;

use kiwi_core::services::{
    Caller, ConsumeOutcome, IncrementOutcome, RateLimitGroup, ResetOutcome, UsageCheck,
};
use kiwi_core::UsageLog;

use super::extract::{ApiJson, AuthUser, MaybeUser};
use super::rate_limit::{enforce, CallerKey};
use crate::{error::ApiResult, AppState};

/// Usage routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/check", get(check_usage))
        .route("/increment", post(increment_usage))
        .route("/consume", post(consume_usage))
        .route("/reset", delete(reset_usage))
        .route("/history", get(usage_history))
}

#[derive(Debug, Deserialize)]
pub struct ServiceQuery {
    pub service: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceRequest {
    #[serde(default)]
    pub service: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetQuery {
    pub user_id: Option<String>,
    pub service: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub days: Option<u32>,
}

/// Today's allowance for the caller and service
async fn check_usage(
    State(state): State<AppState>,
    caller: MaybeUser,
    Query(query): Query<ServiceQuery>,
) -> ApiResult<Json<UsageCheck>> {
    let service = query.service.unwrap_or_default();
    let check = state
        .usage
        .check_usage(&Caller::from_user_id(caller.user_id()), &service)
        .await?;
    Ok(Json(check))
}

/// Service-class budget on top of the general one applied by the middleware
fn enforce_service_class(state: &AppState, key: &CallerKey, service: &str) -> ApiResult<()> {
    let group = RateLimitGroup::for_service(service);
    if group != RateLimitGroup::General {
        enforce(state, group, &key.0)?;
    }
    Ok(())
}

/// Record one use of a service
async fn increment_usage(
    State(state): State<AppState>,
    Extension(key): Extension<CallerKey>,
    caller: MaybeUser,
    ApiJson(req): ApiJson<ServiceRequest>,
) -> ApiResult<Json<IncrementOutcome>> {
    enforce_service_class(&state, &key, req.service.trim())?;
    let outcome = state
        .usage
        .increment_usage(&Caller::from_user_id(caller.user_id()), &req.service)
        .await?;
    Ok(Json(outcome))
}

/// Check and record in one step; never lets a bounded tier pass its limit
async fn consume_usage(
    State(state): State<AppState>,
    Extension(key): Extension<CallerKey>,
    caller: MaybeUser,
    ApiJson(req): ApiJson<ServiceRequest>,
) -> ApiResult<Json<ConsumeOutcome>> {
    enforce_service_class(&state, &key, req.service.trim())?;
    let outcome = state
        .usage
        .consume(&Caller::from_user_id(caller.user_id()), &req.service)
        .await?;
    Ok(Json(outcome))
}

/// Administrative: clear today's counter for a user and service
async fn reset_usage(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ResetQuery>,
) -> ApiResult<Json<ResetOutcome>> {
    let outcome = state
        .usage
        .reset_usage(
            &auth.0.sub,
            query.user_id.as_deref().unwrap_or_default(),
            query.service.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok(Json(outcome))
}

/// The caller's recorded usage over the last few days
async fn usage_history(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<UsageLog>>> {
    let days = query.days.unwrap_or(7).min(90);
    let logs = state.usage.usage_history(&auth.0.sub, days).await?;
    Ok(Json(logs))
}
