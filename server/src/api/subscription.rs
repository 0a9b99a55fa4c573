//! Subscription and billing webhook routes

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use kiwi_core::services::{
    verify_webhook_signature, BillingEvent, SIGNATURE_HEADER, SIGNATURE_TOLERANCE_SECS,
};
use kiwi_core::{Error, Subscription};

use super::extract::AuthUser;
use crate::{error::ApiResult, AppState};

/// Subscription routes (signed-in callers)
pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(current_subscription))
}

/// Webhook route; mounted outside the request rate limiter
pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/webhook", post(billing_webhook))
}

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub subscription: Option<Subscription>,
}

/// The caller's most recent subscription, if any
async fn current_subscription(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<SubscriptionResponse>> {
    let subscription = state.subscriptions.latest_for_user(&auth.0.sub).await?;
    Ok(Json(SubscriptionResponse { subscription }))
}

/// Signed lifecycle events from the payment processor
async fn billing_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let secret = state
        .config
        .webhook_secret
        .as_deref()
        .ok_or_else(|| Error::config("Webhook signing secret is not configured"))?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| Error::webhook("Missing signature header"))?;

    verify_webhook_signature(
        &body,
        signature,
        secret,
        Utc::now().timestamp(),
        SIGNATURE_TOLERANCE_SECS,
    )?;

    let event = BillingEvent::from_json(&body)?;
    log::info!("[billing] Received {}", event.kind());

    let outcome = state.subscriptions.apply_event(&event).await?;
    if let Some(user_id) = outcome.tier_changed_for.as_deref() {
        state.forget_user(user_id);
    }

    Ok(Json(json!({ "received": true })))
}
