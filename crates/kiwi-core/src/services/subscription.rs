//! Subscriptions and billing webhook handling
//!
//! The payment processor reports subscription lifecycle changes through a
//! signed webhook. Each event updates the `subscriptions` row and moves the
//! user between tiers; rows are never deleted.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{MembershipTier, Subscription, SubscriptionStatus};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed webhook payload
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Name of the header carrying the webhook signature
pub const SIGNATURE_HEADER: &str = "stripe-signature";

// ============================================================================
// Signature verification
// ============================================================================

/// Verify a `t=<unix>,v1=<hex>` signature header over `payload`.
///
/// The signed message is `"{t}.{payload}"`, MAC'd with HMAC-SHA256 under
/// `secret`. Any `v1` entry may match; timestamps older or newer than
/// `tolerance_secs` relative to `now` are rejected.
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<()> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(
                    value
                        .parse()
                        .map_err(|_| Error::webhook("Invalid signature timestamp"))?,
                )
            }
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| Error::webhook("Signature header has no timestamp"))?;
    if signatures.is_empty() {
        return Err(Error::webhook("Signature header has no v1 signature"));
    }
    if (now - timestamp).abs() > tolerance_secs {
        return Err(Error::webhook("Signature timestamp outside tolerance"));
    }

    let matched = signatures.iter().any(|candidate| {
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(candidate).is_ok()
    });

    if matched {
        Ok(())
    } else {
        Err(Error::webhook("Signature mismatch"))
    }
}

/// Build a signature header for `payload`, as the payment processor does
pub fn sign_webhook_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::internal(format!("Invalid webhook secret: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    ))
}

// ============================================================================
// Events
// ============================================================================

/// Subscription object as delivered in webhook payloads
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    pub status: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub current_period_start: Option<i64>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub trial_end: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
}

impl SubscriptionObject {
    fn user_id(&self) -> Option<&str> {
        self.metadata
            .get("user_id")
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }

    fn plan(&self) -> Result<Option<MembershipTier>> {
        match self.metadata.get("plan").filter(|p| !p.is_empty()) {
            None => Ok(None),
            Some(raw) => raw.parse::<MembershipTier>().map(Some).map_err(Error::Webhook),
        }
    }
}

/// A billing event, reduced to what the service acts on
#[derive(Debug, Clone)]
pub enum BillingEvent {
    SubscriptionCreated(SubscriptionObject),
    SubscriptionUpdated(SubscriptionObject),
    SubscriptionDeleted(SubscriptionObject),
    InvoicePaymentSucceeded { invoice_id: String },
    InvoicePaymentFailed { invoice_id: String },
    Other(String),
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    data: RawEventData,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

impl BillingEvent {
    /// Parse a webhook body
    pub fn from_json(payload: &[u8]) -> Result<Self> {
        let raw: RawEvent = serde_json::from_slice(payload)
            .map_err(|e| Error::webhook(format!("Malformed event: {}", e)))?;

        let subscription = |object: serde_json::Value| -> Result<SubscriptionObject> {
            serde_json::from_value(object)
                .map_err(|e| Error::webhook(format!("Malformed subscription object: {}", e)))
        };
        let invoice_id = |object: &serde_json::Value| -> String {
            object
                .get("id")
                .and_then(|id| id.as_str())
                .unwrap_or_default()
                .to_string()
        };

        Ok(match raw.kind.as_str() {
            "customer.subscription.created" => {
                BillingEvent::SubscriptionCreated(subscription(raw.data.object)?)
            }
            "customer.subscription.updated" => {
                BillingEvent::SubscriptionUpdated(subscription(raw.data.object)?)
            }
            "customer.subscription.deleted" => {
                BillingEvent::SubscriptionDeleted(subscription(raw.data.object)?)
            }
            "invoice.payment_succeeded" => BillingEvent::InvoicePaymentSucceeded {
                invoice_id: invoice_id(&raw.data.object),
            },
            "invoice.payment_failed" => BillingEvent::InvoicePaymentFailed {
                invoice_id: invoice_id(&raw.data.object),
            },
            _ => BillingEvent::Other(raw.kind),
        })
    }

    pub fn kind(&self) -> &str {
        match self {
            BillingEvent::SubscriptionCreated(_) => "customer.subscription.created",
            BillingEvent::SubscriptionUpdated(_) => "customer.subscription.updated",
            BillingEvent::SubscriptionDeleted(_) => "customer.subscription.deleted",
            BillingEvent::InvoicePaymentSucceeded { .. } => "invoice.payment_succeeded",
            BillingEvent::InvoicePaymentFailed { .. } => "invoice.payment_failed",
            BillingEvent::Other(kind) => kind,
        }
    }
}

/// What applying an event changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventOutcome {
    /// User whose tier was rewritten, if any
    pub tier_changed_for: Option<String>,
}

fn timestamp(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::from_timestamp(s, 0))
}

// ============================================================================
// Service
// ============================================================================

/// Subscription persistence and webhook application
#[derive(Clone)]
pub struct SubscriptionService {
    pool: SqlitePool,
}

impl SubscriptionService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Apply a verified billing event
    pub async fn apply_event(&self, event: &BillingEvent) -> Result<EventOutcome> {
        match event {
            BillingEvent::SubscriptionCreated(object) => self.on_created(object).await,
            BillingEvent::SubscriptionUpdated(object) => self.on_updated(object).await,
            BillingEvent::SubscriptionDeleted(object) => self.on_deleted(object).await,
            BillingEvent::InvoicePaymentSucceeded { invoice_id } => {
                log::info!("[billing] Payment succeeded for invoice {}", invoice_id);
                Ok(EventOutcome::default())
            }
            BillingEvent::InvoicePaymentFailed { invoice_id } => {
                log::warn!("[billing] Payment failed for invoice {}", invoice_id);
                Ok(EventOutcome::default())
            }
            BillingEvent::Other(kind) => {
                log::info!("[billing] Ignoring unhandled event type {}", kind);
                Ok(EventOutcome::default())
            }
        }
    }

    async fn user_exists(&self, user_id: &str) -> Result<bool> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    /// Resolve the event's user, skipping events that name no known user
    async fn event_user<'a>(&self, object: &'a SubscriptionObject) -> Result<Option<&'a str>> {
        let Some(user_id) = object.user_id() else {
            log::warn!("[billing] Subscription {} carries no user_id metadata", object.id);
            return Ok(None);
        };
        if !self.user_exists(user_id).await? {
            log::warn!("[billing] Subscription {} names unknown user {}", object.id, user_id);
            return Ok(None);
        }
        Ok(Some(user_id))
    }

    async fn on_created(&self, object: &SubscriptionObject) -> Result<EventOutcome> {
        let Some(user_id) = self.event_user(object).await? else {
            return Ok(EventOutcome::default());
        };
        let plan = object
            .plan()?
            .ok_or_else(|| Error::webhook("Subscription has no plan metadata"))?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO subscriptions (id, user_id, stripe_subscription_id, stripe_customer_id, plan, status,
                current_period_start, current_period_end, trial_end, cancel_at_period_end, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(stripe_subscription_id) DO UPDATE SET
                user_id = excluded.user_id,
                stripe_customer_id = excluded.stripe_customer_id,
                plan = excluded.plan,
                status = excluded.status,
                current_period_start = excluded.current_period_start,
                current_period_end = excluded.current_period_end,
                trial_end = excluded.trial_end,
                cancel_at_period_end = excluded.cancel_at_period_end,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(&object.id)
        .bind(&object.customer)
        .bind(plan.as_str())
        .bind(&object.status)
        .bind(timestamp(object.current_period_start))
        .bind(timestamp(object.current_period_end))
        .bind(timestamp(object.trial_end))
        .bind(object.cancel_at_period_end)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        set_tier(&mut tx, user_id, plan).await?;
        tx.commit().await?;

        log::info!("[billing] Subscription {} created: {} on {}", object.id, user_id, plan);
        Ok(EventOutcome {
            tier_changed_for: Some(user_id.to_string()),
        })
    }

    async fn on_updated(&self, object: &SubscriptionObject) -> Result<EventOutcome> {
        let Some(user_id) = self.event_user(object).await? else {
            return Ok(EventOutcome::default());
        };
        let plan = object.plan()?;

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                status = ?,
                plan = COALESCE(?, plan),
                current_period_start = ?,
                current_period_end = ?,
                cancel_at_period_end = ?,
                updated_at = ?
            WHERE stripe_subscription_id = ?
            "#,
        )
        .bind(&object.status)
        .bind(plan.map(|p| p.as_str()))
        .bind(timestamp(object.current_period_start))
        .bind(timestamp(object.current_period_end))
        .bind(object.cancel_at_period_end)
        .bind(Utc::now())
        .bind(&object.id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            log::warn!("[billing] Update for unknown subscription {}", object.id);
        }

        let mut outcome = EventOutcome::default();
        let active = object.status.parse::<SubscriptionStatus>().ok() == Some(SubscriptionStatus::Active);
        if let (true, Some(plan)) = (active, plan) {
            set_tier(&mut tx, user_id, plan).await?;
            outcome.tier_changed_for = Some(user_id.to_string());
        }

        tx.commit().await?;

        log::info!("[billing] Subscription {} updated: status {}", object.id, object.status);
        Ok(outcome)
    }

    async fn on_deleted(&self, object: &SubscriptionObject) -> Result<EventOutcome> {
        let Some(user_id) = self.event_user(object).await? else {
            return Ok(EventOutcome::default());
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE subscriptions SET status = ?, updated_at = ? WHERE stripe_subscription_id = ?")
            .bind(SubscriptionStatus::Canceled.as_str())
            .bind(Utc::now())
            .bind(&object.id)
            .execute(&mut *tx)
            .await?;

        set_tier(&mut tx, user_id, MembershipTier::Free).await?;
        tx.commit().await?;

        log::info!("[billing] Subscription {} canceled; {} back on free", object.id, user_id);
        Ok(EventOutcome {
            tier_changed_for: Some(user_id.to_string()),
        })
    }

    /// Most recently created subscription for a user
    pub async fn latest_for_user(&self, user_id: &str) -> Result<Option<Subscription>> {
        let subscription = sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE user_id = ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(subscription)
    }

    /// All subscriptions, optionally restricted to one user
    pub async fn list(&self, user_id: Option<&str>) -> Result<Vec<Subscription>> {
        let subscriptions = match user_id {
            Some(user_id) => {
                sqlx::query_as::<_, Subscription>(
                    "SELECT * FROM subscriptions WHERE user_id = ? ORDER BY created_at DESC",
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions ORDER BY created_at DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(subscriptions)
    }
}

async fn set_tier(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    user_id: &str,
    tier: MembershipTier,
) -> Result<()> {
    sqlx::query("UPDATE users SET membership_tier = ?, updated_at = ? WHERE id = ?")
        .bind(tier.as_str())
        .bind(Utc::now())
        .bind(user_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::services::users::{NewUser, UserStore};
    use serde_json::json;
    use tempfile::TempDir;

    const SECRET: &str = "whsec_test_secret";

    // ========================================================================
    // Signatures
    // ========================================================================

    #[test]
    fn test_signature_round_trip() {
        let payload = br#"{"type":"invoice.payment_succeeded"}"#;
        let header = sign_webhook_payload(payload, SECRET, 1_700_000_000).unwrap();
        assert!(verify_webhook_signature(payload, &header, SECRET, 1_700_000_100, 300).is_ok());
    }

    #[test]
    fn test_signature_rejects_tampering() {
        let header = sign_webhook_payload(b"original", SECRET, 1_700_000_000).unwrap();
        let result = verify_webhook_signature(b"tampered", &header, SECRET, 1_700_000_000, 300);
        assert!(matches!(result, Err(Error::Webhook(_))));

        let result = verify_webhook_signature(b"original", &header, "other", 1_700_000_000, 300);
        assert!(result.is_err());
    }

    #[test]
    fn test_signature_rejects_stale_timestamp() {
        let header = sign_webhook_payload(b"body", SECRET, 1_700_000_000).unwrap();
        let result = verify_webhook_signature(b"body", &header, SECRET, 1_700_000_301, 300);
        assert!(result.is_err());
    }

    #[test]
    fn test_signature_accepts_any_v1_entry() {
        let good = sign_webhook_payload(b"body", SECRET, 1_700_000_000).unwrap();
        let v1 = good.split(",v1=").nth(1).unwrap();
        let header = format!("t=1700000000,v1=deadbeef,v0=ignored,v1={}", v1);
        assert!(verify_webhook_signature(b"body", &header, SECRET, 1_700_000_000, 300).is_ok());
    }

    #[test]
    fn test_signature_malformed_header() {
        assert!(verify_webhook_signature(b"body", "", SECRET, 0, 300).is_err());
        assert!(verify_webhook_signature(b"body", "t=abc,v1=00", SECRET, 0, 300).is_err());
        assert!(verify_webhook_signature(b"body", "t=0", SECRET, 0, 300).is_err());
    }

    // ========================================================================
    // Event parsing
    // ========================================================================

    fn subscription_event(kind: &str, user_id: &str, plan: &str, status: &str) -> Vec<u8> {
        json!({
            "type": kind,
            "data": { "object": {
                "id": "sub_123",
                "customer": "cus_456",
                "status": status,
                "metadata": { "user_id": user_id, "plan": plan },
                "current_period_start": 1_700_000_000,
                "current_period_end": 1_702_592_000,
                "trial_end": null,
                "cancel_at_period_end": false
            }}
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn test_parse_events() {
        let event = BillingEvent::from_json(&subscription_event(
            "customer.subscription.created",
            "u1",
            "basic",
            "active",
        ))
        .unwrap();
        assert!(matches!(event, BillingEvent::SubscriptionCreated(ref s) if s.id == "sub_123"));

        let event = BillingEvent::from_json(
            br#"{"type":"invoice.payment_failed","data":{"object":{"id":"in_1"}}}"#,
        )
        .unwrap();
        assert!(matches!(event, BillingEvent::InvoicePaymentFailed { ref invoice_id } if invoice_id == "in_1"));

        let event = BillingEvent::from_json(br#"{"type":"charge.refunded","data":{"object":{}}}"#).unwrap();
        assert_eq!(event.kind(), "charge.refunded");

        assert!(BillingEvent::from_json(b"not json").is_err());
    }

    // ========================================================================
    // Applying events
    // ========================================================================

    async fn setup() -> (SubscriptionService, UserStore, String, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path().join("test.db")).await.unwrap();
        let users = UserStore::new(db.pool.clone());
        let user = users
            .register(NewUser {
                email: "buyer@example.com".to_string(),
                password: "password123".to_string(),
                name: "Buyer".to_string(),
            })
            .await
            .unwrap();
        (SubscriptionService::new(db.pool), users, user.id, dir)
    }

    async fn apply(service: &SubscriptionService, payload: Vec<u8>) -> EventOutcome {
        let event = BillingEvent::from_json(&payload).unwrap();
        service.apply_event(&event).await.unwrap()
    }

    #[tokio::test]
    async fn test_lifecycle_moves_tier() {
        let (service, users, user_id, _dir) = setup().await;

        let outcome = apply(
            &service,
            subscription_event("customer.subscription.created", &user_id, "standard", "trialing"),
        )
        .await;
        assert_eq!(outcome.tier_changed_for.as_deref(), Some(user_id.as_str()));
        assert_eq!(users.require(&user_id).await.unwrap().tier(), MembershipTier::Standard);

        let sub = service.latest_for_user(&user_id).await.unwrap().unwrap();
        assert_eq!(sub.status(), Some(SubscriptionStatus::Trialing));
        assert_eq!(sub.stripe_customer_id.as_deref(), Some("cus_456"));
        assert!(sub.current_period_end.is_some());

        // Past-due update leaves the tier alone
        let outcome = apply(
            &service,
            subscription_event("customer.subscription.updated", &user_id, "premium", "past_due"),
        )
        .await;
        assert_eq!(outcome.tier_changed_for, None);
        assert_eq!(users.require(&user_id).await.unwrap().tier(), MembershipTier::Standard);

        // Active update applies the plan
        apply(
            &service,
            subscription_event("customer.subscription.updated", &user_id, "premium", "active"),
        )
        .await;
        assert_eq!(users.require(&user_id).await.unwrap().tier(), MembershipTier::Premium);

        apply(
            &service,
            subscription_event("customer.subscription.deleted", &user_id, "premium", "canceled"),
        )
        .await;
        assert_eq!(users.require(&user_id).await.unwrap().tier(), MembershipTier::Free);

        let all = service.list(Some(&user_id)).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status(), Some(SubscriptionStatus::Canceled));
    }

    #[tokio::test]
    async fn test_created_twice_upserts() {
        let (service, _users, user_id, _dir) = setup().await;
        for plan in ["basic", "standard"] {
            apply(
                &service,
                subscription_event("customer.subscription.created", &user_id, plan, "active"),
            )
            .await;
        }
        let all = service.list(None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].plan(), Some(MembershipTier::Standard));
    }

    #[tokio::test]
    async fn test_unknown_user_is_skipped() {
        let (service, _users, _user_id, _dir) = setup().await;
        let outcome = apply(
            &service,
            subscription_event("customer.subscription.created", "ghost", "basic", "active"),
        )
        .await;
        assert_eq!(outcome, EventOutcome::default());
        assert!(service.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_plan_is_rejected() {
        let (service, _users, user_id, _dir) = setup().await;
        let event = BillingEvent::from_json(&subscription_event(
            "customer.subscription.created",
            &user_id,
            "platinum",
            "active",
        ))
        .unwrap();
        let result = service.apply_event(&event).await;
        assert!(matches!(result, Err(Error::Webhook(_))));
    }
}
