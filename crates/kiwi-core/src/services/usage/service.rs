//! Usage ledger operations
//!
//! Answers "may this caller use this service right now" and records that
//! they did. Days run from local midnight to local midnight in the server's
//! timezone.

use std::sync::Arc;

use chrono::{Duration, Local, NaiveDate};
use serde::Serialize;

use super::store::{UsageStore, UserDirectory};
use super::tier::{Limit, TierPolicy};
use crate::config::DEFAULT_ANONYMOUS_ALLOWANCE;
use crate::error::{Error, Result};
use crate::models::{UsageLog, User};

/// Tier label reported for signed-out callers
pub const ANONYMOUS_TIER: &str = "anonymous";

/// Who is asking
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    User(String),
}

impl Caller {
    pub fn from_user_id(user_id: Option<String>) -> Self {
        match user_id {
            Some(id) => Caller::User(id),
            None => Caller::Anonymous,
        }
    }
}

/// Result of a usage check, in the wire shape clients expect
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageCheck {
    pub is_allowed: bool,
    pub remaining: Limit,
    pub limit: Limit,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_usage: Option<u32>,
    pub message: String,
    pub tier: String,
}

/// Result of recording one use
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncrementOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    pub message: String,
}

/// Result of an atomic check-and-record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeOutcome {
    pub is_allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    pub remaining: Limit,
    pub limit: Limit,
    pub message: String,
    pub tier: String,
}

/// Result of an administrative reset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResetOutcome {
    pub success: bool,
    pub message: String,
}

/// Today's date in the server's local timezone
pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

fn validate_service(service: &str) -> Result<&str> {
    let service = service.trim();
    if service.is_empty() {
        return Err(Error::validation("service is required"));
    }
    Ok(service)
}

fn quota_message(allowed: bool, remaining: Limit) -> String {
    match (allowed, remaining) {
        (_, Limit::Unlimited) => "Unlimited usage".to_string(),
        (true, Limit::Bounded(n)) => format!("{} uses left today", n),
        (false, _) => "Daily limit reached. Upgrade your plan to keep going.".to_string(),
    }
}

/// Daily per-service usage ledger
pub struct UsageService {
    store: Arc<dyn UsageStore>,
    users: Arc<dyn UserDirectory>,
    policy: TierPolicy,
    anonymous_allowance: u32,
}

impl UsageService {
    pub fn new(store: Arc<dyn UsageStore>, users: Arc<dyn UserDirectory>) -> Self {
        Self {
            store,
            users,
            policy: TierPolicy::default(),
            anonymous_allowance: DEFAULT_ANONYMOUS_ALLOWANCE,
        }
    }

    pub fn with_policy(mut self, policy: TierPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_anonymous_allowance(mut self, allowance: u32) -> Self {
        self.anonymous_allowance = allowance;
        self
    }

    pub fn policy(&self) -> &TierPolicy {
        &self.policy
    }

    async fn require_user(&self, user_id: &str) -> Result<User> {
        self.users
            .find_user(user_id)
            .await?
            .ok_or_else(|| Error::auth("Unknown user"))
    }

    fn anonymous_check(&self) -> UsageCheck {
        // Advisory only: nothing is persisted for signed-out callers
        UsageCheck {
            is_allowed: true,
            remaining: Limit::Bounded(self.anonymous_allowance),
            limit: Limit::Bounded(self.anonymous_allowance),
            current_usage: None,
            message: "Sign in to unlock more usage".to_string(),
            tier: ANONYMOUS_TIER.to_string(),
        }
    }

    /// Check whether the caller may use `service` today
    pub async fn check_usage(&self, caller: &Caller, service: &str) -> Result<UsageCheck> {
        self.check_usage_on(caller, service, local_today()).await
    }

    pub async fn check_usage_on(
        &self,
        caller: &Caller,
        service: &str,
        day: NaiveDate,
    ) -> Result<UsageCheck> {
        let service = validate_service(service)?;

        let user_id = match caller {
            Caller::Anonymous => return Ok(self.anonymous_check()),
            Caller::User(id) => id,
        };

        let tier = self.require_user(user_id).await?.tier();

        if self.policy.limit_for(tier).is_unlimited() {
            return Ok(UsageCheck {
                is_allowed: true,
                remaining: Limit::Unlimited,
                limit: Limit::Unlimited,
                current_usage: None,
                message: quota_message(true, Limit::Unlimited),
                tier: tier.to_string(),
            });
        }

        let current_usage = self.store.count_for_day(user_id, service, day).await?;
        let allowance = self.policy.evaluate(tier, current_usage);

        log::debug!(
            "[usage] check {} / {} ({}): {} used, allowed={}",
            user_id,
            service,
            tier,
            current_usage,
            allowance.is_allowed
        );

        Ok(UsageCheck {
            is_allowed: allowance.is_allowed,
            remaining: allowance.remaining,
            limit: allowance.limit,
            current_usage: Some(current_usage),
            message: quota_message(allowance.is_allowed, allowance.remaining),
            tier: tier.to_string(),
        })
    }

    /// Record one use of `service` today
    pub async fn increment_usage(&self, caller: &Caller, service: &str) -> Result<IncrementOutcome> {
        self.increment_usage_on(caller, service, local_today()).await
    }

    pub async fn increment_usage_on(
        &self,
        caller: &Caller,
        service: &str,
        day: NaiveDate,
    ) -> Result<IncrementOutcome> {
        let service = validate_service(service)?;

        let user_id = match caller {
            Caller::Anonymous => {
                return Ok(IncrementOutcome {
                    success: true,
                    count: None,
                    message: "Signed-out usage is not recorded".to_string(),
                })
            }
            Caller::User(id) => id,
        };

        self.require_user(user_id).await?;
        let count = self.store.increment_for_day(user_id, service, day).await?;

        log::info!("[usage] {} used {} ({} today)", user_id, service, count);

        Ok(IncrementOutcome {
            success: true,
            count: Some(count),
            message: "Usage recorded".to_string(),
        })
    }

    /// Check and record in one atomic step, so concurrent callers can never
    /// push a bounded tier past its allowance
    pub async fn consume(&self, caller: &Caller, service: &str) -> Result<ConsumeOutcome> {
        self.consume_on(caller, service, local_today()).await
    }

    pub async fn consume_on(
        &self,
        caller: &Caller,
        service: &str,
        day: NaiveDate,
    ) -> Result<ConsumeOutcome> {
        let service = validate_service(service)?;

        let user_id = match caller {
            Caller::Anonymous => {
                let check = self.anonymous_check();
                return Ok(ConsumeOutcome {
                    is_allowed: check.is_allowed,
                    count: None,
                    remaining: check.remaining,
                    limit: check.limit,
                    message: check.message,
                    tier: check.tier,
                });
            }
            Caller::User(id) => id,
        };

        let tier = self.require_user(user_id).await?.tier();

        match self.policy.limit_for(tier) {
            Limit::Unlimited => {
                let count = self.store.increment_for_day(user_id, service, day).await?;
                Ok(ConsumeOutcome {
                    is_allowed: true,
                    count: Some(count),
                    remaining: Limit::Unlimited,
                    limit: Limit::Unlimited,
                    message: quota_message(true, Limit::Unlimited),
                    tier: tier.to_string(),
                })
            }
            Limit::Bounded(limit) => {
                let recorded = self
                    .store
                    .increment_if_below(user_id, service, day, limit)
                    .await?;

                let (is_allowed, count) = match recorded {
                    Some(count) => (true, count),
                    None => (false, self.store.count_for_day(user_id, service, day).await?),
                };
                let remaining = Limit::Bounded(limit.saturating_sub(count));

                if !is_allowed {
                    log::info!("[usage] {} hit the {} limit for {}", user_id, tier, service);
                }

                Ok(ConsumeOutcome {
                    is_allowed,
                    count: Some(count),
                    remaining,
                    limit: Limit::Bounded(limit),
                    message: quota_message(is_allowed, remaining),
                    tier: tier.to_string(),
                })
            }
        }
    }

    /// Administrative: delete today's counter for a user and service
    pub async fn reset_usage(&self, actor_id: &str, user_id: &str, service: &str) -> Result<ResetOutcome> {
        self.reset_usage_on(actor_id, user_id, service, local_today()).await
    }

    pub async fn reset_usage_on(
        &self,
        actor_id: &str,
        user_id: &str,
        service: &str,
        day: NaiveDate,
    ) -> Result<ResetOutcome> {
        if user_id.trim().is_empty() {
            return Err(Error::validation("user_id and service are required"));
        }
        let service = validate_service(service)
            .map_err(|_| Error::validation("user_id and service are required"))?;

        let actor = self.require_user(actor_id).await?;
        if !actor.is_admin {
            log::warn!("[usage] {} attempted a usage reset without admin rights", actor_id);
            return Err(Error::forbidden("Administrator privileges required"));
        }

        let removed = self.store.delete_for_day(user_id, service, day).await?;
        log::info!(
            "[usage] {} reset {} for {} (row existed: {})",
            actor_id,
            service,
            user_id,
            removed
        );

        Ok(ResetOutcome {
            success: true,
            message: "Usage has been reset".to_string(),
        })
    }

    /// Usage rows for the last `days` days, today included
    pub async fn usage_history(&self, user_id: &str, days: u32) -> Result<Vec<UsageLog>> {
        self.usage_history_on(user_id, days, local_today()).await
    }

    pub async fn usage_history_on(&self, user_id: &str, days: u32, today: NaiveDate) -> Result<Vec<UsageLog>> {
        let span = i64::from(days.max(1)) - 1;
        let since = today - Duration::days(span);
        self.store.history(user_id, since).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MembershipTier;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;

    // ========================================================================
    // Fakes
    // ========================================================================

    #[derive(Default)]
    struct MemoryStore {
        counts: Mutex<HashMap<(String, String, NaiveDate), u32>>,
    }

    impl MemoryStore {
        fn seed(&self, user: &str, service: &str, day: NaiveDate, count: u32) {
            self.counts
                .lock()
                .unwrap()
                .insert((user.to_string(), service.to_string(), day), count);
        }
    }

    #[async_trait]
    impl UsageStore for MemoryStore {
        async fn count_for_day(&self, user_id: &str, service: &str, day: NaiveDate) -> Result<u32> {
            let counts = self.counts.lock().unwrap();
            Ok(*counts
                .get(&(user_id.to_string(), service.to_string(), day))
                .unwrap_or(&0))
        }

        async fn increment_for_day(&self, user_id: &str, service: &str, day: NaiveDate) -> Result<u32> {
            let mut counts = self.counts.lock().unwrap();
            let entry = counts
                .entry((user_id.to_string(), service.to_string(), day))
                .or_insert(0);
            *entry += 1;
            Ok(*entry)
        }

        async fn increment_if_below(
            &self,
            user_id: &str,
            service: &str,
            day: NaiveDate,
            limit: u32,
        ) -> Result<Option<u32>> {
            let mut counts = self.counts.lock().unwrap();
            let entry = counts
                .entry((user_id.to_string(), service.to_string(), day))
                .or_insert(0);
            if *entry >= limit {
                return Ok(None);
            }
            *entry += 1;
            Ok(Some(*entry))
        }

        async fn delete_for_day(&self, user_id: &str, service: &str, day: NaiveDate) -> Result<bool> {
            let mut counts = self.counts.lock().unwrap();
            Ok(counts
                .remove(&(user_id.to_string(), service.to_string(), day))
                .is_some())
        }

        async fn history(&self, _user_id: &str, _since: NaiveDate) -> Result<Vec<UsageLog>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct MemoryUsers {
        users: HashMap<String, User>,
    }

    impl MemoryUsers {
        fn with(mut self, id: &str, tier: Option<MembershipTier>, is_admin: bool) -> Self {
            self.users.insert(
                id.to_string(),
                User {
                    id: id.to_string(),
                    email: format!("{}@example.com", id),
                    password_hash: String::new(),
                    name: id.to_string(),
                    role: None,
                    membership_tier: tier.map(|t| t.to_string()),
                    kiwi_balance: 0,
                    is_admin,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                },
            );
            self
        }
    }

    #[async_trait]
    impl UserDirectory for MemoryUsers {
        async fn find_user(&self, user_id: &str) -> Result<Option<User>> {
            Ok(self.users.get(user_id).cloned())
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 20).unwrap()
    }

    fn service_with(store: Arc<MemoryStore>) -> UsageService {
        let users = MemoryUsers::default()
            .with("free", Some(MembershipTier::Free), false)
            .with("unset", None, false)
            .with("premium", Some(MembershipTier::Premium), false)
            .with("admin", Some(MembershipTier::Basic), true);
        UsageService::new(store, Arc::new(users))
    }

    fn user(id: &str) -> Caller {
        Caller::User(id.to_string())
    }

    // ========================================================================
    // Check
    // ========================================================================

    #[tokio::test]
    async fn test_free_tier_last_use_then_exhausted() {
        let store = Arc::new(MemoryStore::default());
        store.seed("free", "keyword_analysis", day(), 9);
        let usage = service_with(store.clone());

        let check = usage.check_usage_on(&user("free"), "keyword_analysis", day()).await.unwrap();
        assert!(check.is_allowed);
        assert_eq!(check.remaining, Limit::Bounded(1));
        assert_eq!(check.limit, Limit::Bounded(10));
        assert_eq!(check.current_usage, Some(9));
        assert_eq!(check.tier, "free");

        usage.increment_usage_on(&user("free"), "keyword_analysis", day()).await.unwrap();

        let check = usage.check_usage_on(&user("free"), "keyword_analysis", day()).await.unwrap();
        assert!(!check.is_allowed);
        assert_eq!(check.remaining, Limit::Bounded(0));
        assert!(check.message.contains("Upgrade"));
    }

    #[tokio::test]
    async fn test_unset_tier_defaults_to_free() {
        let usage = service_with(Arc::new(MemoryStore::default()));
        let check = usage.check_usage_on(&user("unset"), "trends", day()).await.unwrap();
        assert_eq!(check.tier, "free");
        assert_eq!(check.limit, Limit::Bounded(10));
    }

    #[tokio::test]
    async fn test_custom_policy_applies() {
        let store = Arc::new(MemoryStore::default());
        store.seed("free", "trends", day(), 2);
        let usage = service_with(store)
            .with_policy(TierPolicy::default().with_limit(MembershipTier::Free, Limit::Bounded(2)));

        let check = usage.check_usage_on(&user("free"), "trends", day()).await.unwrap();
        assert!(!check.is_allowed);
        assert_eq!(check.limit, Limit::Bounded(2));
        assert_eq!(usage.policy().limit_for(MembershipTier::Basic), Limit::Bounded(100));
    }

    #[tokio::test]
    async fn test_premium_is_unlimited() {
        let store = Arc::new(MemoryStore::default());
        store.seed("premium", "trends", day(), 10_000);
        let usage = service_with(store);

        let check = usage.check_usage_on(&user("premium"), "trends", day()).await.unwrap();
        assert!(check.is_allowed);
        assert_eq!(check.remaining.as_wire(), -1);
        assert_eq!(check.limit.as_wire(), -1);
        assert_eq!(check.current_usage, None);
    }

    #[tokio::test]
    async fn test_anonymous_is_advisory() {
        let usage = service_with(Arc::new(MemoryStore::default()));

        for _ in 0..3 {
            usage
                .increment_usage_on(&Caller::Anonymous, "trends", day())
                .await
                .unwrap();
            let check = usage
                .check_usage_on(&Caller::Anonymous, "trends", day())
                .await
                .unwrap();
            assert!(check.is_allowed);
            assert_eq!(check.tier, ANONYMOUS_TIER);
            assert_eq!(check.remaining, Limit::Bounded(5));
            assert_eq!(check.limit, Limit::Bounded(5));
        }
    }

    #[tokio::test]
    async fn test_unknown_user_is_auth_error() {
        let usage = service_with(Arc::new(MemoryStore::default()));
        let result = usage.check_usage_on(&user("ghost"), "trends", day()).await;
        assert!(matches!(result, Err(Error::Auth(_))));
    }

    #[tokio::test]
    async fn test_blank_service_is_validation_error() {
        let usage = service_with(Arc::new(MemoryStore::default()));
        let result = usage.check_usage_on(&user("free"), "  ", day()).await;
        assert!(matches!(result, Err(Error::Validation(_))));

        let result = usage.increment_usage_on(&Caller::Anonymous, "", day()).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_check_wire_shape() {
        let check = UsageCheck {
            is_allowed: true,
            remaining: Limit::Bounded(1),
            limit: Limit::Bounded(10),
            current_usage: Some(9),
            message: "1 uses left today".to_string(),
            tier: "free".to_string(),
        };
        let json = serde_json::to_value(&check).unwrap();
        assert_eq!(json["isAllowed"], true);
        assert_eq!(json["remaining"], 1);
        assert_eq!(json["currentUsage"], 9);
    }

    // ========================================================================
    // Increment / consume
    // ========================================================================

    #[tokio::test]
    async fn test_increment_counts_up() {
        let usage = service_with(Arc::new(MemoryStore::default()));
        let first = usage.increment_usage_on(&user("free"), "trends", day()).await.unwrap();
        let second = usage.increment_usage_on(&user("free"), "trends", day()).await.unwrap();
        assert_eq!(first.count, Some(1));
        assert_eq!(second.count, Some(2));
    }

    #[tokio::test]
    async fn test_anonymous_increment_not_recorded() {
        let store = Arc::new(MemoryStore::default());
        let usage = service_with(store.clone());
        let outcome = usage.increment_usage_on(&Caller::Anonymous, "trends", day()).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.count, None);
        assert!(store.counts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_consume_enforces_hard_ceiling() {
        let store = Arc::new(MemoryStore::default());
        store.seed("free", "trends", day(), 9);
        let usage = service_with(store);

        let outcome = usage.consume_on(&user("free"), "trends", day()).await.unwrap();
        assert!(outcome.is_allowed);
        assert_eq!(outcome.count, Some(10));
        assert_eq!(outcome.remaining, Limit::Bounded(0));

        let outcome = usage.consume_on(&user("free"), "trends", day()).await.unwrap();
        assert!(!outcome.is_allowed);
        assert_eq!(outcome.count, Some(10));
    }

    #[tokio::test]
    async fn test_consume_unlimited_still_counts() {
        let usage = service_with(Arc::new(MemoryStore::default()));
        let outcome = usage.consume_on(&user("premium"), "trends", day()).await.unwrap();
        assert!(outcome.is_allowed);
        assert_eq!(outcome.count, Some(1));
        assert!(outcome.remaining.is_unlimited());
    }

    // ========================================================================
    // Reset
    // ========================================================================

    #[tokio::test]
    async fn test_reset_requires_admin() {
        let store = Arc::new(MemoryStore::default());
        store.seed("free", "trends", day(), 10);
        let usage = service_with(store.clone());

        let denied = usage.reset_usage_on("free", "free", "trends", day()).await;
        assert!(matches!(denied, Err(Error::Forbidden(_))));

        let outcome = usage.reset_usage_on("admin", "free", "trends", day()).await.unwrap();
        assert!(outcome.success);

        let check = usage.check_usage_on(&user("free"), "trends", day()).await.unwrap();
        assert_eq!(check.current_usage, Some(0));
        assert!(check.is_allowed);
    }

    #[tokio::test]
    async fn test_reset_validates_arguments() {
        let usage = service_with(Arc::new(MemoryStore::default()));
        let result = usage.reset_usage_on("admin", "", "trends", day()).await;
        assert!(matches!(result, Err(Error::Validation(_))));
        let result = usage.reset_usage_on("admin", "free", "", day()).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
