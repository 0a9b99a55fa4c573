//! Data models for the Kiwi service

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ============================================================================
// Enumerations
// ============================================================================

/// Persona chosen during onboarding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonaRole {
    Blogger,
    Seller,
    Youtuber,
}

impl PersonaRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonaRole::Blogger => "blogger",
            PersonaRole::Seller => "seller",
            PersonaRole::Youtuber => "youtuber",
        }
    }
}

impl fmt::Display for PersonaRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PersonaRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "blogger" => Ok(PersonaRole::Blogger),
            "seller" => Ok(PersonaRole::Seller),
            "youtuber" => Ok(PersonaRole::Youtuber),
            other => Err(format!(
                "Unknown role: {}. Use blogger, seller or youtuber",
                other
            )),
        }
    }
}

/// Subscription tier, ordered from least to most capable
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MembershipTier {
    #[default]
    Free,
    Basic,
    Standard,
    Premium,
}

impl MembershipTier {
    pub const ALL: [MembershipTier; 4] = [
        MembershipTier::Free,
        MembershipTier::Basic,
        MembershipTier::Standard,
        MembershipTier::Premium,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipTier::Free => "free",
            MembershipTier::Basic => "basic",
            MembershipTier::Standard => "standard",
            MembershipTier::Premium => "premium",
        }
    }

    /// Parse a stored tier, falling back to `Free` for missing or unknown values
    pub fn from_stored(value: Option<&str>) -> Self {
        match value {
            None => MembershipTier::Free,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                log::warn!("[models] Unknown membership tier '{}', using free", raw);
                MembershipTier::Free
            }),
        }
    }
}

impl fmt::Display for MembershipTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MembershipTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(MembershipTier::Free),
            "basic" => Ok(MembershipTier::Basic),
            "standard" => Ok(MembershipTier::Standard),
            "premium" => Ok(MembershipTier::Premium),
            other => Err(format!("Unknown tier: {}", other)),
        }
    }
}

/// Billing-provider subscription status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    Canceled,
    PastDue,
    Unpaid,
    Incomplete,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Incomplete => "incomplete",
        }
    }

    /// Whether the subscription is in its terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionStatus::Canceled)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "trialing" => Ok(SubscriptionStatus::Trialing),
            "canceled" => Ok(SubscriptionStatus::Canceled),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            "unpaid" => Ok(SubscriptionStatus::Unpaid),
            // incomplete_expired is folded into incomplete
            "incomplete" | "incomplete_expired" => Ok(SubscriptionStatus::Incomplete),
            other => Err(format!("Unknown subscription status: {}", other)),
        }
    }
}

// ============================================================================
// Users
// ============================================================================

/// User model
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Option<String>,
    pub membership_tier: Option<String>,
    pub kiwi_balance: i64,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Effective tier (unset means free)
    pub fn tier(&self) -> MembershipTier {
        MembershipTier::from_stored(self.membership_tier.as_deref())
    }

    /// Persona role if onboarding is complete
    pub fn persona(&self) -> Option<PersonaRole> {
        self.role.as_deref().and_then(|r| r.parse().ok())
    }
}

/// User response (without sensitive fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Option<PersonaRole>,
    pub membership_tier: MembershipTier,
    pub kiwi_balance: i64,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            role: user.persona(),
            membership_tier: user.tier(),
            id: user.id,
            email: user.email,
            name: user.name,
            kiwi_balance: user.kiwi_balance,
            is_admin: user.is_admin,
            created_at: user.created_at,
        }
    }
}

/// JWT Claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub email: String,
    pub exp: i64,
}

// ============================================================================
// Subscriptions
// ============================================================================

/// Subscription row. Never deleted; ends in the `canceled` status.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub stripe_subscription_id: String,
    pub stripe_customer_id: Option<String>,
    pub plan: String,
    pub status: String,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn status(&self) -> Option<SubscriptionStatus> {
        self.status.parse().ok()
    }

    pub fn plan(&self) -> Option<MembershipTier> {
        self.plan.parse().ok()
    }
}

// ============================================================================
// Usage
// ============================================================================

/// One row per (user, service, calendar day)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageLog {
    pub id: String,
    pub user_id: String,
    pub service: String,
    pub usage_date: NaiveDate,
    pub count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Projects & keywords
// ============================================================================

/// Saved keyword-research container
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Project {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Saved keyword, optionally filed under a project
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Keyword {
    pub id: String,
    pub user_id: String,
    pub project_id: Option<String>,
    pub keyword: String,
    pub search_volume: Option<i64>,
    pub competition: Option<String>,
    pub cpc: Option<f64>,
    pub platform: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create project request
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProject {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
}

/// Create keyword request
#[derive(Debug, Clone, Deserialize)]
pub struct CreateKeyword {
    pub keyword: String,
    pub search_volume: Option<i64>,
    pub competition: Option<String>,
    pub cpc: Option<f64>,
    pub platform: Option<String>,
    pub notes: Option<String>,
}

/// Platforms a keyword can be sourced from
pub const KEYWORD_PLATFORMS: [&str; 5] = ["naver", "google", "youtube", "coupang", "daum"];
