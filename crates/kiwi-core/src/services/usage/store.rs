//! Usage storage layer
//!
//! [`UsageStore`] persists the per-(user, service, day) counters and
//! [`UserDirectory`] answers "who is this user and what tier are they on".
//! Both are traits so the ledger can run against SQLite in production and
//! against fakes in tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::{UsageLog, User};
use crate::services::cache::{cache_key, TtlCache};

// ============================================================================
// Traits
// ============================================================================

/// Persistent daily usage counters
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Count recorded for the day, zero when no row exists
    async fn count_for_day(&self, user_id: &str, service: &str, day: NaiveDate) -> Result<u32>;

    /// Atomically add one to the day's counter and return the new value
    async fn increment_for_day(&self, user_id: &str, service: &str, day: NaiveDate) -> Result<u32>;

    /// Atomically add one only while the counter is below `limit`.
    /// Returns the new value, or `None` when the limit was already reached.
    async fn increment_if_below(
        &self,
        user_id: &str,
        service: &str,
        day: NaiveDate,
        limit: u32,
    ) -> Result<Option<u32>>;

    /// Delete the day's row; returns whether one existed
    async fn delete_for_day(&self, user_id: &str, service: &str, day: NaiveDate) -> Result<bool>;

    /// Rows on or after `since`, newest day first
    async fn history(&self, user_id: &str, since: NaiveDate) -> Result<Vec<UsageLog>>;
}

/// Lookup of user records for tier resolution and admin checks
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>>;
}

fn clamp_count(count: i64) -> u32 {
    u32::try_from(count.max(0)).unwrap_or(u32::MAX)
}

// ============================================================================
// SQLite implementations
// ============================================================================

/// Usage counters in the `usage_logs` table
#[derive(Clone)]
pub struct SqliteUsageStore {
    pool: SqlitePool,
}

impl SqliteUsageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageStore for SqliteUsageStore {
    async fn count_for_day(&self, user_id: &str, service: &str, day: NaiveDate) -> Result<u32> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT count FROM usage_logs WHERE user_id = ? AND service = ? AND usage_date = ?",
        )
        .bind(user_id)
        .bind(service)
        .bind(day)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| clamp_count(r.0)).unwrap_or(0))
    }

    async fn increment_for_day(&self, user_id: &str, service: &str, day: NaiveDate) -> Result<u32> {
        let now = Utc::now();
        let (count,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO usage_logs (id, user_id, service, usage_date, count, created_at, updated_at)
            VALUES (?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT(user_id, service, usage_date)
            DO UPDATE SET count = count + 1, updated_at = excluded.updated_at
            RETURNING count
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(service)
        .bind(day)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        log::debug!(
            "[usage:store] {} / {} on {} -> {}",
            user_id,
            service,
            day,
            count
        );

        Ok(clamp_count(count))
    }

    async fn increment_if_below(
        &self,
        user_id: &str,
        service: &str,
        day: NaiveDate,
        limit: u32,
    ) -> Result<Option<u32>> {
        if limit == 0 {
            return Ok(None);
        }

        let now = Utc::now();
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO usage_logs (id, user_id, service, usage_date, count, created_at, updated_at)
            VALUES (?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT(user_id, service, usage_date)
            DO UPDATE SET count = count + 1, updated_at = excluded.updated_at
            WHERE usage_logs.count < ?
            RETURNING count
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(service)
        .bind(day)
        .bind(now)
        .bind(now)
        .bind(i64::from(limit))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| clamp_count(r.0)))
    }

    async fn delete_for_day(&self, user_id: &str, service: &str, day: NaiveDate) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM usage_logs WHERE user_id = ? AND service = ? AND usage_date = ?",
        )
        .bind(user_id)
        .bind(service)
        .bind(day)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn history(&self, user_id: &str, since: NaiveDate) -> Result<Vec<UsageLog>> {
        let rows = sqlx::query_as::<_, UsageLog>(
            r#"
            SELECT id, user_id, service, usage_date, count, created_at, updated_at
            FROM usage_logs
            WHERE user_id = ? AND usage_date >= ?
            ORDER BY usage_date DESC, service ASC
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

/// User records from the `users` table
#[derive(Clone)]
pub struct SqliteUserDirectory {
    pool: SqlitePool,
}

impl SqliteUserDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for SqliteUserDirectory {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }
}

// ============================================================================
// Caching decorator
// ============================================================================

/// Short-lived cache in front of another [`UserDirectory`].
///
/// Call [`CachedUserDirectory::invalidate`] whenever a user's tier changes.
pub struct CachedUserDirectory {
    inner: Arc<dyn UserDirectory>,
    cache: Arc<TtlCache<User>>,
    ttl: Duration,
}

impl CachedUserDirectory {
    pub fn new(inner: Arc<dyn UserDirectory>, cache: Arc<TtlCache<User>>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }

    pub fn invalidate(&self, user_id: &str) {
        self.cache.delete(&cache_key(["user", user_id]));
    }
}

#[async_trait]
impl UserDirectory for CachedUserDirectory {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>> {
        let key = cache_key(["user", user_id]);
        if let Some(user) = self.cache.get(&key) {
            return Ok(Some(user));
        }

        let user = self.inner.find_user(user_id).await?;
        if let Some(user) = &user {
            self.cache.set(key, user.clone(), self.ttl);
        }
        Ok(user)
    }
}
