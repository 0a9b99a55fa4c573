//! User accounts
//!
//! Registration, credential checks, onboarding role and tier changes.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::auth::{hash_password, verify_password};
use crate::error::{Error, Result};
use crate::models::{MembershipTier, PersonaRole, User};

/// New account details
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub name: String,
}

/// SQLite-backed user account store
#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create an account. The first account ever created is an administrator.
    pub async fn register(&self, new_user: NewUser) -> Result<User> {
        let email = new_user.email.trim().to_lowercase();
        let name = new_user.name.trim().to_string();

        if email.is_empty() || !email.contains('@') {
            return Err(Error::validation("A valid email is required"));
        }
        if name.is_empty() {
            return Err(Error::validation("Name is required"));
        }
        if new_user.password.len() < 8 {
            return Err(Error::validation("Password must be at least 8 characters"));
        }

        if self.find_by_email(&email).await?.is_some() {
            return Err(Error::validation("Email already registered"));
        }

        let password_hash = hash_password(&new_user.password)?;
        let user_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        // Admin flag is decided by the insert itself so two first sign-ups
        // cannot both see an empty table
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, name, membership_tier, is_admin, created_at, updated_at)
            SELECT ?, ?, ?, ?, ?, NOT EXISTS (SELECT 1 FROM users), ?, ?
            "#,
        )
        .bind(&user_id)
        .bind(&email)
        .bind(&password_hash)
        .bind(&name)
        .bind(MembershipTier::Free.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(duplicate_email)?;

        let (is_first_user,): (bool,) = sqlx::query_as("SELECT is_admin FROM users WHERE id = ?")
            .bind(&user_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        log::info!(
            "[users] Registered {} ({}){}",
            user_id,
            email,
            if is_first_user { " as administrator" } else { "" }
        );

        self.require(&user_id).await
    }

    /// Check credentials, returning the user on success
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let user = self
            .find_by_email(&email.trim().to_lowercase())
            .await?
            .ok_or_else(|| Error::auth("Invalid credentials"))?;

        if !verify_password(password, &user.password_hash)? {
            return Err(Error::auth("Invalid credentials"));
        }

        Ok(user)
    }

    pub async fn find_by_id(&self, user_id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Fetch a user or fail with `NotFound`
    pub async fn require(&self, user_id: &str) -> Result<User> {
        self.find_by_id(user_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("User {} not found", user_id)))
    }

    pub async fn list(&self) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    pub async fn set_tier(&self, user_id: &str, tier: MembershipTier) -> Result<User> {
        let result = sqlx::query("UPDATE users SET membership_tier = ?, updated_at = ? WHERE id = ?")
            .bind(tier.as_str())
            .bind(Utc::now())
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("User {} not found", user_id)));
        }

        log::info!("[users] {} is now on the {} tier", user_id, tier);
        self.require(user_id).await
    }

    /// Record the persona chosen during onboarding
    pub async fn set_role(&self, user_id: &str, role: PersonaRole) -> Result<User> {
        let result = sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(Utc::now())
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("User {} not found", user_id)));
        }

        self.require(user_id).await
    }
}

/// A concurrent sign-up may pass the lookup and lose on the UNIQUE index
fn duplicate_email(err: sqlx::Error) -> Error {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            Error::validation("Email already registered")
        }
        _ => Error::Database(err),
    }
}
