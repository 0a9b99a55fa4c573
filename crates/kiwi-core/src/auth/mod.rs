//! Session tokens and password hashing
//!
//! Tokens are HS256 JWTs carrying the user id as `sub`; they expire after
//! [`TOKEN_EXPIRY_DAYS`].

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

use crate::error::{Error, Result};
use crate::models::{Claims, User};

pub const TOKEN_EXPIRY_DAYS: i64 = 7;

/// HS256 signing keys for session tokens
#[derive(Clone)]
pub struct AuthKeys {
    secret: Vec<u8>,
}

impl AuthKeys {
    /// Build keys from a configured secret
    pub fn from_secret(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Use the configured secret, or generate a random one for this process
    pub fn from_config_secret(secret: Option<&str>) -> Self {
        match secret {
            Some(secret) if secret.len() >= 32 => Self::from_secret(secret.as_bytes()),
            Some(secret) => {
                log::warn!("[auth] KIWI_JWT_SECRET has fewer than 32 bytes; use a longer secret in production");
                Self::from_secret(secret.as_bytes())
            }
            None => {
                log::warn!("[auth] KIWI_JWT_SECRET is unset; signing with a per-process key, sessions end on restart");
                use rand::Rng;
                let mut rng = rand::thread_rng();
                let secret: Vec<u8> = (0..64).map(|_| rng.gen::<u8>()).collect();
                Self::from_secret(secret)
            }
        }
    }

    /// Issue a session token for `user`
    pub fn create_token(&self, user: &User) -> Result<String> {
        let expiration = Utc::now()
            .checked_add_signed(Duration::days(TOKEN_EXPIRY_DAYS))
            .ok_or_else(|| Error::internal("Token expiry overflow"))?
            .timestamp();

        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            exp: expiration,
        };

        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )?)
    }

    /// Check signature and expiry, returning the claims
    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }
}

/// Token lifetime in seconds, as reported to clients
pub fn token_lifetime_secs() -> i64 {
    Duration::days(TOKEN_EXPIRY_DAYS).num_seconds()
}

/// bcrypt hash at the default cost
pub fn hash_password(password: &str) -> Result<String> {
    Ok(bcrypt::hash(password, bcrypt::DEFAULT_COST)?)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    Ok(bcrypt::verify(password, hash)?)
}
