//! Error type shared by the core, the CLI and the server

use thiserror::Error;

/// Everything that can go wrong inside kiwi-core.
///
/// Variants carrying a `String` hold a message that is safe to show to the
/// caller; wrapped library errors are not.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Token error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Password hashing failed: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Missing or unusable credentials
    #[error("Not authenticated: {0}")]
    Auth(String),

    /// Authenticated, but not allowed to do this
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Request budget spent for the current window
    #[error("Too many requests: {0}")]
    RateLimited(String),

    /// Billing webhook rejected (signature, payload or plan)
    #[error("Webhook rejected: {0}")]
    Webhook(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn auth(msg: impl Into<String>) -> Self {
        Error::Auth(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Error::Forbidden(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Error::RateLimited(msg.into())
    }

    pub fn webhook(msg: impl Into<String>) -> Self {
        Error::Webhook(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Text for an API response body: the bare message for our own
    /// variants, a fixed phrase for token failures
    pub fn user_message(&self) -> String {
        match self {
            Error::Auth(msg)
            | Error::Forbidden(msg)
            | Error::Validation(msg)
            | Error::NotFound(msg)
            | Error::RateLimited(msg)
            | Error::Webhook(msg)
            | Error::Config(msg)
            | Error::Internal(msg) => msg.clone(),
            Error::Jwt(_) => "Invalid or expired session".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_keeps_category() {
        assert_eq!(
            Error::auth("Sign-in required").to_string(),
            "Not authenticated: Sign-in required"
        );
        assert_eq!(Error::internal("boom").to_string(), "boom");
    }

    #[test]
    fn test_user_message_is_bare() {
        assert_eq!(
            Error::validation("service is required").user_message(),
            "service is required"
        );
        assert_eq!(
            Error::rate_limited("slow down").user_message(),
            "slow down"
        );
    }

    #[test]
    fn test_token_errors_hide_details() {
        let err = jsonwebtoken::decode::<serde_json::Value>(
            "not.a.token",
            &jsonwebtoken::DecodingKey::from_secret(b"k"),
            &jsonwebtoken::Validation::default(),
        )
        .unwrap_err();
        assert_eq!(Error::from(err).user_message(), "Invalid or expired session");
    }
}
