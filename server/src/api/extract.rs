//! Request extractors
//!
//! Bearer-token identity and a JSON body extractor whose rejections use the
//! API's `{ "error": ... }` shape.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    Json,
};

use kiwi_core::{Claims, Error};

use crate::{error::ApiError, AppState};

/// Token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Signed-in caller; rejects with 401 when no valid token is present
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(|| Error::auth("Sign-in required"))?;
        let claims = state.keys.verify_token(token)?;
        Ok(AuthUser(claims))
    }
}

/// Caller who may or may not be signed in. An invalid or expired token is
/// treated the same as no token.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Claims>);

impl MaybeUser {
    pub fn user_id(&self) -> Option<String> {
        self.0.as_ref().map(|claims| claims.sub.clone())
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = bearer_token(&parts.headers).and_then(|token| match state.keys.verify_token(token) {
            Ok(claims) => Some(claims),
            Err(e) => {
                log::debug!("[auth] Ignoring unusable token: {}", e);
                None
            }
        });
        Ok(MaybeUser(claims))
    }
}

/// `Json<T>` with malformed bodies reported as validation errors
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError(Error::validation(rejection.body_text()))),
        }
    }
}
