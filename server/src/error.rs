//! HTTP error mapping
//!
//! Every failure leaves the API as `{ "error": "<message>" }` with a status
//! derived from the core error kind.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use kiwi_core::Error;

/// Error returned by every handler
#[derive(Debug)]
pub struct ApiError(pub Error);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl<E> From<E> for ApiError
where
    E: Into<Error>,
{
    fn from(err: E) -> Self {
        ApiError(err.into())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Auth(_) | Error::Jwt(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::Validation(_) | Error::Webhook(_) | Error::Json(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Error::Database(_)
            | Error::Bcrypt(_)
            | Error::Io(_)
            | Error::Config(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            log::error!("[api] {}", self.0);
            match &self.0 {
                Error::Internal(msg) => msg.clone(),
                _ => "Internal server error".to_string(),
            }
        } else {
            log::debug!("[api] {} {}", status.as_u16(), self.0);
            self.0.user_message()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
