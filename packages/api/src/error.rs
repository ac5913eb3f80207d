//! Handler-boundary error type.
//!
//! Every handler returns `Result<_, ApiError>`; the `IntoResponse` impl turns
//! each kind into its status code and a `{"error": "..."}` body. Store and
//! signing failures are logged where they are converted and reach the client
//! only as a fixed message.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use store::StoreError;

use crate::auth::token::TokenError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or missing request fields.
    #[error("{0}")]
    InvalidInput(String),

    /// Missing, invalid or expired session.
    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid credentials")]
    InvalidCredentials,

    /// Policy denial on an existing resource.
    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("username already taken")]
    DuplicateUsername,

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("store unavailable")]
    StoreUnavailable,

    #[error("internal error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) | ApiError::DuplicateUsername => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::StoreUnavailable | ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateUsername => ApiError::DuplicateUsername,
            // The session names a user that no longer exists.
            StoreError::UnknownOwner(owner) => {
                tracing::warn!(owner, "session subject has no user record");
                ApiError::Unauthorized
            }
            StoreError::Unavailable(detail) => {
                tracing::error!(%detail, "store unavailable");
                ApiError::StoreUnavailable
            }
            StoreError::Backend(detail) => {
                tracing::error!(%detail, "store error");
                ApiError::Internal
            }
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        tracing::error!(error = %err, "failed to sign session token");
        ApiError::Internal
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::PayloadTooLarge;
        }
        ApiError::InvalidInput(format!("invalid json: {}", rejection.body_text()))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(ApiError::InvalidInput("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden("no").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound("note").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::DuplicateUsername.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::PayloadTooLarge.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(ApiError::StoreUnavailable.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ApiError::Internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn store_detail_is_not_exposed() {
        let err = ApiError::from(StoreError::Backend("relation \"notes\" does not exist".into()));
        assert_eq!(err.to_string(), "internal error");

        let err = ApiError::from(StoreError::Unavailable("connection refused".into()));
        assert_eq!(err.to_string(), "store unavailable");
    }
}
