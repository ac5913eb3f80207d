//! Cookie-borne sessions.
//!
//! The session is the signed token itself, carried in the `token` cookie.
//! [`Principal`] is the only way handlers learn who is calling: it reads the
//! cookie, has the [`TokenService`](super::TokenService) verify it and parses
//! the subject. Any failure is a plain 401; the reason goes to the debug log.

use axum::extract::FromRequestParts;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use cookie::time::{Duration, OffsetDateTime};
use cookie::{Cookie, SameSite};

use store::UserId;

use super::token::{TokenService, TOKEN_TTL_SECS};
use crate::error::ApiError;
use crate::state::AppState;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "token";

/// The authenticated caller of the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub username: String,
}

impl FromRequestParts<AppState> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        extract_principal(&parts.headers, &state.tokens)
    }
}

/// Recover the principal from request headers.
pub fn extract_principal(
    headers: &HeaderMap,
    tokens: &TokenService,
) -> Result<Principal, ApiError> {
    let Some(token) = session_token(headers) else {
        tracing::debug!("request has no session cookie");
        return Err(ApiError::Unauthorized);
    };
    let claims = tokens.verify(&token).map_err(|err| {
        tracing::debug!(reason = %err, "session token rejected");
        ApiError::Unauthorized
    })?;
    let user_id = claims.user_id().map_err(|err| {
        tracing::debug!(reason = %err, "session token rejected");
        ApiError::Unauthorized
    })?;
    Ok(Principal {
        user_id,
        username: claims.username,
    })
}

/// The value of the session cookie, searched across every `Cookie` header.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|c| c.name() == SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// `Set-Cookie` value establishing a session for `token`.
pub fn session_cookie(token: &str, secure: bool) -> Result<HeaderValue, ApiError> {
    let lifetime = Duration::seconds(TOKEN_TTL_SECS);
    let cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(lifetime)
        .expires(OffsetDateTime::now_utc() + lifetime)
        .build();
    header_value(cookie)
}

/// `Set-Cookie` value telling the browser to drop the session cookie.
///
/// The token itself stays valid until it expires; a client that kept a copy
/// can still present it.
pub fn removal_cookie(secure: bool) -> Result<HeaderValue, ApiError> {
    let cookie = Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(Duration::seconds(-1))
        .expires(OffsetDateTime::UNIX_EPOCH)
        .build();
    header_value(cookie)
}

/// Headers carrying a single `Set-Cookie`.
pub fn set_cookie_headers(value: HeaderValue) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, value);
    headers
}

fn header_value(cookie: Cookie<'_>) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(&cookie.to_string()).map_err(|e| {
        tracing::error!(error = %e, "session cookie is not a valid header value");
        ApiError::Internal
    })
}
