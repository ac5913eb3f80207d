//! Registration, login and session endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use store::{NewUser, UserInfo};

use super::Message;
use crate::auth::password::{hash_blocking, verify_blocking};
use crate::auth::session::{removal_cookie, session_cookie, set_cookie_headers};
use crate::auth::Principal;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Create an account and start a session for it.
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, HeaderMap, Json<UserInfo>)> {
    let Json(req) = payload?;
    let username = req.username.trim().to_string();
    if username.is_empty() || req.password.is_empty() {
        return Err(ApiError::InvalidInput("username and password are required".into()));
    }
    let email = req
        .email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty());

    let password_hash = hash_blocking(req.password).await?;
    let user = state
        .store(state.credentials.create_user(NewUser {
            username,
            password_hash,
            email,
        }))
        .await?;

    let token = state.tokens.issue(user.id, &user.username)?;
    let cookie = session_cookie(&token, state.secure_cookie)?;
    tracing::info!(user_id = user.id, "user registered");
    Ok((StatusCode::CREATED, set_cookie_headers(cookie), Json(user.to_info())))
}

/// Check credentials and start a session.
///
/// Empty fields, an unknown user, a wrong password and an unreadable stored
/// hash all produce the same `invalid credentials` response.
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<(HeaderMap, Json<Message>)> {
    let Json(req) = payload?;
    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        tracing::debug!("login with empty credentials");
        return Err(ApiError::InvalidCredentials);
    }

    let user = state
        .store(state.credentials.find_user_by_username(username))
        .await?
        .ok_or_else(|| {
            tracing::debug!("login for unknown username");
            ApiError::InvalidCredentials
        })?;

    if !verify_blocking(req.password, user.password_hash.clone()).await? {
        tracing::debug!(user_id = user.id, "login with wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    let token = state.tokens.issue(user.id, &user.username)?;
    let cookie = session_cookie(&token, state.secure_cookie)?;
    tracing::info!(user_id = user.id, "user logged in");
    Ok((set_cookie_headers(cookie), Json(Message::new("logged in"))))
}

/// The caller's own account.
pub async fn me(State(state): State<AppState>, principal: Principal) -> ApiResult<Json<UserInfo>> {
    let user = state
        .store(state.credentials.find_user_by_id(principal.user_id))
        .await?
        .ok_or_else(|| {
            tracing::warn!(user_id = principal.user_id, "session subject has no user record");
            ApiError::Unauthorized
        })?;
    Ok(Json(user.to_info()))
}

/// Clear the session cookie. Works without a session.
pub async fn logout(State(state): State<AppState>) -> ApiResult<(HeaderMap, Json<Message>)> {
    let cookie = removal_cookie(state.secure_cookie)?;
    Ok((set_cookie_headers(cookie), Json(Message::new("logged out"))))
}
