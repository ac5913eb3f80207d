//! # HTTP routes
//!
//! | Method | Path | Handler | Auth |
//! |--------|------|---------|------|
//! | POST | `/api/register` | [`auth::register`] | public |
//! | POST | `/api/login` | [`auth::login`] | public |
//! | GET | `/api/me` | [`auth::me`] | session |
//! | POST | `/api/logout` | [`auth::logout`] | public |
//! | GET, POST | `/api/notes` | [`notes::list`], [`notes::create`] | session |
//! | GET, PUT, DELETE | `/api/notes/{id}` | [`notes::get`], [`notes::update`], [`notes::delete`] | session |
//! | GET | `/health` | [`health`] | public |
//!
//! Authenticated handlers take a [`Principal`](crate::auth::Principal)
//! argument, so a request without a valid session is rejected before any
//! store call is made.

use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;

use crate::audit::{audit_middleware, MAX_REQUEST_BYTES};
use crate::state::AppState;

pub mod auth;
pub mod notes;

/// `{"message": "..."}` acknowledgement body.
#[derive(Debug, Serialize)]
pub struct Message {
    pub message: &'static str,
}

impl Message {
    pub fn new(message: &'static str) -> Self {
        Self { message }
    }
}

/// Build the application router. The audit layer is installed when the state carries a sink.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout))
        .route("/notes", get(notes::list).post(notes::create))
        .route(
            "/notes/{id}",
            get(notes::get).put(notes::update).delete(notes::delete),
        );

    let router = Router::new()
        .nest("/api", api)
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES));

    let router = if state.audit.is_some() {
        router.layer(from_fn_with_state(state.clone(), audit_middleware))
    } else {
        router
    };
    router.with_state(state)
}

/// Liveness probe.
pub async fn health() -> &'static str {
    "ok"
}
