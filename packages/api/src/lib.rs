//! # API crate: HTTP surface of the notes service
//!
//! Everything the server binary needs to serve requests: configuration,
//! session tokens, the note access policy, the PostgreSQL store and the axum
//! router. Handlers only see the store traits from the `store` crate, so the
//! integration tests run the real router over `store::MemoryStore`.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`audit`] | Request audit middleware and the bounded drop-oldest queue feeding the `logs` table |
//! | [`auth`] | Argon2 password hashing, HS256 session tokens, the cookie-borne [`auth::Principal`] |
//! | [`db`] | PostgreSQL pool, migrations and [`db::PgStore`] |
//! | [`error`] | [`ApiError`] and its HTTP mapping |
//! | [`policy`] | Who may read, update or delete a note |
//! | [`routes`] | Handlers and [`router`] |
//! | [`settings`] | Layered configuration |
//! | [`state`] | [`AppState`] shared by every handler |

pub mod audit;
pub mod auth;
pub mod db;
pub mod error;
pub mod policy;
pub mod routes;
pub mod settings;
pub mod state;

pub use audit::AuditSink;
pub use auth::{Principal, TokenService};
pub use error::{ApiError, ApiResult};
pub use routes::router;
pub use settings::Settings;
pub use state::AppState;
