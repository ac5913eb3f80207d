//! # Database module: PostgreSQL pool, migrations and the store implementation
//!
//! Nothing here is global: the binary calls [`connect`] with the frozen
//! settings, runs [`run_migrations`], and wraps the pool in a [`PgStore`] that
//! is handed to the router through `AppState`.
//!
//! ## Re-exports
//!
//! - [`connect`]: opens a pool with the configured size and acquire timeout.
//! - [`run_migrations`]: applies `migrations/*.sql` through the sqlx migrator,
//!   which records applied versions in `_sqlx_migrations`.
//! - [`PgStore`]: implements the credential, note and audit store traits.

mod pg_store;
mod pool;

pub use pg_store::PgStore;
pub use pool::{connect, run_migrations};
