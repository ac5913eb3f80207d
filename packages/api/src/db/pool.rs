//! Database connection pool built from [`Database`] settings.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::settings::Database;

/// Open a connection pool. Acquiring a connection waits at most the configured store timeout.
pub async fn connect(settings: &Database) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.timeout())
        .connect(&settings.url())
        .await
}

/// Apply pending migrations from `packages/api/migrations`, in filename order, once each.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
