//! Persistence for scan jobs.
//!
//! - [`repositories::JobRepo`] holds the raw SQL against the `jobs` table.
//! - [`store::JobStore`] is the seam the rest of the workspace depends on,
//!   with a PostgreSQL implementation ([`PgJobStore`]) and an in-memory one
//!   ([`MemoryJobStore`]). Both publish a [`JobChange`] on every write.

pub mod models;
pub mod repositories;
pub mod store;

use sqlx::postgres::PgPoolOptions;

pub use store::{ChangeKind, JobChange, JobStore, MemoryJobStore, PgJobStore, StoreError};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Run a trivial query to confirm the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply pending migrations from `db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../db/migrations").run(pool).await
}
