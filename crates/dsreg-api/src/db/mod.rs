//! # Database Persistence Layer
//!
//! Postgres persistence for registration entities via SQLx.
//!
//! The database layer is **optional**. When `DATABASE_URL` is set, the
//! binary runs the engine and the HTTP surface against
//! [`registrations::PgRegistrationStore`]. When absent, it falls back to the
//! in-memory store, which is suitable for development and testing only:
//! registrations and leases do not survive a restart.

pub mod registrations;

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if `DATABASE_URL` is not set (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool() -> Result<Option<PgPool>, sqlx::Error> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            tracing::warn!(
                "DATABASE_URL not set, running with the in-memory store. \
                 Registrations will not survive restarts."
            );
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}
