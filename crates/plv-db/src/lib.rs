//! Postgres persistence for the booking/payment core.
//!
//! [`PgStore`] implements the engine's store traits:
//! - `ReconcileStore`: `begin` opens a transaction and takes a
//!   `SELECT … FOR UPDATE` row lock on the payment; the returned guard keeps
//!   both until `commit` (or rollback on drop). The lock is acquired only for
//!   the local read-modify-write — gateway calls happen before `begin`.
//! - `BookingStore`: plain pool-level CRUD for charge initiation.
//! - `FeeConfig`: the platform fee, read from the `configuration` table on
//!   every call so admin changes apply to the next reconciliation.

mod rows;
mod store;

pub use store::PgStore;

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

pub const ENV_DB_URL: &str = "PLV_DATABASE_URL";

/// Fallback when the `configuration` row is absent: 2 500 MWK in minor units.
pub(crate) const DEFAULT_PLATFORM_FEE_MINOR: i64 = 250_000;

/// Connect to Postgres using PLV_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url =
        std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Detect a Postgres unique constraint violation by name.
///
/// Used to surface a duplicate tx_ref insert with its true reason instead of
/// a generic database error.
pub fn is_unique_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint() == Some(constraint),
        _ => false,
    }
}
