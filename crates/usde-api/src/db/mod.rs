//! # Database Persistence Layer
//!
//! PostgreSQL access through SQLx. Each submodule owns one table: a
//! `#[derive(sqlx::FromRow)]` row type, its conversion into the API record,
//! and free functions taking `&mut PgConnection` so callers can run them on
//! a pooled connection or inside a transaction.
//!
//! Transaction boundaries and row locking are decided by
//! [`PgStore`](crate::store::postgres::PgStore), not here.

pub mod audit;
pub mod bank_accounts;
pub mod companies;
pub mod deposits;
pub mod earnings;
pub mod enterprises;
pub mod kyc;
pub mod ledger;
pub mod locks;
pub mod payments;
pub mod stakes;
pub mod withdrawals;

use std::str::FromStr;

use sqlx::postgres::{PgPool, PgPoolOptions};
use usde_core::LedgerError;

use crate::store::StoreError;

/// Connect to `url` and run the embedded migrations.
pub async fn init_pool(url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}

/// Decode a TEXT column holding a wire enum.
pub(crate) fn decode<T>(column: &'static str, value: &str) -> Result<T, StoreError>
where
    T: FromStr<Err = LedgerError>,
{
    value
        .parse()
        .map_err(|e: LedgerError| StoreError::Corrupt(format!("{column}: {e}")))
}

/// Convert a non-negative integer column.
pub(crate) fn unsigned<T: TryFrom<i64>>(column: &'static str, value: i64) -> Result<T, StoreError> {
    T::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column}: {value} out of range")))
}

/// Map a unique-constraint violation to [`LedgerError::Duplicate`].
pub(crate) fn duplicate_on_conflict(
    err: sqlx::Error,
    resource: &'static str,
    key: &str,
) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => LedgerError::Duplicate {
            resource,
            key: key.to_string(),
        }
        .into(),
        _ => StoreError::Database(err),
    }
}

/// Page bounds as SQL parameters.
pub(crate) fn limit_offset(page: usde_core::PageRequest) -> (i64, i64) {
    (
        i64::from(page.limit),
        i64::try_from(page.offset()).unwrap_or(i64::MAX),
    )
}
