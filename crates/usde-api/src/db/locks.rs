//! Locked balance persistence operations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::state::LockedBalance;
use crate::store::StoreError;

pub async fn insert(conn: &mut PgConnection, l: &LockedBalance) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO locked_balances (id, company_id, amount, release_at, source_payment_id,
         created_at)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(l.id)
    .bind(l.company_id)
    .bind(l.amount)
    .bind(l.release_at)
    .bind(l.source_payment_id)
    .bind(l.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Sum of a company's locks; zero when it has none.
pub async fn total(conn: &mut PgConnection, company_id: Uuid) -> Result<Decimal, StoreError> {
    let sum: Option<Decimal> =
        sqlx::query_scalar("SELECT SUM(amount) FROM locked_balances WHERE company_id = $1")
            .bind(company_id)
            .fetch_one(&mut *conn)
            .await?;
    Ok(sum.unwrap_or_default())
}

pub async fn for_company(
    conn: &mut PgConnection,
    company_id: Uuid,
) -> Result<Vec<LockedBalance>, StoreError> {
    let rows = sqlx::query_as::<_, LockRow>(
        "SELECT id, company_id, amount, release_at, source_payment_id, created_at
         FROM locked_balances WHERE company_id = $1 ORDER BY release_at",
    )
    .bind(company_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(LockRow::into_record).collect())
}

pub async fn delete_for_payment(conn: &mut PgConnection, payment_id: Uuid) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM locked_balances WHERE source_payment_id = $1")
        .bind(payment_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Delete every lock due at `now`. Returns the source payment of each
/// removed lock (`None` for locks without one).
pub async fn delete_expired(
    conn: &mut PgConnection,
    now: DateTime<Utc>,
) -> Result<Vec<Option<Uuid>>, StoreError> {
    Ok(sqlx::query_scalar(
        "DELETE FROM locked_balances WHERE release_at <= $1 RETURNING source_payment_id",
    )
    .bind(now)
    .fetch_all(&mut *conn)
    .await?)
}

#[derive(sqlx::FromRow)]
struct LockRow {
    id: Uuid,
    company_id: Uuid,
    amount: Decimal,
    release_at: DateTime<Utc>,
    source_payment_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl LockRow {
    fn into_record(self) -> LockedBalance {
        LockedBalance {
            id: self.id,
            company_id: self.company_id,
            amount: self.amount,
            release_at: self.release_at,
            source_payment_id: self.source_payment_id,
            created_at: self.created_at,
        }
    }
}
