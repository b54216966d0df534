//! Payment persistence operations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use usde_core::PageRequest;
use uuid::Uuid;

use super::{decode, limit_offset, unsigned};
use crate::state::Payment;
use crate::store::{PaymentSummary, StoreError};

const COLUMNS: &str =
    "id, from_id, to_id, amount, lock_days, release_at, status, released_at, timestamp";

pub async fn insert(conn: &mut PgConnection, p: &Payment) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO payments (id, from_id, to_id, amount, lock_days, release_at, status,
         released_at, timestamp)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(p.id)
    .bind(p.from_id)
    .bind(p.to_id)
    .bind(p.amount)
    .bind(i32::try_from(p.lock_days).unwrap_or(i32::MAX))
    .bind(p.release_at)
    .bind(p.status.as_str())
    .bind(p.released_at)
    .bind(p.timestamp)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Fetch a payment, optionally row-locking it.
pub async fn by_id(
    conn: &mut PgConnection,
    id: Uuid,
    for_update: bool,
) -> Result<Option<Payment>, StoreError> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let sql = format!("SELECT {COLUMNS} FROM payments WHERE id = $1{lock}");
    sqlx::query_as::<_, PaymentRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(PaymentRow::try_into_record)
        .transpose()
}

/// Mark pending payments released. Already released ones are untouched.
pub async fn mark_released(
    conn: &mut PgConnection,
    ids: &[Uuid],
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE payments SET status = 'released', released_at = $2
         WHERE id = ANY($1) AND status = 'pending'",
    )
    .bind(ids)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Payments sent or received, newest first.
pub async fn for_company(
    conn: &mut PgConnection,
    company_id: Uuid,
    page: PageRequest,
) -> Result<(Vec<Payment>, u64), StoreError> {
    let total: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE from_id = $1 OR to_id = $1")
            .bind(company_id)
            .fetch_one(&mut *conn)
            .await?;
    let (limit, offset) = limit_offset(page);
    let sql = format!(
        "SELECT {COLUMNS} FROM payments WHERE from_id = $1 OR to_id = $1
         ORDER BY timestamp DESC LIMIT $2 OFFSET $3"
    );
    let rows = sqlx::query_as::<_, PaymentRow>(&sql)
        .bind(company_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(PaymentRow::try_into_record)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((rows, unsigned("count", total)?))
}

pub async fn summary(conn: &mut PgConnection, company_id: Uuid) -> Result<PaymentSummary, StoreError> {
    let (sent, sent_total, received, received_total): (i64, Option<Decimal>, i64, Option<Decimal>) =
        sqlx::query_as(
            "SELECT COUNT(*) FILTER (WHERE from_id = $1),
                    SUM(amount) FILTER (WHERE from_id = $1),
                    COUNT(*) FILTER (WHERE to_id = $1),
                    SUM(amount) FILTER (WHERE to_id = $1)
             FROM payments WHERE from_id = $1 OR to_id = $1",
        )
        .bind(company_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(PaymentSummary {
        sent_count: unsigned("count", sent)?,
        sent_total: sent_total.unwrap_or_default(),
        received_count: unsigned("count", received)?,
        received_total: received_total.unwrap_or_default(),
    })
}

/// Payments sent by an enterprise's companies in `[start, end)`, oldest
/// first.
pub async fn sent_by_enterprise(
    conn: &mut PgConnection,
    enterprise_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<Payment>, StoreError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM payments
         WHERE from_id IN (SELECT id FROM companies WHERE enterprise_id = $1)
           AND timestamp >= $2 AND timestamp < $3
         ORDER BY timestamp"
    );
    sqlx::query_as::<_, PaymentRow>(&sql)
        .bind(enterprise_id)
        .bind(start)
        .bind(end)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(PaymentRow::try_into_record)
        .collect()
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    from_id: Uuid,
    to_id: Uuid,
    amount: Decimal,
    lock_days: i32,
    release_at: DateTime<Utc>,
    status: String,
    released_at: Option<DateTime<Utc>>,
    timestamp: DateTime<Utc>,
}

impl PaymentRow {
    fn try_into_record(self) -> Result<Payment, StoreError> {
        Ok(Payment {
            id: self.id,
            from_id: self.from_id,
            to_id: self.to_id,
            amount: self.amount,
            lock_days: unsigned("payments.lock_days", i64::from(self.lock_days))?,
            release_at: self.release_at,
            status: decode("payments.status", &self.status)?,
            released_at: self.released_at,
            timestamp: self.timestamp,
        })
    }
}
