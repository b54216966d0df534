//! Stake persistence operations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use usde_core::{PageRequest, StakeStatus};
use uuid::Uuid;

use super::{decode, limit_offset, unsigned};
use crate::state::Stake;
use crate::store::StoreError;

const COLUMNS: &str = "id, company_id, amount, apy, start_date, end_date, status, \
     earnings_paid, completed_at, created_at";

pub async fn insert(conn: &mut PgConnection, s: &Stake) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO stakes (id, company_id, amount, apy, start_date, end_date, status,
         earnings_paid, completed_at, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(s.id)
    .bind(s.company_id)
    .bind(s.amount)
    .bind(s.apy)
    .bind(s.start_date)
    .bind(s.end_date)
    .bind(s.status.as_str())
    .bind(s.earnings_paid)
    .bind(s.completed_at)
    .bind(s.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn owned(
    conn: &mut PgConnection,
    company_id: Uuid,
    id: Uuid,
) -> Result<Option<Stake>, StoreError> {
    let sql = format!("SELECT {COLUMNS} FROM stakes WHERE id = $1 AND company_id = $2");
    sqlx::query_as::<_, StakeRow>(&sql)
        .bind(id)
        .bind(company_id)
        .fetch_optional(&mut *conn)
        .await?
        .map(StakeRow::try_into_record)
        .transpose()
}

/// A company's stakes, newest first, optionally filtered by status.
pub async fn for_company(
    conn: &mut PgConnection,
    company_id: Uuid,
    status: Option<StakeStatus>,
    page: Option<PageRequest>,
) -> Result<(Vec<Stake>, u64), StoreError> {
    let filter = "company_id = $1 AND ($2::TEXT IS NULL OR status = $2)";
    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM stakes WHERE {filter}"))
        .bind(company_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_one(&mut *conn)
        .await?;
    // Without a page every row is returned.
    let (limit, offset) = page.map_or((i64::MAX, 0), limit_offset);
    let sql = format!(
        "SELECT {COLUMNS} FROM stakes WHERE {filter}
         ORDER BY created_at DESC LIMIT $3 OFFSET $4"
    );
    let rows = sqlx::query_as::<_, StakeRow>(&sql)
        .bind(company_id)
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(StakeRow::try_into_record)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((rows, unsigned("count", total)?))
}

/// Active stakes, oldest first. With `matured_at`, only those whose term
/// has ended by then.
pub async fn active(
    conn: &mut PgConnection,
    matured_at: Option<DateTime<Utc>>,
) -> Result<Vec<Stake>, StoreError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM stakes
         WHERE status = 'active' AND ($1::TIMESTAMPTZ IS NULL OR end_date <= $1)
         ORDER BY start_date"
    );
    sqlx::query_as::<_, StakeRow>(&sql)
        .bind(matured_at)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(StakeRow::try_into_record)
        .collect()
}

pub async fn by_id_for_update(conn: &mut PgConnection, id: Uuid) -> Result<Option<Stake>, StoreError> {
    let sql = format!("SELECT {COLUMNS} FROM stakes WHERE id = $1 FOR UPDATE");
    sqlx::query_as::<_, StakeRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(StakeRow::try_into_record)
        .transpose()
}

/// Close a matured stake.
pub async fn complete(
    conn: &mut PgConnection,
    id: Uuid,
    earnings_paid: Decimal,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE stakes SET status = 'completed', earnings_paid = $2, completed_at = $3
         WHERE id = $1",
    )
    .bind(id)
    .bind(earnings_paid)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct StakeRow {
    id: Uuid,
    company_id: Uuid,
    amount: Decimal,
    apy: Decimal,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    status: String,
    earnings_paid: Decimal,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl StakeRow {
    fn try_into_record(self) -> Result<Stake, StoreError> {
        Ok(Stake {
            id: self.id,
            company_id: self.company_id,
            amount: self.amount,
            apy: self.apy,
            start_date: self.start_date,
            end_date: self.end_date,
            status: decode("stakes.status", &self.status)?,
            earnings_paid: self.earnings_paid,
            completed_at: self.completed_at,
            created_at: self.created_at,
        })
    }
}
