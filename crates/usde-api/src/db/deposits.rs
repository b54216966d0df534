//! Deposit persistence operations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use usde_core::PageRequest;
use uuid::Uuid;

use super::{decode, limit_offset, unsigned};
use crate::state::Deposit;
use crate::store::{DepositStats, StoreError};

const COLUMNS: &str = "id, company_id, amount, fee, fee_rate, usde_amount, payment_method, \
     status, risk_score, risk_decision, expires_at, completed_at, created_at";

pub async fn insert(conn: &mut PgConnection, d: &Deposit) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO deposits (id, company_id, amount, fee, fee_rate, usde_amount,
         payment_method, status, risk_score, risk_decision, expires_at, completed_at, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
    )
    .bind(d.id)
    .bind(d.company_id)
    .bind(d.amount)
    .bind(d.fee)
    .bind(d.fee_rate)
    .bind(d.usde_amount)
    .bind(&d.payment_method)
    .bind(d.status.as_str())
    .bind(i32::try_from(d.risk_score).unwrap_or(i32::MAX))
    .bind(d.risk_decision.as_str())
    .bind(d.expires_at)
    .bind(d.completed_at)
    .bind(d.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Fetch and row-lock a deposit owned by `company_id`.
pub async fn owned_for_update(
    conn: &mut PgConnection,
    company_id: Uuid,
    id: Uuid,
) -> Result<Option<Deposit>, StoreError> {
    let sql = format!("SELECT {COLUMNS} FROM deposits WHERE id = $1 AND company_id = $2 FOR UPDATE");
    sqlx::query_as::<_, DepositRow>(&sql)
        .bind(id)
        .bind(company_id)
        .fetch_optional(&mut *conn)
        .await?
        .map(DepositRow::try_into_record)
        .transpose()
}

pub async fn mark_completed(
    conn: &mut PgConnection,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query("UPDATE deposits SET status = 'completed', completed_at = $2 WHERE id = $1")
        .bind(id)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn mark_expired(conn: &mut PgConnection, id: Uuid) -> Result<(), StoreError> {
    sqlx::query("UPDATE deposits SET status = 'expired' WHERE id = $1 AND status = 'pending'")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Mark every pending deposit whose window closed before `now` expired.
pub async fn expire_lapsed(conn: &mut PgConnection, now: DateTime<Utc>) -> Result<u64, StoreError> {
    let result = sqlx::query(
        "UPDATE deposits SET status = 'expired' WHERE status = 'pending' AND expires_at < $1",
    )
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn count_since(
    conn: &mut PgConnection,
    company_id: Uuid,
    since: DateTime<Utc>,
) -> Result<u64, StoreError> {
    let n: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM deposits WHERE company_id = $1 AND created_at >= $2",
    )
    .bind(company_id)
    .bind(since)
    .fetch_one(&mut *conn)
    .await?;
    unsigned("count", n)
}

pub async fn for_company(
    conn: &mut PgConnection,
    company_id: Uuid,
    page: PageRequest,
) -> Result<(Vec<Deposit>, u64), StoreError> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM deposits WHERE company_id = $1")
        .bind(company_id)
        .fetch_one(&mut *conn)
        .await?;
    let (limit, offset) = limit_offset(page);
    let sql = format!(
        "SELECT {COLUMNS} FROM deposits WHERE company_id = $1
         ORDER BY created_at DESC LIMIT $2 OFFSET $3"
    );
    let rows = sqlx::query_as::<_, DepositRow>(&sql)
        .bind(company_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(DepositRow::try_into_record)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((rows, unsigned("count", total)?))
}

/// Deposits of an enterprise's companies created in `[start, end)`, oldest
/// first.
pub async fn for_enterprise(
    conn: &mut PgConnection,
    enterprise_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<Deposit>, StoreError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM deposits
         WHERE company_id IN (SELECT id FROM companies WHERE enterprise_id = $1)
           AND created_at >= $2 AND created_at < $3
         ORDER BY created_at"
    );
    sqlx::query_as::<_, DepositRow>(&sql)
        .bind(enterprise_id)
        .bind(start)
        .bind(end)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(DepositRow::try_into_record)
        .collect()
}

pub async fn stats(conn: &mut PgConnection, company_id: Uuid) -> Result<DepositStats, StoreError> {
    #[allow(clippy::type_complexity)]
    let (total, completed, pending, amount, fees, minted): (
        i64,
        i64,
        i64,
        Option<Decimal>,
        Option<Decimal>,
        Option<Decimal>,
    ) = sqlx::query_as(
        "SELECT COUNT(*),
                COUNT(*) FILTER (WHERE status = 'completed'),
                COUNT(*) FILTER (WHERE status = 'pending'),
                SUM(amount) FILTER (WHERE status = 'completed'),
                SUM(fee) FILTER (WHERE status = 'completed'),
                SUM(usde_amount) FILTER (WHERE status = 'completed')
         FROM deposits WHERE company_id = $1",
    )
    .bind(company_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(DepositStats {
        total_deposits: unsigned("count", total)?,
        completed_deposits: unsigned("count", completed)?,
        pending_deposits: unsigned("count", pending)?,
        total_amount: amount.unwrap_or_default(),
        total_fees: fees.unwrap_or_default(),
        total_usde_minted: minted.unwrap_or_default(),
    })
}

#[derive(sqlx::FromRow)]
struct DepositRow {
    id: Uuid,
    company_id: Uuid,
    amount: Decimal,
    fee: Decimal,
    fee_rate: Decimal,
    usde_amount: Decimal,
    payment_method: String,
    status: String,
    risk_score: i32,
    risk_decision: String,
    expires_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl DepositRow {
    fn try_into_record(self) -> Result<Deposit, StoreError> {
        Ok(Deposit {
            id: self.id,
            company_id: self.company_id,
            amount: self.amount,
            fee: self.fee,
            fee_rate: self.fee_rate,
            usde_amount: self.usde_amount,
            payment_method: self.payment_method,
            status: decode("deposits.status", &self.status)?,
            risk_score: unsigned("deposits.risk_score", i64::from(self.risk_score))?,
            risk_decision: decode("deposits.risk_decision", &self.risk_decision)?,
            expires_at: self.expires_at,
            completed_at: self.completed_at,
            created_at: self.created_at,
        })
    }
}
