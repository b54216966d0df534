//! Withdrawal persistence operations.
//!
//! Status transitions are validated by `WithdrawalStatus::transition` in
//! the store before [`settle`] runs; SQL only records the result. A payout
//! is started by [`claim`], which succeeds for exactly one caller.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use usde_core::PageRequest;
use uuid::Uuid;

use super::{decode, limit_offset, unsigned};
use crate::state::Withdrawal;
use crate::store::{StoreError, WithdrawalStats};

const COLUMNS: &str = "id, company_id, bank_account_id, amount, status, burn_tx_hash, \
     payout_id, notes, timestamp, payout_started_at, processed_at";

pub async fn insert(conn: &mut PgConnection, w: &Withdrawal) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO withdrawals (id, company_id, bank_account_id, amount, status,
         burn_tx_hash, payout_id, notes, timestamp, payout_started_at, processed_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(w.id)
    .bind(w.company_id)
    .bind(w.bank_account_id)
    .bind(w.amount)
    .bind(w.status.as_str())
    .bind(&w.burn_tx_hash)
    .bind(&w.payout_id)
    .bind(&w.notes)
    .bind(w.timestamp)
    .bind(w.payout_started_at)
    .bind(w.processed_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Fetch a withdrawal, optionally row-locking it.
pub async fn by_id(
    conn: &mut PgConnection,
    id: Uuid,
    for_update: bool,
) -> Result<Option<Withdrawal>, StoreError> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let sql = format!("SELECT {COLUMNS} FROM withdrawals WHERE id = $1{lock}");
    sqlx::query_as::<_, WithdrawalRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(WithdrawalRow::try_into_record)
        .transpose()
}

/// Mark a processing withdrawal's payout as started. `None` when it is not
/// processing or another caller claimed it first.
pub async fn claim(
    conn: &mut PgConnection,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<Withdrawal>, StoreError> {
    let sql = format!(
        "UPDATE withdrawals SET payout_started_at = $2
         WHERE id = $1 AND status = 'processing' AND payout_started_at IS NULL
         RETURNING {COLUMNS}"
    );
    sqlx::query_as::<_, WithdrawalRow>(&sql)
        .bind(id)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?
        .map(WithdrawalRow::try_into_record)
        .transpose()
}

/// Record the final state of a settled withdrawal.
pub async fn settle(conn: &mut PgConnection, w: &Withdrawal) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE withdrawals SET status = $2, payout_id = $3, notes = $4, processed_at = $5
         WHERE id = $1",
    )
    .bind(w.id)
    .bind(w.status.as_str())
    .bind(&w.payout_id)
    .bind(&w.notes)
    .bind(w.processed_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Sum of a company's withdrawals in `[start, end)` that count toward the
/// daily limit.
pub async fn daily_total(
    conn: &mut PgConnection,
    company_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Decimal, StoreError> {
    let sum: Option<Decimal> = sqlx::query_scalar(
        "SELECT SUM(amount) FROM withdrawals
         WHERE company_id = $1 AND status <> 'failed'
           AND timestamp >= $2 AND timestamp < $3",
    )
    .bind(company_id)
    .bind(start)
    .bind(end)
    .fetch_one(&mut *conn)
    .await?;
    Ok(sum.unwrap_or_default())
}

pub async fn for_company(
    conn: &mut PgConnection,
    company_id: Uuid,
    page: PageRequest,
) -> Result<(Vec<Withdrawal>, u64), StoreError> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM withdrawals WHERE company_id = $1")
        .bind(company_id)
        .fetch_one(&mut *conn)
        .await?;
    let (limit, offset) = limit_offset(page);
    let sql = format!(
        "SELECT {COLUMNS} FROM withdrawals WHERE company_id = $1
         ORDER BY timestamp DESC LIMIT $2 OFFSET $3"
    );
    let rows = sqlx::query_as::<_, WithdrawalRow>(&sql)
        .bind(company_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(WithdrawalRow::try_into_record)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((rows, unsigned("count", total)?))
}

pub async fn stats(conn: &mut PgConnection, company_id: Uuid) -> Result<WithdrawalStats, StoreError> {
    let (total, pending, success, failed, amount): (i64, i64, i64, i64, Option<Decimal>) =
        sqlx::query_as(
            "SELECT COUNT(*),
                    COUNT(*) FILTER (WHERE status IN ('pending', 'processing')),
                    COUNT(*) FILTER (WHERE status = 'success'),
                    COUNT(*) FILTER (WHERE status = 'failed'),
                    SUM(amount) FILTER (WHERE status = 'success')
             FROM withdrawals WHERE company_id = $1",
        )
        .bind(company_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(WithdrawalStats {
        total_withdrawals: unsigned("count", total)?,
        pending_withdrawals: unsigned("count", pending)?,
        successful_withdrawals: unsigned("count", success)?,
        failed_withdrawals: unsigned("count", failed)?,
        total_amount: amount.unwrap_or_default(),
    })
}

/// Withdrawals of an enterprise's companies made in `[start, end)`, oldest
/// first.
pub async fn for_enterprise(
    conn: &mut PgConnection,
    enterprise_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<Withdrawal>, StoreError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM withdrawals
         WHERE company_id IN (SELECT id FROM companies WHERE enterprise_id = $1)
           AND timestamp >= $2 AND timestamp < $3
         ORDER BY timestamp"
    );
    sqlx::query_as::<_, WithdrawalRow>(&sql)
        .bind(enterprise_id)
        .bind(start)
        .bind(end)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(WithdrawalRow::try_into_record)
        .collect()
}

/// Pending and processing withdrawals, oldest first.
pub async fn active(conn: &mut PgConnection) -> Result<Vec<Withdrawal>, StoreError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM withdrawals WHERE status IN ('pending', 'processing')
         ORDER BY timestamp"
    );
    sqlx::query_as::<_, WithdrawalRow>(&sql)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(WithdrawalRow::try_into_record)
        .collect()
}

/// Whether an active withdrawal pays out to `bank_account_id`.
pub async fn account_in_use(
    conn: &mut PgConnection,
    bank_account_id: Uuid,
) -> Result<bool, StoreError> {
    Ok(sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM withdrawals
         WHERE bank_account_id = $1 AND status IN ('pending', 'processing'))",
    )
    .bind(bank_account_id)
    .fetch_one(&mut *conn)
    .await?)
}

/// `(total, active)` across all companies.
pub async fn counts(conn: &mut PgConnection) -> Result<(u64, u64), StoreError> {
    let (total, active): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COUNT(*) FILTER (WHERE status IN ('pending', 'processing'))
         FROM withdrawals",
    )
    .fetch_one(&mut *conn)
    .await?;
    Ok((unsigned("count", total)?, unsigned("count", active)?))
}

#[derive(sqlx::FromRow)]
struct WithdrawalRow {
    id: Uuid,
    company_id: Uuid,
    bank_account_id: Uuid,
    amount: Decimal,
    status: String,
    burn_tx_hash: Option<String>,
    payout_id: Option<String>,
    notes: Option<String>,
    timestamp: DateTime<Utc>,
    payout_started_at: Option<DateTime<Utc>>,
    processed_at: Option<DateTime<Utc>>,
}

impl WithdrawalRow {
    fn try_into_record(self) -> Result<Withdrawal, StoreError> {
        Ok(Withdrawal {
            id: self.id,
            company_id: self.company_id,
            bank_account_id: self.bank_account_id,
            amount: self.amount,
            status: decode("withdrawals.status", &self.status)?,
            burn_tx_hash: self.burn_tx_hash,
            payout_id: self.payout_id,
            notes: self.notes,
            timestamp: self.timestamp,
            payout_started_at: self.payout_started_at,
            processed_at: self.processed_at,
        })
    }
}
