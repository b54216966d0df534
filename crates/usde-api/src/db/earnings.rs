//! Staking earnings persistence. One row per stake per day held.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use usde_core::PageRequest;
use uuid::Uuid;

use super::{limit_offset, unsigned};
use crate::state::Earning;
use crate::store::{EarningsSummary, StoreError};

const COLUMNS: &str = "id, company_id, stake_id, day, amount, accrued_for, created_at";

/// Insert accruals. Days already recorded for a stake are skipped. Returns
/// the number inserted.
pub async fn insert_all(conn: &mut PgConnection, rows: &[Earning]) -> Result<u64, StoreError> {
    let mut inserted = 0;
    for e in rows {
        let result = sqlx::query(
            "INSERT INTO earnings (id, company_id, stake_id, day, amount, accrued_for, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (stake_id, day) DO NOTHING",
        )
        .bind(e.id)
        .bind(e.company_id)
        .bind(e.stake_id)
        .bind(i32::try_from(e.day).unwrap_or(i32::MAX))
        .bind(e.amount)
        .bind(e.accrued_for)
        .bind(e.created_at)
        .execute(&mut *conn)
        .await?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

/// Number of days accrued and their sum for one stake.
pub async fn for_stake(conn: &mut PgConnection, stake_id: Uuid) -> Result<(u32, Decimal), StoreError> {
    let (count, total): (i64, Option<Decimal>) =
        sqlx::query_as("SELECT COUNT(*), SUM(amount) FROM earnings WHERE stake_id = $1")
            .bind(stake_id)
            .fetch_one(&mut *conn)
            .await?;
    Ok((unsigned("count", count)?, total.unwrap_or_default()))
}

/// A company's earnings accrued at or after `since`, newest first.
pub async fn for_company(
    conn: &mut PgConnection,
    company_id: Uuid,
    since: Option<DateTime<Utc>>,
    page: PageRequest,
) -> Result<(Vec<Earning>, u64), StoreError> {
    let filter = "company_id = $1 AND ($2::TIMESTAMPTZ IS NULL OR accrued_for >= $2)";
    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM earnings WHERE {filter}"))
        .bind(company_id)
        .bind(since)
        .fetch_one(&mut *conn)
        .await?;
    let (limit, offset) = limit_offset(page);
    let sql = format!(
        "SELECT {COLUMNS} FROM earnings WHERE {filter}
         ORDER BY accrued_for DESC, day DESC LIMIT $3 OFFSET $4"
    );
    let rows = sqlx::query_as::<_, EarningRow>(&sql)
        .bind(company_id)
        .bind(since)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(EarningRow::try_into_record)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((rows, unsigned("count", total)?))
}

pub async fn summary(
    conn: &mut PgConnection,
    company_id: Uuid,
    since: Option<DateTime<Utc>>,
) -> Result<EarningsSummary, StoreError> {
    let (count, total): (i64, Option<Decimal>) = sqlx::query_as(
        "SELECT COUNT(*), SUM(amount) FROM earnings
         WHERE company_id = $1 AND ($2::TIMESTAMPTZ IS NULL OR accrued_for >= $2)",
    )
    .bind(company_id)
    .bind(since)
    .fetch_one(&mut *conn)
    .await?;
    Ok(EarningsSummary {
        total_earnings: total.unwrap_or_default(),
        count: unsigned("count", count)?,
    })
}

#[derive(sqlx::FromRow)]
struct EarningRow {
    id: Uuid,
    company_id: Uuid,
    stake_id: Uuid,
    day: i32,
    amount: Decimal,
    accrued_for: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl EarningRow {
    fn try_into_record(self) -> Result<Earning, StoreError> {
        Ok(Earning {
            id: self.id,
            company_id: self.company_id,
            stake_id: self.stake_id,
            day: unsigned("earnings.day", i64::from(self.day))?,
            amount: self.amount,
            accrued_for: self.accrued_for,
            created_at: self.created_at,
        })
    }
}
