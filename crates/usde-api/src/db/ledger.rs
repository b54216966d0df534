//! Ledger entry persistence. Entries are append-only: there is no update
//! or delete here.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use usde_core::PageRequest;
use uuid::Uuid;

use super::{decode, limit_offset, unsigned};
use crate::state::LedgerEntry;
use crate::store::StoreError;

pub async fn append(conn: &mut PgConnection, e: &LedgerEntry) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO usde_transactions (id, company_id, kind, amount, balance_before,
         balance_after, description, metadata, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(e.id)
    .bind(e.company_id)
    .bind(e.kind.as_str())
    .bind(e.amount)
    .bind(e.balance_before)
    .bind(e.balance_after)
    .bind(&e.description)
    .bind(&e.metadata)
    .bind(e.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// A company's entries, newest first.
pub async fn for_company(
    conn: &mut PgConnection,
    company_id: Uuid,
    page: PageRequest,
) -> Result<(Vec<LedgerEntry>, u64), StoreError> {
    let total: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM usde_transactions WHERE company_id = $1")
            .bind(company_id)
            .fetch_one(&mut *conn)
            .await?;
    let (limit, offset) = limit_offset(page);
    let rows = sqlx::query_as::<_, LedgerRow>(
        "SELECT id, company_id, kind, amount, balance_before, balance_after, description,
         metadata, created_at
         FROM usde_transactions WHERE company_id = $1
         ORDER BY seq DESC LIMIT $2 OFFSET $3",
    )
    .bind(company_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(LedgerRow::try_into_record)
    .collect::<Result<Vec<_>, _>>()?;
    Ok((rows, unsigned("count", total)?))
}

#[derive(sqlx::FromRow)]
struct LedgerRow {
    id: Uuid,
    company_id: Uuid,
    kind: String,
    amount: Decimal,
    balance_before: Decimal,
    balance_after: Decimal,
    description: String,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl LedgerRow {
    fn try_into_record(self) -> Result<LedgerEntry, StoreError> {
        Ok(LedgerEntry {
            id: self.id,
            company_id: self.company_id,
            kind: decode("usde_transactions.kind", &self.kind)?,
            amount: self.amount,
            balance_before: self.balance_before,
            balance_after: self.balance_after,
            description: self.description,
            metadata: self.metadata,
            created_at: self.created_at,
        })
    }
}
