//! Bank account persistence operations.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use super::duplicate_on_conflict;
use crate::state::BankAccount;
use crate::store::StoreError;

/// Insert an account. The same bank and number twice for one company
/// becomes `Duplicate`.
pub async fn insert(conn: &mut PgConnection, a: &BankAccount) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO bank_accounts (id, company_id, bank_name, account_num, currency,
         is_verified, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(a.id)
    .bind(a.company_id)
    .bind(&a.bank_name)
    .bind(&a.account_num)
    .bind(&a.currency)
    .bind(a.is_verified)
    .bind(a.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| duplicate_on_conflict(e, "bank account", &a.account_num))?;
    Ok(())
}

pub async fn for_company(
    conn: &mut PgConnection,
    company_id: Uuid,
) -> Result<Vec<BankAccount>, StoreError> {
    let rows = sqlx::query_as::<_, BankAccountRow>(
        "SELECT id, company_id, bank_name, account_num, currency, is_verified, created_at
         FROM bank_accounts WHERE company_id = $1 ORDER BY created_at",
    )
    .bind(company_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(BankAccountRow::into_record).collect())
}

/// Fetch an account owned by `company_id`, optionally row-locking it.
pub async fn owned(
    conn: &mut PgConnection,
    company_id: Uuid,
    id: Uuid,
    for_update: bool,
) -> Result<Option<BankAccount>, StoreError> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let sql = format!(
        "SELECT id, company_id, bank_name, account_num, currency, is_verified, created_at
         FROM bank_accounts WHERE id = $1 AND company_id = $2{lock}"
    );
    let row = sqlx::query_as::<_, BankAccountRow>(&sql)
        .bind(id)
        .bind(company_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(BankAccountRow::into_record))
}

/// Oldest verified account of a company.
pub async fn first_verified(
    conn: &mut PgConnection,
    company_id: Uuid,
) -> Result<Option<Uuid>, StoreError> {
    Ok(sqlx::query_scalar(
        "SELECT id FROM bank_accounts WHERE company_id = $1 AND is_verified
         ORDER BY created_at LIMIT 1",
    )
    .bind(company_id)
    .fetch_optional(&mut *conn)
    .await?)
}

pub async fn set_verified(conn: &mut PgConnection, id: Uuid) -> Result<(), StoreError> {
    sqlx::query("UPDATE bank_accounts SET is_verified = TRUE WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn delete(conn: &mut PgConnection, id: Uuid) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM bank_accounts WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct BankAccountRow {
    id: Uuid,
    company_id: Uuid,
    bank_name: String,
    account_num: String,
    currency: String,
    is_verified: bool,
    created_at: DateTime<Utc>,
}

impl BankAccountRow {
    fn into_record(self) -> BankAccount {
        BankAccount {
            id: self.id,
            company_id: self.company_id,
            bank_name: self.bank_name,
            account_num: self.account_num,
            currency: self.currency,
            is_verified: self.is_verified,
            created_at: self.created_at,
        }
    }
}
