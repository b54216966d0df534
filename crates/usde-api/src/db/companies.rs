//! Company persistence operations.
//!
//! Balances are only written through [`set_usde_balance`], called by the
//! store after the company row was read with [`by_id_for_update`] in the
//! same transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use usde_core::{KycStatus, PageRequest};
use uuid::Uuid;

use super::{decode, duplicate_on_conflict, limit_offset, unsigned};
use crate::state::Company;
use crate::store::{CompanyPatch, StoreError};

const COLUMNS: &str = "id, name, email, password_hash, kind, role, status, kyc_status, \
     usde_balance, balance, parent_company_id, is_parent_company, enterprise_id, \
     company_code, company_address, created_at, updated_at";

/// Insert a company. A taken e-mail becomes `Duplicate`.
pub async fn insert(conn: &mut PgConnection, c: &Company) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO companies (id, name, email, password_hash, kind, role, status, kyc_status,
         usde_balance, balance, parent_company_id, is_parent_company, enterprise_id,
         company_code, company_address, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
    )
    .bind(c.id)
    .bind(&c.name)
    .bind(&c.email)
    .bind(&c.password_hash)
    .bind(c.kind.as_str())
    .bind(c.role.as_str())
    .bind(c.status.as_str())
    .bind(c.kyc_status.as_str())
    .bind(c.usde_balance)
    .bind(c.balance)
    .bind(c.parent_company_id)
    .bind(c.is_parent_company)
    .bind(c.enterprise_id)
    .bind(&c.company_code)
    .bind(&c.company_address)
    .bind(c.created_at)
    .bind(c.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| duplicate_on_conflict(e, "company", &c.email))?;
    Ok(())
}

pub async fn by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Company>, StoreError> {
    let sql = format!("SELECT {COLUMNS} FROM companies WHERE id = $1");
    sqlx::query_as::<_, CompanyRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(CompanyRow::try_into_record)
        .transpose()
}

/// Fetch and row-lock a company for the rest of the transaction.
pub async fn by_id_for_update(
    conn: &mut PgConnection,
    id: Uuid,
) -> Result<Option<Company>, StoreError> {
    let sql = format!("SELECT {COLUMNS} FROM companies WHERE id = $1 FOR UPDATE");
    sqlx::query_as::<_, CompanyRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(CompanyRow::try_into_record)
        .transpose()
}

/// Row-lock several companies in id order.
pub async fn lock_many(
    conn: &mut PgConnection,
    ids: &[Uuid],
) -> Result<Vec<Company>, StoreError> {
    let sql = format!("SELECT {COLUMNS} FROM companies WHERE id = ANY($1) ORDER BY id FOR UPDATE");
    sqlx::query_as::<_, CompanyRow>(&sql)
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(CompanyRow::try_into_record)
        .collect()
}

pub async fn by_email(conn: &mut PgConnection, email: &str) -> Result<Option<Company>, StoreError> {
    let sql = format!("SELECT {COLUMNS} FROM companies WHERE email = $1");
    sqlx::query_as::<_, CompanyRow>(&sql)
        .bind(email)
        .fetch_optional(&mut *conn)
        .await?
        .map(CompanyRow::try_into_record)
        .transpose()
}

/// Apply a partial update. Returns `None` when the company is absent.
pub async fn update(
    conn: &mut PgConnection,
    id: Uuid,
    patch: &CompanyPatch,
    now: DateTime<Utc>,
) -> Result<Option<Company>, StoreError> {
    let sql = format!(
        "UPDATE companies SET
           name = COALESCE($2, name),
           company_code = COALESCE($3, company_code),
           company_address = COALESCE($4, company_address),
           role = COALESCE($5, role),
           status = COALESCE($6, status),
           updated_at = $7
         WHERE id = $1
         RETURNING {COLUMNS}"
    );
    sqlx::query_as::<_, CompanyRow>(&sql)
        .bind(id)
        .bind(&patch.name)
        .bind(&patch.company_code)
        .bind(&patch.company_address)
        .bind(patch.role.map(|r| r.as_str()))
        .bind(patch.status.map(|s| s.as_str()))
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?
        .map(CompanyRow::try_into_record)
        .transpose()
}

pub async fn set_usde_balance(
    conn: &mut PgConnection,
    id: Uuid,
    balance: Decimal,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query("UPDATE companies SET usde_balance = $2, updated_at = $3 WHERE id = $1")
        .bind(id)
        .bind(balance)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn set_kyc_status(
    conn: &mut PgConnection,
    id: Uuid,
    status: KycStatus,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query("UPDATE companies SET kyc_status = $2, updated_at = $3 WHERE id = $1")
        .bind(id)
        .bind(status.as_str())
        .bind(now)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn mark_parent(
    conn: &mut PgConnection,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query("UPDATE companies SET is_parent_company = TRUE, updated_at = $2 WHERE id = $1")
        .bind(id)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Companies, newest first, optionally filtered by KYC status. With
/// `exclude_unsubmitted`, companies that never applied are skipped.
pub async fn list(
    conn: &mut PgConnection,
    kyc_status: Option<KycStatus>,
    exclude_unsubmitted: bool,
    page: PageRequest,
) -> Result<(Vec<Company>, u64), StoreError> {
    let filter = "($1::TEXT IS NULL OR kyc_status = $1) \
                  AND (NOT $2 OR kyc_status <> 'not_submitted')";
    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM companies WHERE {filter}"))
        .bind(kyc_status.map(|s| s.as_str()))
        .bind(exclude_unsubmitted)
        .fetch_one(&mut *conn)
        .await?;

    let (limit, offset) = limit_offset(page);
    let sql = format!(
        "SELECT {COLUMNS} FROM companies WHERE {filter}
         ORDER BY created_at DESC LIMIT $3 OFFSET $4"
    );
    let rows = sqlx::query_as::<_, CompanyRow>(&sql)
        .bind(kyc_status.map(|s| s.as_str()))
        .bind(exclude_unsubmitted)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(CompanyRow::try_into_record)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((rows, unsigned("count", total)?))
}

pub async fn subsidiaries(
    conn: &mut PgConnection,
    parent_id: Uuid,
) -> Result<Vec<Company>, StoreError> {
    let sql = format!(
        "SELECT {COLUMNS} FROM companies WHERE parent_company_id = $1 ORDER BY created_at"
    );
    sqlx::query_as::<_, CompanyRow>(&sql)
        .bind(parent_id)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(CompanyRow::try_into_record)
        .collect()
}

pub async fn by_enterprise(
    conn: &mut PgConnection,
    enterprise_id: Uuid,
) -> Result<Vec<Company>, StoreError> {
    let sql = format!("SELECT {COLUMNS} FROM companies WHERE enterprise_id = $1 ORDER BY created_at");
    sqlx::query_as::<_, CompanyRow>(&sql)
        .bind(enterprise_id)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(CompanyRow::try_into_record)
        .collect()
}

/// `(total, active, pending_kyc, total_usde)` across all companies.
pub async fn totals(conn: &mut PgConnection) -> Result<(u64, u64, u64, Decimal), StoreError> {
    let (total, active, pending_kyc, usde): (i64, i64, i64, Option<Decimal>) = sqlx::query_as(
        "SELECT COUNT(*),
                COUNT(*) FILTER (WHERE status = 'active'),
                COUNT(*) FILTER (WHERE kyc_status = 'pending'),
                SUM(usde_balance)
         FROM companies",
    )
    .fetch_one(&mut *conn)
    .await?;
    Ok((
        unsigned("count", total)?,
        unsigned("count", active)?,
        unsigned("count", pending_kyc)?,
        usde.unwrap_or_default(),
    ))
}

/// Database row for companies.
#[derive(sqlx::FromRow)]
struct CompanyRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    kind: String,
    role: String,
    status: String,
    kyc_status: String,
    usde_balance: Decimal,
    balance: Decimal,
    parent_company_id: Option<Uuid>,
    is_parent_company: bool,
    enterprise_id: Option<Uuid>,
    company_code: Option<String>,
    company_address: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CompanyRow {
    fn try_into_record(self) -> Result<Company, StoreError> {
        Ok(Company {
            id: self.id,
            name: self.name,
            email: self.email,
            password_hash: self.password_hash,
            kind: decode("companies.kind", &self.kind)?,
            role: decode("companies.role", &self.role)?,
            status: decode("companies.status", &self.status)?,
            kyc_status: decode("companies.kyc_status", &self.kyc_status)?,
            usde_balance: self.usde_balance,
            balance: self.balance,
            parent_company_id: self.parent_company_id,
            is_parent_company: self.is_parent_company,
            enterprise_id: self.enterprise_id,
            company_code: self.company_code,
            company_address: self.company_address,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
