//! Audit log persistence — immutable hash chain.
//!
//! [`append`] takes a table lock so two writers cannot chain onto the same
//! head. Details are stored as the exact JSON text that was hashed.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use usde_core::audit::GENESIS_HASH;
use usde_core::PageRequest;
use uuid::Uuid;

use super::{limit_offset, unsigned};
use crate::state::AuditLog;
use crate::store::{NewAuditEntry, StoreError};

const COLUMNS: &str =
    "id, actor_id, action, target_id, details, previous_hash, entry_hash, created_at";

/// Append an entry chained to the current head. Must run inside a
/// transaction.
pub async fn append(
    conn: &mut PgConnection,
    entry: NewAuditEntry,
    now: DateTime<Utc>,
) -> Result<AuditLog, StoreError> {
    sqlx::query("LOCK TABLE audit_logs IN SHARE ROW EXCLUSIVE MODE")
        .execute(&mut *conn)
        .await?;

    let previous_hash: Option<String> =
        sqlx::query_scalar("SELECT entry_hash FROM audit_logs ORDER BY seq DESC LIMIT 1")
            .fetch_optional(&mut *conn)
            .await?;
    let previous_hash = previous_hash.unwrap_or_else(|| GENESIS_HASH.to_string());

    let entry_hash = AuditLog::chain_hash(
        &previous_hash,
        &entry.action,
        entry.actor_id,
        entry.target_id,
        &entry.details,
    );
    let log = AuditLog {
        id: Uuid::new_v4(),
        actor_id: entry.actor_id,
        action: entry.action,
        target_id: entry.target_id,
        details: entry.details,
        previous_hash,
        entry_hash,
        created_at: now,
    };

    sqlx::query(
        "INSERT INTO audit_logs (id, actor_id, action, target_id, details, previous_hash,
         entry_hash, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(log.id)
    .bind(log.actor_id)
    .bind(&log.action)
    .bind(log.target_id)
    .bind(log.details.to_string())
    .bind(&log.previous_hash)
    .bind(&log.entry_hash)
    .bind(log.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(log)
}

/// Entries newest first.
pub async fn page(
    conn: &mut PgConnection,
    page: PageRequest,
) -> Result<(Vec<AuditLog>, u64), StoreError> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs")
        .fetch_one(&mut *conn)
        .await?;
    let (limit, offset) = limit_offset(page);
    let sql = format!("SELECT {COLUMNS} FROM audit_logs ORDER BY seq DESC LIMIT $1 OFFSET $2");
    let rows = sqlx::query_as::<_, AuditRow>(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(AuditRow::try_into_record)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((rows, unsigned("count", total)?))
}

/// The whole chain in append order.
pub async fn chain(conn: &mut PgConnection) -> Result<Vec<AuditLog>, StoreError> {
    let sql = format!("SELECT {COLUMNS} FROM audit_logs ORDER BY seq ASC");
    sqlx::query_as::<_, AuditRow>(&sql)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(AuditRow::try_into_record)
        .collect()
}

/// Database row for audit entries.
#[derive(sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    actor_id: Uuid,
    action: String,
    target_id: Uuid,
    details: String,
    previous_hash: String,
    entry_hash: String,
    created_at: DateTime<Utc>,
}

impl AuditRow {
    fn try_into_record(self) -> Result<AuditLog, StoreError> {
        let details = serde_json::from_str(&self.details)
            .map_err(|e| StoreError::Corrupt(format!("audit_logs.details: {e}")))?;
        Ok(AuditLog {
            id: self.id,
            actor_id: self.actor_id,
            action: self.action,
            target_id: self.target_id,
            details,
            previous_hash: self.previous_hash,
            entry_hash: self.entry_hash,
            created_at: self.created_at,
        })
    }
}
