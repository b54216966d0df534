//! Enterprise persistence operations. Treasury settings are one JSONB
//! column.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgConnection;
use usde_core::TreasurySettings;
use uuid::Uuid;

use crate::state::Enterprise;
use crate::store::StoreError;

pub async fn insert(conn: &mut PgConnection, e: &Enterprise) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO enterprises (id, name, admin_id, settings, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(e.id)
    .bind(&e.name)
    .bind(e.admin_id)
    .bind(Json(&e.settings))
    .bind(e.created_at)
    .bind(e.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Enterprise>, StoreError> {
    let row = sqlx::query_as::<_, EnterpriseRow>(
        "SELECT id, name, admin_id, settings, created_at, updated_at
         FROM enterprises WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(EnterpriseRow::into_record))
}

pub async fn update_settings(
    conn: &mut PgConnection,
    id: Uuid,
    settings: &TreasurySettings,
    now: DateTime<Utc>,
) -> Result<Option<Enterprise>, StoreError> {
    let row = sqlx::query_as::<_, EnterpriseRow>(
        "UPDATE enterprises SET settings = $2, updated_at = $3 WHERE id = $1
         RETURNING id, name, admin_id, settings, created_at, updated_at",
    )
    .bind(id)
    .bind(Json(settings))
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(EnterpriseRow::into_record))
}

#[derive(sqlx::FromRow)]
struct EnterpriseRow {
    id: Uuid,
    name: String,
    admin_id: Uuid,
    settings: Json<TreasurySettings>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl EnterpriseRow {
    fn into_record(self) -> Enterprise {
        Enterprise {
            id: self.id,
            name: self.name,
            admin_id: self.admin_id,
            settings: self.settings.0,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
