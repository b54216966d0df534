//! KYC profile, beneficial owner and review persistence.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::state::{KycProfile, KycReview, Ubo};
use crate::store::StoreError;

/// Insert or replace a company's profile.
pub async fn upsert_profile(conn: &mut PgConnection, p: &KycProfile) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO kyc_profiles (company_id, english_name, registration_number, country,
         address, incorporation_date, company_type, is_pep, has_sanctions, compliance_agreed,
         submitted_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         ON CONFLICT (company_id) DO UPDATE SET
           english_name = EXCLUDED.english_name,
           registration_number = EXCLUDED.registration_number,
           country = EXCLUDED.country,
           address = EXCLUDED.address,
           incorporation_date = EXCLUDED.incorporation_date,
           company_type = EXCLUDED.company_type,
           is_pep = EXCLUDED.is_pep,
           has_sanctions = EXCLUDED.has_sanctions,
           compliance_agreed = EXCLUDED.compliance_agreed,
           submitted_at = EXCLUDED.submitted_at",
    )
    .bind(p.company_id)
    .bind(&p.english_name)
    .bind(&p.registration_number)
    .bind(&p.country)
    .bind(&p.address)
    .bind(&p.incorporation_date)
    .bind(&p.company_type)
    .bind(p.is_pep)
    .bind(p.has_sanctions)
    .bind(p.compliance_agreed)
    .bind(p.submitted_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn profile(
    conn: &mut PgConnection,
    company_id: Uuid,
) -> Result<Option<KycProfile>, StoreError> {
    let row = sqlx::query_as::<_, ProfileRow>(
        "SELECT company_id, english_name, registration_number, country, address,
         incorporation_date, company_type, is_pep, has_sanctions, compliance_agreed, submitted_at
         FROM kyc_profiles WHERE company_id = $1",
    )
    .bind(company_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(ProfileRow::into_record))
}

/// Replace every owner of a company.
pub async fn replace_ubos(
    conn: &mut PgConnection,
    company_id: Uuid,
    ubos: &[Ubo],
) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM ubos WHERE company_id = $1")
        .bind(company_id)
        .execute(&mut *conn)
        .await?;
    for u in ubos {
        sqlx::query(
            "INSERT INTO ubos (id, company_id, name, id_number, nationality, address,
             ownership_percentage)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(u.id)
        .bind(company_id)
        .bind(&u.name)
        .bind(&u.id_number)
        .bind(&u.nationality)
        .bind(&u.address)
        .bind(u.ownership_percentage)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn ubos(conn: &mut PgConnection, company_id: Uuid) -> Result<Vec<Ubo>, StoreError> {
    let rows = sqlx::query_as::<_, UboRow>(
        "SELECT id, company_id, name, id_number, nationality, address, ownership_percentage
         FROM ubos WHERE company_id = $1 ORDER BY name",
    )
    .bind(company_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(UboRow::into_record).collect())
}

pub async fn append_review(conn: &mut PgConnection, r: &KycReview) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO kyc_reviews (id, company_id, reviewer_id, decision, notes, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(r.id)
    .bind(r.company_id)
    .bind(r.reviewer_id)
    .bind(&r.decision)
    .bind(&r.notes)
    .bind(r.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Review history, newest first.
pub async fn reviews(
    conn: &mut PgConnection,
    company_id: Uuid,
) -> Result<Vec<KycReview>, StoreError> {
    let rows = sqlx::query_as::<_, ReviewRow>(
        "SELECT id, company_id, reviewer_id, decision, notes, created_at
         FROM kyc_reviews WHERE company_id = $1 ORDER BY seq DESC",
    )
    .bind(company_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(ReviewRow::into_record).collect())
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    company_id: Uuid,
    english_name: String,
    registration_number: String,
    country: String,
    address: String,
    incorporation_date: String,
    company_type: String,
    is_pep: bool,
    has_sanctions: bool,
    compliance_agreed: bool,
    submitted_at: DateTime<Utc>,
}

impl ProfileRow {
    fn into_record(self) -> KycProfile {
        KycProfile {
            company_id: self.company_id,
            english_name: self.english_name,
            registration_number: self.registration_number,
            country: self.country,
            address: self.address,
            incorporation_date: self.incorporation_date,
            company_type: self.company_type,
            is_pep: self.is_pep,
            has_sanctions: self.has_sanctions,
            compliance_agreed: self.compliance_agreed,
            submitted_at: self.submitted_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UboRow {
    id: Uuid,
    company_id: Uuid,
    name: String,
    id_number: String,
    nationality: String,
    address: String,
    ownership_percentage: Decimal,
}

impl UboRow {
    fn into_record(self) -> Ubo {
        Ubo {
            id: self.id,
            company_id: self.company_id,
            name: self.name,
            id_number: self.id_number,
            nationality: self.nationality,
            address: self.address,
            ownership_percentage: self.ownership_percentage,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReviewRow {
    id: Uuid,
    company_id: Uuid,
    reviewer_id: Option<Uuid>,
    decision: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl ReviewRow {
    fn into_record(self) -> KycReview {
        KycReview {
            id: self.id,
            company_id: self.company_id,
            reviewer_id: self.reviewer_id,
            decision: self.decision,
            notes: self.notes,
            created_at: self.created_at,
        }
    }
}
