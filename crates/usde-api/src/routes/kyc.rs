//! # KYC API
//!
//! Routes:
//! - POST   /api/kyc/submit — submit or resubmit an application
//! - GET    /api/kyc/status — status, profile, owners and latest review
//! - GET    /api/admin/kyc/applications — reviewer queue (system admin)
//! - PUT    /api/admin/kyc/:company_id/review — record a decision (system admin)

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use usde_core::kyc::validate_ownership;
use usde_core::{KycDecision, KycStatus, PageRequest, Pagination, Permission};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{require_permission, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, min_len, PageQuery, Validate};
use crate::routes::record_audit;
use crate::state::{AppState, Company, KycProfile, KycReview, Ubo};
use crate::store::{KycSubmission, NewUbo};

// ── DTOs ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UboInput {
    pub name: String,
    pub id_number: String,
    pub nationality: String,
    pub address: String,
    pub ownership_percentage: Decimal,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitKycRequest {
    pub english_name: String,
    pub registration_number: String,
    pub country: String,
    pub address: String,
    /// `YYYY-MM-DD` or RFC 3339.
    pub incorporation_date: String,
    pub company_type: String,
    pub is_pep: bool,
    pub has_sanctions: bool,
    pub compliance_agreed: bool,
    pub ubos: Vec<UboInput>,
}

fn valid_date(value: &str) -> bool {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
        || DateTime::parse_from_rfc3339(value).is_ok()
}

impl Validate for SubmitKycRequest {
    fn validate(&self) -> Result<(), String> {
        min_len("englishName", &self.english_name, 2)?;
        min_len("registrationNumber", &self.registration_number, 1)?;
        min_len("country", &self.country, 2)?;
        min_len("address", &self.address, 10)?;
        min_len("companyType", &self.company_type, 2)?;
        if !valid_date(self.incorporation_date.trim()) {
            return Err("incorporationDate must be a valid date".into());
        }
        if !self.compliance_agreed {
            return Err("compliance agreement is required".into());
        }
        for (i, ubo) in self.ubos.iter().enumerate() {
            min_len(&format!("ubos[{i}].name"), &ubo.name, 2)?;
            min_len(&format!("ubos[{i}].idNumber"), &ubo.id_number, 5)?;
            min_len(&format!("ubos[{i}].nationality"), &ubo.nationality, 2)?;
            min_len(&format!("ubos[{i}].address"), &ubo.address, 10)?;
        }
        let shares: Vec<Decimal> = self.ubos.iter().map(|u| u.ownership_percentage).collect();
        validate_ownership(&shares).map_err(|e| e.to_string())
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KycSubmittedResponse {
    pub message: String,
    #[schema(value_type = String)]
    pub status: KycStatus,
    pub ubos_count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KycStatusResponse {
    #[schema(value_type = String)]
    pub status: KycStatus,
    pub profile: Option<KycProfile>,
    pub ubos: Vec<Ubo>,
    pub latest_review: Option<KycReview>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ApplicationsQuery {
    /// KYC status filter; `all` or absent lists every submitted application.
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KycApplicationsResponse {
    pub companies: Vec<Company>,
    #[schema(value_type = Object)]
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewKycRequest {
    /// `approved`, `rejected` or `request_info`.
    #[schema(value_type = String)]
    pub decision: KycDecision,
    pub notes: Option<String>,
}

impl Validate for ReviewKycRequest {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KycReviewedResponse {
    pub message: String,
    pub company: Company,
}

// ── Router ──────────────────────────────────────────────────────────────────

/// Build the KYC router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/kyc/submit", post(submit))
        .route("/api/kyc/status", get(status))
        .route("/api/admin/kyc/applications", get(applications))
        .route("/api/admin/kyc/:company_id/review", put(review))
}

/// POST /api/kyc/submit — Submit the KYC application.
#[utoipa::path(
    post,
    path = "/api/kyc/submit",
    request_body = SubmitKycRequest,
    responses(
        (status = 201, description = "Application submitted", body = KycSubmittedResponse),
        (status = 409, description = "Already approved", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "kyc"
)]
async fn submit(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<SubmitKycRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<KycSubmittedResponse>), AppError> {
    let req = extract_validated_json(body)?;
    let now = Utc::now();
    let ubos_count = req.ubos.len();
    let submission = KycSubmission {
        profile: KycProfile {
            company_id: caller.company_id,
            english_name: req.english_name.trim().to_string(),
            registration_number: req.registration_number.trim().to_string(),
            country: req.country.trim().to_string(),
            address: req.address.trim().to_string(),
            incorporation_date: req.incorporation_date.trim().to_string(),
            company_type: req.company_type.trim().to_string(),
            is_pep: req.is_pep,
            has_sanctions: req.has_sanctions,
            compliance_agreed: req.compliance_agreed,
            submitted_at: now,
        },
        ubos: req
            .ubos
            .into_iter()
            .map(|u| NewUbo {
                name: u.name.trim().to_string(),
                id_number: u.id_number.trim().to_string(),
                nationality: u.nationality.trim().to_string(),
                address: u.address.trim().to_string(),
                ownership_percentage: u.ownership_percentage,
            })
            .collect(),
    };

    let company = state.store.submit_kyc(submission, now).await?;
    tracing::info!(company_id = %company.id, ubos = ubos_count, "KYC application submitted");
    Ok((
        StatusCode::CREATED,
        Json(KycSubmittedResponse {
            message: "KYC application submitted successfully".into(),
            status: company.kyc_status,
            ubos_count,
        }),
    ))
}

/// GET /api/kyc/status — The caller's application.
#[utoipa::path(
    get,
    path = "/api/kyc/status",
    responses(
        (status = 200, description = "KYC status", body = KycStatusResponse),
    ),
    tag = "kyc"
)]
async fn status(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<KycStatusResponse>, AppError> {
    let application = state.store.kyc_application(caller.company_id).await?;
    Ok(Json(KycStatusResponse {
        status: application.kyc_status,
        profile: application.profile,
        ubos: application.ubos,
        latest_review: application.reviews.into_iter().next(),
    }))
}

/// GET /api/admin/kyc/applications — Applications, newest first.
#[utoipa::path(
    get,
    path = "/api/admin/kyc/applications",
    params(ApplicationsQuery),
    responses(
        (status = 200, description = "Applications", body = KycApplicationsResponse),
        (status = 403, description = "Not a reviewer", body = crate::error::ErrorBody),
    ),
    tag = "kyc"
)]
async fn applications(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<ApplicationsQuery>,
) -> Result<Json<KycApplicationsResponse>, AppError> {
    require_permission(&caller, Permission::ReviewKyc)?;
    let status = match query.status.as_deref() {
        None | Some("all") => None,
        Some(s) => Some(s.parse::<KycStatus>()?),
    };
    let page: PageRequest = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .into();
    let rows = state.store.kyc_applications(status, page).await?;
    Ok(Json(KycApplicationsResponse {
        companies: rows.items,
        pagination: page.paginate(rows.total),
    }))
}

/// PUT /api/admin/kyc/:company_id/review — Decide a pending application.
#[utoipa::path(
    put,
    path = "/api/admin/kyc/{company_id}/review",
    params(("company_id" = Uuid, Path, description = "Company under review")),
    request_body = ReviewKycRequest,
    responses(
        (status = 200, description = "Decision recorded", body = KycReviewedResponse),
        (status = 403, description = "Not a reviewer", body = crate::error::ErrorBody),
        (status = 409, description = "Application not pending", body = crate::error::ErrorBody),
    ),
    tag = "kyc"
)]
async fn review(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(company_id): Path<Uuid>,
    body: Result<Json<ReviewKycRequest>, JsonRejection>,
) -> Result<Json<KycReviewedResponse>, AppError> {
    require_permission(&caller, Permission::ReviewKyc)?;
    let req = extract_validated_json(body)?;
    let company = state
        .store
        .review_kyc(
            company_id,
            caller.company_id,
            req.decision,
            req.notes.clone(),
            Utc::now(),
        )
        .await?;
    record_audit(
        &state,
        &caller,
        "kyc.review",
        company_id,
        serde_json::json!({ "decision": req.decision.as_str(), "notes": req.notes }),
    )
    .await?;

    Ok(Json(KycReviewedResponse {
        message: format!("KYC application {}", req.decision),
        company,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SubmitKycRequest {
        SubmitKycRequest {
            english_name: "Acme Trading Ltd".into(),
            registration_number: "REG-2291".into(),
            country: "SG".into(),
            address: "1 Harbourfront Ave, Singapore".into(),
            incorporation_date: "2019-04-01".into(),
            company_type: "Private Limited".into(),
            is_pep: false,
            has_sanctions: false,
            compliance_agreed: true,
            ubos: vec![UboInput {
                name: "Jane Tan".into(),
                id_number: "S1234567A".into(),
                nationality: "SG".into(),
                address: "22 Orchard Road, Singapore".into(),
                ownership_percentage: Decimal::from(60),
            }],
        }
    }

    #[test]
    fn complete_application_validates() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn compliance_must_be_agreed() {
        let mut req = request();
        req.compliance_agreed = false;
        assert!(req.validate().is_err());
    }

    #[test]
    fn ownership_over_100_rejected() {
        let mut req = request();
        req.ubos.push(UboInput {
            ownership_percentage: Decimal::from(50),
            ..req.ubos[0].clone()
        });
        assert!(req.validate().unwrap_err().contains("cannot exceed 100"));
    }

    #[test]
    fn owners_required_and_dates_checked() {
        let mut req = request();
        req.ubos.clear();
        assert!(req.validate().is_err());
        let mut req = request();
        req.incorporation_date = "yesterday".into();
        assert!(req.validate().is_err());
    }
}
