//! # Companies and Subsidiaries
//!
//! Routes:
//! - GET    /api/companies/current — caller's company
//! - PUT    /api/companies/profile — update name, code and address
//! - POST   /api/companies/subsidiaries — create a subsidiary under the caller
//! - GET    /api/companies/:id/subsidiaries — list a parent's subsidiaries
//! - GET    /api/companies/:id/consolidated-balance — parent plus subsidiaries

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use usde_core::{CompanyKind, KycStatus, Permission, Role};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{hash_password, require_permission, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, min_len, valid_email, Validate};
use crate::routes::auth::normalize_email;
use crate::state::{AppState, Company};
use crate::store::{CompanyPatch, NewCompany};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub company_code: Option<String>,
    pub company_address: Option<String>,
}

impl Validate for UpdateProfileRequest {
    fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name {
            min_len("name", name, 2)?;
        }
        if self.name.is_none() && self.company_code.is_none() && self.company_address.is_none() {
            return Err("at least one field must be provided".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubsidiaryRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub company_code: Option<String>,
    pub company_address: Option<String>,
}

impl Validate for CreateSubsidiaryRequest {
    fn validate(&self) -> Result<(), String> {
        min_len("name", &self.name, 2)?;
        valid_email(self.email.trim())?;
        if self.password.chars().count() < 6 {
            return Err("password must be at least 6 characters".into());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompanyResponse {
    pub company: Company,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubsidiariesResponse {
    pub subsidiaries: Vec<Company>,
    pub count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BalanceLine {
    pub usde_balance: Decimal,
    pub balance: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedBalance {
    pub parent_company_id: Uuid,
    pub parent_name: String,
    pub parent: BalanceLine,
    pub subsidiaries: BalanceLine,
    pub subsidiary_count: usize,
    pub consolidated: BalanceLine,
}

/// Build the companies router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/companies/current", get(current_company))
        .route("/api/companies/profile", put(update_profile))
        .route("/api/companies/subsidiaries", post(create_subsidiary))
        .route("/api/companies/:id/subsidiaries", get(list_subsidiaries))
        .route(
            "/api/companies/:id/consolidated-balance",
            get(consolidated_balance),
        )
}

/// The parent itself or a system admin.
fn require_parent_access(caller: &CallerIdentity, parent_id: Uuid) -> Result<(), AppError> {
    if caller.role == Role::SystemAdmin {
        return Ok(());
    }
    if caller.company_id != parent_id {
        return Err(AppError::Forbidden(
            "only the parent company may view its subsidiaries".into(),
        ));
    }
    require_permission(caller, Permission::ConsolidatedReporting)
}

async fn load_company(state: &AppState, id: Uuid) -> Result<Company, AppError> {
    state
        .store
        .company(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("company {id} not found")))
}

/// GET /api/companies/current — The caller's company.
#[utoipa::path(
    get,
    path = "/api/companies/current",
    responses(
        (status = 200, description = "Caller company", body = CompanyResponse),
    ),
    tag = "companies"
)]
async fn current_company(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<CompanyResponse>, AppError> {
    let company = load_company(&state, caller.company_id).await?;
    Ok(Json(CompanyResponse { company }))
}

/// PUT /api/companies/profile — Update name, code or address.
#[utoipa::path(
    put,
    path = "/api/companies/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = CompanyResponse),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "companies"
)]
async fn update_profile(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<CompanyResponse>, AppError> {
    let req = extract_validated_json(body)?;
    let patch = CompanyPatch {
        name: req.name.map(|n| n.trim().to_string()),
        company_code: req.company_code,
        company_address: req.company_address,
        ..CompanyPatch::default()
    };
    let company = state.store.update_company(caller.company_id, patch).await?;
    Ok(Json(CompanyResponse { company }))
}

/// POST /api/companies/subsidiaries — Create a subsidiary under the caller.
#[utoipa::path(
    post,
    path = "/api/companies/subsidiaries",
    request_body = CreateSubsidiaryRequest,
    responses(
        (status = 201, description = "Subsidiary created", body = CompanyResponse),
        (status = 403, description = "Role too low", body = crate::error::ErrorBody),
        (status = 409, description = "E-mail already registered", body = crate::error::ErrorBody),
    ),
    tag = "companies"
)]
async fn create_subsidiary(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateSubsidiaryRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CompanyResponse>), AppError> {
    require_permission(&caller, Permission::ManageSubsidiaries)?;
    let req = extract_validated_json(body)?;
    let new = NewCompany {
        name: req.name.trim().to_string(),
        email: normalize_email(&req.email),
        password_hash: hash_password(&req.password)?,
        kind: CompanyKind::Subsidiary,
        role: Role::FinanceOperator,
        kyc_status: KycStatus::NotSubmitted,
        parent_company_id: Some(caller.company_id),
        enterprise_id: caller.enterprise_id,
        company_code: req.company_code,
        company_address: req.company_address,
    };
    let company = state.store.create_subsidiary(caller.company_id, new).await?;
    tracing::info!(parent_id = %caller.company_id, subsidiary_id = %company.id, "subsidiary created");
    Ok((StatusCode::CREATED, Json(CompanyResponse { company })))
}

/// GET /api/companies/:id/subsidiaries — Subsidiaries of a parent.
#[utoipa::path(
    get,
    path = "/api/companies/{id}/subsidiaries",
    params(("id" = Uuid, Path, description = "Parent company ID")),
    responses(
        (status = 200, description = "Subsidiaries", body = SubsidiariesResponse),
        (status = 403, description = "Not the parent", body = crate::error::ErrorBody),
    ),
    tag = "companies"
)]
async fn list_subsidiaries(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<SubsidiariesResponse>, AppError> {
    require_parent_access(&caller, id)?;
    let subsidiaries = state.store.subsidiaries(id).await?;
    Ok(Json(SubsidiariesResponse {
        count: subsidiaries.len(),
        subsidiaries,
    }))
}

/// GET /api/companies/:id/consolidated-balance — Parent and subsidiary
/// balances summed.
#[utoipa::path(
    get,
    path = "/api/companies/{id}/consolidated-balance",
    params(("id" = Uuid, Path, description = "Parent company ID")),
    responses(
        (status = 200, description = "Consolidated balance", body = ConsolidatedBalance),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "companies"
)]
async fn consolidated_balance(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<ConsolidatedBalance>, AppError> {
    require_parent_access(&caller, id)?;
    let parent = load_company(&state, id).await?;
    let subsidiaries = state.store.subsidiaries(id).await?;

    let subs = BalanceLine {
        usde_balance: subsidiaries.iter().map(|c| c.usde_balance).sum(),
        balance: subsidiaries.iter().map(|c| c.balance).sum(),
    };
    let consolidated = BalanceLine {
        usde_balance: parent.usde_balance + subs.usde_balance,
        balance: parent.balance + subs.balance,
    };
    Ok(Json(ConsolidatedBalance {
        parent_company_id: parent.id,
        parent_name: parent.name,
        parent: BalanceLine {
            usde_balance: parent.usde_balance,
            balance: parent.balance,
        },
        subsidiaries: subs,
        subsidiary_count: subsidiaries.len(),
        consolidated,
    }))
}
