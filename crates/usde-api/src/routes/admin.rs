//! # Platform Administration
//!
//! Routes (system admin only):
//! - GET    /api/admin/companies — every company, newest first
//! - PUT    /api/admin/companies/:id/status — suspend or reactivate
//! - GET    /api/admin/withdrawals/pending — pending and processing withdrawals
//! - GET    /api/admin/stats — platform counters and request metrics
//! - GET    /api/admin/audit-logs — audit log, newest first
//! - GET    /api/admin/audit-logs/verify — hash-chain continuity check
//! - POST   /api/admin/locks/release-expired — run the lock release sweep now
//! - POST   /api/admin/sweep — run every background sweep step now
//!
//! KYC review lives in [`kyc`](super::kyc) under `/api/admin/kyc`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use usde_core::audit::verify_chain;
use usde_core::{CompanyStatus, PageRequest, Pagination, Permission};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{require_permission, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, PageQuery, Validate};
use crate::middleware::metrics::MetricsSnapshot;
use crate::routes::record_audit;
use crate::services::sweeper::{release_expired, run_sweep, SweepReport};
use crate::state::{AppState, AuditLog, Company, Withdrawal};
use crate::store::{CompanyPatch, PlatformStats};

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompanyList {
    pub companies: Vec<Company>,
    #[schema(value_type = Object)]
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    /// `active` or `suspended`.
    #[schema(value_type = String)]
    pub status: CompanyStatus,
    pub reason: Option<String>,
}

impl Validate for UpdateStatusRequest {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompanyStatusResponse {
    pub message: String,
    pub company: Company,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PendingWithdrawals {
    pub withdrawals: Vec<Withdrawal>,
    pub count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub platform: PlatformStats,
    pub requests: MetricsSnapshot,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogPage {
    pub logs: Vec<AuditLog>,
    #[schema(value_type = Object)]
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    pub valid: bool,
    pub entries: usize,
    /// Position of the first entry that does not link to its predecessor.
    pub broken_at: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocksReleased {
    pub message: String,
    pub released: u64,
}

/// Build the admin router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/companies", get(list_companies))
        .route("/api/admin/companies/:id/status", put(update_status))
        .route("/api/admin/withdrawals/pending", get(pending_withdrawals))
        .route("/api/admin/stats", get(platform_stats))
        .route("/api/admin/audit-logs", get(audit_logs))
        .route("/api/admin/audit-logs/verify", get(verify_audit_chain))
        .route("/api/admin/locks/release-expired", post(release_locks))
        .route("/api/admin/sweep", post(sweep))
}

/// GET /api/admin/companies
#[utoipa::path(
    get,
    path = "/api/admin/companies",
    params(PageQuery),
    responses(
        (status = 200, description = "Company page", body = CompanyList),
        (status = 403, description = "Not a system admin", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn list_companies(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<PageQuery>,
) -> Result<Json<CompanyList>, AppError> {
    require_permission(&caller, Permission::ManageAllCompanies)?;
    let page: PageRequest = query.into();
    let rows = state.store.companies(page).await?;
    Ok(Json(CompanyList {
        companies: rows.items,
        pagination: page.paginate(rows.total),
    }))
}

/// PUT /api/admin/companies/:id/status — Suspend or reactivate a company.
/// A suspended company fails authentication on its next request.
#[utoipa::path(
    put,
    path = "/api/admin/companies/{id}/status",
    params(("id" = Uuid, Path, description = "Company ID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = CompanyStatusResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Cannot change own status", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
async fn update_status(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<CompanyStatusResponse>, AppError> {
    require_permission(&caller, Permission::ManageAllCompanies)?;
    let req = extract_validated_json(body)?;
    if id == caller.company_id {
        return Err(AppError::Conflict(
            "administrators cannot change their own status".into(),
        ));
    }
    let company = state
        .store
        .update_company(
            id,
            CompanyPatch {
                status: Some(req.status),
                ..CompanyPatch::default()
            },
        )
        .await?;
    record_audit(
        &state,
        &caller,
        "company.status",
        id,
        serde_json::json!({ "status": req.status.as_str(), "reason": req.reason }),
    )
    .await?;
    Ok(Json(CompanyStatusResponse {
        message: format!("Company status set to {}", req.status),
        company,
    }))
}

/// GET /api/admin/withdrawals/pending — Oldest first.
#[utoipa::path(
    get,
    path = "/api/admin/withdrawals/pending",
    responses(
        (status = 200, description = "Active withdrawals", body = PendingWithdrawals),
    ),
    tag = "admin"
)]
async fn pending_withdrawals(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<PendingWithdrawals>, AppError> {
    require_permission(&caller, Permission::ManageAllCompanies)?;
    let withdrawals = state.store.active_withdrawals().await?;
    Ok(Json(PendingWithdrawals {
        count: withdrawals.len(),
        withdrawals,
    }))
}

/// GET /api/admin/stats
#[utoipa::path(
    get,
    path = "/api/admin/stats",
    responses(
        (status = 200, description = "Platform statistics", body = AdminStats),
    ),
    tag = "admin"
)]
async fn platform_stats(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<AdminStats>, AppError> {
    require_permission(&caller, Permission::ManageAllCompanies)?;
    Ok(Json(AdminStats {
        platform: state.store.platform_stats().await?,
        requests: state.metrics.snapshot(),
    }))
}

/// GET /api/admin/audit-logs
#[utoipa::path(
    get,
    path = "/api/admin/audit-logs",
    params(PageQuery),
    responses(
        (status = 200, description = "Audit log page", body = AuditLogPage),
    ),
    tag = "admin"
)]
async fn audit_logs(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<PageQuery>,
) -> Result<Json<AuditLogPage>, AppError> {
    require_permission(&caller, Permission::AuditLogs)?;
    let page: PageRequest = query.into();
    let rows = state.store.audit_logs(page).await?;
    Ok(Json(AuditLogPage {
        logs: rows.items,
        pagination: page.paginate(rows.total),
    }))
}

/// GET /api/admin/audit-logs/verify — Recompute every hash in the chain.
#[utoipa::path(
    get,
    path = "/api/admin/audit-logs/verify",
    responses(
        (status = 200, description = "Verification result", body = ChainVerification),
    ),
    tag = "admin"
)]
async fn verify_audit_chain(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<ChainVerification>, AppError> {
    require_permission(&caller, Permission::AuditLogs)?;
    let chain = state.store.audit_chain().await?;
    let broken_at = verify_chain(&chain);
    if let Some(index) = broken_at {
        tracing::error!(index, entries = chain.len(), "audit chain broken");
    }
    Ok(Json(ChainVerification {
        valid: broken_at.is_none(),
        entries: chain.len(),
        broken_at,
    }))
}

/// POST /api/admin/locks/release-expired
#[utoipa::path(
    post,
    path = "/api/admin/locks/release-expired",
    responses(
        (status = 200, description = "Sweep finished", body = LocksReleased),
    ),
    tag = "admin"
)]
async fn release_locks(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<LocksReleased>, AppError> {
    require_permission(&caller, Permission::ManageAllCompanies)?;
    let released = release_expired(state.store.as_ref()).await?;
    Ok(Json(LocksReleased {
        message: format!("{released} expired locks released"),
        released,
    }))
}

/// POST /api/admin/sweep
#[utoipa::path(
    post,
    path = "/api/admin/sweep",
    responses(
        (status = 200, description = "Counts of what the sweep changed", body = SweepReport),
    ),
    tag = "admin"
)]
async fn sweep(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<SweepReport>, AppError> {
    require_permission(&caller, Permission::ManageAllCompanies)?;
    let report = run_sweep(state.store.as_ref(), chrono::Utc::now()).await?;
    Ok(Json(report))
}
