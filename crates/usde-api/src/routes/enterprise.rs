//! # Enterprise Users, Treasury Settings and Reports
//!
//! Routes (scoped to the caller's enterprise):
//! - GET    /api/enterprise/users — every company attached to the enterprise
//! - POST   /api/enterprise/users — create a finance manager or operator
//! - PUT    /api/enterprise/users/:id — rename, change role, (de)activate
//! - DELETE /api/enterprise/users/:id — deactivate a user
//! - GET    /api/enterprise/settings — treasury settings
//! - PUT    /api/enterprise/settings — replace treasury settings
//! - GET    /api/enterprise/dashboard — spend against the monthly and
//!   quarterly budgets (finance manager and up)
//! - GET    /api/enterprise/reports/monthly — one calendar month of
//!   payments, withdrawals and deposits (finance manager and up)
//!
//! Every user mutation is appended to the audit log. Spend is payments sent
//! by the enterprise's companies plus their withdrawals that did not fail.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use usde_core::treasury::{month_bounds, month_start, period_label, quarter_start};
use usde_core::{
    BudgetUsage, CompanyKind, CompanyStatus, KycStatus, PageRequest, Permission, Role,
    TreasurySettings, WithdrawalStatus,
};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{hash_password, require_permission, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, min_len, valid_email, Validate};
use crate::routes::auth::normalize_email;
use crate::routes::record_audit;
use crate::state::{AppState, Company, Deposit, Enterprise, LedgerEntry, Payment, Withdrawal};
use crate::store::{CompanyPatch, EnterpriseActivity, NewCompany};

/// Ledger entries shown on the dashboard.
const RECENT_TRANSACTIONS: u32 = 10;

fn assignable(role: Role) -> Result<(), String> {
    if role.is_enterprise_assignable() {
        Ok(())
    } else {
        Err(format!(
            "role must be {} or {}",
            Role::FinanceManager,
            Role::FinanceOperator
        ))
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(alias = "enterpriseRole")]
    #[schema(value_type = String)]
    pub role: Role,
}

impl Validate for CreateUserRequest {
    fn validate(&self) -> Result<(), String> {
        min_len("name", &self.name, 2)?;
        valid_email(self.email.trim())?;
        if self.password.chars().count() < 6 {
            return Err("password must be at least 6 characters".into());
        }
        assignable(self.role)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    #[serde(alias = "enterpriseRole")]
    #[schema(value_type = Option<String>)]
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

impl Validate for UpdateUserRequest {
    fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name {
            min_len("name", name, 2)?;
        }
        if let Some(role) = self.role {
            assignable(role)?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnterpriseUsersResponse {
    pub users: Vec<Company>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnterpriseUserResponse {
    pub message: String,
    pub user: Company,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SettingsResponse {
    pub enterprise_id: Uuid,
    pub enterprise_name: String,
    #[schema(value_type = Object)]
    pub settings: TreasurySettings,
}

impl From<Enterprise> for SettingsResponse {
    fn from(e: Enterprise) -> Self {
        Self {
            enterprise_id: e.id,
            enterprise_name: e.name,
            settings: e.settings,
        }
    }
}

/// Payments and withdrawals counted against the budgets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Spend {
    pub payments: Decimal,
    pub withdrawals: Decimal,
}

impl Spend {
    /// Spend in `activity` at or after `since`.
    fn of(activity: &EnterpriseActivity, since: DateTime<Utc>) -> Self {
        Self {
            payments: activity
                .payments
                .iter()
                .filter(|p| p.timestamp >= since)
                .map(|p| p.amount)
                .sum(),
            withdrawals: activity
                .withdrawals
                .iter()
                .filter(|w| w.timestamp >= since && w.status != WithdrawalStatus::Failed)
                .map(|w| w.amount)
                .sum(),
        }
    }

    fn total(&self) -> Decimal {
        self.payments + self.withdrawals
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnterpriseDashboard {
    pub enterprise_id: Uuid,
    pub enterprise_name: String,
    /// Companies attached to the enterprise.
    pub member_count: usize,
    /// USDE held across those companies.
    pub total_usde: Decimal,
    pub month_to_date: Spend,
    pub quarter_to_date: Spend,
    #[schema(value_type = Object)]
    pub monthly_budget: BudgetUsage,
    #[schema(value_type = Object)]
    pub quarterly_budget: BudgetUsage,
    #[schema(value_type = Object)]
    pub settings: TreasurySettings,
    /// The enterprise admin's latest ledger entries.
    pub recent_transactions: Vec<LedgerEntry>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ReportQuery {
    /// Defaults to the current year.
    pub year: Option<i32>,
    /// 1 to 12; defaults to the current month.
    pub month: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportTransactions {
    pub payments: Vec<Payment>,
    pub withdrawals: Vec<Withdrawal>,
    pub deposits: Vec<Deposit>,
}

/// Every movement of one calendar month, whatever its status.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyReport {
    /// `YYYY-MM`.
    pub period: String,
    pub total_payments: Decimal,
    pub total_withdrawals: Decimal,
    /// Fiat amount deposited.
    pub total_deposits: Decimal,
    pub payment_count: usize,
    pub withdrawal_count: usize,
    pub deposit_count: usize,
    pub transactions: ReportTransactions,
}

impl MonthlyReport {
    fn new(period: String, activity: EnterpriseActivity) -> Self {
        Self {
            period,
            total_payments: activity.payments.iter().map(|p| p.amount).sum(),
            total_withdrawals: activity.withdrawals.iter().map(|w| w.amount).sum(),
            total_deposits: activity.deposits.iter().map(|d| d.amount).sum(),
            payment_count: activity.payments.len(),
            withdrawal_count: activity.withdrawals.len(),
            deposit_count: activity.deposits.len(),
            transactions: ReportTransactions {
                payments: activity.payments,
                withdrawals: activity.withdrawals,
                deposits: activity.deposits,
            },
        }
    }
}

/// Build the enterprise router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/enterprise/users", get(list_users).post(create_user))
        .route(
            "/api/enterprise/users/:id",
            axum::routing::put(update_user).delete(deactivate_user),
        )
        .route(
            "/api/enterprise/settings",
            get(get_settings).put(update_settings),
        )
        .route("/api/enterprise/dashboard", get(dashboard))
        .route("/api/enterprise/reports/monthly", get(monthly_report))
}

/// The caller's enterprise id, after the permission check.
fn enterprise_scope(caller: &CallerIdentity, permission: Permission) -> Result<Uuid, AppError> {
    require_permission(caller, permission)?;
    caller
        .enterprise_id
        .ok_or_else(|| AppError::NotFound("caller is not attached to an enterprise".into()))
}

/// A user of `enterprise_id`; companies of other enterprises are reported
/// as absent.
async fn enterprise_user(
    state: &AppState,
    enterprise_id: Uuid,
    user_id: Uuid,
) -> Result<Company, AppError> {
    state
        .store
        .company(user_id)
        .await?
        .filter(|c| c.enterprise_id == Some(enterprise_id))
        .ok_or_else(|| AppError::NotFound(format!("enterprise user {user_id} not found")))
}

/// GET /api/enterprise/users
#[utoipa::path(
    get,
    path = "/api/enterprise/users",
    responses(
        (status = 200, description = "Enterprise users", body = EnterpriseUsersResponse),
        (status = 403, description = "Not an enterprise admin", body = crate::error::ErrorBody),
    ),
    tag = "enterprise"
)]
async fn list_users(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<EnterpriseUsersResponse>, AppError> {
    let enterprise_id = enterprise_scope(&caller, Permission::ManageEnterpriseUsers)?;
    let users = state.store.enterprise_users(enterprise_id).await?;
    Ok(Json(EnterpriseUsersResponse { users }))
}

/// POST /api/enterprise/users — Add a finance user to the enterprise.
#[utoipa::path(
    post,
    path = "/api/enterprise/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = EnterpriseUserResponse),
        (status = 409, description = "E-mail already registered", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "enterprise"
)]
async fn create_user(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EnterpriseUserResponse>), AppError> {
    let enterprise_id = enterprise_scope(&caller, Permission::ManageEnterpriseUsers)?;
    let req = extract_validated_json(body)?;
    let user = state
        .store
        .insert_company(NewCompany {
            name: req.name.trim().to_string(),
            email: normalize_email(&req.email),
            password_hash: hash_password(&req.password)?,
            kind: CompanyKind::Company,
            role: req.role,
            kyc_status: KycStatus::NotSubmitted,
            parent_company_id: None,
            enterprise_id: Some(enterprise_id),
            company_code: None,
            company_address: None,
        })
        .await?;
    record_audit(
        &state,
        &caller,
        "enterprise_user.create",
        user.id,
        serde_json::json!({
            "email": user.email,
            "role": user.role.as_str(),
            "enterpriseId": enterprise_id,
        }),
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(EnterpriseUserResponse {
            message: "Enterprise user created successfully".into(),
            user,
        }),
    ))
}

/// PUT /api/enterprise/users/:id
#[utoipa::path(
    put,
    path = "/api/enterprise/users/{id}",
    params(("id" = Uuid, Path, description = "User company ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = EnterpriseUserResponse),
        (status = 404, description = "Not in this enterprise", body = crate::error::ErrorBody),
    ),
    tag = "enterprise"
)]
async fn update_user(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<EnterpriseUserResponse>, AppError> {
    let enterprise_id = enterprise_scope(&caller, Permission::ManageEnterpriseUsers)?;
    let req = extract_validated_json(body)?;
    enterprise_user(&state, enterprise_id, id).await?;
    if id == caller.company_id && (req.role.is_some() || req.is_active == Some(false)) {
        return Err(AppError::Conflict(
            "an enterprise admin cannot change its own role or status".into(),
        ));
    }

    let patch = CompanyPatch {
        name: req.name.as_deref().map(|n| n.trim().to_string()),
        role: req.role,
        status: req.is_active.map(|active| {
            if active {
                CompanyStatus::Active
            } else {
                CompanyStatus::Suspended
            }
        }),
        ..CompanyPatch::default()
    };
    let user = state.store.update_company(id, patch).await?;
    record_audit(
        &state,
        &caller,
        "enterprise_user.update",
        id,
        serde_json::json!({
            "name": req.name,
            "role": req.role.map(|r| r.as_str()),
            "isActive": req.is_active,
            "enterpriseId": enterprise_id,
        }),
    )
    .await?;
    Ok(Json(EnterpriseUserResponse {
        message: "Enterprise user updated successfully".into(),
        user,
    }))
}

/// DELETE /api/enterprise/users/:id — Deactivate; the record and its ledger
/// are kept.
#[utoipa::path(
    delete,
    path = "/api/enterprise/users/{id}",
    params(("id" = Uuid, Path, description = "User company ID")),
    responses(
        (status = 200, description = "User deactivated", body = EnterpriseUserResponse),
        (status = 404, description = "Not in this enterprise", body = crate::error::ErrorBody),
        (status = 409, description = "Cannot remove yourself", body = crate::error::ErrorBody),
    ),
    tag = "enterprise"
)]
async fn deactivate_user(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<EnterpriseUserResponse>, AppError> {
    let enterprise_id = enterprise_scope(&caller, Permission::ManageEnterpriseUsers)?;
    if id == caller.company_id {
        return Err(AppError::Conflict(
            "an enterprise admin cannot remove itself".into(),
        ));
    }
    enterprise_user(&state, enterprise_id, id).await?;
    let user = state
        .store
        .update_company(
            id,
            CompanyPatch {
                status: Some(CompanyStatus::Suspended),
                ..CompanyPatch::default()
            },
        )
        .await?;
    record_audit(
        &state,
        &caller,
        "enterprise_user.deactivate",
        id,
        serde_json::json!({ "email": user.email, "enterpriseId": enterprise_id }),
    )
    .await?;
    Ok(Json(EnterpriseUserResponse {
        message: "Enterprise user deactivated successfully".into(),
        user,
    }))
}

/// GET /api/enterprise/settings
#[utoipa::path(
    get,
    path = "/api/enterprise/settings",
    responses(
        (status = 200, description = "Treasury settings", body = SettingsResponse),
    ),
    tag = "enterprise"
)]
async fn get_settings(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<SettingsResponse>, AppError> {
    let enterprise_id = enterprise_scope(&caller, Permission::ApprovalWorkflows)?;
    let enterprise = state
        .store
        .enterprise(enterprise_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("enterprise {enterprise_id} not found")))?;
    Ok(Json(enterprise.into()))
}

/// PUT /api/enterprise/settings — Replace the treasury settings.
#[utoipa::path(
    put,
    path = "/api/enterprise/settings",
    request_body(content = Object, description = "Complete treasury settings"),
    responses(
        (status = 200, description = "Settings updated", body = SettingsResponse),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "enterprise"
)]
async fn update_settings(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<TreasurySettings>, JsonRejection>,
) -> Result<Json<SettingsResponse>, AppError> {
    let enterprise_id = enterprise_scope(&caller, Permission::ApprovalWorkflows)?;
    let settings = extract_json(body)?;
    settings.validate()?;
    let enterprise = state
        .store
        .update_treasury_settings(enterprise_id, settings)
        .await?;
    tracing::info!(%enterprise_id, actor_id = %caller.company_id, "treasury settings updated");
    Ok(Json(enterprise.into()))
}

/// GET /api/enterprise/dashboard — Month- and quarter-to-date spend
/// against the treasury budgets.
#[utoipa::path(
    get,
    path = "/api/enterprise/dashboard",
    responses(
        (status = 200, description = "Treasury dashboard", body = EnterpriseDashboard),
        (status = 403, description = "Below finance manager", body = crate::error::ErrorBody),
    ),
    tag = "enterprise"
)]
async fn dashboard(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<EnterpriseDashboard>, AppError> {
    let enterprise_id = enterprise_scope(&caller, Permission::ConsolidatedReporting)?;
    let enterprise = state
        .store
        .enterprise(enterprise_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("enterprise {enterprise_id} not found")))?;
    let members = state.store.enterprise_users(enterprise_id).await?;

    let now = Utc::now();
    // The month never starts before its quarter.
    let activity = state
        .store
        .enterprise_activity(enterprise_id, quarter_start(now), now)
        .await?;
    let month_to_date = Spend::of(&activity, month_start(now));
    let quarter_to_date = Spend::of(&activity, quarter_start(now));
    let recent_transactions = state
        .store
        .transactions(enterprise.admin_id, PageRequest::new(Some(1), Some(RECENT_TRANSACTIONS)))
        .await?
        .items;

    Ok(Json(EnterpriseDashboard {
        enterprise_id,
        member_count: members.len(),
        total_usde: members.iter().map(|c| c.usde_balance).sum(),
        monthly_budget: BudgetUsage::compute(
            enterprise.settings.monthly_budget,
            month_to_date.total(),
        ),
        quarterly_budget: BudgetUsage::compute(
            enterprise.settings.quarterly_budget,
            quarter_to_date.total(),
        ),
        month_to_date,
        quarter_to_date,
        enterprise_name: enterprise.name,
        settings: enterprise.settings,
        recent_transactions,
    }))
}

/// GET /api/enterprise/reports/monthly
#[utoipa::path(
    get,
    path = "/api/enterprise/reports/monthly",
    params(ReportQuery),
    responses(
        (status = 200, description = "Monthly report", body = MonthlyReport),
        (status = 422, description = "Month or year out of range", body = crate::error::ErrorBody),
    ),
    tag = "enterprise"
)]
async fn monthly_report(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<ReportQuery>,
) -> Result<Json<MonthlyReport>, AppError> {
    let enterprise_id = enterprise_scope(&caller, Permission::ConsolidatedReporting)?;
    let now = Utc::now();
    let year = query.year.unwrap_or_else(|| now.year());
    let month = query.month.unwrap_or_else(|| now.month());
    let (start, end) = month_bounds(year, month)?;
    let activity = state
        .store
        .enterprise_activity(enterprise_id, start, end)
        .await?;
    Ok(Json(MonthlyReport::new(period_label(year, month), activity)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use usde_core::PaymentStatus;

    #[test]
    fn only_finance_roles_assignable() {
        let req: CreateUserRequest = serde_json::from_value(serde_json::json!({
            "name": "Ops Team",
            "email": "ops@acme.test",
            "password": "secret1",
            "enterpriseRole": "system_admin"
        }))
        .unwrap();
        assert!(req.validate().is_err());

        let req: CreateUserRequest = serde_json::from_value(serde_json::json!({
            "name": "Ops Team",
            "email": "ops@acme.test",
            "password": "secret1",
            "role": "enterprise_finance_manager"
        }))
        .unwrap();
        assert!(req.validate().is_ok());
    }

    fn payment(amount: i64, at: DateTime<Utc>) -> Payment {
        Payment {
            id: Uuid::new_v4(),
            from_id: Uuid::new_v4(),
            to_id: Uuid::new_v4(),
            amount: Decimal::from(amount),
            lock_days: 30,
            release_at: at + Duration::days(30),
            status: PaymentStatus::Pending,
            released_at: None,
            timestamp: at,
        }
    }

    fn withdrawal(amount: i64, status: WithdrawalStatus, at: DateTime<Utc>) -> Withdrawal {
        Withdrawal {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            bank_account_id: Uuid::new_v4(),
            amount: Decimal::from(amount),
            status,
            burn_tx_hash: None,
            payout_id: None,
            notes: None,
            timestamp: at,
            payout_started_at: None,
            processed_at: None,
        }
    }

    #[test]
    fn failed_withdrawals_are_not_spend() {
        let now = Utc::now();
        let activity = EnterpriseActivity {
            payments: vec![payment(300, now - Duration::days(40)), payment(200, now)],
            withdrawals: vec![
                withdrawal(1000, WithdrawalStatus::Success, now),
                withdrawal(5000, WithdrawalStatus::Failed, now),
                withdrawal(50, WithdrawalStatus::Processing, now),
            ],
            deposits: Vec::new(),
        };
        let recent = Spend::of(&activity, now - Duration::days(1));
        assert_eq!(recent.payments, Decimal::from(200));
        assert_eq!(recent.withdrawals, Decimal::from(1050));
        assert_eq!(recent.total(), Decimal::from(1250));
        let all = Spend::of(&activity, now - Duration::days(90));
        assert_eq!(all.payments, Decimal::from(500));
    }

    #[test]
    fn report_counts_every_status() {
        let now = Utc::now();
        let activity = EnterpriseActivity {
            payments: vec![payment(300, now)],
            withdrawals: vec![
                withdrawal(1000, WithdrawalStatus::Success, now),
                withdrawal(5000, WithdrawalStatus::Failed, now),
            ],
            deposits: Vec::new(),
        };
        let report = MonthlyReport::new(period_label(2026, 3), activity);
        assert_eq!(report.period, "2026-03");
        assert_eq!(report.total_withdrawals, Decimal::from(6000));
        assert_eq!(report.withdrawal_count, 2);
        assert_eq!(report.total_deposits, Decimal::ZERO);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["transactions"]["payments"].as_array().unwrap().len(), 1);
        assert_eq!(json["paymentCount"], 1);
    }
}
