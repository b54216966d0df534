//! # Withdrawals API
//!
//! Routes:
//! - POST   /api/withdrawals/check-balance — available balance for an amount
//! - POST   /api/withdrawals/check-limits — KYC, bank account and limit checks
//! - POST   /api/withdrawals — burn USDE and start a withdrawal
//! - GET    /api/withdrawals — paginated history with bank details
//! - POST   /api/withdrawals/:id/process — pay out a processing withdrawal
//! - GET    /api/withdrawals/stats/summary — per-company counters
//!
//! Every operation delegates to the
//! [`WithdrawalService`](crate::services::withdrawal::WithdrawalService).

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use usde_core::{BalanceCheck, LimitCheck, LedgerError, Permission, WithdrawalLimits};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{require_permission, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, positive, PageQuery, Validate};
use crate::services::withdrawal::{
    BankAccountSummary, TransferOutcome, WithdrawalHistory, WithdrawalView,
};
use crate::state::AppState;
use crate::store::WithdrawalStats;

// ── Request / Response DTOs ─────────────────────────────────────────────────

/// Amount to check.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AmountRequest {
    pub amount: Decimal,
}

impl Validate for AmountRequest {
    fn validate(&self) -> Result<(), String> {
        positive("amount", self.amount)
    }
}

/// Start a withdrawal to one of the caller's verified bank accounts.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateWithdrawalRequest {
    pub amount: Decimal,
    pub bank_account_id: Uuid,
}

impl Validate for CreateWithdrawalRequest {
    fn validate(&self) -> Result<(), String> {
        positive("amount", self.amount)
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BalanceCheckResponse {
    pub total_balance: Decimal,
    pub locked_amount: Decimal,
    /// May be negative when locks exceed the balance.
    pub available_balance: Decimal,
    pub has_enough_balance: bool,
}

impl From<BalanceCheck> for BalanceCheckResponse {
    fn from(check: BalanceCheck) -> Self {
        Self {
            total_balance: check.total_balance,
            locked_amount: check.locked_amount,
            available_balance: check.available_balance,
            has_enough_balance: check.has_enough_balance,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LimitCheckResponse {
    pub daily_total: Decimal,
    pub daily_limit: Decimal,
    pub single_limit: Decimal,
    /// Remaining headroom today.
    pub daily_remaining: Decimal,
    pub bank_account_id: Uuid,
}

impl From<LimitCheck> for LimitCheckResponse {
    fn from(check: LimitCheck) -> Self {
        Self {
            daily_total: check.daily_total,
            daily_limit: check.daily_limit,
            single_limit: check.single_limit,
            daily_remaining: (check.daily_limit - check.daily_total).max(Decimal::ZERO),
            bank_account_id: check.bank_account_id,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalCreatedResponse {
    pub message: String,
    pub withdrawal: WithdrawalView,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferProcessedResponse {
    pub message: String,
    pub result: TransferOutcome,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalLimitsResponse {
    pub daily_limit: Decimal,
    pub single_limit: Decimal,
}

impl From<WithdrawalLimits> for WithdrawalLimitsResponse {
    fn from(limits: WithdrawalLimits) -> Self {
        Self {
            daily_limit: limits.daily,
            single_limit: limits.single,
        }
    }
}

// ── Router ──────────────────────────────────────────────────────────────────

/// Build the withdrawals router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/withdrawals",
            post(create_withdrawal).get(withdrawal_history),
        )
        .route("/api/withdrawals/check-balance", post(check_balance))
        .route("/api/withdrawals/check-limits", post(check_limits))
        .route("/api/withdrawals/limits", get(withdrawal_limits))
        .route("/api/withdrawals/stats/summary", get(withdrawal_stats))
        .route("/api/withdrawals/:id/process", post(process_withdrawal))
}

// ── Handlers ────────────────────────────────────────────────────────────────

/// POST /api/withdrawals/check-balance — Available balance for an amount.
#[utoipa::path(
    post,
    path = "/api/withdrawals/check-balance",
    request_body = AmountRequest,
    responses(
        (status = 200, description = "Balance evaluated", body = BalanceCheckResponse),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "withdrawals"
)]
async fn check_balance(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<AmountRequest>, JsonRejection>,
) -> Result<Json<BalanceCheckResponse>, AppError> {
    require_permission(&caller, Permission::ViewTransactions)?;
    let req = extract_validated_json(body)?;
    let check = state
        .withdrawals
        .check_available_balance(caller.company_id, req.amount)
        .await?;
    Ok(Json(check.into()))
}

/// POST /api/withdrawals/check-limits — KYC, bank account, daily and single
/// limits for an amount.
#[utoipa::path(
    post,
    path = "/api/withdrawals/check-limits",
    request_body = AmountRequest,
    responses(
        (status = 200, description = "Amount within limits", body = LimitCheckResponse),
        (status = 400, description = "Limit exceeded or no verified bank account", body = crate::error::ErrorBody),
        (status = 403, description = "KYC not approved", body = crate::error::ErrorBody),
    ),
    tag = "withdrawals"
)]
async fn check_limits(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<AmountRequest>, JsonRejection>,
) -> Result<Json<LimitCheckResponse>, AppError> {
    require_permission(&caller, Permission::ViewTransactions)?;
    let req = extract_validated_json(body)?;
    let check = state
        .withdrawals
        .check_withdrawal_limits(caller.company_id, req.amount)
        .await?;
    Ok(Json(check.into()))
}

/// GET /api/withdrawals/limits — Limits in force.
#[utoipa::path(
    get,
    path = "/api/withdrawals/limits",
    responses(
        (status = 200, description = "Process-wide limits", body = WithdrawalLimitsResponse),
    ),
    tag = "withdrawals"
)]
async fn withdrawal_limits(
    State(state): State<AppState>,
    _caller: CallerIdentity,
) -> Json<WithdrawalLimitsResponse> {
    Json(state.withdrawals.limits().into())
}

/// POST /api/withdrawals — Burn USDE and start a bank withdrawal.
#[utoipa::path(
    post,
    path = "/api/withdrawals",
    request_body = CreateWithdrawalRequest,
    responses(
        (status = 201, description = "Withdrawal processing", body = WithdrawalCreatedResponse),
        (status = 400, description = "Insufficient balance, limit exceeded or no verified account", body = crate::error::ErrorBody),
        (status = 403, description = "KYC not approved", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "withdrawals"
)]
async fn create_withdrawal(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateWithdrawalRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<WithdrawalCreatedResponse>), AppError> {
    require_permission(&caller, Permission::FinancialOperations)?;
    let req = extract_validated_json(body)?;
    let withdrawal = state
        .withdrawals
        .create_withdrawal(caller.company_id, req.amount, req.bank_account_id)
        .await?;
    let bank_account = state
        .store
        .bank_account(caller.company_id, withdrawal.bank_account_id)
        .await?
        .map(|a| BankAccountSummary {
            bank_name: a.bank_name,
            account_num: a.account_num,
        });

    Ok((
        StatusCode::CREATED,
        Json(WithdrawalCreatedResponse {
            message: "Withdrawal request created successfully".into(),
            withdrawal: WithdrawalView {
                withdrawal,
                bank_account,
            },
        }),
    ))
}

/// GET /api/withdrawals — Withdrawal history, newest first.
#[utoipa::path(
    get,
    path = "/api/withdrawals",
    params(PageQuery),
    responses(
        (status = 200, description = "Withdrawal page", body = WithdrawalHistory),
    ),
    tag = "withdrawals"
)]
async fn withdrawal_history(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(page): Query<PageQuery>,
) -> Result<Json<WithdrawalHistory>, AppError> {
    require_permission(&caller, Permission::ViewTransactions)?;
    let history = state
        .withdrawals
        .history(caller.company_id, page.into())
        .await?;
    Ok(Json(history))
}

/// POST /api/withdrawals/:id/process — Send the payout and settle.
///
/// A refused payout returns 200 with `status: failed`; the amount has been
/// refunded.
#[utoipa::path(
    post,
    path = "/api/withdrawals/{id}/process",
    params(("id" = Uuid, Path, description = "Withdrawal ID")),
    responses(
        (status = 200, description = "Payout settled", body = TransferProcessedResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Not processing", body = crate::error::ErrorBody),
    ),
    tag = "withdrawals"
)]
async fn process_withdrawal(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<TransferProcessedResponse>, AppError> {
    require_permission(&caller, Permission::FinancialOperations)?;
    // Another company's withdrawal is indistinguishable from a missing one.
    match state.store.withdrawal(id).await? {
        Some(w) if w.company_id == caller.company_id => {}
        _ => return Err(LedgerError::not_found("withdrawal", id).into()),
    }

    let result = state.withdrawals.process_bank_transfer(id).await?;
    Ok(Json(TransferProcessedResponse {
        message: "Bank transfer processed".into(),
        result,
    }))
}

/// GET /api/withdrawals/stats/summary — Withdrawal counters.
#[utoipa::path(
    get,
    path = "/api/withdrawals/stats/summary",
    responses(
        (status = 200, description = "Withdrawal statistics", body = WithdrawalStats),
    ),
    tag = "withdrawals"
)]
async fn withdrawal_stats(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<WithdrawalStats>, AppError> {
    require_permission(&caller, Permission::ViewTransactions)?;
    Ok(Json(state.withdrawals.stats(caller.company_id).await?))
}
