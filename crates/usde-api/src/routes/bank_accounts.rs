//! # Bank Accounts API
//!
//! Routes:
//! - GET    /api/bank-accounts — caller's accounts, newest first
//! - POST   /api/bank-accounts — add an unverified USD account (KYC approved)
//! - POST   /api/bank-accounts/:id/verify — verify with the bank (KYC approved)
//! - DELETE /api/bank-accounts/:id — remove an account with no active withdrawal
//! - GET    /api/bank-accounts/balance — withdrawable balance summary

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use usde_core::{BalanceCheck, LedgerError, Permission};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{require_permission, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, min_len, Validate};
use crate::state::{AppState, BankAccount};

/// The only currency accounts may hold.
const SUPPORTED_CURRENCY: &str = "USD";

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddBankAccountRequest {
    pub bank_name: String,
    pub account_num: String,
    /// Defaults to `USD`, the only accepted value.
    pub currency: Option<String>,
}

impl Validate for AddBankAccountRequest {
    fn validate(&self) -> Result<(), String> {
        min_len("bankName", &self.bank_name, 1)?;
        min_len("accountNum", &self.account_num, 1)?;
        match self.currency.as_deref() {
            None | Some(SUPPORTED_CURRENCY) => Ok(()),
            Some(_) => Err("currency must be USD".into()),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BankAccountsResponse {
    pub bank_accounts: Vec<BankAccount>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BankAccountResponse {
    pub message: String,
    pub bank_account: BankAccount,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawableBalance {
    pub total_balance: Decimal,
    pub locked_amount: Decimal,
    pub available_balance: Decimal,
    pub has_verified_bank_account: bool,
}

/// Build the bank accounts router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/bank-accounts",
            get(list_accounts).post(add_account),
        )
        .route("/api/bank-accounts/balance", get(withdrawable_balance))
        .route("/api/bank-accounts/:id/verify", post(verify_account))
        .route("/api/bank-accounts/:id", axum::routing::delete(delete_account))
}

/// GET /api/bank-accounts — The caller's bank accounts.
#[utoipa::path(
    get,
    path = "/api/bank-accounts",
    responses(
        (status = 200, description = "Bank accounts", body = BankAccountsResponse),
    ),
    tag = "bank_accounts"
)]
async fn list_accounts(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<BankAccountsResponse>, AppError> {
    let bank_accounts = state.store.bank_accounts(caller.company_id).await?;
    Ok(Json(BankAccountsResponse { bank_accounts }))
}

/// POST /api/bank-accounts — Add an unverified account.
#[utoipa::path(
    post,
    path = "/api/bank-accounts",
    request_body = AddBankAccountRequest,
    responses(
        (status = 201, description = "Account added", body = BankAccountResponse),
        (status = 403, description = "KYC not approved", body = crate::error::ErrorBody),
        (status = 409, description = "Account already exists", body = crate::error::ErrorBody),
    ),
    tag = "bank_accounts"
)]
async fn add_account(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<AddBankAccountRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BankAccountResponse>), AppError> {
    require_permission(&caller, Permission::FinancialOperations)?;
    caller.kyc_status.require_approved()?;
    let req = extract_validated_json(body)?;
    let bank_account = state
        .store
        .insert_bank_account(
            caller.company_id,
            req.bank_name.trim().to_string(),
            req.account_num.trim().to_string(),
            SUPPORTED_CURRENCY.to_string(),
        )
        .await?;
    tracing::info!(company_id = %caller.company_id, bank_account_id = %bank_account.id, "bank account added");
    Ok((
        StatusCode::CREATED,
        Json(BankAccountResponse {
            message: "Bank account added successfully".into(),
            bank_account,
        }),
    ))
}

/// POST /api/bank-accounts/:id/verify — Ask the bank to confirm the account.
#[utoipa::path(
    post,
    path = "/api/bank-accounts/{id}/verify",
    params(("id" = Uuid, Path, description = "Bank account ID")),
    responses(
        (status = 200, description = "Account verified", body = BankAccountResponse),
        (status = 400, description = "Bank did not confirm the account", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Already verified", body = crate::error::ErrorBody),
    ),
    tag = "bank_accounts"
)]
async fn verify_account(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<BankAccountResponse>, AppError> {
    require_permission(&caller, Permission::FinancialOperations)?;
    caller.kyc_status.require_approved()?;
    let account = state
        .store
        .bank_account(caller.company_id, id)
        .await?
        .ok_or_else(|| LedgerError::not_found("bank account", id))?;
    if account.is_verified {
        return Err(LedgerError::invalid_state(
            "bank account",
            "verified",
            "bank account already verified",
        )
        .into());
    }

    if !state.payouts.verify_account(&account).await {
        tracing::warn!(company_id = %caller.company_id, bank_account_id = %id, "bank account verification failed");
        return Err(LedgerError::BankVerificationFailed.into());
    }

    let bank_account = state
        .store
        .mark_bank_account_verified(caller.company_id, id)
        .await?;
    tracing::info!(company_id = %caller.company_id, bank_account_id = %id, "bank account verified");
    Ok(Json(BankAccountResponse {
        message: "Bank account verified successfully".into(),
        bank_account,
    }))
}

/// DELETE /api/bank-accounts/:id — Remove an account.
#[utoipa::path(
    delete,
    path = "/api/bank-accounts/{id}",
    params(("id" = Uuid, Path, description = "Bank account ID")),
    responses(
        (status = 200, description = "Account deleted", body = MessageResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Active withdrawal uses the account", body = crate::error::ErrorBody),
    ),
    tag = "bank_accounts"
)]
async fn delete_account(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    require_permission(&caller, Permission::FinancialOperations)?;
    state.store.delete_bank_account(caller.company_id, id).await?;
    tracing::info!(company_id = %caller.company_id, bank_account_id = %id, "bank account deleted");
    Ok(Json(MessageResponse {
        message: "Bank account deleted successfully".into(),
    }))
}

/// GET /api/bank-accounts/balance — Balance available for withdrawal.
#[utoipa::path(
    get,
    path = "/api/bank-accounts/balance",
    responses(
        (status = 200, description = "Withdrawable balance", body = WithdrawableBalance),
    ),
    tag = "bank_accounts"
)]
async fn withdrawable_balance(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<WithdrawableBalance>, AppError> {
    let ctx = state
        .store
        .withdrawal_context(caller.company_id, Utc::now())
        .await?;
    let check = BalanceCheck::compute(ctx.total_balance, ctx.locked_amount, Decimal::ZERO);
    Ok(Json(WithdrawableBalance {
        total_balance: check.total_balance,
        locked_amount: check.locked_amount,
        available_balance: check.available_balance,
        has_verified_bank_account: ctx.verified_bank_account.is_some(),
    }))
}
