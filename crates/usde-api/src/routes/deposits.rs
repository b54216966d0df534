//! # Deposits API
//!
//! Routes:
//! - POST   /api/deposits — quote, risk-score and open a deposit order
//! - POST   /api/deposits/:id/complete — confirm payment and mint USDE
//! - GET    /api/deposits — paginated history
//! - GET    /api/deposits/stats/summary — per-company counters
//!
//! `POST /api/deposits` is rate limited per company by
//! [`rate_limit_middleware`](crate::middleware::rate_limit::rate_limit_middleware).

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use usde_core::{
    DepositQuote, DepositStatus, PageRequest, Pagination, Permission, RiskAssessment, RiskDecision,
};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{require_permission, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, min_len, positive, PageQuery, Validate};
use crate::state::{AppState, Deposit};
use crate::store::DepositStats;

/// Look-back window for the deposit frequency factor.
const FREQUENCY_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateDepositRequest {
    pub amount: Decimal,
    /// Free-form channel name, e.g. `bank_transfer`.
    pub payment_method: String,
}

impl Validate for CreateDepositRequest {
    fn validate(&self) -> Result<(), String> {
        positive("amount", self.amount)?;
        min_len("paymentMethod", &self.payment_method, 1)
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RiskSummary {
    pub score: u32,
    #[schema(value_type = String)]
    pub decision: RiskDecision,
    pub factors: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DepositCreatedResponse {
    pub message: String,
    pub deposit: Deposit,
    pub risk: RiskSummary,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DepositCompletedResponse {
    pub message: String,
    pub deposit: Deposit,
    /// Balance after the mint.
    pub usde_balance: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DepositHistory {
    pub deposits: Vec<Deposit>,
    #[schema(value_type = Object)]
    pub pagination: Pagination,
}

/// Build the deposits router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/deposits", post(create_deposit).get(deposit_history))
        .route("/api/deposits/stats/summary", get(deposit_stats))
        .route("/api/deposits/:id/complete", post(complete_deposit))
}

/// POST /api/deposits — Open a deposit order.
///
/// A rejected risk assessment still records the order, with status
/// `rejected`, before the 403 is returned.
#[utoipa::path(
    post,
    path = "/api/deposits",
    request_body = CreateDepositRequest,
    responses(
        (status = 201, description = "Deposit order created", body = DepositCreatedResponse),
        (status = 400, description = "Amount out of range", body = crate::error::ErrorBody),
        (status = 403, description = "Rejected by risk assessment", body = crate::error::ErrorBody),
        (status = 429, description = "Too many deposit requests", body = crate::error::ErrorBody),
    ),
    tag = "deposits"
)]
async fn create_deposit(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateDepositRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DepositCreatedResponse>), AppError> {
    require_permission(&caller, Permission::FinancialOperations)?;
    let req = extract_validated_json(body)?;
    let quote = DepositQuote::for_amount(req.amount)?;

    let now = Utc::now();
    let recent = state
        .store
        .recent_deposit_count(caller.company_id, now - Duration::hours(FREQUENCY_WINDOW_HOURS))
        .await?;
    let risk = RiskAssessment::assess(quote.amount, recent, caller.kyc_status);

    let status = if risk.decision == RiskDecision::Rejected {
        DepositStatus::Rejected
    } else {
        DepositStatus::Pending
    };
    let deposit = state
        .store
        .insert_deposit(Deposit {
            id: Uuid::new_v4(),
            company_id: caller.company_id,
            amount: quote.amount,
            fee: quote.fee,
            fee_rate: quote.fee_rate,
            usde_amount: quote.usde_amount,
            payment_method: req.payment_method.trim().to_string(),
            status,
            risk_score: risk.score,
            risk_decision: risk.decision,
            expires_at: DepositQuote::expires_at(now),
            completed_at: None,
            created_at: now,
        })
        .await?;

    if let Err(err) = risk.require_accepted() {
        tracing::warn!(
            company_id = %caller.company_id,
            deposit_id = %deposit.id,
            score = risk.score,
            factors = ?risk.factors,
            "deposit rejected by risk assessment"
        );
        return Err(err.into());
    }

    tracing::info!(
        company_id = %caller.company_id,
        deposit_id = %deposit.id,
        amount = %deposit.amount,
        risk_decision = %risk.decision,
        "deposit order created"
    );
    Ok((
        StatusCode::CREATED,
        Json(DepositCreatedResponse {
            message: "Deposit order created successfully".into(),
            deposit,
            risk: RiskSummary {
                score: risk.score,
                decision: risk.decision,
                factors: risk.factors,
            },
        }),
    ))
}

/// POST /api/deposits/:id/complete — Mint the deposit's USDE.
#[utoipa::path(
    post,
    path = "/api/deposits/{id}/complete",
    params(("id" = Uuid, Path, description = "Deposit ID")),
    responses(
        (status = 200, description = "Deposit completed", body = DepositCompletedResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Not pending or expired", body = crate::error::ErrorBody),
    ),
    tag = "deposits"
)]
async fn complete_deposit(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<DepositCompletedResponse>, AppError> {
    require_permission(&caller, Permission::FinancialOperations)?;
    let completed = state
        .store
        .complete_deposit(caller.company_id, id, Utc::now())
        .await?;
    tracing::info!(
        company_id = %caller.company_id,
        deposit_id = %id,
        usde_amount = %completed.deposit.usde_amount,
        "deposit completed"
    );
    Ok(Json(DepositCompletedResponse {
        message: "Deposit completed successfully".into(),
        deposit: completed.deposit,
        usde_balance: completed.usde_balance,
    }))
}

/// GET /api/deposits — Deposit history, newest first.
#[utoipa::path(
    get,
    path = "/api/deposits",
    params(PageQuery),
    responses(
        (status = 200, description = "Deposit page", body = DepositHistory),
    ),
    tag = "deposits"
)]
async fn deposit_history(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<PageQuery>,
) -> Result<Json<DepositHistory>, AppError> {
    require_permission(&caller, Permission::ViewTransactions)?;
    let page: PageRequest = query.into();
    let rows = state.store.deposits(caller.company_id, page).await?;
    Ok(Json(DepositHistory {
        deposits: rows.items,
        pagination: page.paginate(rows.total),
    }))
}

/// GET /api/deposits/stats/summary
#[utoipa::path(
    get,
    path = "/api/deposits/stats/summary",
    responses(
        (status = 200, description = "Deposit counters", body = DepositStats),
    ),
    tag = "deposits"
)]
async fn deposit_stats(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<DepositStats>, AppError> {
    require_permission(&caller, Permission::ViewTransactions)?;
    Ok(Json(state.store.deposit_stats(caller.company_id).await?))
}
