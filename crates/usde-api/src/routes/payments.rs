//! # Payments API
//!
//! Routes:
//! - POST   /api/payments — pay another company; funds lock on the recipient
//! - GET    /api/payments — sent and received payments, newest first
//! - GET    /api/payments/locked-balances — caller's locks with days remaining
//! - POST   /api/payments/:id/release — recipient releases a matured lock

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use usde_core::payment::days_remaining;
use usde_core::{LedgerError, LockPeriod, PageRequest, Pagination, Permission};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{require_permission, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, positive, valid_email, PageQuery, Validate};
use crate::routes::auth::normalize_email;
use crate::state::{AppState, LockedBalance, Payment};
use crate::store::NewPayment;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    /// Recipient company's login e-mail.
    pub to_email: String,
    pub amount: Decimal,
    /// 30, 90 or 180.
    #[schema(value_type = u32)]
    pub lock_days: LockPeriod,
}

impl Validate for CreatePaymentRequest {
    fn validate(&self) -> Result<(), String> {
        valid_email(self.to_email.trim())?;
        positive("amount", self.amount)
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub message: String,
    pub payment: Payment,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentHistory {
    pub payments: Vec<Payment>,
    #[schema(value_type = Object)]
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LockView {
    #[serde(flatten)]
    pub lock: LockedBalance,
    pub days_remaining: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LockedBalancesResponse {
    pub locked_balances: Vec<LockView>,
    pub total_locked: Decimal,
}

/// Build the payments router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/payments", post(create_payment).get(payment_history))
        .route("/api/payments/locked-balances", get(locked_balances))
        .route("/api/payments/:id/release", post(release_payment))
}

/// POST /api/payments — Send a payment with a lock period.
#[utoipa::path(
    post,
    path = "/api/payments",
    request_body = CreatePaymentRequest,
    responses(
        (status = 201, description = "Payment sent", body = PaymentResponse),
        (status = 400, description = "Insufficient balance", body = crate::error::ErrorBody),
        (status = 403, description = "KYC not approved", body = crate::error::ErrorBody),
        (status = 404, description = "Recipient not found", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "payments"
)]
async fn create_payment(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreatePaymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PaymentResponse>), AppError> {
    require_permission(&caller, Permission::FinancialOperations)?;
    caller.kyc_status.require_approved()?;
    let req = extract_validated_json(body)?;
    let payment = state
        .store
        .create_payment(
            NewPayment {
                from_id: caller.company_id,
                to_email: normalize_email(&req.to_email),
                amount: req.amount,
                lock: req.lock_days,
            },
            Utc::now(),
        )
        .await?;
    tracing::info!(
        payment_id = %payment.id,
        from_id = %payment.from_id,
        to_id = %payment.to_id,
        amount = %payment.amount,
        lock_days = payment.lock_days,
        "payment sent"
    );
    Ok((
        StatusCode::CREATED,
        Json(PaymentResponse {
            message: "Payment sent successfully".into(),
            payment,
        }),
    ))
}

/// GET /api/payments — Payments sent or received by the caller.
#[utoipa::path(
    get,
    path = "/api/payments",
    params(PageQuery),
    responses(
        (status = 200, description = "Payment page", body = PaymentHistory),
    ),
    tag = "payments"
)]
async fn payment_history(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<PageQuery>,
) -> Result<Json<PaymentHistory>, AppError> {
    require_permission(&caller, Permission::ViewTransactions)?;
    let page: PageRequest = query.into();
    let rows = state.store.payments(caller.company_id, page).await?;
    Ok(Json(PaymentHistory {
        payments: rows.items,
        pagination: page.paginate(rows.total),
    }))
}

fn lock_views(locks: Vec<LockedBalance>, now: DateTime<Utc>) -> LockedBalancesResponse {
    let total_locked = locks.iter().map(|l| l.amount).sum();
    let locked_balances = locks
        .into_iter()
        .map(|lock| LockView {
            days_remaining: days_remaining(lock.release_at, now),
            lock,
        })
        .collect();
    LockedBalancesResponse {
        locked_balances,
        total_locked,
    }
}

/// GET /api/payments/locked-balances
#[utoipa::path(
    get,
    path = "/api/payments/locked-balances",
    responses(
        (status = 200, description = "Locked balances", body = LockedBalancesResponse),
    ),
    tag = "payments"
)]
async fn locked_balances(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<LockedBalancesResponse>, AppError> {
    require_permission(&caller, Permission::ViewTransactions)?;
    let locks = state.store.locked_balances(caller.company_id).await?;
    Ok(Json(lock_views(locks, Utc::now())))
}

/// POST /api/payments/:id/release — Release a matured lock.
#[utoipa::path(
    post,
    path = "/api/payments/{id}/release",
    params(("id" = Uuid, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment released", body = PaymentResponse),
        (status = 403, description = "Caller is not the recipient", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Already released or still locked", body = crate::error::ErrorBody),
    ),
    tag = "payments"
)]
async fn release_payment(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentResponse>, AppError> {
    require_permission(&caller, Permission::FinancialOperations)?;
    let payment = state
        .store
        .payment(id)
        .await?
        .ok_or_else(|| LedgerError::not_found("payment", id))?;
    if payment.to_id != caller.company_id {
        return Err(AppError::Forbidden(
            "only the recipient may release a payment".into(),
        ));
    }

    let payment = state.store.release_payment(id, Utc::now()).await?;
    tracing::info!(payment_id = %id, company_id = %caller.company_id, "payment released");
    Ok(Json(PaymentResponse {
        message: "Payment released successfully".into(),
        payment,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn lock_days_must_be_allowed_period() {
        let ok: Result<CreatePaymentRequest, _> = serde_json::from_value(serde_json::json!({
            "toEmail": "ap@globex.test", "amount": 100, "lockDays": 90
        }));
        assert_eq!(ok.unwrap().lock_days, LockPeriod::Days90);
        let bad: Result<CreatePaymentRequest, _> = serde_json::from_value(serde_json::json!({
            "toEmail": "ap@globex.test", "amount": 100, "lockDays": 60
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn locks_summed_with_days_remaining() {
        let now = Utc::now();
        let lock = |amount: i64, days: i64| LockedBalance {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            amount: Decimal::from(amount),
            release_at: now + Duration::days(days),
            source_payment_id: None,
            created_at: now,
        };
        let view = lock_views(vec![lock(100, 30), lock(250, -1)], now);
        assert_eq!(view.total_locked, Decimal::from(350));
        assert_eq!(view.locked_balances[0].days_remaining, 30);
        assert_eq!(view.locked_balances[1].days_remaining, 0);
    }
}
