//! # Staking API
//!
//! Routes:
//! - POST   /api/stakes — stake USDE for 30 to 365 days
//! - GET    /api/stakes — stakes with accrued earnings, `?status=` filter
//! - GET    /api/stakes/:id — one stake with remaining days
//! - GET    /api/stakes/stats/summary — totals and current daily earnings

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use usde_core::stake::{accrued_days, daily_earnings, days_held, earnings, remaining_days};
use usde_core::{LedgerError, PageRequest, Pagination, Permission, StakeStatus, StakeTerms};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{require_permission, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, positive, PageQuery, Validate};
use crate::state::{AppState, Stake};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateStakeRequest {
    pub amount: Decimal,
    /// Lock period in days, 30 to 365.
    pub lock_period: u32,
    /// Annual rate as a fraction; defaults to 0.04.
    pub interest_rate: Option<Decimal>,
}

impl Validate for CreateStakeRequest {
    fn validate(&self) -> Result<(), String> {
        positive("amount", self.amount)
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct StakesQuery {
    /// `active` or `completed`.
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// A stake with values derived at read time. `currentEarnings` is the
/// interest accrued so far, capped at the term; for a completed stake it
/// is what was paid out.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StakeView {
    #[serde(flatten)]
    pub stake: Stake,
    pub current_earnings: Decimal,
    pub days_held: i64,
    pub is_expired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_days: Option<i64>,
}

impl StakeView {
    fn at(stake: Stake, now: DateTime<Utc>) -> Self {
        let held = days_held(stake.start_date, now);
        let current_earnings = match stake.status {
            StakeStatus::Active => {
                let days = accrued_days(stake.start_date, stake.end_date, now);
                earnings(stake.amount, stake.apy, days).round_dp(2)
            }
            StakeStatus::Completed => stake.earnings_paid,
        };
        Self {
            current_earnings,
            days_held: held,
            is_expired: now >= stake.end_date,
            remaining_days: None,
            stake,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StakeResponse {
    pub message: String,
    pub stake: Stake,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StakeDetail {
    pub stake: StakeView,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StakeList {
    pub stakes: Vec<StakeView>,
    #[schema(value_type = Object)]
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StakeSummary {
    pub total_staked: Decimal,
    pub active_stakes: usize,
    pub daily_earnings: Decimal,
}

impl StakeSummary {
    fn of(active: &[Stake]) -> Self {
        Self {
            total_staked: active.iter().map(|s| s.amount).sum(),
            active_stakes: active.len(),
            daily_earnings: active
                .iter()
                .map(|s| daily_earnings(s.amount, s.apy))
                .sum(),
        }
    }
}

/// Build the stakes router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/stakes", post(create_stake).get(list_stakes))
        .route("/api/stakes/stats/summary", get(stake_summary))
        .route("/api/stakes/:id", get(get_stake))
}

/// POST /api/stakes — Lock USDE to earn interest.
#[utoipa::path(
    post,
    path = "/api/stakes",
    request_body = CreateStakeRequest,
    responses(
        (status = 201, description = "Stake created", body = StakeResponse),
        (status = 400, description = "Insufficient balance", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "stakes"
)]
async fn create_stake(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateStakeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<StakeResponse>), AppError> {
    require_permission(&caller, Permission::FinancialOperations)?;
    let req = extract_validated_json(body)?;
    let terms = StakeTerms::new(req.amount, req.lock_period, req.interest_rate)?;
    let stake = state
        .store
        .create_stake(caller.company_id, terms, Utc::now())
        .await?;
    tracing::info!(
        company_id = %caller.company_id,
        stake_id = %stake.id,
        amount = %stake.amount,
        lock_days = terms.lock_days,
        "stake created"
    );
    Ok((
        StatusCode::CREATED,
        Json(StakeResponse {
            message: "Stake created successfully".into(),
            stake,
        }),
    ))
}

/// GET /api/stakes — The caller's stakes, newest first.
#[utoipa::path(
    get,
    path = "/api/stakes",
    params(StakesQuery),
    responses(
        (status = 200, description = "Stake page", body = StakeList),
    ),
    tag = "stakes"
)]
async fn list_stakes(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<StakesQuery>,
) -> Result<Json<StakeList>, AppError> {
    require_permission(&caller, Permission::ViewTransactions)?;
    let status = query
        .status
        .as_deref()
        .map(str::parse::<StakeStatus>)
        .transpose()?;
    let page: PageRequest = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .into();
    let rows = state.store.stakes(caller.company_id, status, page).await?;
    let now = Utc::now();
    Ok(Json(StakeList {
        stakes: rows.items.into_iter().map(|s| StakeView::at(s, now)).collect(),
        pagination: page.paginate(rows.total),
    }))
}

/// GET /api/stakes/:id
#[utoipa::path(
    get,
    path = "/api/stakes/{id}",
    params(("id" = Uuid, Path, description = "Stake ID")),
    responses(
        (status = 200, description = "Stake", body = StakeDetail),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "stakes"
)]
async fn get_stake(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<StakeDetail>, AppError> {
    require_permission(&caller, Permission::ViewTransactions)?;
    let stake = state
        .store
        .stake(caller.company_id, id)
        .await?
        .ok_or_else(|| LedgerError::not_found("stake", id))?;
    let now = Utc::now();
    let end_date = stake.end_date;
    let mut view = StakeView::at(stake, now);
    view.remaining_days = Some(remaining_days(end_date, now));
    Ok(Json(StakeDetail { stake: view }))
}

/// GET /api/stakes/stats/summary
#[utoipa::path(
    get,
    path = "/api/stakes/stats/summary",
    responses(
        (status = 200, description = "Staking totals", body = StakeSummary),
    ),
    tag = "stakes"
)]
async fn stake_summary(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<StakeSummary>, AppError> {
    require_permission(&caller, Permission::ViewTransactions)?;
    let active = state.store.active_stakes(caller.company_id).await?;
    Ok(Json(StakeSummary::of(&active)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn stake(amount: i64, started_days_ago: i64, lock_days: i64) -> Stake {
        let now = Utc::now();
        let start = now - Duration::days(started_days_ago);
        Stake {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            amount: Decimal::from(amount),
            apy: Decimal::new(4, 2),
            start_date: start,
            end_date: start + Duration::days(lock_days),
            status: StakeStatus::Active,
            earnings_paid: Decimal::ZERO,
            completed_at: None,
            created_at: start,
        }
    }

    #[test]
    fn view_accrues_simple_interest() {
        let view = StakeView::at(stake(36_500, 10, 90), Utc::now());
        assert_eq!(view.days_held, 10);
        assert_eq!(view.current_earnings, Decimal::from(40));
        assert!(!view.is_expired);
    }

    #[test]
    fn matured_stake_is_expired() {
        let view = StakeView::at(stake(36_500, 31, 30), Utc::now());
        assert!(view.is_expired);
        // Interest stops at the end of the term.
        assert_eq!(view.current_earnings, Decimal::from(120));
    }

    #[test]
    fn completed_stake_shows_paid_earnings() {
        let mut completed = stake(36_500, 400, 30);
        completed.status = StakeStatus::Completed;
        completed.earnings_paid = Decimal::from(120);
        let view = StakeView::at(completed, Utc::now());
        assert_eq!(view.current_earnings, Decimal::from(120));
    }

    #[test]
    fn summary_sums_active() {
        let summary = StakeSummary::of(&[stake(36_500, 0, 30), stake(36_500, 5, 60)]);
        assert_eq!(summary.total_staked, Decimal::from(73_000));
        assert_eq!(summary.active_stakes, 2);
        assert_eq!(summary.daily_earnings, Decimal::from(8));
    }
}
