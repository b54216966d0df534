//! # Company Dashboard
//!
//! Routes:
//! - GET    /api/dashboard — balances, staking and payment totals, recent
//!   activity
//! - GET    /api/dashboard/earnings — accrued staking earnings over
//!   `?period=7d|30d|90d|1y`, newest first

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use usde_core::stake::daily_earnings;
use usde_core::{EarningsPeriod, LedgerError, PageRequest, Pagination, Permission};
use utoipa::{IntoParams, ToSchema};

use crate::auth::{require_permission, CallerIdentity};
use crate::error::AppError;
use crate::extractors::PageQuery;
use crate::state::{AppState, Company, Earning, Payment, Stake};
use crate::store::{EarningsSummary, PaymentSummary};

/// Items per recent-activity list.
const RECENT_ITEMS: u32 = 5;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    /// USDE plus fiat balance.
    pub total_balance: Decimal,
    /// USDE not held by payment locks.
    pub available_balance: Decimal,
    pub locked_amount: Decimal,
    /// Every earning accrued so far.
    pub total_earnings: Decimal,
    /// What the active stakes earn per day.
    pub current_daily_earnings: Decimal,
    pub active_stakes_count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StakeTotals {
    /// Amount in active stakes.
    pub total: Decimal,
    pub count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStatistics {
    pub payments: PaymentSummary,
    pub stakes: StakeTotals,
    pub earnings: EarningsSummary,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecentActivities {
    pub payments: Vec<Payment>,
    pub stakes: Vec<Stake>,
    pub earnings: Vec<Earning>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub company: Company,
    pub overview: Overview,
    pub statistics: DashboardStatistics,
    pub recent_activities: RecentActivities,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct EarningsQuery {
    /// `7d`, `30d` (default), `90d` or `1y`.
    pub period: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSummary {
    /// Sum over the whole period, not only this page.
    pub total_earnings: Decimal,
    pub count: u64,
    pub period: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EarningsHistory {
    pub earnings: Vec<Earning>,
    pub summary: PeriodSummary,
    #[schema(value_type = Object)]
    pub pagination: Pagination,
}

/// Build the dashboard router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/dashboard", get(dashboard))
        .route("/api/dashboard/earnings", get(earnings_history))
}

/// GET /api/dashboard
#[utoipa::path(
    get,
    path = "/api/dashboard",
    responses(
        (status = 200, description = "Dashboard", body = Dashboard),
    ),
    tag = "dashboard"
)]
async fn dashboard(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<Dashboard>, AppError> {
    require_permission(&caller, Permission::ViewTransactions)?;
    let company_id = caller.company_id;
    let company = state
        .store
        .company(company_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("company", company_id))?;

    let locked_amount: Decimal = state
        .store
        .locked_balances(company_id)
        .await?
        .iter()
        .map(|l| l.amount)
        .sum();
    let active = state.store.active_stakes(company_id).await?;
    let earnings = state.store.earnings_summary(company_id, None).await?;
    let recent = PageRequest::new(Some(1), Some(RECENT_ITEMS));

    let overview = Overview {
        total_balance: company.usde_balance + company.balance,
        available_balance: company.usde_balance - locked_amount,
        locked_amount,
        total_earnings: earnings.total_earnings,
        current_daily_earnings: active
            .iter()
            .map(|s| daily_earnings(s.amount, s.apy))
            .sum(),
        active_stakes_count: active.len(),
    };
    let statistics = DashboardStatistics {
        payments: state.store.payment_summary(company_id).await?,
        stakes: StakeTotals {
            total: active.iter().map(|s| s.amount).sum(),
            count: active.len(),
        },
        earnings,
    };
    let recent_activities = RecentActivities {
        payments: state.store.payments(company_id, recent).await?.items,
        stakes: state.store.stakes(company_id, None, recent).await?.items,
        earnings: state.store.earnings(company_id, None, recent).await?.items,
    };
    Ok(Json(Dashboard {
        company,
        overview,
        statistics,
        recent_activities,
    }))
}

/// GET /api/dashboard/earnings
#[utoipa::path(
    get,
    path = "/api/dashboard/earnings",
    params(EarningsQuery),
    responses(
        (status = 200, description = "Earnings page", body = EarningsHistory),
        (status = 422, description = "Unknown period", body = crate::error::ErrorBody),
    ),
    tag = "dashboard"
)]
async fn earnings_history(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<EarningsQuery>,
) -> Result<Json<EarningsHistory>, AppError> {
    require_permission(&caller, Permission::ViewTransactions)?;
    let period = query
        .period
        .as_deref()
        .map(str::parse::<EarningsPeriod>)
        .transpose()?
        .unwrap_or_default();
    let since = Some(period.since(Utc::now()));
    let page: PageRequest = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .into();

    let rows = state.store.earnings(caller.company_id, since, page).await?;
    let summary = state.store.earnings_summary(caller.company_id, since).await?;
    Ok(Json(EarningsHistory {
        earnings: rows.items,
        summary: PeriodSummary {
            total_earnings: summary.total_earnings,
            count: summary.count,
            period: period.to_string(),
        },
        pagination: page.paginate(rows.total),
    }))
}

