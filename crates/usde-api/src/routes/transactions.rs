//! # Ledger History
//!
//! Routes:
//! - GET    /api/transactions — caller's ledger entries, newest first

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use usde_core::{PageRequest, Pagination, Permission};
use utoipa::ToSchema;

use crate::auth::{require_permission, CallerIdentity};
use crate::error::AppError;
use crate::extractors::PageQuery;
use crate::state::{AppState, LedgerEntry};

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionHistory {
    pub transactions: Vec<LedgerEntry>,
    #[schema(value_type = Object)]
    pub pagination: Pagination,
}

/// Build the transactions router.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/transactions", get(list_transactions))
}

/// GET /api/transactions
#[utoipa::path(
    get,
    path = "/api/transactions",
    params(PageQuery),
    responses(
        (status = 200, description = "Ledger page", body = TransactionHistory),
    ),
    tag = "transactions"
)]
async fn list_transactions(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<PageQuery>,
) -> Result<Json<TransactionHistory>, AppError> {
    require_permission(&caller, Permission::ViewTransactions)?;
    let page: PageRequest = query.into();
    let rows = state.store.transactions(caller.company_id, page).await?;
    Ok(Json(TransactionHistory {
        transactions: rows.items,
        pagination: page.paginate(rows.total),
    }))
}
