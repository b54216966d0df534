//! # API Route Modules
//!
//! Route modules for the USDE back office, all under `/api`:
//!
//! - `auth` — registration, login and profile. Register and login are the
//!   only routes reachable without a token.
//! - `withdrawals` — balance and limit checks, withdrawal creation, payout
//!   processing, history and statistics.
//! - `companies` — company profile and the parent/subsidiary hierarchy.
//! - `kyc` — application submission and status; reviewer endpoints under
//!   `/api/admin/kyc`.
//! - `bank_accounts` — payout destinations and their verification.
//! - `deposits` — fiat deposits with fee, risk assessment and completion.
//! - `payments` — inter-company payments with locked balances.
//! - `stakes` — staking and earnings.
//! - `dashboard` — the caller's balances, totals and earnings history.
//! - `transactions` — the caller's ledger.
//! - `enterprise` — enterprise users, treasury settings, the budget
//!   dashboard and monthly reports.
//! - `admin` — platform administration and the audit log.

pub mod admin;
pub mod auth;
pub mod bank_accounts;
pub mod companies;
pub mod dashboard;
pub mod deposits;
pub mod enterprise;
pub mod kyc;
pub mod payments;
pub mod stakes;
pub mod transactions;
pub mod withdrawals;

use chrono::Utc;
use uuid::Uuid;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::NewAuditEntry;

/// Append an administrative action to the hash-chained audit log.
pub(crate) async fn record_audit(
    state: &AppState,
    caller: &CallerIdentity,
    action: &str,
    target_id: Uuid,
    details: serde_json::Value,
) -> Result<(), AppError> {
    let entry = state
        .store
        .append_audit(
            NewAuditEntry {
                actor_id: caller.company_id,
                action: action.to_string(),
                target_id,
                details,
            },
            Utc::now(),
        )
        .await?;
    tracing::info!(
        actor_id = %caller.company_id,
        %target_id,
        action,
        entry_hash = %entry.entry_hash,
        "audit entry recorded"
    );
    Ok(())
}
