//! # Treasury Reporting
//!
//! Calendar periods (UTC) for enterprise reports and the comparison of
//! month-to-date and quarter-to-date spend against the budgets in
//! [`TreasurySettings`](crate::TreasurySettings). Spend is the sum of
//! payments sent and withdrawals that were not refused.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::LedgerError;

/// Earliest year a report may cover.
pub const MIN_REPORT_YEAR: i32 = 2000;

/// Latest year a report may cover.
pub const MAX_REPORT_YEAR: i32 = 9999;

fn month_start_of(year: i32, month: u32) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()
}

/// Start and end (exclusive) of calendar month `month` (1..=12) of `year`.
pub fn month_bounds(year: i32, month: u32) -> Result<(DateTime<Utc>, DateTime<Utc>), LedgerError> {
    if !(MIN_REPORT_YEAR..=MAX_REPORT_YEAR).contains(&year) {
        return Err(LedgerError::Validation(format!(
            "year must be between {MIN_REPORT_YEAR} and {MAX_REPORT_YEAR}"
        )));
    }
    if !(1..=12).contains(&month) {
        return Err(LedgerError::Validation("month must be between 1 and 12".into()));
    }
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    match (month_start_of(year, month), month_start_of(next_year, next_month)) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(LedgerError::Validation(format!("invalid period {year}-{month:02}"))),
    }
}

/// `YYYY-MM` label of a report period.
pub fn period_label(year: i32, month: u32) -> String {
    format!("{year:04}-{month:02}")
}

/// First instant of the month containing `now`.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    month_start_of(now.year(), now.month()).unwrap_or(now)
}

/// First instant of the calendar quarter containing `now`.
pub fn quarter_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let first_month = (now.month0() / 3) * 3 + 1;
    month_start_of(now.year(), first_month).unwrap_or(now)
}

/// Spend measured against one budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetUsage {
    /// Configured budget.
    pub budget: Decimal,
    /// Spend in the period so far.
    pub spent: Decimal,
    /// `budget − spent`; negative once exceeded.
    pub remaining: Decimal,
    /// `spent / budget` as a percentage, two decimals. Absent for a zero
    /// budget.
    pub used_percent: Option<Decimal>,
    /// Whether spend is above the budget.
    pub over_budget: bool,
}

impl BudgetUsage {
    /// Compare `spent` with `budget`.
    pub fn compute(budget: Decimal, spent: Decimal) -> Self {
        let used_percent = (!budget.is_zero())
            .then(|| (spent / budget * Decimal::ONE_HUNDRED).round_dp(2));
        Self {
            budget,
            spent,
            remaining: budget - spent,
            used_percent,
            over_budget: spent > budget,
        }
    }
}
