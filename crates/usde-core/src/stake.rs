//! Staking terms and simple-interest earnings.
//!
//! A stake accrues one earning per whole day held, each worth
//! [`daily_earnings`], up to the end of its term. At maturity the principal
//! and the sum of its accruals are credited back and the stake is
//! `completed`.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::require_positive;
use crate::LedgerError;

/// Shortest stake, in days.
pub const MIN_LOCK_DAYS: u32 = 30;

/// Longest stake, in days.
pub const MAX_LOCK_DAYS: u32 = 365;

/// APY used when the request does not name one: 4 %.
pub fn default_apy() -> Decimal {
    Decimal::new(4, 2)
}

/// Stake status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakeStatus {
    /// Earning.
    Active,
    /// Matured and closed.
    Completed,
}

wire_enum!(StakeStatus, "stake status", {
    Active => "active",
    Completed => "completed",
});

/// Validated terms for a new stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakeTerms {
    /// Amount staked.
    pub amount: Decimal,
    /// Lock period in days.
    pub lock_days: u32,
    /// Annual rate as a fraction.
    pub apy: Decimal,
}

impl StakeTerms {
    /// Validate the amount, the lock period (30..=365) and the rate (0..=1).
    pub fn new(amount: Decimal, lock_days: u32, apy: Option<Decimal>) -> Result<Self, LedgerError> {
        require_positive(amount)?;
        if !(MIN_LOCK_DAYS..=MAX_LOCK_DAYS).contains(&lock_days) {
            return Err(LedgerError::Validation(format!(
                "lock period must be between {MIN_LOCK_DAYS} and {MAX_LOCK_DAYS} days"
            )));
        }
        let apy = apy.unwrap_or_else(default_apy);
        if apy < Decimal::ZERO || apy > Decimal::ONE {
            return Err(LedgerError::Validation(
                "interest rate must be between 0 and 1".into(),
            ));
        }
        Ok(Self {
            amount,
            lock_days,
            apy,
        })
    }

    /// Maturity date for a stake starting at `start`.
    pub fn end_date(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        start + Duration::days(i64::from(self.lock_days))
    }
}

/// Whole days elapsed since `start`, floored.
pub fn days_held(start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - start).num_days().max(0)
}

/// Whole days until `end`, rounded up; never negative.
pub fn remaining_days(end: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    crate::payment::days_remaining(end, now)
}

/// Simple interest accrued: `amount × apy / 365 × days_held`.
pub fn earnings(amount: Decimal, apy: Decimal, days_held: i64) -> Decimal {
    amount * apy / Decimal::from(365) * Decimal::from(days_held)
}

/// Earnings for one day, rounded to cents.
pub fn daily_earnings(amount: Decimal, apy: Decimal) -> Decimal {
    earnings(amount, apy, 1).round_dp(2)
}

/// Length of the term between `start` and `end`, in whole days.
pub fn term_days(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_days().max(0)
}

/// Daily accruals owed at `now`: whole days held, capped at the term.
pub fn accrued_days(start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    days_held(start, now).min(term_days(start, end))
}

/// Whether a stake ending at `end` has matured.
pub fn is_matured(end: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= end
}

/// Look-back window for earnings history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EarningsPeriod {
    /// Last 7 days.
    #[serde(rename = "7d")]
    Week,
    /// Last 30 days.
    #[default]
    #[serde(rename = "30d")]
    Month,
    /// Last 90 days.
    #[serde(rename = "90d")]
    Quarter,
    /// Last 365 days.
    #[serde(rename = "1y")]
    Year,
}

wire_enum!(EarningsPeriod, "earnings period", {
    Week => "7d",
    Month => "30d",
    Quarter => "90d",
    Year => "1y",
});

impl EarningsPeriod {
    /// Start of the window ending at `now`.
    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let days = match self {
            Self::Week => 7,
            Self::Month => 30,
            Self::Quarter => 90,
            Self::Year => 365,
        };
        now - Duration::days(days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_four_percent() {
        let terms = StakeTerms::new(Decimal::from(1000), 30, None).unwrap();
        assert_eq!(terms.apy, Decimal::new(4, 2));
    }

    #[test]
    fn lock_period_bounds() {
        assert!(StakeTerms::new(Decimal::ONE, 29, None).is_err());
        assert!(StakeTerms::new(Decimal::ONE, 366, None).is_err());
        assert!(StakeTerms::new(Decimal::ONE, 30, None).is_ok());
        assert!(StakeTerms::new(Decimal::ONE, 365, None).is_ok());
    }

    #[test]
    fn rate_bounds() {
        assert!(StakeTerms::new(Decimal::ONE, 30, Some(Decimal::new(11, 1))).is_err());
        assert!(StakeTerms::new(Decimal::ONE, 30, Some(Decimal::from(-1))).is_err());
        assert!(StakeTerms::new(Decimal::ONE, 30, Some(Decimal::ZERO)).is_ok());
    }

    #[test]
    fn full_year_earns_apy() {
        let e = earnings(Decimal::from(36_500), Decimal::new(4, 2), 365);
        assert_eq!(e.round_dp(2), Decimal::from(1_460));
    }

    #[test]
    fn daily_earnings_rounded() {
        assert_eq!(
            daily_earnings(Decimal::from(36_500), Decimal::new(4, 2)),
            Decimal::from(4)
        );
    }

    #[test]
    fn days_held_floors_and_clamps() {
        let now = Utc::now();
        assert_eq!(days_held(now - Duration::hours(47), now), 1);
        assert_eq!(days_held(now + Duration::hours(5), now), 0);
    }

    #[test]
    fn accruals_stop_at_term_end() {
        let start = Utc::now() - Duration::days(400);
        let end = start + Duration::days(30);
        assert_eq!(term_days(start, end), 30);
        assert_eq!(accrued_days(start, end, Utc::now()), 30);
        assert_eq!(accrued_days(start, end, start + Duration::hours(36)), 1);
        assert!(is_matured(end, Utc::now()));
        assert!(!is_matured(end, start));
    }

    #[test]
    fn period_windows() {
        let now = Utc::now();
        assert_eq!(EarningsPeriod::default(), EarningsPeriod::Month);
        assert_eq!("7d".parse::<EarningsPeriod>().unwrap().since(now), now - Duration::days(7));
        assert_eq!(EarningsPeriod::Year.since(now), now - Duration::days(365));
        assert!("2w".parse::<EarningsPeriod>().is_err());
    }

    #[test]
    fn end_date_adds_lock_days() {
        let start = Utc::now();
        let terms = StakeTerms::new(Decimal::from(10), 90, None).unwrap();
        assert_eq!(terms.end_date(start) - start, Duration::days(90));
        assert_eq!(remaining_days(terms.end_date(start), start), 90);
    }
}
