//! # Balance and Withdrawal Limit Evaluation
//!
//! Two questions gate every withdrawal:
//!
//! 1. **Balance** — is `total − Σ locked` at least the amount?
//! 2. **Limits** — in this order: KYC approved, verified bank account on
//!    file, today's withdrawals plus the amount within the daily limit, the
//!    amount within the single-withdrawal limit.
//!
//! "Today" is the current UTC calendar day. Pending, processing and
//! successful withdrawals count toward it; failed ones were refunded and do
//! not. Limits are process-wide values, never per company.
//!
//! Available balance is reported unclamped. When locks exceed the balance
//! the available figure is negative and no positive amount passes.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::require_positive;
use crate::{KycStatus, LedgerError};

/// Default daily withdrawal limit in USDE.
pub const DEFAULT_DAILY_LIMIT: i64 = 10_000;

/// Default single withdrawal limit in USDE.
pub const DEFAULT_SINGLE_LIMIT: i64 = 5_000;

/// Result of an available-balance check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceCheck {
    /// Current USDE balance.
    pub total_balance: Decimal,
    /// Sum of the company's locked balances.
    pub locked_amount: Decimal,
    /// `total_balance − locked_amount`; may be negative.
    pub available_balance: Decimal,
    /// `available_balance >= amount`.
    pub has_enough_balance: bool,
}

impl BalanceCheck {
    /// Compute the check for `amount`.
    pub fn compute(total_balance: Decimal, locked_amount: Decimal, amount: Decimal) -> Self {
        let available_balance = total_balance - locked_amount;
        Self {
            total_balance,
            locked_amount,
            available_balance,
            has_enough_balance: available_balance >= amount,
        }
    }

    /// Fail with [`LedgerError::InsufficientBalance`] unless the amount fits.
    pub fn require_enough(&self, amount: Decimal) -> Result<(), LedgerError> {
        if self.has_enough_balance {
            Ok(())
        } else {
            Err(LedgerError::InsufficientBalance {
                available: self.available_balance,
                requested: amount,
            })
        }
    }
}

/// Result of a successful limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitCheck {
    /// Today's qualifying withdrawals, excluding the requested amount.
    pub daily_total: Decimal,
    /// Daily limit in force.
    pub daily_limit: Decimal,
    /// Single-withdrawal limit in force.
    pub single_limit: Decimal,
    /// The verified bank account the withdrawal will pay out to.
    pub bank_account_id: Uuid,
}

/// Process-wide withdrawal limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalLimits {
    /// Maximum sum of qualifying withdrawals per UTC day.
    pub daily: Decimal,
    /// Maximum amount of one withdrawal.
    pub single: Decimal,
}

impl Default for WithdrawalLimits {
    fn default() -> Self {
        Self {
            daily: Decimal::from(DEFAULT_DAILY_LIMIT),
            single: Decimal::from(DEFAULT_SINGLE_LIMIT),
        }
    }
}

/// Everything a store gathers (under its lock) before authorizing a
/// withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawalContext {
    /// Company KYC status.
    pub kyc_status: KycStatus,
    /// Current USDE balance.
    pub total_balance: Decimal,
    /// Sum of locked balances.
    pub locked_amount: Decimal,
    /// Today's qualifying withdrawals.
    pub daily_total: Decimal,
    /// Verified bank account eligible for this withdrawal, if any.
    pub verified_bank_account: Option<Uuid>,
}

impl WithdrawalLimits {
    /// Validate configured limits.
    pub fn new(daily: Decimal, single: Decimal) -> Result<Self, LedgerError> {
        if daily <= Decimal::ZERO || single <= Decimal::ZERO {
            return Err(LedgerError::Validation(
                "withdrawal limits must be greater than zero".into(),
            ));
        }
        Ok(Self { daily, single })
    }

    /// Run the limit checks in order: KYC, bank account, daily, single.
    pub fn check(
        &self,
        kyc_status: KycStatus,
        verified_bank_account: Option<Uuid>,
        daily_total: Decimal,
        amount: Decimal,
    ) -> Result<LimitCheck, LedgerError> {
        kyc_status.require_approved()?;

        let bank_account_id = verified_bank_account.ok_or(LedgerError::BankAccountMissing)?;

        if daily_total + amount > self.daily {
            return Err(LedgerError::DailyLimitExceeded {
                limit: self.daily,
                used: daily_total,
                requested: amount,
            });
        }

        if amount > self.single {
            return Err(LedgerError::SingleLimitExceeded {
                limit: self.single,
                requested: amount,
            });
        }

        Ok(LimitCheck {
            daily_total,
            daily_limit: self.daily,
            single_limit: self.single,
            bank_account_id,
        })
    }

    /// Full authorization used when creating a withdrawal: positive amount,
    /// then balance, then [`check`](Self::check).
    pub fn authorize(
        &self,
        ctx: &WithdrawalContext,
        amount: Decimal,
    ) -> Result<(BalanceCheck, LimitCheck), LedgerError> {
        require_positive(amount)?;
        let balance = BalanceCheck::compute(ctx.total_balance, ctx.locked_amount, amount);
        balance.require_enough(amount)?;
        let limits = self.check(
            ctx.kyc_status,
            ctx.verified_bank_account,
            ctx.daily_total,
            amount,
        )?;
        Ok((balance, limits))
    }
}

/// Start and end (exclusive) of the UTC calendar day containing `now`.
pub fn utc_day_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::default()));
    (start, start + Duration::days(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn approved_ctx(balance: i64) -> WithdrawalContext {
        WithdrawalContext {
            kyc_status: KycStatus::Approved,
            total_balance: d(balance),
            locked_amount: Decimal::ZERO,
            daily_total: Decimal::ZERO,
            verified_bank_account: Some(Uuid::new_v4()),
        }
    }

    #[test]
    fn available_balance_subtracts_locks() {
        let check = BalanceCheck::compute(d(5000), d(1500), d(3000));
        assert_eq!(check.available_balance, d(3500));
        assert!(check.has_enough_balance);
    }

    #[test]
    fn over_locked_balance_is_negative_and_unclamped() {
        let check = BalanceCheck::compute(d(1000), d(1500), d(1));
        assert_eq!(check.available_balance, d(-500));
        assert!(!check.has_enough_balance);
        assert!(check.require_enough(d(1)).is_err());
    }

    #[test]
    fn kyc_checked_first() {
        let limits = WithdrawalLimits::default();
        let err = limits
            .check(KycStatus::Pending, None, d(20_000), d(9_000))
            .unwrap_err();
        assert!(matches!(err, LedgerError::KycRequired { .. }));
    }

    #[test]
    fn bank_account_checked_before_amounts() {
        let limits = WithdrawalLimits::default();
        let err = limits
            .check(KycStatus::Approved, None, d(20_000), d(9_000))
            .unwrap_err();
        assert_eq!(err, LedgerError::BankAccountMissing);
    }

    #[test]
    fn daily_checked_before_single() {
        let limits = WithdrawalLimits::default();
        let err = limits
            .check(KycStatus::Approved, Some(Uuid::new_v4()), d(8_000), d(6_000))
            .unwrap_err();
        assert!(matches!(err, LedgerError::DailyLimitExceeded { .. }));
    }

    #[test]
    fn six_thousand_fails_single_limit() {
        let limits = WithdrawalLimits::default();
        let err = limits
            .check(KycStatus::Approved, Some(Uuid::new_v4()), Decimal::ZERO, d(6_000))
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::SingleLimitExceeded {
                limit: d(5_000),
                requested: d(6_000),
            }
        );
    }

    #[test]
    fn daily_limit_is_inclusive() {
        let limits = WithdrawalLimits::default();
        let account = Uuid::new_v4();
        let ok = limits
            .check(KycStatus::Approved, Some(account), d(5_000), d(5_000))
            .unwrap();
        assert_eq!(ok.bank_account_id, account);
        assert_eq!(ok.daily_total, d(5_000));
        assert!(limits
            .check(KycStatus::Approved, Some(account), d(5_001), d(5_000))
            .is_err());
    }

    #[test]
    fn authorize_checks_balance_before_limits() {
        let limits = WithdrawalLimits::default();
        let mut ctx = approved_ctx(100);
        ctx.kyc_status = KycStatus::Rejected;
        let err = limits.authorize(&ctx, d(3_000)).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
    }

    #[test]
    fn authorize_rejects_non_positive_amount() {
        let limits = WithdrawalLimits::default();
        let err = limits.authorize(&approved_ctx(5_000), Decimal::ZERO).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount { .. }));
    }

    #[test]
    fn authorize_happy_path() {
        let limits = WithdrawalLimits::default();
        let (balance, check) = limits.authorize(&approved_ctx(5_000), d(3_000)).unwrap();
        assert_eq!(balance.available_balance, d(5_000));
        assert_eq!(check.single_limit, d(5_000));
        assert_eq!(check.daily_limit, d(10_000));
    }

    #[test]
    fn limits_must_be_positive() {
        assert!(WithdrawalLimits::new(Decimal::ZERO, d(1)).is_err());
        assert!(WithdrawalLimits::new(d(10), d(5)).is_ok());
    }

    #[test]
    fn day_bounds_cover_24_hours() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 23, 59, 59).unwrap();
        let (start, end) = utc_day_bounds(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap());
    }

    proptest! {
        #[test]
        fn available_is_total_minus_locked(total in -1_000_000i64..1_000_000, locked in 0i64..1_000_000) {
            let check = BalanceCheck::compute(Decimal::new(total, 2), Decimal::new(locked, 2), Decimal::ONE);
            prop_assert_eq!(check.available_balance, Decimal::new(total - locked, 2));
        }
    }
}
