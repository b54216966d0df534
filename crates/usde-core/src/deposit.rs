//! # Deposits
//!
//! A deposit is a fiat top-up that mints USDE once completed. The company
//! receives `amount − fee` where the fee is 0.25 % of the amount, rounded to
//! cents. Every request is risk-scored first:
//!
//! | Factor | Points |
//! |---|---|
//! | amount above 50,000 | 30 |
//! | more than 5 deposits in the last 24 hours | 20 |
//! | KYC not approved | 50 |
//!
//! Scores above 70 are rejected, above 40 go to manual review, the rest are
//! approved. Pending deposits expire after two hours.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{KycStatus, LedgerError};

/// Smallest accepted deposit.
pub const MIN_DEPOSIT: i64 = 1;

/// Largest accepted deposit.
pub const MAX_DEPOSIT: i64 = 1_000_000;

/// Hours until a pending deposit expires.
pub const DEPOSIT_TTL_HOURS: i64 = 2;

/// Fee rate as a fraction: 0.0025.
pub fn fee_rate() -> Decimal {
    Decimal::new(25, 4)
}

/// Deposit lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    /// Awaiting payment confirmation.
    Pending,
    /// Paid; USDE minted.
    Completed,
    /// Refused by risk assessment.
    Rejected,
    /// Not completed before `expiresAt`.
    Expired,
}

wire_enum!(DepositStatus, "deposit status", {
    Pending => "pending",
    Completed => "completed",
    Rejected => "rejected",
    Expired => "expired",
});

impl DepositStatus {
    /// Whether a deposit in this status, expiring at `expires_at`, should be
    /// marked [`Expired`](Self::Expired) at `now`.
    pub fn is_lapsed(&self, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        *self == Self::Pending && now > expires_at
    }

    /// Check that a deposit in this status, expiring at `expires_at`, may be
    /// completed at `now`.
    pub fn require_completable(
        &self,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        match self {
            Self::Pending if now <= expires_at => Ok(()),
            Self::Pending => Err(LedgerError::invalid_state(
                "deposit",
                Self::Expired,
                "deposit order has expired",
            )),
            other => Err(LedgerError::invalid_state(
                "deposit",
                other,
                "only pending deposits can be completed",
            )),
        }
    }
}

/// Fee breakdown for a deposit amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositQuote {
    /// Fiat amount paid in.
    pub amount: Decimal,
    /// Fee withheld.
    pub fee: Decimal,
    /// Fee rate applied.
    pub fee_rate: Decimal,
    /// USDE minted on completion.
    pub usde_amount: Decimal,
}

impl DepositQuote {
    /// Validate the amount range and compute the fee.
    pub fn for_amount(amount: Decimal) -> Result<Self, LedgerError> {
        if amount < Decimal::from(MIN_DEPOSIT) || amount > Decimal::from(MAX_DEPOSIT) {
            return Err(LedgerError::InvalidAmount {
                reason: format!("deposit must be between {MIN_DEPOSIT} and {MAX_DEPOSIT}"),
            });
        }
        let rate = fee_rate();
        let fee = (amount * rate).round_dp(2);
        Ok(Self {
            amount,
            fee,
            fee_rate: rate,
            usde_amount: amount - fee,
        })
    }

    /// Expiry for an order created at `now`.
    pub fn expires_at(now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::hours(DEPOSIT_TTL_HOURS)
    }
}

/// Outcome of the risk assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskDecision {
    /// Proceed.
    Approved,
    /// Proceed, flagged for manual review.
    ManualReview,
    /// Refuse the deposit.
    Rejected,
}

wire_enum!(RiskDecision, "risk decision", {
    Approved => "approved",
    ManualReview => "manual_review",
    Rejected => "rejected",
});

/// Score, decision and triggered factors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    /// Sum of triggered factor points.
    pub score: u32,
    /// Decision derived from the score.
    pub decision: RiskDecision,
    /// Names of triggered factors.
    pub factors: Vec<String>,
}

impl RiskAssessment {
    /// Score a deposit request.
    ///
    /// `recent_deposits` is the number of deposits the company created in
    /// the 24 hours before this one.
    pub fn assess(amount: Decimal, recent_deposits: u64, kyc_status: KycStatus) -> Self {
        let mut score = 0;
        let mut factors = Vec::new();

        if amount > Decimal::from(50_000) {
            score += 30;
            factors.push("large_amount".to_string());
        }
        if recent_deposits > 5 {
            score += 20;
            factors.push("high_frequency".to_string());
        }
        if !kyc_status.is_approved() {
            score += 50;
            factors.push("kyc_not_approved".to_string());
        }

        let decision = if score > 70 {
            RiskDecision::Rejected
        } else if score > 40 {
            RiskDecision::ManualReview
        } else {
            RiskDecision::Approved
        };

        Self {
            score,
            decision,
            factors,
        }
    }

    /// Fail with [`LedgerError::RiskRejected`] when the decision is `rejected`.
    pub fn require_accepted(&self) -> Result<(), LedgerError> {
        if self.decision == RiskDecision::Rejected {
            Err(LedgerError::RiskRejected { score: self.score })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_is_quarter_percent() {
        let quote = DepositQuote::for_amount(Decimal::from(10_000)).unwrap();
        assert_eq!(quote.fee, Decimal::from(25));
        assert_eq!(quote.usde_amount, Decimal::from(9_975));
        assert_eq!(quote.fee_rate, Decimal::new(25, 4));
    }

    #[test]
    fn fee_rounds_to_cents() {
        let quote = DepositQuote::for_amount(Decimal::new(1999, 2)).unwrap();
        // 19.99 * 0.0025 = 0.049975
        assert_eq!(quote.fee, Decimal::new(5, 2));
        assert_eq!(quote.usde_amount, Decimal::new(1994, 2));
    }

    #[test]
    fn amount_range_enforced() {
        assert!(DepositQuote::for_amount(Decimal::new(99, 2)).is_err());
        assert!(DepositQuote::for_amount(Decimal::from(1_000_001)).is_err());
        assert!(DepositQuote::for_amount(Decimal::from(1)).is_ok());
        assert!(DepositQuote::for_amount(Decimal::from(1_000_000)).is_ok());
    }

    #[test]
    fn clean_request_is_approved() {
        let risk = RiskAssessment::assess(Decimal::from(1_000), 0, KycStatus::Approved);
        assert_eq!(risk.score, 0);
        assert_eq!(risk.decision, RiskDecision::Approved);
        assert!(risk.factors.is_empty());
    }

    #[test]
    fn unapproved_kyc_goes_to_manual_review() {
        let risk = RiskAssessment::assess(Decimal::from(1_000), 0, KycStatus::Pending);
        assert_eq!(risk.score, 50);
        assert_eq!(risk.decision, RiskDecision::ManualReview);
        assert!(risk.require_accepted().is_ok());
    }

    #[test]
    fn large_unverified_deposit_rejected() {
        let risk = RiskAssessment::assess(Decimal::from(60_000), 0, KycStatus::Pending);
        assert_eq!(risk.score, 80);
        assert_eq!(risk.decision, RiskDecision::Rejected);
        assert_eq!(
            risk.require_accepted().unwrap_err(),
            LedgerError::RiskRejected { score: 80 }
        );
    }

    #[test]
    fn frequency_and_size_only_reach_review() {
        let risk = RiskAssessment::assess(Decimal::from(60_000), 6, KycStatus::Approved);
        assert_eq!(risk.score, 50);
        assert_eq!(risk.decision, RiskDecision::ManualReview);
    }

    #[test]
    fn expired_pending_cannot_complete() {
        let now = Utc::now();
        let expires = now - Duration::minutes(1);
        assert!(DepositStatus::Pending.require_completable(expires, now).is_err());
        assert!(DepositStatus::Pending
            .require_completable(now + Duration::minutes(1), now)
            .is_ok());
        assert!(DepositStatus::Completed
            .require_completable(now + Duration::hours(1), now)
            .is_err());
    }

    #[test]
    fn only_pending_deposits_lapse() {
        let now = Utc::now();
        let past = now - Duration::minutes(1);
        assert!(DepositStatus::Pending.is_lapsed(past, now));
        assert!(!DepositStatus::Pending.is_lapsed(now + Duration::minutes(1), now));
        assert!(!DepositStatus::Completed.is_lapsed(past, now));
        assert!(!DepositStatus::Expired.is_lapsed(past, now));
    }
}
